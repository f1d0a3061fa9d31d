//! Text helpers for Telegram HTML parse mode.

/// Placeholder in menu prompts replaced with the sender's display name.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Telegram's limit for one text message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '"' => Some("&quot;"),
        _ => None,
    }
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match escape_char(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

/// Escape `text` so the result fits in `max_chars`, cutting between escaped
/// characters and marking the cut with `...`.
pub fn escape_html_within(text: &str, max_chars: usize) -> String {
    let escaped = escape_html(text);
    if escaped.chars().count() <= max_chars {
        return escaped;
    }

    let budget = max_chars.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let width = escape_char(c).map_or(1, |e| e.len());
        if used + width > budget {
            break;
        }
        match escape_char(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
        used += width;
    }
    out.push_str("...");
    out
}

/// Render a menu prompt for one user.
///
/// Prompts are trusted configuration (they may carry markup); the display name
/// is user input and gets escaped.
pub fn render_prompt(template: &str, display_name: &str) -> String {
    if !template.contains(NAME_PLACEHOLDER) {
        return template.to_string();
    }
    template.replace(NAME_PLACEHOLDER, &escape_html(display_name))
}

/// Cap HTML `text` at `max_chars` characters, marking the cut with `...`.
///
/// The cut backs off to before a tag or entity it would split.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    if let Some(lt) = cut.rfind('<') {
        if !cut[lt..].contains('>') {
            cut.truncate(lt);
        }
    }
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut.truncate(amp);
        }
    }
    cut.push_str("...");
    cut
}
