//! Telegram update JSON → `InboundUpdate`.
//!
//! Normalization never fails: anything that does not match a recognized shape
//! becomes `InboundUpdate::Unknown` carrying the raw payload.

use serde_json::Value;

use crate::{
    domain::{ChatId, MessageId},
    messaging::types::{CallbackQuery, Command, InboundUpdate, TextMessage},
};

/// Display name used when `from.first_name` is absent or blank.
pub const FALLBACK_SENDER_NAME: &str = "friend";

pub fn normalize(raw: &Value) -> InboundUpdate {
    normalize_message(raw)
        .or_else(|| normalize_callback(raw))
        .unwrap_or_else(|| InboundUpdate::Unknown { raw: raw.clone() })
}

/// Normalize a raw HTTP body. Non-JSON bodies become `Unknown` holding the
/// body as a lossy string.
pub fn normalize_bytes(body: &[u8]) -> InboundUpdate {
    match serde_json::from_slice::<Value>(body) {
        Ok(v) => normalize(&v),
        Err(_) => InboundUpdate::Unknown {
            raw: Value::String(String::from_utf8_lossy(body).into_owned()),
        },
    }
}

fn normalize_message(raw: &Value) -> Option<InboundUpdate> {
    let message = raw.get("message")?;
    let chat_id = chat_id_of(message)?;
    let text = message.get("text")?.as_str()?;
    let sender_name = sender_name_of(message);

    if let Some(rest) = text.strip_prefix('/') {
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        // `/start@MyBot` in group chats.
        let name = head.split('@').next().unwrap_or(head);
        return Some(InboundUpdate::Command(Command {
            chat_id,
            sender_name,
            command: format!("/{}", name.to_lowercase()),
            args: args.to_string(),
        }));
    }

    Some(InboundUpdate::Text(TextMessage {
        chat_id,
        sender_name,
        text: text.to_string(),
    }))
}

fn normalize_callback(raw: &Value) -> Option<InboundUpdate> {
    let query = raw.get("callback_query")?;
    let query_id = id_string(query.get("id")?)?;
    let message = query.get("message")?;
    let chat_id = chat_id_of(message)?;
    let message_id = message
        .get("message_id")
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
        .map(MessageId);
    let token = query
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(InboundUpdate::Callback(CallbackQuery {
        chat_id,
        query_id,
        sender_name: sender_name_of(query),
        token,
        message_id,
    }))
}

fn chat_id_of(message: &Value) -> Option<ChatId> {
    message
        .get("chat")?
        .get("id")?
        .as_i64()
        .map(ChatId)
}

/// Callback query ids are strings in the Bot API, but be lenient with numbers.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn sender_name_of(container: &Value) -> String {
    container
        .get("from")
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_SENDER_NAME)
        .to_string()
}
