use crate::domain::{ChatId, MessageId};

/// Normalized incoming update.
///
/// Telegram's raw JSON never leaves `update::normalize`; everything past it
/// works with this closed set of variants.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundUpdate {
    Text(TextMessage),
    Command(Command),
    Callback(CallbackQuery),
    Unknown { raw: serde_json::Value },
}

impl InboundUpdate {
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::Text(m) => Some(m.chat_id),
            Self::Command(c) => Some(c.chat_id),
            Self::Callback(q) => Some(q.chat_id),
            Self::Unknown { .. } => None,
        }
    }

    pub fn sender_name(&self) -> Option<&str> {
        match self {
            Self::Text(m) => Some(&m.sender_name),
            Self::Command(c) => Some(&c.sender_name),
            Self::Callback(q) => Some(&q.sender_name),
            Self::Unknown { .. } => None,
        }
    }

    /// Short variant label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Command(_) => "command",
            Self::Callback(_) => "callback",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub sender_name: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub chat_id: ChatId,
    pub sender_name: String,
    /// Lower-cased, including the leading `/`, without any `@botname` suffix.
    pub command: String,
    pub args: String,
}

impl Command {
    /// The command as the user typed it (modulo case), for echoing.
    pub fn as_text(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub query_id: String,
    pub sender_name: String,
    pub token: String,
    /// The message carrying the pressed keyboard, when Telegram includes it.
    pub message_id: Option<MessageId>,
}

/// Abstract reply produced by the dispatcher and delivered by the executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyAction {
    SendText {
        chat_id: ChatId,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    SendPhoto {
        chat_id: ChatId,
        photo_url: String,
        caption: Option<String>,
        keyboard: Option<InlineKeyboard>,
    },
    AcknowledgeCallback {
        query_id: String,
        toast_text: Option<String>,
    },
    EditText {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
}

/// Inline keyboard: ordered rows of callback buttons.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Lay `buttons` out left to right, `columns` per row.
    pub fn with_columns(buttons: Vec<InlineButton>, columns: usize) -> Self {
        let columns = columns.max(1);
        let mut rows = Vec::new();
        let mut row = Vec::with_capacity(columns);
        for b in buttons {
            row.push(b);
            if row.len() == columns {
                rows.push(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        Self { rows }
    }

    /// Callback tokens in display order.
    pub fn tokens(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
            .collect()
    }
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub max_message_len: usize,
    pub max_caption_len: usize,
}
