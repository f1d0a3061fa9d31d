//! Delivers `ReplyAction`s through a `MessagingPort`.
//!
//! Delivery problems are reported, never raised: the caller always gets one
//! `DeliveryResult` per action and processing of the update carries on.

use crate::{
    domain::{ChatId, MessageRef},
    formatting::truncate_chars,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, ReplyAction},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// Something reached the user, but not what was asked for (or a callback
    /// acknowledgement was lost).
    Degraded,
    Failed,
}

pub async fn execute(action: &ReplyAction, sender: &dyn MessagingPort) -> DeliveryResult {
    let caps = sender.capabilities();
    match action {
        ReplyAction::SendText {
            chat_id,
            text,
            keyboard,
        } => {
            let text = truncate_chars(text, caps.max_message_len);
            match sender.send_html(*chat_id, &text, keyboard.as_ref()).await {
                Ok(_) => DeliveryResult::Delivered,
                Err(e) => {
                    tracing::warn!(chat_id = chat_id.0, error = %e, "send text failed");
                    DeliveryResult::Failed
                }
            }
        }

        ReplyAction::SendPhoto {
            chat_id,
            photo_url,
            caption,
            keyboard,
        } => {
            let caption = caption
                .as_deref()
                .map(|c| truncate_chars(c, caps.max_caption_len));
            let err = match sender
                .send_photo(*chat_id, photo_url, caption.as_deref(), keyboard.as_ref())
                .await
            {
                Ok(_) => return DeliveryResult::Delivered,
                Err(e) => e,
            };
            tracing::warn!(chat_id = chat_id.0, error = %err, "send photo failed");

            // The caption alone is better than no reply at all.
            let Some(caption) = action_caption(action) else {
                return DeliveryResult::Failed;
            };
            fallback_text(sender, *chat_id, caption, keyboard.as_ref()).await
        }

        ReplyAction::EditText {
            chat_id,
            message_id,
            text,
            keyboard,
        } => {
            let text = truncate_chars(text, caps.max_message_len);
            if caps.supports_edit {
                let msg = MessageRef {
                    chat_id: *chat_id,
                    message_id: *message_id,
                };
                match sender.edit_html(msg, &text, keyboard.as_ref()).await {
                    Ok(()) => return DeliveryResult::Delivered,
                    Err(e) => {
                        tracing::warn!(chat_id = chat_id.0, error = %e, "edit failed");
                    }
                }
            }
            fallback_text(sender, *chat_id, &text, keyboard.as_ref()).await
        }

        ReplyAction::AcknowledgeCallback {
            query_id,
            toast_text,
        } => match sender
            .answer_callback_query(query_id, toast_text.as_deref())
            .await
        {
            Ok(()) => DeliveryResult::Delivered,
            Err(e) => {
                // A missed acknowledgement only leaves the client spinner running.
                tracing::warn!(query_id = %query_id, error = %e, "callback acknowledgement failed");
                DeliveryResult::Degraded
            }
        },
    }
}

/// Deliver `actions` in order. Every action is attempted regardless of how
/// the previous ones went.
pub async fn execute_all(
    actions: &[ReplyAction],
    sender: &dyn MessagingPort,
) -> Vec<DeliveryResult> {
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        results.push(execute(action, sender).await);
    }
    results
}

fn action_caption(action: &ReplyAction) -> Option<&str> {
    match action {
        ReplyAction::SendPhoto {
            caption: Some(c), ..
        } if !c.trim().is_empty() => Some(c),
        _ => None,
    }
}

async fn fallback_text(
    sender: &dyn MessagingPort,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<&InlineKeyboard>,
) -> DeliveryResult {
    let text = truncate_chars(text, sender.capabilities().max_message_len);
    match sender.send_html(chat_id, &text, keyboard).await {
        Ok(_) => DeliveryResult::Degraded,
        Err(e) => {
            tracing::warn!(chat_id = chat_id.0, error = %e, "fallback text failed");
            DeliveryResult::Failed
        }
    }
}
