//! Pure state machine: `(session, update) -> (reply actions, next state)`.
//!
//! No I/O happens here; the caller owns the session guard and delivers the
//! returned actions in order.

use crate::{
    domain::{ChatId, MessageId},
    formatting::{escape_html_within, render_prompt, MAX_MESSAGE_CHARS},
    menu::{MenuGraph, MenuNode, ROOT_STATE},
    messaging::types::{CallbackQuery, InboundUpdate, ReplyAction},
    session::ChatSession,
};

pub const START_COMMAND: &str = "/start";
pub const ECHO_PREFIX: &str = "You said: ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub actions: Vec<ReplyAction>,
    pub next_state: String,
}

impl Dispatch {
    fn stay(session_state: &str, actions: Vec<ReplyAction>) -> Self {
        Self {
            actions,
            next_state: session_state.to_string(),
        }
    }
}

pub fn dispatch(menu: &MenuGraph, session: &ChatSession, update: &InboundUpdate) -> Dispatch {
    // A state dropped from the menu since the session was stored counts as root.
    let current = menu.node_or_root(&session.current_state);
    let name = &session.user_display_name;

    match update {
        InboundUpdate::Command(cmd) if cmd.command == START_COMMAND => Dispatch {
            actions: vec![render_node(menu.root(), cmd.chat_id, name, None)],
            next_state: ROOT_STATE.to_string(),
        },
        InboundUpdate::Command(cmd) => {
            Dispatch::stay(&current.state_id, vec![echo(cmd.chat_id, &cmd.as_text())])
        }
        InboundUpdate::Text(msg) => {
            Dispatch::stay(&current.state_id, vec![echo(msg.chat_id, &msg.text)])
        }
        InboundUpdate::Callback(q) => dispatch_callback(menu, current, name, q),
        InboundUpdate::Unknown { .. } => Dispatch::stay(&current.state_id, Vec::new()),
    }
}

fn dispatch_callback(
    menu: &MenuGraph,
    current: &MenuNode,
    name: &str,
    q: &CallbackQuery,
) -> Dispatch {
    let Some(option) = current.find_option(&q.token) else {
        // Stale or foreign button: clear the spinner, change nothing.
        return Dispatch::stay(
            &current.state_id,
            vec![ReplyAction::AcknowledgeCallback {
                query_id: q.query_id.clone(),
                toast_text: None,
            }],
        );
    };

    let ack = ReplyAction::AcknowledgeCallback {
        query_id: q.query_id.clone(),
        toast_text: option.toast.clone(),
    };
    let Some(target) = menu.node(&option.target_state) else {
        // Unreachable for a validated graph.
        return Dispatch::stay(&current.state_id, vec![ack]);
    };

    Dispatch {
        actions: vec![ack, render_node(target, q.chat_id, name, q.message_id)],
        next_state: target.state_id.clone(),
    }
}

/// The reply that presents `node` to the user.
fn render_node(
    node: &MenuNode,
    chat_id: ChatId,
    display_name: &str,
    pressed_message: Option<MessageId>,
) -> ReplyAction {
    let text = render_prompt(&node.prompt_text, display_name);
    let keyboard = node.keyboard();

    if let Some(photo_url) = &node.photo_url {
        return ReplyAction::SendPhoto {
            chat_id,
            photo_url: photo_url.clone(),
            caption: Some(text),
            keyboard,
        };
    }

    match pressed_message {
        Some(message_id) if node.edit_in_place => ReplyAction::EditText {
            chat_id,
            message_id,
            text,
            keyboard,
        },
        _ => ReplyAction::SendText {
            chat_id,
            text,
            keyboard,
        },
    }
}

fn echo(chat_id: ChatId, text: &str) -> ReplyAction {
    ReplyAction::SendText {
        chat_id,
        text: format!(
            "{ECHO_PREFIX}{}",
            escape_html_within(text, MAX_MESSAGE_CHARS - ECHO_PREFIX.len())
        ),
        keyboard: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::types::{Command, TextMessage};
    use serde_json::json;

    fn session(state: &str) -> ChatSession {
        ChatSession {
            chat_id: ChatId(42),
            current_state: state.to_string(),
            user_display_name: "Ann".to_string(),
        }
    }

    fn command(name: &str) -> InboundUpdate {
        InboundUpdate::Command(Command {
            chat_id: ChatId(42),
            sender_name: "Ann".to_string(),
            command: name.to_string(),
            args: String::new(),
        })
    }

    fn callback(token: &str) -> InboundUpdate {
        InboundUpdate::Callback(CallbackQuery {
            chat_id: ChatId(42),
            query_id: "q1".to_string(),
            sender_name: "Ann".to_string(),
            token: token.to_string(),
            message_id: Some(MessageId(9)),
        })
    }

    fn text(t: &str) -> InboundUpdate {
        InboundUpdate::Text(TextMessage {
            chat_id: ChatId(42),
            sender_name: "Ann".to_string(),
            text: t.to_string(),
        })
    }

    fn ack_only() -> Vec<ReplyAction> {
        vec![ReplyAction::AcknowledgeCallback {
            query_id: "q1".to_string(),
            toast_text: None,
        }]
    }

    #[test]
    fn start_sends_root_photo_with_keyboard() {
        let menu = MenuGraph::builtin().unwrap();
        let root = menu.root();
        let out = dispatch(&menu, &session(ROOT_STATE), &command("/start"));

        assert_eq!(out.next_state, ROOT_STATE);
        assert_eq!(
            out.actions,
            vec![ReplyAction::SendPhoto {
                chat_id: ChatId(42),
                photo_url: root.photo_url.clone().unwrap(),
                caption: Some(render_prompt(&root.prompt_text, "Ann")),
                keyboard: root.keyboard(),
            }]
        );
        let ReplyAction::SendPhoto { caption, keyboard, .. } = &out.actions[0] else {
            unreachable!();
        };
        assert!(caption.as_deref().unwrap().contains("Ann"));
        assert_eq!(keyboard.as_ref().unwrap().tokens(), vec!["more_info", "start"]);
    }

    #[test]
    fn start_resets_from_every_state() {
        let menu = MenuGraph::builtin().unwrap();
        for node in menu.nodes() {
            let out = dispatch(&menu, &session(&node.state_id), &command("/start"));
            assert_eq!(out.next_state, ROOT_STATE, "from {}", node.state_id);
            assert_eq!(out.actions.len(), 1);
        }
    }

    #[test]
    fn root_more_info_acks_then_replies() {
        let menu = MenuGraph::builtin().unwrap();
        let more = menu.node("more_info").unwrap();
        let out = dispatch(&menu, &session(ROOT_STATE), &callback("more_info"));

        assert_eq!(out.next_state, "more_info");
        assert_eq!(
            out.actions,
            vec![
                ack_only().remove(0),
                ReplyAction::SendText {
                    chat_id: ChatId(42),
                    text: more.prompt_text.clone(),
                    keyboard: more.keyboard(),
                },
            ]
        );
    }

    #[test]
    fn leaf_choice_confirms_selection() {
        let menu = MenuGraph::builtin().unwrap();
        let out = dispatch(&menu, &session("start"), &callback("di"));

        assert_eq!(out.next_state, "choice_di");
        assert_eq!(out.actions.len(), 2);
        assert!(matches!(out.actions[0], ReplyAction::AcknowledgeCallback { .. }));
        let ReplyAction::SendText { text, keyboard, .. } = &out.actions[1] else {
            panic!("expected text reply, got {:?}", out.actions[1]);
        };
        assert!(text.starts_with("You selected: DI"));
        assert_eq!(keyboard.as_ref().unwrap().tokens(), vec!["more_info", "start"]);
    }

    #[test]
    fn unreachable_tokens_only_ack_and_keep_state() {
        let menu = MenuGraph::builtin().unwrap();
        // `di` is valid in the menu, but not from root.
        for (state, token) in [
            (ROOT_STATE, "di"),
            ("start", "more_info"),
            ("choice_fm", "fm"),
            ("more_info", ""),
            ("start", "no_such_token"),
        ] {
            let out = dispatch(&menu, &session(state), &callback(token));
            assert_eq!(out.next_state, state, "{state}/{token}");
            assert_eq!(out.actions, ack_only(), "{state}/{token}");
        }
    }

    #[test]
    fn text_echoes_and_never_moves() {
        let menu = MenuGraph::builtin().unwrap();
        for node in menu.nodes() {
            let out = dispatch(&menu, &session(&node.state_id), &text("hello"));
            assert_eq!(out.next_state, node.state_id);
            assert_eq!(
                out.actions,
                vec![ReplyAction::SendText {
                    chat_id: ChatId(42),
                    text: "You said: hello".to_string(),
                    keyboard: None,
                }]
            );
        }
    }

    #[test]
    fn echo_escapes_html() {
        let menu = MenuGraph::builtin().unwrap();
        let out = dispatch(&menu, &session(ROOT_STATE), &text("<b>hi</b>"));
        let ReplyAction::SendText { text, .. } = &out.actions[0] else {
            panic!();
        };
        assert_eq!(text, "You said: &lt;b&gt;hi&lt;/b&gt;");
    }

    #[test]
    fn other_commands_echo_like_text() {
        let menu = MenuGraph::builtin().unwrap();
        let out = dispatch(&menu, &session("start"), &command("/help"));
        assert_eq!(out.next_state, "start");
        let ReplyAction::SendText { text, .. } = &out.actions[0] else {
            panic!();
        };
        assert_eq!(text, "You said: /help");
    }

    #[test]
    fn unknown_is_a_no_op() {
        let menu = MenuGraph::builtin().unwrap();
        let out = dispatch(
            &menu,
            &session("start"),
            &InboundUpdate::Unknown { raw: json!({"poll": {}}) },
        );
        assert_eq!(out, Dispatch::stay("start", Vec::new()));
    }

    #[test]
    fn stale_session_state_is_treated_as_root() {
        let menu = MenuGraph::builtin().unwrap();
        let out = dispatch(&menu, &session("removed_state"), &callback("start"));
        assert_eq!(out.next_state, "start");

        let out = dispatch(&menu, &session("removed_state"), &text("x"));
        assert_eq!(out.next_state, ROOT_STATE);
    }

    #[test]
    fn edit_in_place_nodes_edit_the_pressed_message() {
        let menu = MenuGraph::from_toml(
            r#"
            [[node]]
            id = "root"
            prompt = "Pick"
            [[node.option]]
            label = "Day"
            token = "day"
            target = "day"
            toast = "One moment"

            [[node]]
            id = "day"
            prompt = "Today is a fine day"
            edit_in_place = true
            "#,
        )
        .unwrap();

        let out = dispatch(&menu, &session(ROOT_STATE), &callback("day"));
        assert_eq!(out.next_state, "day");
        assert_eq!(
            out.actions,
            vec![
                ReplyAction::AcknowledgeCallback {
                    query_id: "q1".to_string(),
                    toast_text: Some("One moment".to_string()),
                },
                ReplyAction::EditText {
                    chat_id: ChatId(42),
                    message_id: MessageId(9),
                    text: "Today is a fine day".to_string(),
                    keyboard: None,
                },
            ]
        );

        // Without the pressed message there is nothing to edit.
        let mut q = match callback("day") {
            InboundUpdate::Callback(q) => q,
            _ => unreachable!(),
        };
        q.message_id = None;
        let out = dispatch(&menu, &session(ROOT_STATE), &InboundUpdate::Callback(q));
        assert!(matches!(out.actions[1], ReplyAction::SendText { .. }));
    }
}
