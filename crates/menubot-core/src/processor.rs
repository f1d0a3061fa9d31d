use std::sync::Arc;

use serde_json::Value;

use crate::{
    dispatcher::dispatch,
    domain::ChatId,
    executor::{execute_all, DeliveryResult},
    menu::MenuGraph,
    messaging::{port::MessagingPort, types::InboundUpdate},
    session::SessionStore,
    update::{normalize, normalize_bytes},
};

/// What happened to one update, for logging and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub chat_id: Option<ChatId>,
    pub previous_state: Option<String>,
    pub next_state: Option<String>,
    pub results: Vec<DeliveryResult>,
}

impl ProcessOutcome {
    pub fn count(&self, r: DeliveryResult) -> usize {
        self.results.iter().filter(|x| **x == r).count()
    }
}

/// Runs one update end to end: normalize, lock the chat, dispatch, deliver,
/// store the next state.
#[derive(Clone)]
pub struct UpdateProcessor {
    menu: Arc<MenuGraph>,
    sessions: Arc<SessionStore>,
    messenger: Arc<dyn MessagingPort>,
}

impl UpdateProcessor {
    pub fn new(
        menu: Arc<MenuGraph>,
        sessions: Arc<SessionStore>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            menu,
            sessions,
            messenger,
        }
    }

    pub fn menu(&self) -> &MenuGraph {
        &self.menu
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn process(&self, raw: &Value) -> ProcessOutcome {
        self.process_update(normalize(raw)).await
    }

    pub async fn process_bytes(&self, body: &[u8]) -> ProcessOutcome {
        self.process_update(normalize_bytes(body)).await
    }

    pub async fn process_update(&self, update: InboundUpdate) -> ProcessOutcome {
        let Some(chat_id) = update.chat_id() else {
            if let InboundUpdate::Unknown { raw } = &update {
                tracing::debug!(keys = %payload_keys(raw), "ignoring unrecognized update");
            }
            return ProcessOutcome::default();
        };

        // Held until the next state is stored: one update per chat at a time.
        let mut session = self.sessions.lock(chat_id).await;
        if let Some(name) = update.sender_name() {
            if session.user_display_name != name {
                session.user_display_name = name.to_string();
            }
        }

        let previous = session.current_state.clone();
        let out = dispatch(&self.menu, &session, &update);
        let results = execute_all(&out.actions, self.messenger.as_ref()).await;
        session.current_state = out.next_state.clone();
        drop(session);

        let outcome = ProcessOutcome {
            chat_id: Some(chat_id),
            previous_state: Some(previous),
            next_state: Some(out.next_state),
            results,
        };
        tracing::info!(
            chat_id = chat_id.0,
            kind = update.kind(),
            from = outcome.previous_state.as_deref().unwrap_or_default(),
            to = outcome.next_state.as_deref().unwrap_or_default(),
            actions = outcome.results.len(),
            degraded = outcome.count(DeliveryResult::Degraded),
            failed = outcome.count(DeliveryResult::Failed),
            "update processed"
        );
        outcome
    }
}

/// Top-level keys of a payload, never its values (they may carry user data).
fn payload_keys(raw: &Value) -> String {
    match raw {
        Value::Object(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
        Value::Null => "null".to_string(),
        Value::Array(_) => "array".to_string(),
        _ => "scalar".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::tests::{Call, FakeMessenger},
        menu::ROOT_STATE,
    };
    use serde_json::json;

    fn processor(api: Arc<FakeMessenger>) -> UpdateProcessor {
        UpdateProcessor::new(
            Arc::new(MenuGraph::builtin().unwrap()),
            Arc::new(SessionStore::default()),
            api,
        )
    }

    fn start(chat: i64, name: &str) -> Value {
        json!({"message": {"chat": {"id": chat}, "from": {"first_name": name}, "text": "/start"}})
    }

    fn press(chat: i64, token: &str) -> Value {
        json!({"callback_query": {
            "id": format!("cb-{token}"),
            "data": token,
            "from": {"first_name": "Ann"},
            "message": {"message_id": 3, "chat": {"id": chat}}
        }})
    }

    #[tokio::test]
    async fn walks_the_menu_across_updates() {
        let api = Arc::new(FakeMessenger::default());
        let p = processor(api.clone());

        let out = p.process(&start(7, "Ann")).await;
        assert_eq!(out.next_state.as_deref(), Some(ROOT_STATE));
        assert_eq!(out.results, vec![DeliveryResult::Delivered]);

        let out = p.process(&press(7, "start")).await;
        assert_eq!(out.previous_state.as_deref(), Some(ROOT_STATE));
        assert_eq!(out.next_state.as_deref(), Some("start"));

        let out = p.process(&press(7, "di")).await;
        assert_eq!(out.next_state.as_deref(), Some("choice_di"));

        let calls = api.calls();
        assert!(matches!(&calls[0], Call::Photo(_, _, Some(c)) if c.contains("Ann")));
        assert_eq!(calls[1], Call::Ack("cb-start".to_string(), None));
        assert_eq!(calls[3], Call::Ack("cb-di".to_string(), None));
        assert!(matches!(&calls[4], Call::Text(_, t, _) if t.starts_with("You selected: DI")));
    }

    #[tokio::test]
    async fn chats_do_not_share_state() {
        let api = Arc::new(FakeMessenger::default());
        let p = processor(api);

        p.process(&press(1, "start")).await;
        let other = p.process(&press(2, "di")).await;
        assert_eq!(other.next_state.as_deref(), Some(ROOT_STATE));
        assert_eq!(p.sessions().len().await, 2);
    }

    #[tokio::test]
    async fn display_name_is_refreshed_from_updates() {
        let api = Arc::new(FakeMessenger::default());
        let p = processor(api.clone());

        p.process(&start(5, "Bob")).await;
        assert_eq!(p.sessions().lock(ChatId(5)).await.user_display_name, "Bob");
    }

    #[tokio::test]
    async fn unknown_updates_touch_nothing() {
        let api = Arc::new(FakeMessenger::default());
        let p = processor(api.clone());

        let out = p.process(&json!({"poll": {"id": "1"}})).await;
        assert_eq!(out, ProcessOutcome::default());
        let out = p.process_bytes(b"{oops").await;
        assert_eq!(out, ProcessOutcome::default());

        assert!(api.calls().is_empty());
        assert!(p.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn photo_failure_degrades_but_still_advances() {
        let api = Arc::new(FakeMessenger {
            fail_photo: true,
            ..Default::default()
        });
        let p = processor(api.clone());

        p.process(&press(9, "start")).await;
        let out = p.process(&start(9, "Ann")).await;
        assert_eq!(out.results, vec![DeliveryResult::Degraded]);
        assert_eq!(out.next_state.as_deref(), Some(ROOT_STATE));
    }

    #[tokio::test]
    async fn long_echo_is_cut_without_breaking_entities() {
        let api = Arc::new(FakeMessenger::default());
        let p = processor(api.clone());

        let text = format!("{}{}", "a".repeat(4070), "<".repeat(20));
        let msg = json!({"message": {"chat": {"id": 8}, "text": text}});
        let out = p.process(&msg).await;
        assert_eq!(out.results, vec![DeliveryResult::Delivered]);

        let calls = api.calls();
        let Call::Text(_, sent, _) = &calls[0] else {
            panic!("expected a text reply, got {calls:?}");
        };
        assert!(sent.chars().count() <= 4096);
        assert!(sent.ends_with("&lt;..."), "{}", &sent[sent.len() - 20..]);
    }

    #[tokio::test]
    async fn concurrent_presses_for_one_chat_apply_in_turn() {
        let api = Arc::new(FakeMessenger::default());
        let p = processor(api.clone());

        // Double click on "start": the second press arrives while in `start`
        // and is treated as stale.
        let (first, second) = (press(4, "start"), press(4, "start"));
        let (a, b) = tokio::join!(p.process(&first), p.process(&second));
        let mut states = vec![a.next_state.unwrap(), b.next_state.unwrap()];
        states.sort();
        assert_eq!(states, vec!["start".to_string(), "start".to_string()]);

        let acks = api
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Ack(..)))
            .count();
        let texts = api
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Text(..)))
            .count();
        assert_eq!(acks, 2);
        assert_eq!(texts, 1);
    }
}
