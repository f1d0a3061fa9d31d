//! Per-chat conversation sessions.
//!
//! The store hands out one exclusive guard per chat: everything that reads a
//! session, dispatches on it and writes the next state back happens while the
//! guard is held, so updates for one chat are applied strictly in turn while
//! different chats proceed in parallel.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{domain::ChatId, menu::ROOT_STATE, update::FALLBACK_SENDER_NAME};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSession {
    pub chat_id: ChatId,
    pub current_state: String,
    pub user_display_name: String,
}

impl ChatSession {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            current_state: ROOT_STATE.to_string(),
            user_display_name: FALLBACK_SENDER_NAME.to_string(),
        }
    }
}

/// Inactivity policy for in-memory sessions.
#[derive(Clone, Copy, Debug)]
pub struct SessionPolicy {
    /// Idle sessions older than this are dropped.
    pub ttl: Duration,
    /// Upper bound on stored sessions; the least recently used idle one is
    /// dropped to make room.
    pub max_sessions: usize,
    /// Minimum spacing between TTL sweeps.
    pub sweep_interval: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_sessions: 10_000,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct Slot {
    session: ChatSession,
    last_seen: Instant,
}

#[derive(Debug)]
struct Sessions {
    slots: HashMap<i64, Arc<Mutex<Slot>>>,
    last_sweep: Instant,
}

/// Exclusive access to one chat's session.
pub struct SessionGuard {
    slot: OwnedMutexGuard<Slot>,
}

impl Deref for SessionGuard {
    type Target = ChatSession;

    fn deref(&self) -> &ChatSession {
        &self.slot.session
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut ChatSession {
        &mut self.slot.session
    }
}

pub struct SessionStore {
    policy: SessionPolicy,
    inner: Mutex<Sessions>,
}

impl SessionStore {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Sessions {
                slots: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Lock `chat_id`'s session, creating it in the root state if needed.
    ///
    /// Waits while another task holds the same chat.
    pub async fn lock(&self, chat_id: ChatId) -> SessionGuard {
        self.lock_at(chat_id, Instant::now()).await
    }

    pub async fn lock_at(&self, chat_id: ChatId, now: Instant) -> SessionGuard {
        let slot = {
            let mut map = self.inner.lock().await;
            if now.saturating_duration_since(map.last_sweep) >= self.policy.sweep_interval {
                map.last_sweep = now;
                let evicted = self.evict_expired(&mut map.slots, now);
                if evicted > 0 {
                    tracing::debug!(evicted, "expired chat sessions dropped");
                }
            }
            if !map.slots.contains_key(&chat_id.0) && map.slots.len() >= self.policy.max_sessions
            {
                self.evict_least_recent(&mut map.slots);
            }
            map.slots
                .entry(chat_id.0)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(Slot {
                        session: ChatSession::new(chat_id),
                        last_seen: now,
                    }))
                })
                .clone()
        };

        let mut guard = slot.lock_owned().await;
        if guard.last_seen < now {
            guard.last_seen = now;
        }
        SessionGuard { slot: guard }
    }

    /// Number of stored sessions (held or idle).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Idle slots: not locked and not awaited by anyone. Only the map holds
    /// their `Arc`, and new clones are only made under the map lock.
    fn idle_last_seen(slot: &Arc<Mutex<Slot>>) -> Option<Instant> {
        if Arc::strong_count(slot) > 1 {
            return None;
        }
        slot.try_lock().ok().map(|s| s.last_seen)
    }

    fn evict_expired(&self, slots: &mut HashMap<i64, Arc<Mutex<Slot>>>, now: Instant) -> usize {
        let before = slots.len();
        let ttl = self.policy.ttl;
        slots.retain(|_, slot| match Self::idle_last_seen(slot) {
            Some(seen) => now.saturating_duration_since(seen) < ttl,
            None => true,
        });
        before - slots.len()
    }

    fn evict_least_recent(&self, slots: &mut HashMap<i64, Arc<Mutex<Slot>>>) {
        let oldest = slots
            .iter()
            .filter_map(|(id, slot)| Self::idle_last_seen(slot).map(|seen| (*id, seen)))
            .min_by_key(|(_, seen)| *seen)
            .map(|(id, _)| id);
        if let Some(id) = oldest {
            slots.remove(&id);
            tracing::debug!(chat_id = id, "session evicted to stay under capacity");
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}
