// Process-local chat sessions

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConversationController, ConversationState};

pub type SharedConversation = Arc<Mutex<ConversationController>>;

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    conversation: SharedConversation,
    last_used: Instant,
}

/// Conversations keyed by session id. Nothing is persisted; a session idle
/// for longer than the TTL is dropped the next time the store is written.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Entry>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
        }
    }

    /// The session for `id`, or a fresh one when `id` is absent or unknown.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SharedConversation) {
        let mut sessions = self.sessions.lock().await;
        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_used = Instant::now();
                return (id, Arc::clone(&entry.conversation));
            }
        }

        self.evict_idle(&mut sessions);

        let id = id.unwrap_or_else(Uuid::new_v4);
        let conversation = Arc::new(Mutex::new(ConversationController::new()));
        sessions.insert(
            id,
            Entry {
                conversation: Arc::clone(&conversation),
                last_used: Instant::now(),
            },
        );
        info!(session_id = %id, sessions = sessions.len(), "Session created");
        (id, conversation)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedConversation> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(id).map(|entry| {
            entry.last_used = Instant::now();
            Arc::clone(&entry.conversation)
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    // A session with a turn in flight, or one whose lock is held, is kept.
    fn evict_idle(&self, sessions: &mut HashMap<Uuid, Entry>) {
        let before = sessions.len();
        let ttl = self.idle_ttl;
        sessions.retain(|_, entry| {
            if entry.last_used.elapsed() < ttl {
                return true;
            }
            match entry.conversation.try_lock() {
                Ok(conversation) => conversation.state() == ConversationState::AwaitingResponse,
                Err(_) => true,
            }
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Idle sessions dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ResearchMode;

    #[tokio::test]
    async fn test_sessions_are_reused_by_id() {
        let store = SessionStore::new();
        let (id, first) = store.get_or_create(None).await;
        first.lock().await.ensure_greeting();

        let (same_id, again) = store.get_or_create(Some(id)).await;
        assert_eq!(same_id, id);
        assert_eq!(again.lock().await.history().len(), 1);

        // An unknown id is adopted rather than replaced.
        let wanted = Uuid::new_v4();
        let (adopted, _) = store.get_or_create(Some(wanted)).await;
        assert_eq!(adopted, wanted);
        assert_eq!(store.len().await, 2);
        assert!(store.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let store = SessionStore::with_idle_ttl(Duration::ZERO);
        let (idle, _) = store.get_or_create(None).await;
        let (busy, conversation) = store.get_or_create(None).await;
        let _pending = conversation
            .lock()
            .await
            .begin_turn("KRAS", ResearchMode::Fast)
            .unwrap();

        let (fresh, _) = store.get_or_create(None).await;
        assert!(store.get(&idle).await.is_none());
        assert!(store.get(&busy).await.is_some());
        assert!(store.get(&fresh).await.is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_recent_sessions_survive() {
        let store = SessionStore::new();
        for _ in 0..5 {
            store.get_or_create(None).await;
        }
        assert_eq!(store.len().await, 5);
    }
}
