//! Per-conversation session state and its registry.
//!
//! One `ChatSession` per caller-supplied chat id, created on first
//! message and evicted after an idle timeout. Each session sits behind
//! its own async mutex so writers to one conversation are serialized
//! while distinct conversations proceed concurrently.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::memory::{ConversationLog, ReferenceImageSet};

#[derive(Debug, Clone, Copy)]
pub struct FlowConfig {
    pub history_cap: usize,
    pub reference_image_cap: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            history_cap: 40,
            reference_image_cap: 8,
        }
    }
}

impl FlowConfig {
    pub fn from_config() -> Self {
        Self {
            history_cap: *crate::config::HISTORY_CAP,
            reference_image_cap: *crate::config::REFERENCE_IMAGE_CAP,
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    pub log: ConversationLog,
    pub images: ReferenceImageSet,
    pub last_active: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            log: ConversationLog::new(config.history_cap),
            images: ReferenceImageSet::new(config.reference_image_cap),
            last_active: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    fn is_expired(&self, idle_timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_active > idle_timeout
    }
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<Mutex<ChatSession>>>>,
    config: FlowConfig,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(config: FlowConfig, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            idle_timeout,
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            FlowConfig::from_config(),
            Duration::seconds(*crate::config::SESSION_IDLE_SECS),
        )
    }

    /// Resolve or create the session for a chat id, evicting expired
    /// sessions along the way. Returns the effective id (a fresh one is
    /// minted when the caller supplied none).
    pub async fn checkout(&self, requested: Option<Uuid>) -> (Uuid, Arc<Mutex<ChatSession>>) {
        let mut sessions = self.sessions.lock().await;
        Self::evict_expired(&mut sessions, self.idle_timeout);

        let id = requested.unwrap_or_else(Uuid::new_v4);
        let session = sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(ChatSession::new(self.config))))
            .clone();

        (id, session)
    }

    /// Look up an existing session without creating one.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.lock().await;
        Self::evict_expired(&mut sessions, self.idle_timeout);
        sessions.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    // A session whose mutex is currently held is in use and never
    // evicted, whatever its timestamp says.
    fn evict_expired(sessions: &mut HashMap<Uuid, Arc<Mutex<ChatSession>>>, idle_timeout: Duration) {
        let now = Utc::now();
        sessions.retain(|id, session| match session.try_lock() {
            Ok(guard) => {
                let keep = !guard.is_expired(idle_timeout, now);
                if !keep {
                    tracing::debug!(session_id = %id, "evicting idle session");
                }
                keep
            }
            Err(_) => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(idle_secs: i64) -> SessionRegistry {
        SessionRegistry::new(FlowConfig::default(), Duration::seconds(idle_secs))
    }

    #[tokio::test]
    async fn test_checkout_creates_and_reuses() {
        let registry = registry(60);
        let (id, _) = registry.checkout(None).await;
        let (id2, _) = registry.checkout(Some(id)).await;
        assert_eq!(id, id2);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_get_distinct_sessions() {
        let registry = registry(60);
        registry.checkout(None).await;
        registry.checkout(None).await;
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_get_without_create() {
        let registry = registry(60);
        assert!(registry.get(Uuid::new_v4()).await.is_none());
        let (id, _) = registry.checkout(None).await;
        assert!(registry.get(id).await.is_some());
    }

    #[tokio::test]
    async fn test_idle_session_is_evicted() {
        let registry = registry(60);
        let (stale_id, stale) = registry.checkout(None).await;
        let (fresh_id, _) = registry.checkout(None).await;

        stale.lock().await.last_active = Utc::now() - Duration::seconds(120);

        // Any registry access sweeps
        assert!(registry.get(stale_id).await.is_none());
        assert!(registry.get(fresh_id).await.is_some());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_locked_session_survives_sweep() {
        let registry = registry(60);
        let (id, session) = registry.checkout(None).await;
        let mut guard = session.lock().await;
        guard.last_active = Utc::now() - Duration::seconds(120);

        // Held lock means in use; the sweep must not drop it
        assert_eq!(registry.len().await, 1);
        guard.touch();
        drop(guard);
        assert!(registry.get(id).await.is_some());
    }

    #[tokio::test]
    async fn test_checkout_after_eviction_starts_fresh() {
        let registry = registry(60);
        let (id, session) = registry.checkout(None).await;
        session.lock().await.images.push(
            crate::ai::core::providers::ImageLocator::url("https://cdn.example/a.png"),
        );
        session.lock().await.last_active = Utc::now() - Duration::seconds(120);

        let (same_id, fresh) = registry.checkout(Some(id)).await;
        assert_eq!(same_id, id);
        assert!(fresh.lock().await.images.is_empty());
    }
}
