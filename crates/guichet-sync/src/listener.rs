//! Change-notification listener.
//!
//! One task per open conversation view consumes the backend's change
//! stream and turns every event into a cache invalidation, whatever the
//! event says changed.  A lost stream is resubscribed with exponential
//! backoff plus jitter; until then the cache keeps serving its last state
//! marked stale.  Dropping the handle aborts the task and tears down the
//! subscription, so an unmounted view leaks nothing.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use guichet_backend::BackendService;
use guichet_shared::constants::{RESUBSCRIBE_BASE_MS, RESUBSCRIBE_MAX_MS};
use guichet_shared::types::ConversationKey;

use crate::cache::ConversationCache;

/// Backoff bounds for resubscribing to a lost change stream.
#[derive(Debug, Clone)]
pub struct ResubscribeConfig {
    /// Delay after the first loss.
    pub base: Duration,
    /// Upper bound the delay doubles toward.
    pub max: Duration,
}

impl Default for ResubscribeConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(RESUBSCRIBE_BASE_MS),
            max: Duration::from_millis(RESUBSCRIBE_MAX_MS),
        }
    }
}

/// Owns one conversation's listener task; dropping it aborts the task.
pub struct ListenerHandle {
    key: ConversationKey,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn key(&self) -> ConversationKey {
        self.key
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        debug!(key = %self.key, "Change listener dropped");
        self.task.abort();
    }
}

/// Spawn the listener task for one conversation.
pub fn spawn_change_listener(
    backend: Arc<dyn BackendService>,
    cache: ConversationCache,
    key: ConversationKey,
    config: ResubscribeConfig,
) -> ListenerHandle {
    let task = tokio::spawn(async move {
        let mut delay = config.base;
        loop {
            match backend.subscribe_changes(key).await {
                Ok(mut stream) => {
                    info!(key = %key, "Subscribed to change stream");
                    delay = config.base;
                    while let Some(event) = stream.next().await {
                        debug!(key = %key, kind = ?event.kind, "Change event, invalidating");
                        cache.invalidate(key);
                    }
                    warn!(key = %key, "Change stream ended, will resubscribe");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Change subscription failed");
                }
            }

            // Jitter keeps a burst of views from resubscribing in lockstep.
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay.as_millis() as u64) / 4);
            tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
            delay = delay.saturating_mul(2).min(config.max);
        }
    });

    ListenerHandle { key, task }
}

#[cfg(test)]
mod tests {
    use super::*;

    use guichet_backend::{BackendOp, MemoryBackend};

    #[tokio::test]
    async fn test_event_triggers_invalidation_and_refetch() {
        let backend = Arc::new(MemoryBackend::new());
        let key = ConversationKey::new();
        let cache = ConversationCache::new(backend.clone());

        let _listener = spawn_change_listener(
            backend.clone(),
            cache.clone(),
            key,
            ResubscribeConfig::default(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        backend.push_message(key, "pushed from the server", false);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = cache.get(key);
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].content, "pushed from the server");
    }

    #[tokio::test]
    async fn test_dropping_handle_unsubscribes() {
        let backend = Arc::new(MemoryBackend::new());
        let key = ConversationKey::new();
        let cache = ConversationCache::new(backend.clone());

        let listener = spawn_change_listener(
            backend.clone(),
            cache,
            key,
            ResubscribeConfig::default(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.subscriber_count(key), 1);

        drop(listener);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.subscriber_count(key), 0);
    }

    #[tokio::test]
    async fn test_resubscribes_after_failure_with_backoff() {
        let backend = Arc::new(MemoryBackend::new());
        let key = ConversationKey::new();
        let cache = ConversationCache::new(backend.clone());

        backend.set_failing(BackendOp::SubscribeChanges, true);
        let _listener = spawn_change_listener(
            backend.clone(),
            cache.clone(),
            key,
            ResubscribeConfig {
                base: Duration::from_millis(10),
                max: Duration::from_millis(40),
            },
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(backend.subscriber_count(key), 0);

        backend.set_failing(BackendOp::SubscribeChanges, false);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.subscriber_count(key), 1);

        backend.push_message(key, "after recovery", false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get(key).messages.len(), 1);
    }
}
