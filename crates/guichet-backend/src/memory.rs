//! In-memory backend implementation.
//!
//! Suitable for development and tests: state lives in a `Mutex<HashMap>`,
//! change events fan out over per-conversation tokio broadcast channels.
//! Mutations go through the same code path a real backend would take, so
//! every write emits a change event for subscribed listeners.
//!
//! Test hooks (artificial latency, per-operation fault injection, call
//! counters) exist so the sync layer's coalescing and failure properties
//! can be exercised without a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;
use uuid::Uuid;

use guichet_shared::constants::{CHANGE_CHANNEL_CAPACITY, MAX_UPLOAD_SIZE};
use guichet_shared::types::{
    ChangeEvent, ChangeKind, CompanyProfile, ConversationKey, FileRecord, Identity, IdentityId,
    Message, OnboardingRecord,
};
use guichet_shared::BackendError;

use crate::service::{BackendService, ChangeStream};

/// Backend operations that can be made to fail for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    FetchIdentity,
    FetchOnboarding,
    CompleteOnboarding,
    FetchMessages,
    FetchFiles,
    SendMessage,
    UploadFile,
    SubscribeChanges,
}

#[derive(Default)]
struct MemoryState {
    identity: Option<Identity>,
    onboarding: HashMap<IdentityId, OnboardingRecord>,
    messages: HashMap<ConversationKey, Vec<Message>>,
    files: HashMap<ConversationKey, Vec<FileRecord>>,
    channels: HashMap<ConversationKey, broadcast::Sender<ChangeEvent>>,
    failing: HashSet<BackendOp>,
}

/// In-process [`BackendService`] implementation.
///
/// Events are only delivered within this process; a dropped stream simply
/// stops receiving.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    latency_ms: AtomicU64,
    message_fetches: AtomicUsize,
    onboarding_lookups: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            latency_ms: AtomicU64::new(0),
            message_fetches: AtomicUsize::new(0),
            onboarding_lookups: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay every operation by `latency`, to keep requests observably
    /// in flight during tests.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Toggle fault injection for one operation.
    pub fn set_failing(&self, op: BackendOp, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    /// Set (or clear) the identity returned by `fetch_identity`.
    pub fn set_identity(&self, identity: Option<Identity>) {
        self.lock().identity = identity;
    }

    /// Seed the onboarding record for an identity.
    pub fn set_onboarding(&self, identity_id: IdentityId, record: OnboardingRecord) {
        self.lock().onboarding.insert(identity_id, record);
    }

    /// Append a message as if another participant created it server-side,
    /// emitting a change event to subscribers.
    pub fn push_message(
        &self,
        key: ConversationKey,
        content: &str,
        sender_is_client: bool,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            sender_is_client,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let mut state = self.lock();
        state.messages.entry(key).or_default().push(message.clone());
        Self::emit(&mut state, key, ChangeKind::MessageCreated);
        message
    }

    /// Append a file record server-side, emitting a change event.
    pub fn push_file(&self, key: ConversationKey, file_name: &str, file_size: u64) -> FileRecord {
        let record = FileRecord {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            file_size,
            content_type: "application/octet-stream".to_string(),
            created_at: Utc::now(),
        };
        let mut state = self.lock();
        state.files.entry(key).or_default().push(record.clone());
        Self::emit(&mut state, key, ChangeKind::FileCreated);
        record
    }

    /// Number of live change-stream subscribers for a conversation.
    pub fn subscriber_count(&self, key: ConversationKey) -> usize {
        self.lock()
            .channels
            .get(&key)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// How many `fetch_messages` calls have been issued.
    pub fn message_fetch_count(&self) -> usize {
        self.message_fetches.load(Ordering::Relaxed)
    }

    /// How many `fetch_onboarding_status` calls have been issued.
    pub fn onboarding_lookup_count(&self) -> usize {
        self.onboarding_lookups.load(Ordering::Relaxed)
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check_failing(&self, op: BackendOp) -> Result<(), BackendError> {
        if self.lock().failing.contains(&op) {
            return Err(BackendError::Unreachable("injected fault".to_string()));
        }
        Ok(())
    }

    fn emit(state: &mut MemoryState, key: ConversationKey, kind: ChangeKind) {
        let tx = state
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0);
        // No receivers is fine; the event is simply dropped.
        let _ = tx.send(ChangeEvent {
            key,
            kind,
            occurred_at: Utc::now(),
        });
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendService for MemoryBackend {
    async fn fetch_identity(&self) -> Result<Option<Identity>, BackendError> {
        self.simulate_latency().await;
        self.check_failing(BackendOp::FetchIdentity)?;
        Ok(self.lock().identity.clone())
    }

    async fn fetch_onboarding_status(
        &self,
        identity_id: IdentityId,
    ) -> Result<OnboardingRecord, BackendError> {
        self.onboarding_lookups.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        self.check_failing(BackendOp::FetchOnboarding)?;
        // An identity without a record simply has not onboarded yet.
        Ok(self
            .lock()
            .onboarding
            .get(&identity_id)
            .cloned()
            .unwrap_or(OnboardingRecord {
                completed: false,
                company_id: None,
            }))
    }

    async fn complete_onboarding(
        &self,
        identity_id: IdentityId,
        profile: CompanyProfile,
    ) -> Result<OnboardingRecord, BackendError> {
        self.simulate_latency().await;
        self.check_failing(BackendOp::CompleteOnboarding)?;

        if profile.name.trim().is_empty() {
            return Err(BackendError::Rejected(
                "company name must not be empty".to_string(),
            ));
        }

        let record = OnboardingRecord {
            completed: true,
            company_id: Some(Uuid::new_v4()),
        };
        self.lock().onboarding.insert(identity_id, record.clone());
        debug!(identity = %identity_id, company = %profile.name, "Onboarding completed");
        Ok(record)
    }

    async fn fetch_messages(&self, key: ConversationKey) -> Result<Vec<Message>, BackendError> {
        self.message_fetches.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;
        self.check_failing(BackendOp::FetchMessages)?;
        let mut messages = self.lock().messages.get(&key).cloned().unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn fetch_files(&self, key: ConversationKey) -> Result<Vec<FileRecord>, BackendError> {
        self.simulate_latency().await;
        self.check_failing(BackendOp::FetchFiles)?;
        Ok(self.lock().files.get(&key).cloned().unwrap_or_default())
    }

    async fn send_message(
        &self,
        key: ConversationKey,
        content: String,
        sender_is_client: bool,
    ) -> Result<Message, BackendError> {
        self.simulate_latency().await;
        self.check_failing(BackendOp::SendMessage)?;

        let message = Message {
            id: Uuid::new_v4(),
            sender_is_client,
            content,
            created_at: Utc::now(),
        };
        let mut state = self.lock();
        state.messages.entry(key).or_default().push(message.clone());
        Self::emit(&mut state, key, ChangeKind::MessageCreated);
        Ok(message)
    }

    async fn upload_file(
        &self,
        key: ConversationKey,
        file_name: String,
        data: Bytes,
    ) -> Result<FileRecord, BackendError> {
        self.simulate_latency().await;
        self.check_failing(BackendOp::UploadFile)?;

        if data.len() > MAX_UPLOAD_SIZE {
            return Err(BackendError::PayloadTooLarge {
                size: data.len(),
                max: MAX_UPLOAD_SIZE,
            });
        }

        // Size and content type are determined here, never guessed by the
        // caller.
        let record = FileRecord {
            id: Uuid::new_v4(),
            file_name,
            file_size: data.len() as u64,
            content_type: "application/octet-stream".to_string(),
            created_at: Utc::now(),
        };
        let mut state = self.lock();
        state.files.entry(key).or_default().push(record.clone());
        Self::emit(&mut state, key, ChangeKind::FileCreated);
        Ok(record)
    }

    async fn subscribe_changes(
        &self,
        key: ConversationKey,
    ) -> Result<ChangeStream, BackendError> {
        self.simulate_latency().await;
        self.check_failing(BackendOp::SubscribeChanges)?;

        let rx = {
            let mut state = self.lock();
            state
                .channels
                .entry(key)
                .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
                .subscribe()
        };

        // A lagged receiver dropped events; the listener invalidates on the
        // next event anyway, so lag errors are filtered out.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_identity() -> Identity {
        Identity {
            id: IdentityId::new(),
            email: "client@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_identity_roundtrip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.fetch_identity().await.unwrap(), None);

        let identity = test_identity();
        backend.set_identity(Some(identity.clone()));
        assert_eq!(backend.fetch_identity().await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn test_unknown_identity_has_not_onboarded() {
        let backend = MemoryBackend::new();
        let record = backend
            .fetch_onboarding_status(IdentityId::new())
            .await
            .unwrap();
        assert!(!record.completed);
        assert!(record.company_id.is_none());
    }

    #[tokio::test]
    async fn test_complete_onboarding_persists() {
        let backend = MemoryBackend::new();
        let id = IdentityId::new();
        let profile = CompanyProfile {
            name: "Dupont SARL".to_string(),
            contact_email: "contact@dupont.fr".to_string(),
            phone: None,
        };

        let record = backend.complete_onboarding(id, profile).await.unwrap();
        assert!(record.completed);
        assert!(record.company_id.is_some());

        let looked_up = backend.fetch_onboarding_status(id).await.unwrap();
        assert_eq!(looked_up, record);
    }

    #[tokio::test]
    async fn test_complete_onboarding_rejects_blank_name() {
        let backend = MemoryBackend::new();
        let profile = CompanyProfile {
            name: "   ".to_string(),
            contact_email: "contact@dupont.fr".to_string(),
            phone: None,
        };
        let err = backend
            .complete_onboarding(IdentityId::new(), profile)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_send_message_emits_change_event() {
        let backend = Arc::new(MemoryBackend::new());
        let key = ConversationKey::new();

        let mut stream = backend.subscribe_changes(key).await.unwrap();
        let sent = backend
            .send_message(key, "bonjour".to_string(), true)
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.key, key);
        assert_eq!(event.kind, ChangeKind::MessageCreated);

        let messages = backend.fetch_messages(key).await.unwrap();
        assert_eq!(messages, vec![sent]);
    }

    #[tokio::test]
    async fn test_messages_sorted_ascending() {
        let backend = MemoryBackend::new();
        let key = ConversationKey::new();
        backend.push_message(key, "first", true);
        backend.push_message(key, "second", false);

        let messages = backend.fetch_messages(key).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].created_at <= messages[1].created_at);
        assert_eq!(messages[0].content, "first");
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let backend = MemoryBackend::new();
        let key = ConversationKey::new();

        backend.set_failing(BackendOp::SendMessage, true);
        let err = backend
            .send_message(key, "hello".to_string(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)));

        backend.set_failing(BackendOp::SendMessage, false);
        assert!(backend.send_message(key, "hello".to_string(), true).await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_too_large_rejected() {
        let backend = MemoryBackend::new();
        let key = ConversationKey::new();
        let data = Bytes::from(vec![0u8; MAX_UPLOAD_SIZE + 1]);

        let err = backend
            .upload_file(key, "huge.bin".to_string(), data)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::PayloadTooLarge { .. }));
        assert!(backend.fetch_files(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let backend = MemoryBackend::new();
        let key = ConversationKey::new();

        let stream = backend.subscribe_changes(key).await.unwrap();
        assert_eq!(backend.subscriber_count(key), 1);

        drop(stream);
        assert_eq!(backend.subscriber_count(key), 0);
    }
}
