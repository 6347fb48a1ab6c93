//! Backend data-service port.
//!
//! This trait is the only seam between the portal core and the outside
//! world: storage, authentication, and the change-notification transport
//! all live behind it.  Implementations may be remote (HTTP, websocket) or
//! in-process ([`crate::MemoryBackend`]); the core holds an
//! `Arc<dyn BackendService>` and never knows the difference.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use guichet_shared::types::{
    ChangeEvent, CompanyProfile, ConversationKey, FileRecord, Identity, IdentityId, Message,
    OnboardingRecord,
};
use guichet_shared::BackendError;

/// Stream of change events for one conversation.
///
/// Ends when the subscription is torn down on the backend side; dropping
/// the stream unsubscribes.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// Operations the portal consumes from the backend data service.
///
/// Every method returns a `Result`; callers own the fail-closed handling.
/// No method may panic, and no failure in one conversation's subscription
/// affects another's.
#[async_trait]
pub trait BackendService: Send + Sync {
    /// Resolve the currently authenticated identity, if any.
    ///
    /// `Ok(None)` means "nobody is signed in"; an error means the backend
    /// could not be asked, which the session layer treats as
    /// unauthenticated.
    async fn fetch_identity(&self) -> Result<Option<Identity>, BackendError>;

    /// Look up whether an identity has completed onboarding.
    async fn fetch_onboarding_status(
        &self,
        identity_id: IdentityId,
    ) -> Result<OnboardingRecord, BackendError>;

    /// Complete onboarding for an identity by creating its company profile.
    ///
    /// On success the returned record has `completed = true`.
    async fn complete_onboarding(
        &self,
        identity_id: IdentityId,
        profile: CompanyProfile,
    ) -> Result<OnboardingRecord, BackendError>;

    /// Fetch all messages of a conversation, ascending by creation time.
    async fn fetch_messages(&self, key: ConversationKey) -> Result<Vec<Message>, BackendError>;

    /// Fetch all file records of a conversation.
    async fn fetch_files(&self, key: ConversationKey) -> Result<Vec<FileRecord>, BackendError>;

    /// Persist a new message and return the server-confirmed record.
    async fn send_message(
        &self,
        key: ConversationKey,
        content: String,
        sender_is_client: bool,
    ) -> Result<Message, BackendError>;

    /// Upload a file and return the server-confirmed record.
    ///
    /// Size and content type in the returned record are determined by the
    /// server; the client only supplies the name and the raw bytes.
    async fn upload_file(
        &self,
        key: ConversationKey,
        file_name: String,
        data: Bytes,
    ) -> Result<FileRecord, BackendError>;

    /// Subscribe to the change stream of one conversation.
    ///
    /// The listener treats every event as an invalidation trigger; the
    /// payload carries no differential data.
    async fn subscribe_changes(&self, key: ConversationKey)
        -> Result<ChangeStream, BackendError>;
}
