//! Domain model structs exchanged between the portal layers.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer; the types themselves carry no behavior beyond
//! identity helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of an authenticated principal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one participant's message/file stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationKey(pub Uuid);

impl ConversationKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Topic string used when subscribing to this conversation's change stream.
    pub fn to_topic(&self) -> String {
        format!("conversation:{}", self.0)
    }
}

impl Default for ConversationKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The currently signed-in principal.
///
/// Created on successful authentication, destroyed on sign-out.  Owned
/// exclusively by the session state; everything else reads a clone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Opaque unique identifier.
    pub id: IdentityId,
    /// Email the principal authenticated with.
    pub email: String,
}

// ---------------------------------------------------------------------------
// Onboarding
// ---------------------------------------------------------------------------

/// Result of an onboarding lookup for one identity.
///
/// `completed` is monotonic per identity within a session: once observed
/// `true` it is never downgraded without a server-confirmed refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnboardingStatus {
    /// Identity this status belongs to.
    pub identity_id: IdentityId,
    /// Whether the one-time setup step has been completed.
    pub completed: bool,
    /// Company created during onboarding, once one exists.
    pub company_id: Option<Uuid>,
    /// When the backend was last asked.
    pub last_checked_at: DateTime<Utc>,
    /// Set when the last lookup failed and `completed` is a fail-closed
    /// default rather than a server answer.
    pub lookup_failed: bool,
}

/// Raw onboarding answer as the backend reports it.
///
/// The resolver wraps this into an [`OnboardingStatus`] with bookkeeping
/// fields; nothing outside the resolver should consume it directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnboardingRecord {
    /// Whether the one-time setup step has been completed.
    pub completed: bool,
    /// Company created during onboarding, once one exists.
    pub company_id: Option<Uuid>,
}

/// Company profile submitted to complete onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyProfile {
    /// Legal or display name of the company.
    pub name: String,
    /// Contact email for the company.
    pub contact_email: String,
    /// Optional phone number.
    pub phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation records
// ---------------------------------------------------------------------------

/// A single message in a conversation.  Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// Whether the client participant (as opposed to staff) sent it.
    pub sender_is_client: bool,
    /// Message body.
    pub content: String,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

/// Metadata for a file exchanged in a conversation.
///
/// Size and content type are server-authoritative; the client never guesses
/// them, which is why uploads have no optimistic rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Unique file identifier.
    pub id: Uuid,
    /// Original file name.
    pub file_name: String,
    /// File size in bytes.
    pub file_size: u64,
    /// MIME type as reported by the server.
    pub content_type: String,
    /// When the file record was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// What kind of mutation a change event reports.
///
/// The listener treats every event as a full invalidation; the kind exists
/// for logging, not for differential updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeKind {
    MessageCreated,
    FileCreated,
}

/// Server-pushed notification that a conversation changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Conversation the mutation happened in.
    pub key: ConversationKey,
    /// Kind of mutation, for logging only.
    pub kind: ChangeKind,
    /// Server-side timestamp of the mutation.
    pub occurred_at: DateTime<Utc>,
}
