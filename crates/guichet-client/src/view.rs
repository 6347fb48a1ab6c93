//! Serializable snapshots for the presentation layer.
//!
//! The UI receives camelCase JSON; these DTOs are the only place where
//! domain types are flattened for it.

use serde::Serialize;

use guichet_session::gate::Decision;
use guichet_shared::types::{FileRecord, Message};
use guichet_sync::cache::{CachedConversation, Freshness};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub sender_is_client: bool,
    pub content: String,
    pub created_at: String,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id.to_string(),
            sender_is_client: m.sender_is_client,
            content: m.content,
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDto {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    pub created_at: String,
}

impl From<FileRecord> for FileDto {
    fn from(f: FileRecord) -> Self {
        Self {
            id: f.id.to_string(),
            file_name: f.file_name,
            file_size: f.file_size,
            content_type: f.content_type,
            created_at: f.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub key: String,
    pub messages: Vec<MessageDto>,
    pub files: Vec<FileDto>,
    /// `"valid"`, `"stale"`, or `"fetching"`; drives loading indicators.
    pub freshness: String,
}

impl From<CachedConversation> for ConversationDto {
    fn from(c: CachedConversation) -> Self {
        let freshness = match c.freshness {
            Freshness::Valid => "valid",
            Freshness::Stale => "stale",
            Freshness::Fetching => "fetching",
        };
        Self {
            key: c.key.to_string(),
            messages: c.messages.into_iter().map(MessageDto::from).collect(),
            files: c.files.into_iter().map(FileDto::from).collect(),
            freshness: freshness.to_string(),
        }
    }
}

/// A gating decision flattened for the router.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDto {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

impl From<Decision> for DecisionDto {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Render => Self {
                action: "render".to_string(),
                return_to: None,
            },
            Decision::RedirectAuth { return_to } => Self {
                action: "redirectAuth".to_string(),
                return_to: Some(return_to),
            },
            Decision::RedirectOnboarding { return_to } => Self {
                action: "redirectOnboarding".to_string(),
                return_to: Some(return_to),
            },
            Decision::RedirectHome => Self {
                action: "redirectHome".to_string(),
                return_to: None,
            },
        }
    }
}
