//! Optimistic action coordination.
//!
//! Sends and uploads go through here so their lifecycle is uniform:
//! validate locally, reflect optimistically (messages only: file
//! metadata is server-authoritative, so uploads show nothing until
//! confirmed), run the backend call in its own task, then reconcile by
//! removing the pending entry and invalidating the cache.  A failed
//! action is surfaced to the caller and never retried implicitly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use guichet_backend::BackendService;
use guichet_shared::constants::{MAX_MESSAGE_LEN, MAX_UPLOAD_SIZE};
use guichet_shared::types::{ConversationKey, FileRecord, Message};
use guichet_shared::BackendError;

use crate::cache::ConversationCache;

/// What a pending action is doing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionKind {
    SendMessage,
    UploadFile,
}

/// Lifecycle of a pending action.
///
/// `created → in-flight → succeeded | failed`; terminal states are never
/// re-entered, and the action is dropped from tracking once it settles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionStatus {
    InFlight,
    Succeeded,
    Failed,
}

/// A mutating request between submission and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAction {
    pub local_id: Uuid,
    pub key: ConversationKey,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Message content is empty")]
    EmptyMessage,

    #[error("Message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Action task did not complete")]
    Aborted,
}

/// Limits enforced before a request leaves the client.
#[derive(Debug, Clone, Copy)]
pub struct ActionLimits {
    pub max_message_len: usize,
    pub max_upload_size: usize,
}

impl Default for ActionLimits {
    fn default() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LEN,
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }
}

/// Issues mutating requests and reconciles them with the cache.
#[derive(Clone)]
pub struct ActionCoordinator {
    backend: Arc<dyn BackendService>,
    cache: ConversationCache,
    limits: ActionLimits,
    pending: Arc<Mutex<HashMap<Uuid, PendingAction>>>,
}

impl ActionCoordinator {
    pub fn new(
        backend: Arc<dyn BackendService>,
        cache: ConversationCache,
        limits: ActionLimits,
    ) -> Self {
        Self {
            backend,
            cache,
            limits,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PendingAction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a message, rendered optimistically until the server confirms.
    ///
    /// The backend call runs in its own task: reconciliation happens even
    /// if the caller goes away before the request settles.
    pub async fn send_message(
        &self,
        key: ConversationKey,
        content: String,
        sender_is_client: bool,
    ) -> Result<Message, ActionError> {
        if content.trim().is_empty() {
            return Err(ActionError::EmptyMessage);
        }
        if content.len() > self.limits.max_message_len {
            return Err(ActionError::MessageTooLong {
                len: content.len(),
                max: self.limits.max_message_len,
            });
        }

        let local_id = Uuid::new_v4();
        self.cache.optimistic_append(
            key,
            Message {
                id: local_id,
                sender_is_client,
                content: content.clone(),
                created_at: Utc::now(),
            },
        );
        self.track(local_id, key, ActionKind::SendMessage);

        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let result = coordinator
                .backend
                .send_message(key, content, sender_is_client)
                .await;
            coordinator.cache.remove_optimistic(key, local_id);
            match &result {
                Ok(message) => {
                    coordinator.settle(local_id, ActionStatus::Succeeded);
                    info!(key = %key, message = %message.id, "Message sent");
                    // The authoritative record replaces the optimistic one
                    // on the next fetch.
                    coordinator.cache.invalidate(key);
                }
                Err(e) => {
                    coordinator.settle(local_id, ActionStatus::Failed);
                    warn!(key = %key, error = %e, "Message send failed");
                }
            }
            result
        });

        match task.await {
            Ok(result) => result.map_err(ActionError::from),
            Err(e) => {
                error!(key = %key, error = %e, "Send task did not complete");
                Err(ActionError::Aborted)
            }
        }
    }

    /// Upload a file.  No optimistic entry: nothing is shown until the
    /// server confirms the record.
    pub async fn upload_file(
        &self,
        key: ConversationKey,
        file_name: String,
        data: Bytes,
    ) -> Result<FileRecord, ActionError> {
        if data.len() > self.limits.max_upload_size {
            return Err(ActionError::FileTooLarge {
                size: data.len(),
                max: self.limits.max_upload_size,
            });
        }

        let local_id = Uuid::new_v4();
        self.track(local_id, key, ActionKind::UploadFile);

        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let result = coordinator.backend.upload_file(key, file_name, data).await;
            match &result {
                Ok(record) => {
                    coordinator.settle(local_id, ActionStatus::Succeeded);
                    info!(key = %key, file = %record.id, size = record.file_size, "File uploaded");
                    coordinator.cache.invalidate(key);
                }
                Err(e) => {
                    coordinator.settle(local_id, ActionStatus::Failed);
                    warn!(key = %key, error = %e, "File upload failed");
                }
            }
            result
        });

        match task.await {
            Ok(result) => result.map_err(ActionError::from),
            Err(e) => {
                error!(key = %key, error = %e, "Upload task did not complete");
                Err(ActionError::Aborted)
            }
        }
    }

    /// In-flight actions for one conversation, oldest first.
    pub fn pending(&self, key: ConversationKey) -> Vec<PendingAction> {
        let mut actions: Vec<PendingAction> = self
            .lock()
            .values()
            .filter(|action| action.key == key)
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        actions
    }

    fn track(&self, local_id: Uuid, key: ConversationKey, kind: ActionKind) {
        self.lock().insert(
            local_id,
            PendingAction {
                local_id,
                key,
                kind,
                status: ActionStatus::InFlight,
                created_at: Utc::now(),
            },
        );
    }

    fn settle(&self, local_id: Uuid, status: ActionStatus) {
        if let Some(mut action) = self.lock().remove(&local_id) {
            action.status = status;
            debug!(action = %action.local_id, kind = ?action.kind, status = ?status, "Action settled");
        }
    }
}
