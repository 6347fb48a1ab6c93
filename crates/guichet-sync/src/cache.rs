//! In-memory, query-keyed cache of conversation state.
//!
//! Entries are mutated only from inside this module, driven by fetch
//! completion, invalidation, or optimistic appends from the action
//! coordinator.  Invalidation during an in-flight fetch is coalesced: the
//! second trigger does not launch a duplicate request but guarantees one
//! more fetch after the current one completes, so the cache converges on
//! the state behind the latest trigger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use guichet_backend::BackendService;
use guichet_shared::constants::CACHE_UPDATE_CAPACITY;
use guichet_shared::types::{ConversationKey, FileRecord, Message};

/// Freshness of a cached conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Freshness {
    /// Reflects the last fetch; no invalidation since.
    Valid,
    /// Invalidated (or never fetched, or the last fetch failed).
    Stale,
    /// A fetch is in flight.
    Fetching,
}

/// Snapshot of one conversation as served to the presentation layer.
///
/// Optimistic messages are merged into `messages`; `freshness` drives
/// loading indicators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedConversation {
    pub key: ConversationKey,
    /// Ascending by creation time.
    pub messages: Vec<Message>,
    pub files: Vec<FileRecord>,
    pub freshness: Freshness,
}

struct Entry {
    messages: Vec<Message>,
    files: Vec<FileRecord>,
    /// Optimistic messages awaiting server confirmation.
    pending: Vec<Message>,
    freshness: Freshness,
    /// Set when an invalidation arrived during an in-flight fetch.
    rerun: bool,
}

impl Entry {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            files: Vec::new(),
            pending: Vec::new(),
            freshness: Freshness::Stale,
            rerun: false,
        }
    }
}

/// Shared conversation cache.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConversationCache {
    backend: Arc<dyn BackendService>,
    entries: Arc<Mutex<HashMap<ConversationKey, Entry>>>,
    updates: broadcast::Sender<ConversationKey>,
}

impl ConversationCache {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self {
            backend,
            entries: Arc::new(Mutex::new(HashMap::new())),
            updates: broadcast::channel(CACHE_UPDATE_CAPACITY).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve the cached snapshot, starting a background fetch when the
    /// entry is not valid.
    pub fn get(&self, key: ConversationKey) -> CachedConversation {
        let (snapshot, spawn) = {
            let mut entries = self.lock();
            let entry = entries.entry(key).or_insert_with(Entry::new);
            let spawn = matches!(entry.freshness, Freshness::Stale);
            if spawn {
                entry.freshness = Freshness::Fetching;
            }
            (Self::snapshot_of(key, entry), spawn)
        };
        if spawn {
            self.spawn_fetch(key);
        }
        snapshot
    }

    /// Mark a conversation stale and schedule a re-fetch.
    ///
    /// If a fetch is already running the trigger is coalesced into a rerun
    /// after it completes.
    pub fn invalidate(&self, key: ConversationKey) {
        let spawn = {
            let mut entries = self.lock();
            let entry = entries.entry(key).or_insert_with(Entry::new);
            match entry.freshness {
                Freshness::Fetching => {
                    debug!(key = %key, "Invalidation coalesced into in-flight fetch");
                    entry.rerun = true;
                    false
                }
                _ => {
                    entry.freshness = Freshness::Fetching;
                    true
                }
            }
        };
        if spawn {
            self.spawn_fetch(key);
        }
        self.notify(key);
    }

    /// Subscribe to change notifications: the key of every conversation
    /// whose snapshot changed.
    pub fn updates(&self) -> broadcast::Receiver<ConversationKey> {
        self.updates.subscribe()
    }

    /// Drop every entry.  Called on sign-out so no conversation data leaks
    /// across identities.
    pub fn clear(&self) {
        let keys: Vec<ConversationKey> = {
            let mut entries = self.lock();
            let keys = entries.keys().copied().collect();
            entries.clear();
            keys
        };
        for key in keys {
            self.notify(key);
        }
    }

    /// Append an optimistic message awaiting confirmation.
    ///
    /// Only the action coordinator calls this; nothing else writes cache
    /// entries.
    pub(crate) fn optimistic_append(&self, key: ConversationKey, message: Message) {
        {
            let mut entries = self.lock();
            let entry = entries.entry(key).or_insert_with(Entry::new);
            entry.pending.push(message);
        }
        self.notify(key);
    }

    /// Remove an optimistic message once its action settled.
    pub(crate) fn remove_optimistic(&self, key: ConversationKey, local_id: Uuid) {
        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(&key) {
                entry.pending.retain(|message| message.id != local_id);
            }
        }
        self.notify(key);
    }

    fn spawn_fetch(&self, key: ConversationKey) {
        let cache = self.clone();
        tokio::spawn(async move {
            cache.run_fetch(key).await;
        });
    }

    async fn run_fetch(&self, key: ConversationKey) {
        loop {
            let messages = self.backend.fetch_messages(key).await;
            let files = self.backend.fetch_files(key).await;

            let rerun = {
                let mut entries = self.lock();
                let entry = entries.entry(key).or_insert_with(Entry::new);
                match (messages, files) {
                    (Ok(messages), Ok(files)) => {
                        entry.messages = messages;
                        entry.files = files;
                        entry.freshness = Freshness::Valid;
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        // Keep serving what we have, marked stale; the next
                        // get or invalidation retries.
                        warn!(key = %key, error = %e, "Conversation fetch failed");
                        entry.freshness = Freshness::Stale;
                    }
                }
                if entry.rerun {
                    entry.rerun = false;
                    entry.freshness = Freshness::Fetching;
                    true
                } else {
                    false
                }
            };

            self.notify(key);
            if !rerun {
                break;
            }
        }
    }

    fn snapshot_of(key: ConversationKey, entry: &Entry) -> CachedConversation {
        let mut messages = entry.messages.clone();
        messages.extend(entry.pending.iter().cloned());
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        CachedConversation {
            key,
            messages,
            files: entry.files.clone(),
            freshness: entry.freshness,
        }
    }

    fn notify(&self, key: ConversationKey) {
        // No subscribers is fine.
        let _ = self.updates.send(key);
    }
}
