//! # guichet-sync
//!
//! Keeps locally cached conversation state consistent with a backend that
//! pushes asynchronous change events.  Three pieces cooperate:
//!
//! - [`ConversationCache`]: query-keyed cache with coalesced
//!   invalidate-and-refetch,
//! - the change listener: one task per open conversation turning every
//!   pushed event into an invalidation, resubscribing with backoff,
//! - [`ActionCoordinator`]: optimistic sends and server-authoritative
//!   uploads, reconciled through the same invalidation path.

pub mod actions;
pub mod cache;
pub mod listener;

pub use actions::{ActionCoordinator, ActionError, ActionKind, ActionLimits, ActionStatus, PendingAction};
pub use cache::{CachedConversation, ConversationCache, Freshness};
pub use listener::{spawn_change_listener, ListenerHandle, ResubscribeConfig};
