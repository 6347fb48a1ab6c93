//! Session state shared across the portal.
//!
//! The [`SessionHandle`] owns a watch channel holding the current
//! [`SessionState`].  Only the portal facade mutates it (single-writer);
//! every other component reads a snapshot or subscribes to changes.

use tokio::sync::watch;
use tracing::info;

use guichet_shared::types::Identity;

/// Current authentication state.
///
/// `settling = true` means the authentication bootstrap is still in
/// flight; no gating decision may be made until it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// The signed-in principal, if any.
    pub identity: Option<Identity>,
    /// Whether the bootstrap is still in flight.
    pub settling: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Owner of the session state.
pub struct SessionHandle {
    tx: watch::Sender<SessionState>,
}

impl SessionHandle {
    /// Create a handle in the settling state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState {
            identity: None,
            settling: true,
        });
        Self { tx }
    }

    /// Mark the bootstrap finished with the given identity (or none).
    pub fn settle(&self, identity: Option<Identity>) {
        match &identity {
            Some(id) => info!(identity = %id.id, "Session settled, authenticated"),
            None => info!("Session settled, unauthenticated"),
        }
        self.tx.send_replace(SessionState {
            identity,
            settling: false,
        });
    }

    /// Re-enter the settling state ahead of a fresh bootstrap.
    pub fn begin_settling(&self) {
        self.tx.send_replace(SessionState {
            identity: None,
            settling: true,
        });
    }

    /// Destroy the identity.  The session stays settled.
    pub fn sign_out(&self) {
        info!("Session signed out");
        self.tx.send_replace(SessionState {
            identity: None,
            settling: false,
        });
    }

    /// Latest state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Wait until the bootstrap has settled and return the state.
    pub async fn wait_settled(&self) -> SessionState {
        let mut rx = self.tx.subscribe();
        let waited = rx
            .wait_for(|state| !state.settling)
            .await
            .map(|state| state.clone());
        match waited {
            Ok(state) => state,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.snapshot(),
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}
