//! Onboarding status resolution.
//!
//! Results are cached per identity for the lifetime of the session, and
//! concurrent first lookups coalesce: however many UI regions ask at
//! mount, the backend sees one request.  A failed lookup is recorded as
//! fail-closed (`completed = false`) and is never retried automatically;
//! [`OnboardingResolver::refresh`] is the explicit retry path, used after
//! the completion action succeeds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use guichet_backend::BackendService;
use guichet_shared::types::{IdentityId, OnboardingStatus};

enum Entry {
    Cached(OnboardingStatus),
    InFlight(watch::Receiver<Option<OnboardingStatus>>),
}

enum Claim {
    Cached(OnboardingStatus),
    Join(watch::Receiver<Option<OnboardingStatus>>),
    Lead(watch::Sender<Option<OnboardingStatus>>),
}

/// Per-session cache of onboarding statuses.
pub struct OnboardingResolver {
    backend: Arc<dyn BackendService>,
    entries: Mutex<HashMap<IdentityId, Entry>>,
    version: watch::Sender<u64>,
}

impl OnboardingResolver {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        let (version, _rx) = watch::channel(0);
        Self {
            backend,
            entries: Mutex::new(HashMap::new()),
            version,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IdentityId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the status for an identity, reusing the cache and any
    /// in-flight lookup.
    pub async fn resolve(&self, identity_id: IdentityId) -> OnboardingStatus {
        let claim = {
            let mut entries = self.lock();
            match entries.get(&identity_id) {
                Some(Entry::Cached(status)) => Claim::Cached(status.clone()),
                Some(Entry::InFlight(rx)) => Claim::Join(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    entries.insert(identity_id, Entry::InFlight(rx));
                    Claim::Lead(tx)
                }
            }
        };

        match claim {
            Claim::Cached(status) => status,
            Claim::Join(rx) => self.join(identity_id, rx).await,
            Claim::Lead(tx) => self.lead(identity_id, tx).await,
        }
    }

    /// Force a re-fetch, bypassing the cache.
    ///
    /// This is the server-confirmed path that may overwrite a cached
    /// status in either direction, except that a *failed* refresh never
    /// downgrades a known `completed = true`.
    pub async fn refresh(&self, identity_id: IdentityId) -> OnboardingStatus {
        let looked_up = self.lookup(identity_id).await;
        let status = {
            let mut entries = self.lock();
            let status = if looked_up.lookup_failed {
                match entries.get(&identity_id) {
                    Some(Entry::Cached(prev)) if prev.completed => {
                        warn!(identity = %identity_id, "Refresh failed, keeping completed status");
                        prev.clone()
                    }
                    _ => looked_up,
                }
            } else {
                looked_up
            };
            entries.insert(identity_id, Entry::Cached(status.clone()));
            status
        };
        self.bump();
        status
    }

    /// Cached status, if one has been resolved.  Never triggers a lookup.
    pub fn cached(&self, identity_id: IdentityId) -> Option<OnboardingStatus> {
        match self.lock().get(&identity_id) {
            Some(Entry::Cached(status)) => Some(status.clone()),
            _ => None,
        }
    }

    /// Subscribe to status-change notifications (a bumped version counter).
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Drop every cached status.  Called on sign-out.
    pub fn clear(&self) {
        self.lock().clear();
        self.bump();
    }

    async fn lead(
        &self,
        identity_id: IdentityId,
        tx: watch::Sender<Option<OnboardingStatus>>,
    ) -> OnboardingStatus {
        let looked_up = self.lookup(identity_id).await;
        let status = {
            let mut entries = self.lock();
            // A refresh may have landed while this lookup ran; an older
            // answer must not downgrade a completed=true entry.
            let status = match entries.get(&identity_id) {
                Some(Entry::Cached(prev)) if prev.completed && !looked_up.completed => {
                    prev.clone()
                }
                _ => looked_up,
            };
            entries.insert(identity_id, Entry::Cached(status.clone()));
            status
        };
        let _ = tx.send(Some(status.clone()));
        self.bump();
        status
    }

    async fn join(
        &self,
        identity_id: IdentityId,
        mut rx: watch::Receiver<Option<OnboardingStatus>>,
    ) -> OnboardingStatus {
        let waited = rx
            .wait_for(|status| status.is_some())
            .await
            .map(|value| value.clone());
        match waited {
            Ok(value) => match value {
                Some(status) => status,
                // wait_for's predicate guarantees Some.
                None => Self::fail_closed(identity_id),
            },
            Err(_) => {
                // The leading task was dropped before answering.  Remove the
                // dead entry so the next resolve can retry, and fail closed.
                warn!(identity = %identity_id, "Onboarding lookup abandoned");
                let mut entries = self.lock();
                if let Some(Entry::InFlight(stored)) = entries.get(&identity_id) {
                    if stored.same_channel(&rx) {
                        entries.remove(&identity_id);
                    }
                }
                Self::fail_closed(identity_id)
            }
        }
    }

    async fn lookup(&self, identity_id: IdentityId) -> OnboardingStatus {
        match self.backend.fetch_onboarding_status(identity_id).await {
            Ok(record) => {
                debug!(
                    identity = %identity_id,
                    completed = record.completed,
                    "Onboarding status resolved"
                );
                OnboardingStatus {
                    identity_id,
                    completed: record.completed,
                    company_id: record.company_id,
                    last_checked_at: Utc::now(),
                    lookup_failed: false,
                }
            }
            Err(e) => {
                warn!(
                    identity = %identity_id,
                    error = %e,
                    "Onboarding lookup failed, treating as incomplete"
                );
                Self::fail_closed(identity_id)
            }
        }
    }

    fn fail_closed(identity_id: IdentityId) -> OnboardingStatus {
        OnboardingStatus {
            identity_id,
            completed: false,
            company_id: None,
            last_checked_at: Utc::now(),
            lookup_failed: true,
        }
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
