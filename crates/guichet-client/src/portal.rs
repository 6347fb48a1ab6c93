//! The portal facade.
//!
//! One explicit context object owns the session handle, onboarding
//! resolver, route table, conversation cache, and action coordinator, all
//! over a shared backend port.  It is created on app start and torn down
//! via [`Portal::sign_out`]; nothing here is a process-wide global.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use guichet_backend::BackendService;
use guichet_session::gate::{decide, Decision};
use guichet_session::onboarding::OnboardingResolver;
use guichet_session::routes::RouteTable;
use guichet_session::session::{SessionHandle, SessionState};
use guichet_shared::types::{
    CompanyProfile, ConversationKey, FileRecord, Message, OnboardingStatus,
};
use guichet_shared::BackendError;
use guichet_sync::actions::{ActionCoordinator, ActionError, ActionLimits, PendingAction};
use guichet_sync::cache::{CachedConversation, ConversationCache};
use guichet_sync::listener::{spawn_change_listener, ListenerHandle, ResubscribeConfig};

use crate::config::PortalConfig;

/// Errors surfaced by portal operations.
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Action(#[from] ActionError),
}

/// The application-facing entry point.
pub struct Portal {
    backend: Arc<dyn BackendService>,
    session: SessionHandle,
    resolver: OnboardingResolver,
    routes: RouteTable,
    cache: ConversationCache,
    actions: ActionCoordinator,
    resubscribe: ResubscribeConfig,
}

impl Portal {
    pub fn new(backend: Arc<dyn BackendService>, config: PortalConfig) -> Self {
        let routes = RouteTable::new(guichet_session::routes::RoutePaths {
            auth: config.auth_path.clone(),
            onboarding: config.onboarding_path.clone(),
            home: config.home_path.clone(),
        });
        let cache = ConversationCache::new(backend.clone());
        let actions = ActionCoordinator::new(
            backend.clone(),
            cache.clone(),
            ActionLimits {
                max_message_len: config.max_message_len,
                max_upload_size: config.max_upload_size,
            },
        );
        Self {
            resolver: OnboardingResolver::new(backend.clone()),
            session: SessionHandle::new(),
            routes,
            cache,
            actions,
            resubscribe: ResubscribeConfig {
                base: config.resubscribe_base,
                max: config.resubscribe_max,
            },
            backend,
        }
    }

    /// Register an application route and its onboarding requirement.
    pub fn register_route(&mut self, path: &str, requires_onboarding: bool) {
        self.routes.register(path, requires_onboarding);
    }

    /// Settle the session by asking the backend who is signed in.
    ///
    /// An unreachable backend settles the session unauthenticated: on
    /// uncertainty the user lands on the authentication screen, never in
    /// protected content.
    pub async fn bootstrap(&self) -> SessionState {
        self.session.begin_settling();
        match self.backend.fetch_identity().await {
            Ok(identity) => self.session.settle(identity),
            Err(e) => {
                warn!(error = %e, "Identity bootstrap failed, treating as unauthenticated");
                self.session.settle(None);
            }
        }
        self.session.snapshot()
    }

    /// Decide a navigation, waiting out the settling window first.
    pub async fn navigate(&self, path: &str) -> Decision {
        let session = self.session.wait_settled().await;
        let route = self.routes.resolve(path);
        let status = match &session.identity {
            Some(identity) => Some(self.resolver.resolve(identity.id).await),
            None => None,
        };
        let decision = decide(&session, status.as_ref(), &route, self.routes.paths());
        debug!(path = %path, decision = ?decision, "Navigation decided");
        decision
    }

    /// Non-blocking navigation decision against the current snapshots.
    ///
    /// Returns `None` while the session is settling; the caller shows a
    /// loading indicator instead of deciding anything.
    pub fn navigate_now(&self, path: &str) -> Option<Decision> {
        let session = self.session.snapshot();
        if session.settling {
            return None;
        }
        let status = session
            .identity
            .as_ref()
            .and_then(|identity| self.resolver.cached(identity.id));
        let route = self.routes.resolve(path);
        Some(decide(&session, status.as_ref(), &route, self.routes.paths()))
    }

    /// Complete onboarding and promote the cached status immediately.
    pub async fn complete_onboarding(
        &self,
        profile: CompanyProfile,
    ) -> Result<OnboardingStatus, PortalError> {
        let session = self.session.snapshot();
        let identity = session.identity.as_ref().ok_or(PortalError::NotAuthenticated)?;

        self.backend
            .complete_onboarding(identity.id, profile)
            .await?;
        // Refresh rather than waiting out a stale cache window.
        let status = self.resolver.refresh(identity.id).await;
        info!(identity = %identity.id, completed = status.completed, "Onboarding completed");
        Ok(status)
    }

    /// Tear down the identity: session, onboarding cache, and conversation
    /// cache are all cleared so nothing leaks into the next sign-in.
    pub fn sign_out(&self) {
        self.session.sign_out();
        self.resolver.clear();
        self.cache.clear();
    }

    /// Open a conversation: serves cached state and holds the change
    /// subscription for as long as the view lives.
    pub fn open_conversation(&self, key: ConversationKey) -> ConversationView {
        let listener = spawn_change_listener(
            self.backend.clone(),
            self.cache.clone(),
            key,
            self.resubscribe.clone(),
        );
        ConversationView {
            key,
            cache: self.cache.clone(),
            actions: self.actions.clone(),
            _listener: listener,
        }
    }

    /// Send a message in the client's name, optimistically rendered.
    pub async fn send_message(
        &self,
        key: ConversationKey,
        content: String,
    ) -> Result<Message, PortalError> {
        Ok(self.actions.send_message(key, content, true).await?)
    }

    /// Upload a file; nothing renders until the server confirms.
    pub async fn upload_file(
        &self,
        key: ConversationKey,
        file_name: String,
        data: Bytes,
    ) -> Result<FileRecord, PortalError> {
        Ok(self.actions.upload_file(key, file_name, data).await?)
    }

    /// In-flight actions for one conversation.
    pub fn pending(&self, key: ConversationKey) -> Vec<PendingAction> {
        self.actions.pending(key)
    }

    /// Subscribe to session-state changes (for reactive gate re-evaluation).
    pub fn session_changes(&self) -> watch::Receiver<SessionState> {
        self.session.changes()
    }

    /// Subscribe to onboarding-status changes (a bumped version counter).
    pub fn onboarding_changes(&self) -> watch::Receiver<u64> {
        self.resolver.changes()
    }
}

/// Handle held by an open conversation view.
///
/// Dropping it aborts the change listener and releases the subscription;
/// actions already in flight still reconcile in their own tasks, only
/// their optimistic reflection disappears with the view.
pub struct ConversationView {
    key: ConversationKey,
    cache: ConversationCache,
    actions: ActionCoordinator,
    _listener: ListenerHandle,
}

impl ConversationView {
    pub fn key(&self) -> ConversationKey {
        self.key
    }

    /// Current snapshot; triggers a background fetch when not valid.
    pub fn snapshot(&self) -> CachedConversation {
        self.cache.get(self.key)
    }

    /// Manually mark the conversation stale and re-fetch.
    pub fn refresh(&self) {
        self.cache.invalidate(self.key);
    }

    /// Keys of conversations whose snapshot changed; re-render on receipt.
    pub fn updates(&self) -> broadcast::Receiver<ConversationKey> {
        self.cache.updates()
    }

    /// In-flight actions for this conversation.
    pub fn pending(&self) -> Vec<PendingAction> {
        self.actions.pending(self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use guichet_backend::{BackendOp, MemoryBackend};
    use guichet_shared::types::{Identity, IdentityId, OnboardingRecord};

    fn client_identity() -> Identity {
        Identity {
            id: IdentityId::new(),
            email: "client@example.com".to_string(),
        }
    }

    fn company() -> CompanyProfile {
        CompanyProfile {
            name: "Dupont SARL".to_string(),
            contact_email: "contact@dupont.fr".to_string(),
            phone: Some("+33 1 23 45 67 89".to_string()),
        }
    }

    fn portal_over(backend: Arc<MemoryBackend>) -> Portal {
        let mut portal = Portal::new(backend, PortalConfig::default());
        portal.register_route("/kanban", true);
        portal.register_route("/documents", true);
        portal
    }

    async fn settle_tasks() {
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    #[tokio::test]
    async fn test_no_decision_while_settling() {
        let backend = Arc::new(MemoryBackend::new());
        let portal = portal_over(backend);

        // Bootstrap has not run: the session is settling and the caller
        // must show a loading state, not a redirect.
        assert!(portal.navigate_now("/kanban").is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_treated_as_unauthenticated() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_failing(BackendOp::FetchIdentity, true);
        let portal = portal_over(backend);

        let state = portal.bootstrap().await;
        assert!(!state.settling);
        assert!(!state.is_authenticated());

        let decision = portal.navigate("/kanban").await;
        assert_eq!(
            decision,
            Decision::RedirectAuth {
                return_to: "/kanban".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_incomplete_onboarding_redirects_and_preserves_location() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_identity(Some(client_identity()));
        let portal = portal_over(backend);
        portal.bootstrap().await;

        let decision = portal.navigate("/kanban").await;
        assert_eq!(
            decision,
            Decision::RedirectOnboarding {
                return_to: "/kanban".to_string()
            }
        );

        // The onboarding screen itself renders, repeatedly, without
        // flapping back into a redirect.
        assert_eq!(portal.navigate("/onboarding").await, Decision::Render);
        assert_eq!(portal.navigate("/onboarding").await, Decision::Render);
    }

    #[tokio::test]
    async fn test_completed_user_goes_home_from_onboarding() {
        let backend = Arc::new(MemoryBackend::new());
        let identity = client_identity();
        backend.set_identity(Some(identity.clone()));
        backend.set_onboarding(
            identity.id,
            OnboardingRecord {
                completed: true,
                company_id: None,
            },
        );
        let portal = portal_over(backend);
        portal.bootstrap().await;

        assert_eq!(portal.navigate("/onboarding").await, Decision::RedirectHome);
        assert_eq!(portal.navigate("/kanban").await, Decision::Render);
    }

    #[tokio::test]
    async fn test_complete_onboarding_promotes_without_stale_window() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_identity(Some(client_identity()));
        let portal = portal_over(backend.clone());
        portal.bootstrap().await;

        assert!(matches!(
            portal.navigate("/kanban").await,
            Decision::RedirectOnboarding { .. }
        ));

        let status = portal.complete_onboarding(company()).await.unwrap();
        assert!(status.completed);
        assert!(status.company_id.is_some());

        // Immediately visible: no stale cache window.
        assert_eq!(portal.navigate("/kanban").await, Decision::Render);
        // Initial resolve plus the explicit refresh.
        assert_eq!(backend.onboarding_lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_complete_onboarding_requires_identity() {
        let backend = Arc::new(MemoryBackend::new());
        let portal = portal_over(backend);
        portal.bootstrap().await;

        let err = portal.complete_onboarding(company()).await.unwrap_err();
        assert!(matches!(err, PortalError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_messaging_end_to_end() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_identity(Some(client_identity()));
        let portal = portal_over(backend.clone());
        portal.bootstrap().await;

        let key = ConversationKey::new();
        let view = portal.open_conversation(key);
        view.snapshot();
        settle_tasks().await;

        let sent = portal
            .send_message(key, "bonjour, où en est mon dossier ?".to_string())
            .await
            .unwrap();
        settle_tasks().await;

        let snapshot = view.snapshot();
        let ours: Vec<_> = snapshot
            .messages
            .iter()
            .filter(|m| m.id == sent.id)
            .collect();
        assert_eq!(ours.len(), 1);
        assert!(view.pending().is_empty());

        // A staff reply pushed server-side reaches the view through the
        // change stream.
        backend.push_message(key, "votre dossier est en cours", false);
        settle_tasks().await;
        assert_eq!(view.snapshot().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_failure_surfaces_and_renders_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_identity(Some(client_identity()));
        backend.set_failing(BackendOp::UploadFile, true);
        let portal = portal_over(backend);
        portal.bootstrap().await;

        let key = ConversationKey::new();
        let view = portal.open_conversation(key);
        view.snapshot();
        settle_tasks().await;

        let err = portal
            .upload_file(key, "devis.pdf".to_string(), Bytes::from_static(b"%PDF"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Action(_)));
        settle_tasks().await;

        assert!(view.snapshot().files.is_empty());
        assert!(view.pending().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_everything() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_identity(Some(client_identity()));
        let portal = portal_over(backend.clone());
        portal.bootstrap().await;

        let key = ConversationKey::new();
        let view = portal.open_conversation(key);
        portal
            .send_message(key, "bonjour".to_string())
            .await
            .unwrap();
        settle_tasks().await;
        assert!(!view.snapshot().messages.is_empty());

        portal.sign_out();

        // No decision ever reaches protected content again...
        assert_eq!(
            portal.navigate("/kanban").await,
            Decision::RedirectAuth {
                return_to: "/kanban".to_string()
            }
        );
        // ...and the cached conversation state is gone, not served stale.
        let snapshot = view.snapshot();
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_view_releases_subscription() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_identity(Some(client_identity()));
        let portal = portal_over(backend.clone());
        portal.bootstrap().await;

        let key = ConversationKey::new();
        let view = portal.open_conversation(key);
        settle_tasks().await;
        assert_eq!(backend.subscriber_count(key), 1);

        drop(view);
        settle_tasks().await;
        assert_eq!(backend.subscriber_count(key), 0);
    }

    #[tokio::test]
    async fn test_session_changes_drive_reevaluation() {
        let backend = Arc::new(MemoryBackend::new());
        let portal = portal_over(backend.clone());

        let mut session_rx = portal.session_changes();
        portal.bootstrap().await;
        session_rx.changed().await.unwrap();

        // After the change notification a fresh evaluation is available.
        assert!(portal.navigate_now("/kanban").is_some());
    }
}
