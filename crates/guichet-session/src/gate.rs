//! Access-gating decision engine.
//!
//! [`decide`] is a pure function over the latest session and onboarding
//! snapshots; the caller performs the redirect it returns.  Rules are
//! evaluated top to bottom and the first match wins; the order is part of
//! the contract, not an implementation detail.
//!
//! Callers must not invoke the gate while the session is settling; the
//! portal facade enforces that by awaiting settlement (and its
//! non-blocking variant returns no decision instead).

use serde::{Deserialize, Serialize};

use guichet_shared::types::OnboardingStatus;

use crate::routes::{RoutePaths, RouteRequest};
use crate::session::SessionState;

/// Outcome of a gating decision.
///
/// Redirects carry the originally requested location so the auth and
/// onboarding flows can send the user back afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Decision {
    /// Render the requested view.
    Render,
    /// Send the user to the authentication screen.
    RedirectAuth { return_to: String },
    /// Send the user to the onboarding screen.
    RedirectOnboarding { return_to: String },
    /// Send the user to the home page.
    RedirectHome,
}

/// Decide whether a navigation renders or redirects.
///
/// A missing or failed onboarding status counts as `completed = false`:
/// on uncertainty the gate routes toward onboarding, never into protected
/// content.  Never panics, never returns an error.
pub fn decide(
    session: &SessionState,
    onboarding: Option<&OnboardingStatus>,
    route: &RouteRequest,
    paths: &RoutePaths,
) -> Decision {
    // Rule 2: no identity, no access, regardless of path or status.
    if session.identity.is_none() {
        return Decision::RedirectAuth {
            return_to: route.path.clone(),
        };
    }

    // Rules 3 and 4 only apply to onboarding-gated routes; public routes
    // are reachable in any onboarding state.
    if route.requires_onboarding {
        let completed = onboarding.map(|status| status.completed).unwrap_or(false);

        if !completed {
            // The onboarding screen must render for the user it exists for,
            // not redirect onto itself.
            if route.path == paths.onboarding {
                return Decision::Render;
            }
            return Decision::RedirectOnboarding {
                return_to: route.path.clone(),
            };
        }

        // A completed user never lands back on the onboarding screen.
        if route.path == paths.onboarding {
            return Decision::RedirectHome;
        }
    }

    Decision::Render
}
