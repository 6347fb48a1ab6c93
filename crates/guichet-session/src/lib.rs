//! # guichet-session
//!
//! Session state, onboarding status resolution, and the access-gating
//! decision engine.  The gate itself is a pure function; the stateful
//! pieces around it (session handle, resolver) are observable through
//! watch channels so consumers re-evaluate on change instead of polling.

pub mod gate;
pub mod onboarding;
pub mod routes;
pub mod session;

pub use gate::{decide, Decision};
pub use onboarding::OnboardingResolver;
pub use routes::{RoutePaths, RouteRequest, RouteTable};
pub use session::{SessionHandle, SessionState};
