//! Routing surface consumed by the access gate.
//!
//! The table maps paths to their onboarding requirement.  Unknown paths
//! resolve as protected and onboarding-gated: an unregistered route must
//! never be more reachable than a registered one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use guichet_shared::constants::{DEFAULT_AUTH_PATH, DEFAULT_HOME_PATH, DEFAULT_ONBOARDING_PATH};

/// The three paths the gate redirects between.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutePaths {
    /// Authentication screen.
    pub auth: String,
    /// Onboarding screen.
    pub onboarding: String,
    /// Landing page for fully onboarded users.
    pub home: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            auth: DEFAULT_AUTH_PATH.to_string(),
            onboarding: DEFAULT_ONBOARDING_PATH.to_string(),
            home: DEFAULT_HOME_PATH.to_string(),
        }
    }
}

/// One navigation request, produced per navigation and then discarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteRequest {
    /// Requested path.
    pub path: String,
    /// Whether the route is gated on completed onboarding.
    pub requires_onboarding: bool,
}

/// Registry of the application's routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    paths: RoutePaths,
    requirements: HashMap<String, bool>,
}

impl RouteTable {
    /// Build a table over the given well-known paths.
    ///
    /// The auth path is public; the onboarding and home paths start out
    /// onboarding-gated (the gate itself exempts the onboarding screen for
    /// users who still need it).
    pub fn new(paths: RoutePaths) -> Self {
        let mut requirements = HashMap::new();
        requirements.insert(paths.auth.clone(), false);
        requirements.insert(paths.onboarding.clone(), true);
        requirements.insert(paths.home.clone(), true);
        Self {
            paths,
            requirements,
        }
    }

    /// Register an application route.
    pub fn register(&mut self, path: &str, requires_onboarding: bool) {
        self.requirements
            .insert(path.to_string(), requires_onboarding);
    }

    /// Produce the request for a navigation to `path`.
    pub fn resolve(&self, path: &str) -> RouteRequest {
        // Unknown paths are treated as gated.
        let requires_onboarding = self.requirements.get(path).copied().unwrap_or(true);
        RouteRequest {
            path: path.to_string(),
            requires_onboarding,
        }
    }

    pub fn paths(&self) -> &RoutePaths {
        &self.paths
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(RoutePaths::default())
    }
}
