//! Portal configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the portal can start with zero
//! configuration for local development.

use std::time::Duration;

use guichet_shared::constants::{
    DEFAULT_AUTH_PATH, DEFAULT_HOME_PATH, DEFAULT_ONBOARDING_PATH, MAX_MESSAGE_LEN,
    MAX_UPLOAD_SIZE, RESUBSCRIBE_BASE_MS, RESUBSCRIBE_MAX_MS,
};

/// Portal configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Path of the authentication screen.
    /// Env: `GUICHET_AUTH_PATH`
    /// Default: `/login`
    pub auth_path: String,

    /// Path of the onboarding screen.
    /// Env: `GUICHET_ONBOARDING_PATH`
    /// Default: `/onboarding`
    pub onboarding_path: String,

    /// Landing page for fully onboarded users.
    /// Env: `GUICHET_HOME_PATH`
    /// Default: `/`
    pub home_path: String,

    /// Maximum message content length in bytes.
    /// Env: `GUICHET_MAX_MESSAGE_LEN`
    pub max_message_len: usize,

    /// Maximum upload size in bytes.
    /// Env: `GUICHET_MAX_UPLOAD_SIZE`
    pub max_upload_size: usize,

    /// Initial delay before resubscribing to a lost change stream.
    /// Env: `GUICHET_RESUBSCRIBE_BASE_MS`
    pub resubscribe_base: Duration,

    /// Upper bound on the resubscription backoff delay.
    /// Env: `GUICHET_RESUBSCRIBE_MAX_MS`
    pub resubscribe_max: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            onboarding_path: DEFAULT_ONBOARDING_PATH.to_string(),
            home_path: DEFAULT_HOME_PATH.to_string(),
            max_message_len: MAX_MESSAGE_LEN,
            max_upload_size: MAX_UPLOAD_SIZE,
            resubscribe_base: Duration::from_millis(RESUBSCRIBE_BASE_MS),
            resubscribe_max: Duration::from_millis(RESUBSCRIBE_MAX_MS),
        }
    }
}

impl PortalConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("GUICHET_AUTH_PATH") {
            config.auth_path = path;
        }

        if let Ok(path) = std::env::var("GUICHET_ONBOARDING_PATH") {
            config.onboarding_path = path;
        }

        if let Ok(path) = std::env::var("GUICHET_HOME_PATH") {
            config.home_path = path;
        }

        if let Some(len) = parse_env_usize("GUICHET_MAX_MESSAGE_LEN") {
            config.max_message_len = len;
        }

        if let Some(size) = parse_env_usize("GUICHET_MAX_UPLOAD_SIZE") {
            config.max_upload_size = size;
        }

        if let Some(ms) = parse_env_u64("GUICHET_RESUBSCRIBE_BASE_MS") {
            config.resubscribe_base = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_env_u64("GUICHET_RESUBSCRIBE_MAX_MS") {
            config.resubscribe_max = Duration::from_millis(ms);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_env_usize(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    match value.parse::<usize>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Invalid value, using default");
            None
        }
    }
}

fn parse_env_u64(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.parse::<u64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortalConfig::default();
        assert_eq!(config.auth_path, "/login");
        assert_eq!(config.onboarding_path, "/onboarding");
        assert_eq!(config.home_path, "/");
        assert!(config.resubscribe_base < config.resubscribe_max);
    }

    #[test]
    fn test_missing_env_vars_fall_back() {
        // No GUICHET_* variables are set in the test environment.
        assert!(parse_env_usize("GUICHET_DOES_NOT_EXIST").is_none());
    }
}
