/// Application name
pub const APP_NAME: &str = "Guichet";

/// Default path of the authentication screen
pub const DEFAULT_AUTH_PATH: &str = "/login";

/// Default path of the onboarding screen
pub const DEFAULT_ONBOARDING_PATH: &str = "/onboarding";

/// Default path redirected to once onboarding is complete
pub const DEFAULT_HOME_PATH: &str = "/";

/// Maximum message content length in bytes (8 KiB)
pub const MAX_MESSAGE_LEN: usize = 8_192;

/// Maximum file upload size in bytes (25 MiB)
pub const MAX_UPLOAD_SIZE: usize = 25 * 1024 * 1024;

/// Capacity of the per-conversation change-event channel
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the cache update broadcast channel
pub const CACHE_UPDATE_CAPACITY: usize = 256;

/// Initial delay before resubscribing to a lost change stream (milliseconds)
pub const RESUBSCRIBE_BASE_MS: u64 = 500;

/// Upper bound on the resubscription backoff delay (milliseconds)
pub const RESUBSCRIBE_MAX_MS: u64 = 30_000;
