use thiserror::Error;

/// Errors surfaced by the backend data service.
///
/// Every async entry point in the portal returns one of these rather than
/// letting a failure escape a component boundary uncaught.  The gating and
/// sync layers map them onto fail-closed defaults; only the presentation
/// layer turns them into user-visible notifications.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
