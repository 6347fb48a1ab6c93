//! # guichet-client
//!
//! The portal facade: one explicit context object wiring the session
//! handle, onboarding resolver, route table, conversation cache, change
//! listeners, and action coordinator over a backend port.  The
//! presentation layer talks to [`Portal`] and [`ConversationView`] only.

pub mod config;
pub mod portal;
pub mod view;

pub use config::PortalConfig;
pub use portal::{ConversationView, Portal, PortalError};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise logging for the portal process.
///
/// `RUST_LOG` takes precedence; the fallback keeps the portal crates
/// chatty and everything else quiet.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "guichet_client=debug,guichet_session=debug,guichet_sync=debug,guichet_backend=info,warn",
        )
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
