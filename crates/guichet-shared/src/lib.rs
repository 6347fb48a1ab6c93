//! # guichet-shared
//!
//! Domain types, error taxonomy, and constants shared by every Guichet
//! crate.  Nothing in here talks to the backend or holds runtime state;
//! the structs are plain data handed between the session, sync, and
//! client layers (and to the UI over serde).

pub mod constants;
pub mod error;
pub mod types;

pub use error::BackendError;
pub use types::*;
