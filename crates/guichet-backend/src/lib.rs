//! # guichet-backend
//!
//! The port to the backend data service.  The portal core never talks to
//! storage, credentials, or a transport directly; everything goes through
//! the [`BackendService`] trait defined here.  [`MemoryBackend`] is the
//! in-process implementation used for development and tests.

pub mod memory;
pub mod service;

pub use memory::{BackendOp, MemoryBackend};
pub use service::{BackendService, ChangeStream};
