//! Core domain types and traits for shipwright.
//!
//! This crate contains:
//! - The error taxonomy shared by every stage of a release
//! - Run identifiers
//! - The command executor trait and command types
//! - Environment and secret-store abstractions
//! - Platform helpers
//! - Cancellation helpers

pub mod cancel;
pub mod env;
pub mod error;
pub mod executor;
pub mod id;
pub mod platform;
pub mod secret;

pub use cancel::{cancellable, ensure_active};
pub use env::{Environment, MapEnv, ProcessEnv};
pub use error::{Error, Result};
pub use id::RunId;
pub use tokio_util::sync::CancellationToken;
