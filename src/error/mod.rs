//! Error types for the digest daemon.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
