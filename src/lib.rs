//! Digest Daemon Library
//!
//! HTTP Digest Access Authentication (RFC 2617, MD5, `qop=auth`) with
//! replay-safe nonce tracking, plus the small axum server that puts the
//! engine in front of a protected endpoint.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
