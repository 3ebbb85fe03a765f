//! Error types for the digest daemon.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// HTTP listener errors.
    #[error("Server error: {message}")]
    Server { message: String },

    /// Credential source errors.
    #[error("Credential error: {kind}")]
    Credentials { kind: CredentialErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CredentialErrorKind> for DaemonError {
    fn from(kind: CredentialErrorKind) -> Self {
        DaemonError::Credentials { kind }
    }
}

/// Credential source error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialErrorKind {
    #[error("Credential store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid credential entry at {path}:{line}: {message}")]
    InvalidEntry {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Credential file {path} has insecure permissions {mode:04o}, expected 0600 or 0400")]
    InsecurePermissions { path: PathBuf, mode: u32 },
}

/// Why a digest response was not accepted.
///
/// `UnknownUser` is deliberately absent: an unknown username and a failed
/// credential lookup both surface as [`RejectReason::DigestMismatch`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    #[error("Malformed authorization header")]
    Malformed,

    #[error("Nonce was never issued or has been purged")]
    UnknownNonce,

    #[error("Nonce has expired")]
    StaleNonce,

    #[error("Nonce count already used (replay attack detected)")]
    ReplayedCounter,

    #[error("Digest uri does not match the request target")]
    UriMismatch,

    #[error("Digest mismatch")]
    DigestMismatch,
}

impl RejectReason {
    /// Stable code used in logs and the audit trail.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::UnknownNonce => "unknown_nonce",
            RejectReason::StaleNonce => "stale_nonce",
            RejectReason::ReplayedCounter => "replayed_counter",
            RejectReason::UriMismatch => "uri_mismatch",
            RejectReason::DigestMismatch => "digest_mismatch",
        }
    }

    /// Hard failures get a fresh nonce but no retry guidance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RejectReason::ReplayedCounter | RejectReason::UriMismatch)
    }
}

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_reasons() {
        assert!(RejectReason::ReplayedCounter.is_terminal());
        assert!(RejectReason::UriMismatch.is_terminal());
        assert!(!RejectReason::StaleNonce.is_terminal());
        assert!(!RejectReason::DigestMismatch.is_terminal());
        assert!(!RejectReason::Malformed.is_terminal());
    }

    #[test]
    fn test_reason_serializes_as_code() {
        for reason in [
            RejectReason::Malformed,
            RejectReason::UnknownNonce,
            RejectReason::StaleNonce,
            RejectReason::ReplayedCounter,
            RejectReason::UriMismatch,
            RejectReason::DigestMismatch,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }

    #[test]
    fn test_credential_error_wraps() {
        let err: DaemonError = CredentialErrorKind::Unavailable {
            message: "store offline".to_string(),
        }
        .into();
        assert!(err.to_string().contains("store offline"));
    }
}
