//! Audit entry types.

use serde::Serialize;
use uuid::Uuid;

use crate::auth::Verdict;
use crate::error::RejectReason;

/// A single audit log entry.
///
/// Records one authentication decision: who asked for what, what digest
/// parameters they presented (sanitized), and what the daemon decided.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp of the decision.
    pub timestamp: String,
    /// Unique identifier for the request.
    pub request_id: Uuid,
    pub method: String,
    pub uri: String,
    /// Client socket address.
    pub remote_addr: String,
    /// Claimed username for rejections, verified username for successes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Sanitized `Authorization` parameters.
    pub params: serde_json::Value,
    pub result: AuditResult,
    /// Decision time in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of a request for audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditResult {
    Authenticated,
    Challenged,
    Rejected { reason: RejectReason },
    /// Refused before authentication by the per-client rate limit.
    RateLimited,
}

impl From<&Verdict> for AuditResult {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Authenticated { .. } => AuditResult::Authenticated,
            Verdict::Challenged { .. } => AuditResult::Challenged,
            Verdict::Rejected { reason, .. } => AuditResult::Rejected { reason: *reason },
        }
    }
}
