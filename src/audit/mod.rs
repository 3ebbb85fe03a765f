//! Audit logging module.
//!
//! Records every authentication decision the daemon makes as one JSON
//! object per line, with digest parameters sanitized before they are
//! written.

mod entry;
mod logger;
mod sanitize;

pub use entry::{AuditEntry, AuditResult};
pub use logger::{AuditLogger, AuditSink, NullAuditLogger};
pub use sanitize::{authorization_params, sanitize_params};
