//! Digest wire protocol.
//!
//! Defines the inbound request view, `Authorization` parsing and the
//! outbound challenge and `Authentication-Info` header values.
//!
//! ## Header Format
//!
//! ```text
//! WWW-Authenticate: Digest realm="...", nonce="...", opaque="...", qop="auth", algorithm=MD5[, stale=true]
//! Authorization: Digest username="...", realm="...", nonce="...", uri="...", qop=auth, nc=00000001, cnonce="...", response="..."
//! ```

mod request;
mod response;
mod wire;

pub use request::{AuthRequest, DigestResponse};
pub use response::{AuthenticationInfo, Challenge, ALGORITHM_MD5, QOP_AUTH};
pub use wire::{parse_params, quote, strip_digest_scheme, ParamError, DIGEST_SCHEME};
