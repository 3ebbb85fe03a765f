//! Digest authentication engine.
//!
//! Issues challenges, verifies client responses against a credential source,
//! and tracks server nonces and their request counters for replay defense.

mod challenge;
mod credentials;
pub mod hash;
mod nonce;
mod rate_limit;
mod session;
mod verifier;

pub use challenge::ChallengeBuilder;
pub use credentials::{load_htdigest, CredentialResolver, SharedCredentials, StaticCredentials};
pub use hash::Ha1;
pub use nonce::{NonceRecord, NonceRegistry, NonceStatus};
pub use rate_limit::RateLimiter;
pub use session::{DigestAuthenticator, SessionState, Verdict};
pub use verifier::{Accepted, ResponseVerifier};
