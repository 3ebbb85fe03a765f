//! Challenge construction.

use std::sync::Arc;

use ring::rand::SystemRandom;

use crate::error::DaemonResult;
use crate::protocol::Challenge;

use super::nonce::{random_token, NonceRegistry};

/// Builds `WWW-Authenticate` challenges, always with a freshly issued nonce.
pub struct ChallengeBuilder {
    registry: Arc<NonceRegistry>,
    rng: SystemRandom,
}

impl ChallengeBuilder {
    pub fn new(registry: Arc<NonceRegistry>) -> Self {
        Self {
            registry,
            rng: SystemRandom::new(),
        }
    }

    /// Start a new logical session: fresh nonce and fresh opaque.
    pub fn build(&self, realm: &str, stale: bool) -> DaemonResult<Challenge> {
        self.build_with_opaque(realm, stale, None)
    }

    /// Re-challenge, echoing the client's opaque when it is one we could have
    /// issued so the client can correlate its retries.
    ///
    /// The opaque is never trusted; anything that is not a plain token is
    /// replaced rather than reflected into the header.
    pub fn build_with_opaque(
        &self,
        realm: &str,
        stale: bool,
        previous_opaque: Option<&str>,
    ) -> DaemonResult<Challenge> {
        let nonce = self.registry.issue(realm)?;

        let opaque = match previous_opaque {
            Some(opaque) if is_opaque_token(opaque) => opaque.to_string(),
            _ => random_token(&self.rng)?,
        };

        Ok(Challenge {
            realm: realm.to_string(),
            nonce: nonce.value().to_string(),
            opaque,
            stale,
        })
    }
}

fn is_opaque_token(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn builder() -> (Arc<NonceRegistry>, ChallengeBuilder) {
        let registry = Arc::new(NonceRegistry::new(Duration::from_secs(60), 2));
        let builder = ChallengeBuilder::new(Arc::clone(&registry));
        (registry, builder)
    }

    #[test]
    fn test_build_registers_nonce() {
        let (registry, builder) = builder();
        let challenge = builder.build("example.com", false).unwrap();

        assert_eq!(challenge.realm, "example.com");
        assert!(!challenge.stale);
        assert!(registry.get(&challenge.nonce).is_some());
        assert!(is_opaque_token(&challenge.opaque));
    }

    #[test]
    fn test_stale_rechallenge_gets_new_nonce_same_opaque() {
        let (_, builder) = builder();
        let first = builder.build("example.com", false).unwrap();
        let retry = builder
            .build_with_opaque("example.com", true, Some(&first.opaque))
            .unwrap();

        assert!(retry.stale);
        assert_ne!(retry.nonce, first.nonce);
        assert_eq!(retry.opaque, first.opaque);
    }

    #[test]
    fn test_foreign_opaque_not_reflected() {
        let (_, builder) = builder();
        let challenge = builder
            .build_with_opaque("example.com", false, Some("\", evil=\"1"))
            .unwrap();

        assert!(is_opaque_token(&challenge.opaque));
    }
}
