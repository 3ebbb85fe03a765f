//! Digest response verification.

use std::sync::Arc;

use ring::rand::SystemRandom;
use tracing::{debug, error};

use crate::error::{DaemonResult, RejectReason};
use crate::protocol::{strip_digest_scheme, AuthRequest, AuthenticationInfo, DigestResponse};

use super::credentials::CredentialResolver;
use super::hash::{digests_equal, request_digest, response_auth, Ha1};
use super::nonce::{random_token, NonceRegistry, NonceStatus};

/// A verified digest response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub username: String,
    pub authentication_info: Option<AuthenticationInfo>,
}

/// Checks client responses against the nonce registry and credential source.
pub struct ResponseVerifier {
    registry: Arc<NonceRegistry>,
    resolver: Arc<dyn CredentialResolver>,
    /// Stand-in secret used when the user is unknown so both failure paths
    /// do the same work.
    decoy: Ha1,
    authentication_info: bool,
}

impl ResponseVerifier {
    pub fn new(
        registry: Arc<NonceRegistry>,
        resolver: Arc<dyn CredentialResolver>,
        authentication_info: bool,
    ) -> DaemonResult<Self> {
        let decoy = random_token(&SystemRandom::new())?;
        Ok(Self {
            registry,
            resolver,
            decoy: Ha1::from_hex(&decoy).unwrap_or_else(|| Ha1::from_password("", "", &decoy)),
            authentication_info,
        })
    }

    /// Parse an `Authorization` header value into a digest response.
    pub fn parse(header: &str) -> Result<DigestResponse, RejectReason> {
        let params = strip_digest_scheme(header).ok_or(RejectReason::Malformed)?;
        DigestResponse::parse(params)
    }

    /// Parse and verify in one step.
    pub fn verify_header(
        &self,
        request: &AuthRequest,
        header: &str,
    ) -> Result<Accepted, RejectReason> {
        let response = Self::parse(header)?;
        self.verify(request, &response)
    }

    /// Verify a parsed response for `request`.
    ///
    /// Order: uri binding, nonce/counter check, credential lookup, digest
    /// comparison. The counter is consumed before the digest is checked.
    pub fn verify(
        &self,
        request: &AuthRequest,
        response: &DigestResponse,
    ) -> Result<Accepted, RejectReason> {
        if response.uri != request.uri {
            debug!(
                digest_uri = %response.uri,
                request_uri = %request.uri,
                "Digest uri does not match request target"
            );
            return Err(RejectReason::UriMismatch);
        }

        let nc = response.nonce_count()?;
        match self.registry.validate(&response.nonce, nc) {
            NonceStatus::Ok => {}
            NonceStatus::Unknown => return Err(RejectReason::UnknownNonce),
            NonceStatus::Stale => return Err(RejectReason::StaleNonce),
            NonceStatus::Replayed => return Err(RejectReason::ReplayedCounter),
        }

        let (ha1, known) = match self.resolver.resolve(&response.username, &response.realm) {
            Ok(Some(ha1)) => (ha1, true),
            Ok(None) => (self.decoy.clone(), false),
            Err(e) => {
                error!(error = %e, "Credential lookup failed");
                (self.decoy.clone(), false)
            }
        };

        let qop = response.qop_fields();
        let expected = request_digest(&ha1, &response.nonce, &request.method, &response.uri, qop);

        if !(digests_equal(&expected, &response.response) & known) {
            return Err(RejectReason::DigestMismatch);
        }

        let authentication_info = match qop {
            Some(qop) if self.authentication_info => Some(AuthenticationInfo {
                rspauth: response_auth(&ha1, &response.nonce, &response.uri, qop),
                nc: qop.nc.to_string(),
                cnonce: qop.cnonce.to_string(),
            }),
            _ => None,
        };

        Ok(Accepted {
            username: response.username.clone(),
            authentication_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::StaticCredentials;
    use crate::auth::hash::QopFields;
    use crate::error::CredentialErrorKind;
    use std::time::Duration;

    const REALM: &str = "example.com";

    struct FailingResolver;

    impl CredentialResolver for FailingResolver {
        fn resolve(&self, _: &str, _: &str) -> Result<Option<Ha1>, CredentialErrorKind> {
            Err(CredentialErrorKind::Unavailable {
                message: "offline".to_string(),
            })
        }
    }

    fn setup(resolver: Arc<dyn CredentialResolver>) -> (Arc<NonceRegistry>, ResponseVerifier) {
        let registry = Arc::new(NonceRegistry::new(Duration::from_secs(60), 2));
        let verifier = ResponseVerifier::new(Arc::clone(&registry), resolver, true).unwrap();
        (registry, verifier)
    }

    fn alice() -> Arc<dyn CredentialResolver> {
        Arc::new(StaticCredentials::new().with_password("alice", REALM, "secret"))
    }

    fn header(user: &str, password: &str, nonce: &str, uri: &str, nc: &str) -> String {
        let ha1 = Ha1::from_password(user, REALM, password);
        let qop = QopFields {
            qop: "auth",
            nc,
            cnonce: "0a4f113b",
        };
        let digest = request_digest(&ha1, nonce, "GET", uri, Some(qop));
        format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", qop=auth, nc={}, cnonce="0a4f113b", response="{}""#,
            user, REALM, nonce, uri, nc, digest
        )
    }

    #[test]
    fn test_valid_response_accepted_once() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let request = AuthRequest::new("GET", "/");
        let auth = header("alice", "secret", nonce.value(), "/", "00000001");

        let accepted = verifier.verify_header(&request, &auth).unwrap();
        assert_eq!(accepted.username, "alice");
        assert!(accepted.authentication_info.is_some());

        assert_eq!(
            verifier.verify_header(&request, &auth),
            Err(RejectReason::ReplayedCounter)
        );
    }

    #[test]
    fn test_uppercase_digest_accepted() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let request = AuthRequest::new("GET", "/");
        let auth = header("alice", "secret", nonce.value(), "/", "00000001");
        let digest_start = auth.rfind("response=\"").unwrap() + "response=\"".len();
        let upper = format!("{}{}", &auth[..digest_start], auth[digest_start..].to_uppercase());

        assert!(verifier.verify_header(&request, &upper).is_ok());
    }

    #[test]
    fn test_unknown_user_and_wrong_password_look_the_same() {
        let (registry, verifier) = setup(alice());
        let request = AuthRequest::new("GET", "/");

        let nonce = registry.issue(REALM).unwrap();
        let wrong_password = verifier
            .verify_header(&request, &header("alice", "guess", nonce.value(), "/", "00000001"));

        let nonce = registry.issue(REALM).unwrap();
        let unknown_user = verifier
            .verify_header(&request, &header("mallory", "secret", nonce.value(), "/", "00000001"));

        assert_eq!(wrong_password, Err(RejectReason::DigestMismatch));
        assert_eq!(unknown_user, wrong_password);
    }

    #[test]
    fn test_resolver_failure_is_digest_mismatch() {
        let (registry, verifier) = setup(Arc::new(FailingResolver));
        let nonce = registry.issue(REALM).unwrap();
        let request = AuthRequest::new("GET", "/");

        assert_eq!(
            verifier.verify_header(&request, &header("alice", "secret", nonce.value(), "/", "00000001")),
            Err(RejectReason::DigestMismatch)
        );
    }

    #[test]
    fn test_tampered_uri_is_digest_mismatch() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let original = header("alice", "secret", nonce.value(), "/public", "00000001");
        let tampered = original.replace(r#"uri="/public""#, r#"uri="/admin""#);

        assert_eq!(
            verifier.verify_header(&AuthRequest::new("GET", "/admin"), &tampered),
            Err(RejectReason::DigestMismatch)
        );
    }

    #[test]
    fn test_uri_must_match_request_target() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let auth = header("alice", "secret", nonce.value(), "/public", "00000001");

        assert_eq!(
            verifier.verify_header(&AuthRequest::new("GET", "/admin"), &auth),
            Err(RejectReason::UriMismatch)
        );
        // The counter was not consumed by the rejected attempt
        assert!(verifier
            .verify_header(&AuthRequest::new("GET", "/public"), &auth)
            .is_ok());
    }

    #[test]
    fn test_method_is_bound() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let auth = header("alice", "secret", nonce.value(), "/", "00000001");

        assert_eq!(
            verifier.verify_header(&AuthRequest::new("POST", "/"), &auth),
            Err(RejectReason::DigestMismatch)
        );
    }

    #[test]
    fn test_unknown_nonce() {
        let (_, verifier) = setup(alice());
        let auth = header("alice", "secret", "00112233445566778899aabbccddeeff", "/", "00000001");

        assert_eq!(
            verifier.verify_header(&AuthRequest::new("GET", "/"), &auth),
            Err(RejectReason::UnknownNonce)
        );
    }

    #[test]
    fn test_stale_nonce_never_accepted() {
        let registry = Arc::new(NonceRegistry::new(Duration::from_millis(20), 10));
        let verifier = ResponseVerifier::new(Arc::clone(&registry), alice(), true).unwrap();
        let nonce = registry.issue(REALM).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(
            verifier.verify_header(
                &AuthRequest::new("GET", "/"),
                &header("alice", "secret", nonce.value(), "/", "00000001")
            ),
            Err(RejectReason::StaleNonce)
        );
    }

    #[test]
    fn test_rfc2069_form_is_single_use() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let ha1 = Ha1::from_password("alice", REALM, "secret");
        let digest = request_digest(&ha1, nonce.value(), "GET", "/", None);
        let auth = format!(
            r#"Digest username="alice", realm="{}", nonce="{}", uri="/", response="{}""#,
            REALM,
            nonce.value(),
            digest
        );
        let request = AuthRequest::new("GET", "/");

        let accepted = verifier.verify_header(&request, &auth).unwrap();
        assert!(accepted.authentication_info.is_none());
        assert_eq!(
            verifier.verify_header(&request, &auth),
            Err(RejectReason::ReplayedCounter)
        );
    }

    #[test]
    fn test_authentication_info_rspauth() {
        let (registry, verifier) = setup(alice());
        let nonce = registry.issue(REALM).unwrap();
        let auth = header("alice", "secret", nonce.value(), "/", "00000001");

        let info = verifier
            .verify_header(&AuthRequest::new("GET", "/"), &auth)
            .unwrap()
            .authentication_info
            .unwrap();

        let ha1 = Ha1::from_password("alice", REALM, "secret");
        let expected = response_auth(
            &ha1,
            nonce.value(),
            "/",
            QopFields {
                qop: "auth",
                nc: "00000001",
                cnonce: "0a4f113b",
            },
        );
        assert_eq!(info.rspauth, expected);
        assert_eq!(info.nc, "00000001");
    }

    #[test]
    fn test_non_digest_scheme_is_malformed() {
        assert_eq!(
            ResponseVerifier::parse("Basic YWxpY2U6c2VjcmV0"),
            Err(RejectReason::Malformed)
        );
    }
}
