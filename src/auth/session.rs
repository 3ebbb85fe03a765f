//! Per-request authentication decision.
//!
//! Each request walks `Unauthenticated -> Challenged` (no usable credentials)
//! or `Verifying -> Authenticated | Rejected`. Nothing carries over between
//! requests except nonce state in the [`NonceRegistry`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DaemonResult, RejectReason};
use crate::protocol::{strip_digest_scheme, AuthRequest, AuthenticationInfo, Challenge, DigestResponse};

use super::challenge::ChallengeBuilder;
use super::credentials::CredentialResolver;
use super::nonce::NonceRegistry;
use super::verifier::ResponseVerifier;

/// Protocol state of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Challenged,
    Verifying,
    Authenticated,
    Rejected,
}

/// Final decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Credentials verified; the request may proceed as `username`.
    Authenticated {
        username: String,
        authentication_info: Option<AuthenticationInfo>,
    },
    /// No digest credentials for this realm were offered.
    Challenged { challenge: Challenge },
    /// Credentials were offered and refused.
    Rejected {
        reason: RejectReason,
        challenge: Challenge,
    },
}

impl Verdict {
    pub fn state(&self) -> SessionState {
        match self {
            Verdict::Authenticated { .. } => SessionState::Authenticated,
            Verdict::Challenged { .. } => SessionState::Challenged,
            Verdict::Rejected { .. } => SessionState::Rejected,
        }
    }

    /// The challenge to send back, if the request was not authenticated.
    pub fn challenge(&self) -> Option<&Challenge> {
        match self {
            Verdict::Authenticated { .. } => None,
            Verdict::Challenged { challenge } | Verdict::Rejected { challenge, .. } => {
                Some(challenge)
            }
        }
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Verdict::Authenticated { username, .. } => Some(username),
            _ => None,
        }
    }
}

/// Orchestrates challenge issuance and response verification for one realm.
pub struct DigestAuthenticator {
    realm: String,
    registry: Arc<NonceRegistry>,
    challenges: ChallengeBuilder,
    verifier: ResponseVerifier,
}

impl DigestAuthenticator {
    /// Create an authenticator for `realm`.
    ///
    /// `authentication_info` controls whether successful qop responses get
    /// an `rspauth` for mutual authentication.
    pub fn new(
        realm: impl Into<String>,
        registry: Arc<NonceRegistry>,
        resolver: Arc<dyn CredentialResolver>,
        authentication_info: bool,
    ) -> DaemonResult<Self> {
        Ok(Self {
            realm: realm.into(),
            challenges: ChallengeBuilder::new(Arc::clone(&registry)),
            verifier: ResponseVerifier::new(Arc::clone(&registry), resolver, authentication_info)?,
            registry,
        })
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn registry(&self) -> Arc<NonceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Decide the outcome of one request.
    ///
    /// Errors only when a fresh nonce cannot be generated.
    pub fn authenticate(&self, request: &AuthRequest) -> DaemonResult<Verdict> {
        let params = match request.authorization.as_deref().and_then(strip_digest_scheme) {
            Some(params) => params,
            None => return self.challenge(SessionState::Unauthenticated),
        };

        let response = match DigestResponse::parse(params) {
            Ok(response) => response,
            Err(reason) => return self.reject(reason, None),
        };

        if response.realm != self.realm {
            debug!(realm = %response.realm, "Credentials for a different realm");
            return self.challenge(SessionState::Unauthenticated);
        }

        debug!(state = ?SessionState::Verifying, username = %response.username, "Verifying digest response");

        match self.verifier.verify(request, &response) {
            Ok(accepted) => {
                info!(
                    username = %accepted.username,
                    method = %request.method,
                    uri = %request.uri,
                    "Request authenticated"
                );
                Ok(Verdict::Authenticated {
                    username: accepted.username,
                    authentication_info: accepted.authentication_info,
                })
            }
            Err(reason) => {
                if reason == RejectReason::StaleNonce {
                    self.registry.revoke(&response.nonce);
                }
                self.reject(reason, Some(&response))
            }
        }
    }

    fn challenge(&self, from: SessionState) -> DaemonResult<Verdict> {
        debug!(from = ?from, "Issuing challenge");
        Ok(Verdict::Challenged {
            challenge: self.challenges.build(&self.realm, false)?,
        })
    }

    fn reject(
        &self,
        reason: RejectReason,
        response: Option<&DigestResponse>,
    ) -> DaemonResult<Verdict> {
        let username = response.map(|r| r.username.as_str()).unwrap_or("");
        if reason.is_terminal() {
            warn!(reason = reason.code(), username = %username, "Digest response refused");
        } else {
            debug!(reason = reason.code(), username = %username, "Digest response rejected");
        }

        let opaque = if reason.is_terminal() {
            None
        } else {
            response.and_then(|r| r.opaque.as_deref())
        };
        let stale = reason == RejectReason::StaleNonce;
        let challenge = self
            .challenges
            .build_with_opaque(&self.realm, stale, opaque)?;

        Ok(Verdict::Rejected { reason, challenge })
    }
}
