//! Inbound request view and the parsed client digest response.

use crate::auth::hash::QopFields;
use crate::error::RejectReason;

use super::wire::parse_params;

/// The parts of an HTTP request the engine needs.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Request method, e.g. `GET`.
    pub method: String,

    /// Effective request target (path and query) as sent on the request line.
    pub uri: String,

    /// Raw `Authorization` header value, if any.
    pub authorization: Option<String>,
}

impl AuthRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }
}

/// A client's `Authorization: Digest ...` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResponse {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

impl DigestResponse {
    /// Parse the parameter list of a Digest credential.
    ///
    /// Any syntax error, a missing required field, an unsupported `qop` or
    /// `algorithm`, or a malformed `nc` yields [`RejectReason::Malformed`].
    pub fn parse(params: &str) -> Result<Self, RejectReason> {
        let mut params = parse_params(params).map_err(|_| RejectReason::Malformed)?;
        let mut required = |key: &str| params.remove(key).ok_or(RejectReason::Malformed);

        let username = required("username")?;
        let realm = required("realm")?;
        let nonce = required("nonce")?;
        let uri = required("uri")?;
        let response = required("response")?;

        let qop = params.remove("qop");
        let nc = params.remove("nc");
        let cnonce = params.remove("cnonce");

        let parsed = Self {
            username,
            realm,
            nonce,
            uri,
            response,
            qop,
            nc,
            cnonce,
            opaque: params.remove("opaque"),
            algorithm: params.remove("algorithm"),
        };
        parsed.check_consistency()?;
        Ok(parsed)
    }

    fn check_consistency(&self) -> Result<(), RejectReason> {
        if let Some(algorithm) = &self.algorithm {
            if !algorithm.eq_ignore_ascii_case("MD5") {
                return Err(RejectReason::Malformed);
            }
        }

        match &self.qop {
            Some(qop) => {
                if qop != "auth" || self.cnonce.is_none() {
                    return Err(RejectReason::Malformed);
                }
                self.nonce_count()?;
            }
            None => {
                if self.nc.is_some() || self.cnonce.is_some() {
                    return Err(RejectReason::Malformed);
                }
            }
        }

        Ok(())
    }

    /// The request counter as an integer.
    ///
    /// Responses without qop have no counter and consume the implicit
    /// counter `0`, which makes such nonces single use.
    pub fn nonce_count(&self) -> Result<u32, RejectReason> {
        match (&self.qop, &self.nc) {
            (None, _) => Ok(0),
            (Some(_), Some(nc)) => {
                if nc.is_empty() || nc.len() > 8 || !nc.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(RejectReason::Malformed);
                }
                match u32::from_str_radix(nc, 16) {
                    Ok(0) | Err(_) => Err(RejectReason::Malformed),
                    Ok(count) => Ok(count),
                }
            }
            (Some(_), None) => Err(RejectReason::Malformed),
        }
    }

    /// The qop inputs of the digest formula, when qop was used.
    pub fn qop_fields(&self) -> Option<QopFields<'_>> {
        match (&self.qop, &self.nc, &self.cnonce) {
            (Some(qop), Some(nc), Some(cnonce)) => Some(QopFields {
                qop,
                nc,
                cnonce,
            }),
            _ => None,
        }
    }
}
