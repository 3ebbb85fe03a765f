//! Outbound header values: the `WWW-Authenticate` challenge and
//! `Authentication-Info`.

use std::fmt;

use super::wire::{quote, DIGEST_SCHEME};

/// The only quality of protection offered.
pub const QOP_AUTH: &str = "auth";

/// The only hash algorithm offered.
pub const ALGORITHM_MD5: &str = "MD5";

/// A digest challenge sent with a 401 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: String,
    pub stale: bool,
}

impl Challenge {
    /// Render as a `WWW-Authenticate` header value.
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} realm={}, nonce={}, opaque={}, qop={}, algorithm={}",
            DIGEST_SCHEME,
            quote(&self.realm),
            quote(&self.nonce),
            quote(&self.opaque),
            quote(QOP_AUTH),
            ALGORITHM_MD5
        )?;
        if self.stale {
            f.write_str(", stale=true")?;
        }
        Ok(())
    }
}

/// Mutual-authentication data returned on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationInfo {
    pub rspauth: String,
    pub nc: String,
    pub cnonce: String,
}

impl AuthenticationInfo {
    /// Render as an `Authentication-Info` header value.
    pub fn header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AuthenticationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rspauth={}, qop={}, nc={}, cnonce={}",
            quote(&self.rspauth),
            QOP_AUTH,
            self.nc,
            quote(&self.cnonce)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::{parse_params, strip_digest_scheme};

    fn challenge(stale: bool) -> Challenge {
        Challenge {
            realm: "example.com".to_string(),
            nonce: "abc".to_string(),
            opaque: "def".to_string(),
            stale,
        }
    }

    #[test]
    fn test_challenge_header() {
        assert_eq!(
            challenge(false).header_value(),
            r#"Digest realm="example.com", nonce="abc", opaque="def", qop="auth", algorithm=MD5"#
        );
        assert!(challenge(true).header_value().ends_with(", stale=true"));
    }

    #[test]
    fn test_challenge_parses_back() {
        let header = challenge(true).header_value();
        let params = parse_params(strip_digest_scheme(&header).unwrap()).unwrap();

        assert_eq!(params["realm"], "example.com");
        assert_eq!(params["stale"], "true");
        assert_eq!(params["algorithm"], "MD5");
    }

    #[test]
    fn test_authentication_info_header() {
        let info = AuthenticationInfo {
            rspauth: "0123".to_string(),
            nc: "00000001".to_string(),
            cnonce: "xyz".to_string(),
        };
        assert_eq!(
            info.header_value(),
            r#"rspauth="0123", qop=auth, nc=00000001, cnonce="xyz""#
        );
    }
}
