//! MD5 digest formulas (RFC 2617) and constant-time digest comparison.

use std::fmt;

use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

/// Length of a hex-encoded MD5 digest.
pub const MD5_HEX_LEN: usize = 32;

/// Hex-encoded `H(username:realm:password)`.
///
/// This is the only secret material the engine ever handles; the plaintext
/// password never leaves the credential source.
#[derive(Clone, PartialEq, Eq)]
pub struct Ha1(String);

impl Ha1 {
    /// Hash a plaintext password into its HA1 form.
    pub fn from_password(username: &str, realm: &str, password: &str) -> Self {
        Self(md5_hex(&format!("{}:{}:{}", username, realm, password)))
    }

    /// Accept a precomputed HA1, normalised to lowercase hex.
    ///
    /// Returns `None` unless the value is exactly 32 hex characters.
    pub fn from_hex(value: &str) -> Option<Self> {
        if value.len() == MD5_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(value.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ha1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ha1([REDACTED])")
    }
}

/// The qop-specific inputs of the response formula.
#[derive(Debug, Clone, Copy)]
pub struct QopFields<'a> {
    pub qop: &'a str,
    pub nc: &'a str,
    pub cnonce: &'a str,
}

/// Lowercase hex MD5 of a string.
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// `H(method:uri)`.
pub fn ha2(method: &str, uri: &str) -> String {
    md5_hex(&format!("{}:{}", method, uri))
}

/// The request digest a client must send in `response=`.
///
/// With qop: `H(HA1:nonce:nc:cnonce:qop:HA2)`; without: `H(HA1:nonce:HA2)`.
pub fn request_digest(
    ha1: &Ha1,
    nonce: &str,
    method: &str,
    uri: &str,
    qop: Option<QopFields<'_>>,
) -> String {
    keyed_digest(ha1, nonce, &ha2(method, uri), qop)
}

/// The `rspauth` value of `Authentication-Info`.
///
/// Same shape as the request digest but with an empty method in HA2.
pub fn response_auth(ha1: &Ha1, nonce: &str, uri: &str, qop: QopFields<'_>) -> String {
    keyed_digest(ha1, nonce, &ha2("", uri), Some(qop))
}

fn keyed_digest(ha1: &Ha1, nonce: &str, ha2: &str, qop: Option<QopFields<'_>>) -> String {
    match qop {
        Some(q) => md5_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            ha1.as_str(),
            nonce,
            q.nc,
            q.cnonce,
            q.qop,
            ha2
        )),
        None => md5_hex(&format!("{}:{}:{}", ha1.as_str(), nonce, ha2)),
    }
}

/// Compare two hex digests case-insensitively in constant time.
///
/// Both inputs are padded to the longer length with different fill bytes so
/// that a length difference cannot short-circuit the comparison.
pub fn digests_equal(expected: &str, supplied: &str) -> bool {
    let a = expected.to_ascii_lowercase();
    let b = supplied.to_ascii_lowercase();
    let max_len = a.len().max(b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
