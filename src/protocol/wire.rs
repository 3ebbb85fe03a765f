//! Header parameter syntax for the Digest scheme.
//!
//! Parameters are `key=value` pairs separated by commas, where a value is
//! either a token or a quoted-string with backslash escapes:
//! ```text
//! username="alice", realm="example.com", nc=00000001, qop=auth
//! ```

use std::collections::HashMap;

use thiserror::Error;

/// The authentication scheme this crate speaks.
pub const DIGEST_SCHEME: &str = "Digest";

/// Syntax errors in a parameter list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("expected '=' at offset {at}")]
    MissingEquals { at: usize },
    #[error("empty parameter name at offset {at}")]
    EmptyKey { at: usize },
    #[error("unterminated quoted-string starting at offset {at}")]
    UnterminatedQuote { at: usize },
    #[error("expected ',' at offset {at}")]
    ExpectedComma { at: usize },
    #[error("duplicate parameter '{key}'")]
    DuplicateKey { key: String },
}

/// Return the parameter list of a `Digest` credential, or `None` when the
/// header uses another scheme.
pub fn strip_digest_scheme(header: &str) -> Option<&str> {
    let header = header.trim_start();
    let scheme_len = DIGEST_SCHEME.len();
    if header.len() <= scheme_len || !header.is_char_boundary(scheme_len) {
        return None;
    }
    let (scheme, rest) = header.split_at(scheme_len);
    if scheme.eq_ignore_ascii_case(DIGEST_SCHEME) && rest.starts_with(|c: char| c.is_whitespace()) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Parse a comma-separated parameter list.
///
/// Keys are lowercased; values keep their case. Quoted values may contain
/// commas and escaped quotes.
pub fn parse_params(input: &str) -> Result<HashMap<String, String>, ParamError> {
    let bytes = input.as_bytes();
    let mut params = HashMap::new();
    let mut pos = 0;

    loop {
        pos = skip_whitespace(bytes, pos);
        while pos < bytes.len() && bytes[pos] == b',' {
            pos = skip_whitespace(bytes, pos + 1);
        }
        if pos >= bytes.len() {
            break;
        }

        let key_start = pos;
        while pos < bytes.len() && is_token_byte(bytes[pos]) {
            pos += 1;
        }
        if pos == key_start {
            return Err(ParamError::EmptyKey { at: pos });
        }
        let key = input[key_start..pos].to_ascii_lowercase();

        pos = skip_whitespace(bytes, pos);
        if pos >= bytes.len() || bytes[pos] != b'=' {
            return Err(ParamError::MissingEquals { at: pos });
        }
        pos = skip_whitespace(bytes, pos + 1);

        let value = if pos < bytes.len() && bytes[pos] == b'"' {
            let (value, next) = read_quoted(input, pos)?;
            pos = next;
            value
        } else {
            let value_start = pos;
            while pos < bytes.len() && is_token_byte(bytes[pos]) {
                pos += 1;
            }
            input[value_start..pos].to_string()
        };

        pos = skip_whitespace(bytes, pos);
        if pos < bytes.len() && bytes[pos] != b',' {
            return Err(ParamError::ExpectedComma { at: pos });
        }

        if params.insert(key.clone(), value).is_some() {
            return Err(ParamError::DuplicateKey { key });
        }
    }

    Ok(params)
}

/// Render a value as a quoted-string.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn read_quoted(input: &str, open: usize) -> Result<(String, usize), ParamError> {
    let mut value = String::new();
    let mut chars = input[open + 1..].char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            '"' => return Ok((value, open + 1 + offset + 1)),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            },
            _ => value.push(c),
        }
    }

    Err(ParamError::UnterminatedQuote { at: open })
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// RFC 7230 `tchar`, plus `/` which some clients leave unquoted in `uri`.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~/:".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_digest_scheme("Digest username=\"a\""), Some("username=\"a\""));
        assert_eq!(strip_digest_scheme("  digest   a=b"), Some("a=b"));
        assert_eq!(strip_digest_scheme("Basic YWxpY2U6c2VjcmV0"), None);
        assert_eq!(strip_digest_scheme("Digest"), None);
        assert_eq!(strip_digest_scheme("Digestive a=b"), None);
    }

    #[test]
    fn test_parse_mixed_values() {
        let params = parse_params(
            r#"username="alice", realm="example.com", nc=00000001, qop=auth, uri="/a,b""#,
        )
        .unwrap();

        assert_eq!(params["username"], "alice");
        assert_eq!(params["realm"], "example.com");
        assert_eq!(params["nc"], "00000001");
        assert_eq!(params["qop"], "auth");
        assert_eq!(params["uri"], "/a,b");
    }

    #[test]
    fn test_parse_escapes_and_key_case() {
        let params = parse_params(r#"UserName="al\"ice", Realm = "x\\y""#).unwrap();
        assert_eq!(params["username"], "al\"ice");
        assert_eq!(params["realm"], "x\\y");
    }

    #[test]
    fn test_parse_tolerates_extra_commas_and_newlines() {
        let params = parse_params("\n  a=1,,\n  b=\"2\" ,").unwrap();
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_params(r#"username="alice"#),
            Err(ParamError::UnterminatedQuote { .. })
        ));
        assert!(matches!(parse_params("username"), Err(ParamError::MissingEquals { .. })));
        assert!(matches!(parse_params("a=1 b=2"), Err(ParamError::ExpectedComma { .. })));
        assert!(matches!(parse_params("=1"), Err(ParamError::EmptyKey { .. })));
        assert!(matches!(
            parse_params("a=1, A=2"),
            Err(ParamError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}
