//! Credential sources.
//!
//! The engine only ever sees `HA1 = H(username:realm:password)`; plaintext
//! passwords are hashed when a source is built and then dropped.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::CredentialsConfig;
use crate::error::{CredentialErrorKind, DaemonError};

use super::hash::Ha1;

/// Looks up the secret digest for a user within a realm.
///
/// `Ok(None)` means the user is unknown. `Err` means the store itself failed;
/// callers must not let either case be distinguishable from a wrong password.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, username: &str, realm: &str) -> Result<Option<Ha1>, CredentialErrorKind>;
}

/// In-memory `(username, realm) -> HA1` table.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: HashMap<(String, String), Ha1>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user by plaintext password. Only the HA1 is kept.
    pub fn with_password(mut self, username: &str, realm: &str, password: &str) -> Self {
        self.insert(username, realm, Ha1::from_password(username, realm, password));
        self
    }

    pub fn insert(&mut self, username: &str, realm: &str, ha1: Ha1) {
        self.entries
            .insert((username.to_string(), realm.to_string()), ha1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the table from configuration.
    ///
    /// Inline users are bound to `realm`; an optional htdigest file adds its
    /// own `(user, realm)` pairs.
    pub fn from_config(config: &CredentialsConfig, realm: &str) -> Result<Self, DaemonError> {
        let mut credentials = match &config.htdigest_path {
            Some(path) => load_htdigest(path)?,
            None => Self::new(),
        };

        for user in &config.users {
            let ha1 = match (&user.password, &user.ha1) {
                (Some(password), None) => Ha1::from_password(&user.username, realm, password),
                (None, Some(ha1)) => Ha1::from_hex(ha1).ok_or_else(|| DaemonError::Config {
                    message: format!("Invalid ha1 for user '{}'", user.username),
                })?,
                _ => {
                    return Err(DaemonError::Config {
                        message: format!(
                            "User '{}' must set exactly one of 'password' or 'ha1'",
                            user.username
                        ),
                    })
                }
            };
            credentials.insert(&user.username, realm, ha1);
        }

        debug!(entries = credentials.len(), "Credential table built");
        Ok(credentials)
    }
}

impl CredentialResolver for StaticCredentials {
    fn resolve(&self, username: &str, realm: &str) -> Result<Option<Ha1>, CredentialErrorKind> {
        Ok(self
            .entries
            .get(&(username.to_string(), realm.to_string()))
            .cloned())
    }
}

/// Credential table that can be swapped while requests are in flight.
///
/// Used for SIGHUP reloads; lookups already running keep the table they
/// started with.
#[derive(Debug, Default)]
pub struct SharedCredentials {
    current: RwLock<Arc<StaticCredentials>>,
}

impl SharedCredentials {
    pub fn new(credentials: StaticCredentials) -> Self {
        Self {
            current: RwLock::new(Arc::new(credentials)),
        }
    }

    /// Install a new table.
    pub fn replace(&self, credentials: StaticCredentials) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(credentials);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<StaticCredentials> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }
}

impl CredentialResolver for SharedCredentials {
    fn resolve(&self, username: &str, realm: &str) -> Result<Option<Ha1>, CredentialErrorKind> {
        self.snapshot().resolve(username, realm)
    }
}

/// Load an Apache `htdigest` file (`user:realm:ha1` per line).
///
/// Security: the file must not be readable by group or others.
pub fn load_htdigest(path: &Path) -> Result<StaticCredentials, DaemonError> {
    let metadata = std::fs::metadata(path).map_err(|e| CredentialErrorKind::Unavailable {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(CredentialErrorKind::InsecurePermissions {
                path: path.to_path_buf(),
                mode: mode & 0o777,
            }
            .into());
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let content = std::fs::read_to_string(path).map_err(|e| CredentialErrorKind::Unavailable {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    parse_htdigest(&content, path)
}

fn parse_htdigest(content: &str, path: &Path) -> Result<StaticCredentials, DaemonError> {
    let mut credentials = StaticCredentials::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let invalid = |message: &str| CredentialErrorKind::InvalidEntry {
            path: path.to_path_buf(),
            line: index + 1,
            message: message.to_string(),
        };

        let mut fields = line.splitn(3, ':');
        let (user, realm, ha1) = match (fields.next(), fields.next(), fields.next()) {
            (Some(user), Some(realm), Some(ha1)) if !user.is_empty() => (user, realm, ha1),
            _ => return Err(invalid("expected user:realm:ha1").into()),
        };
        let ha1 = Ha1::from_hex(ha1).ok_or_else(|| invalid("ha1 must be 32 hex characters"))?;

        credentials.insert(user, realm, ha1);
    }

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserEntry;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_static_resolve() {
        let creds = StaticCredentials::new().with_password("alice", "example.com", "secret");

        let ha1 = creds.resolve("alice", "example.com").unwrap().unwrap();
        assert_eq!(ha1, Ha1::from_password("alice", "example.com", "secret"));
        assert!(creds.resolve("alice", "other.realm").unwrap().is_none());
        assert!(creds.resolve("bob", "example.com").unwrap().is_none());
    }

    #[test]
    fn test_parse_htdigest() {
        let content = "# comment\n\nalice:example.com:939e7578ed9e3c518a452acee763bce9\n";
        let creds = parse_htdigest(content, Path::new("htdigest")).unwrap();

        assert_eq!(creds.len(), 1);
        assert!(creds.resolve("alice", "example.com").unwrap().is_some());
    }

    #[test]
    fn test_parse_htdigest_reports_line() {
        let content = "alice:example.com:939e7578ed9e3c518a452acee763bce9\nbroken-line\n";
        let err = parse_htdigest(content, Path::new("htdigest")).unwrap_err();

        assert!(matches!(
            err,
            DaemonError::Credentials {
                kind: CredentialErrorKind::InvalidEntry { line: 2, .. }
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_htdigest_permissions_enforced() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "alice:example.com:939e7578ed9e3c518a452acee763bce9").unwrap();

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            load_htdigest(file.path()),
            Err(DaemonError::Credentials {
                kind: CredentialErrorKind::InsecurePermissions { .. }
            })
        ));

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        assert_eq!(load_htdigest(file.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_from_config_hashes_passwords() {
        let config = CredentialsConfig {
            htdigest_path: None,
            users: vec![
                UserEntry {
                    username: "alice".to_string(),
                    password: Some("secret".to_string()),
                    ha1: None,
                },
                UserEntry {
                    username: "bob".to_string(),
                    password: None,
                    ha1: Some("0123456789abcdef0123456789ABCDEF".to_string()),
                },
            ],
        };

        let creds = StaticCredentials::from_config(&config, "example.com").unwrap();
        assert_eq!(
            creds.resolve("alice", "example.com").unwrap().unwrap(),
            Ha1::from_password("alice", "example.com", "secret")
        );
        assert_eq!(
            creds.resolve("bob", "example.com").unwrap().unwrap().as_str(),
            "0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn test_from_config_rejects_ambiguous_user() {
        let config = CredentialsConfig {
            htdigest_path: None,
            users: vec![UserEntry {
                username: "alice".to_string(),
                password: Some("secret".to_string()),
                ha1: Some("0123456789abcdef0123456789abcdef".to_string()),
            }],
        };

        assert!(matches!(
            StaticCredentials::from_config(&config, "example.com"),
            Err(DaemonError::Config { .. })
        ));
    }

    #[test]
    fn test_shared_credentials_replace() {
        let shared = SharedCredentials::new(
            StaticCredentials::new().with_password("alice", "example.com", "secret"),
        );
        assert!(shared.resolve("alice", "example.com").unwrap().is_some());

        shared.replace(StaticCredentials::new().with_password("bob", "example.com", "hunter2"));
        assert!(shared.resolve("alice", "example.com").unwrap().is_none());
        assert!(shared.resolve("bob", "example.com").unwrap().is_some());
        assert_eq!(shared.len(), 1);
    }
}
