//! Connection settings and credential lookup.

use rootsync::{Error, Result};
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Global CAVE deployment used when no server address is given.
pub const DEFAULT_SERVER_ADDRESS: &str = "https://global.daf-apis.com";

/// Default datastack.
pub const DEFAULT_DATASTACK: &str = "brain_and_nerve_cord";

/// Per-request timeout. Bulk calls against large tables routinely take tens of
/// seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Location of the secret file relative to `$HOME`, shared with the Python
/// CAVE tooling.
const SECRET_FILE: &str = ".cloudvolume/secrets/cave-secret.json";

/// Everything needed to talk to one datastack.
#[derive(Clone)]
pub struct CaveConfig {
    pub server_address: String,
    pub datastack: String,
    pub token: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl CaveConfig {
    pub fn new(datastack: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            datastack: datastack.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_server_address(mut self, server_address: impl Into<String>) -> Self {
        self.server_address = server_address.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `GET` endpoint for the full datastack description.
    pub fn info_url(&self) -> String {
        format!(
            "{}/info/api/v2/datastack/full/{}",
            self.server_address.trim_end_matches('/'),
            self.datastack
        )
    }
}

// Keeps the token out of logs.
impl fmt::Debug for CaveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaveConfig")
            .field("server_address", &self.server_address)
            .field("datastack", &self.datastack)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Deserialize)]
struct SecretFile {
    token: String,
}

/// `$HOME/.cloudvolume/secrets/cave-secret.json`, if `$HOME` is set.
pub fn default_secret_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(SECRET_FILE))
}

/// Picks the API token: an explicit token wins, otherwise the secret file is
/// read.
///
/// # Errors
///
/// Returns [`Error::Credential`] if no token is given and the secret file is
/// missing, unreadable, or has no usable `token` field.
pub fn resolve_token(explicit: Option<&str>, secret_file: Option<&Path>) -> Result<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let path = match secret_file {
        Some(path) => path.to_path_buf(),
        None => default_secret_path().ok_or_else(|| Error::Credential {
            reason: "no token given and $HOME is not set".to_string(),
        })?,
    };

    read_secret_file(&path)
}

fn read_secret_file(path: &Path) -> Result<String> {
    let raw = std::fs::read(path).map_err(|e| Error::Credential {
        reason: format!("cannot read secret file {}: {e}", path.display()),
    })?;
    let secret: SecretFile = serde_json::from_slice(&raw).map_err(|e| Error::Credential {
        reason: format!("malformed secret file {}: {e}", path.display()),
    })?;

    let token = secret.token.trim();
    if token.is_empty() {
        return Err(Error::Credential {
            reason: format!("secret file {} has an empty token", path.display()),
        });
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Using CAVE token from {}", path.display());

    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn secret(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn explicit_token_wins() {
        let file = secret(r#"{"token": "from-file"}"#);
        let token = resolve_token(Some("  from-flag "), Some(file.path())).unwrap();
        assert_eq!(token, "from-flag");
    }

    #[test]
    fn falls_back_to_secret_file() {
        let file = secret(r#"{"token": "abc123", "other": 1}"#);
        assert_eq!(resolve_token(None, Some(file.path())).unwrap(), "abc123");
        assert_eq!(resolve_token(Some(""), Some(file.path())).unwrap(), "abc123");
    }

    #[test]
    fn missing_secret_file_is_a_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cave-secret.json");
        assert!(matches!(
            resolve_token(None, Some(&path)),
            Err(Error::Credential { .. })
        ));
    }

    #[test]
    fn rejects_secret_without_token() {
        for contents in [r#"{"token": "  "}"#, r#"{"key": "abc"}"#, "not json"] {
            let file = secret(contents);
            assert!(
                matches!(
                    resolve_token(None, Some(file.path())),
                    Err(Error::Credential { .. })
                ),
                "{contents} was accepted"
            );
        }
    }

    #[test]
    fn builds_info_url() {
        let config = CaveConfig::new("brain_and_nerve_cord", "t")
            .with_server_address("https://global.daf-apis.com/");
        assert_eq!(
            config.info_url(),
            "https://global.daf-apis.com/info/api/v2/datastack/full/brain_and_nerve_cord"
        );
    }

    #[test]
    fn debug_hides_token() {
        let config = CaveConfig::new("ds", "super-secret");
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
