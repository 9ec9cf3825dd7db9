//! Credentials and their lifetimes.
//!
//! The admin credential outlives the process in a small JSON file until
//! logout. The shop credential only lives in memory and is consumed by one
//! activation.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};
use wty_core::{Error, Result};

macro_rules! secret_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(token: impl Into<String>) -> Self {
                Self(token.into())
            }

            /// Raw bearer value. Only for building request headers.
            pub fn expose(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(***)"))
            }
        }
    };
}

secret_token!(
    /// Bearer credential of an administrator.
    AdminToken
);
secret_token!(
    /// Bearer credential of a shop, valid for activations.
    ShopToken
);

/// Single-use holder of the shop credential.
#[derive(Debug, Default)]
pub struct ShopSession {
    token: Option<ShopToken>,
}

impl ShopSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&mut self, token: ShopToken) {
        self.token = Some(token);
    }

    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&ShopToken> {
        self.token.as_ref()
    }

    pub fn discard(&mut self) {
        self.token = None;
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    admin_token: AdminToken,
    #[serde(with = "time::serde::rfc3339")]
    saved_at: OffsetDateTime,
}

/// File-backed admin credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored credential, if any. A corrupt file counts as none.
    pub fn load(&self) -> Result<Option<AdminToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<StoredCredentials>(&content) {
            Ok(stored) => {
                debug!("Loaded admin credential saved at {}", stored.saved_at);
                Ok(Some(stored.admin_token))
            }
            Err(e) => {
                debug!("Ignoring unreadable credentials file: {}", e);
                Ok(None)
            }
        }
    }

    /// Like [`load`](Self::load), but a missing credential is `Unauthorized`.
    pub fn require(&self) -> Result<AdminToken> {
        self.load()?.ok_or_else(|| {
            Error::Unauthorized("Not logged in. Run `wty admin login` first.".to_string())
        })
    }

    pub fn save(&self, token: &AdminToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredCredentials {
            admin_token: token.clone(),
            saved_at: OffsetDateTime::now_utc(),
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| Error::Io(format!("Failed to encode credentials: {e}")))?;
        write_private(&self.path, content.as_bytes())?;
        info!("Saved admin credential to {}", self.path.display());
        Ok(())
    }

    /// Removes the stored credential. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        info!("Removed admin credential");
        Ok(true)
    }
}

/// Writes a file only its owner can read. The mode is set at creation, and
/// a file left over from an earlier save is narrowed as well.
#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_debug_is_redacted() {
        let token = AdminToken::new("super-secret");
        assert_eq!(format!("{token:?}"), "AdminToken(***)");
        assert_eq!(format!("{:?}", ShopToken::new("x")), "ShopToken(***)");
        assert_eq!(token.expose(), "super-secret");
    }

    #[test]
    fn test_store_round_trip_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("credentials.json"));

        assert!(store.load().unwrap().is_none());
        assert!(matches!(store.require(), Err(Error::Unauthorized(_))));

        store.save(&AdminToken::new("abc")).unwrap();
        assert_eq!(store.load().unwrap(), Some(AdminToken::new("abc")));

        // A second store on the same path sees the credential (process restart).
        let reopened = CredentialStore::new(store.path());
        assert_eq!(reopened.require().unwrap().expose(), "abc");

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert!(reopened.load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_credential_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::new(&path);

        store.save(&AdminToken::new("abc")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // An older file with wider permissions is narrowed on save.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        store.save(&AdminToken::new("def")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.require().unwrap().expose(), "def");
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(CredentialStore::new(path).load().unwrap().is_none());
    }

    #[test]
    fn test_shop_session_discard() {
        let mut session = ShopSession::new();
        assert!(!session.is_held());
        session.hold(ShopToken::new("t"));
        assert!(session.is_held());
        session.discard();
        assert!(session.token().is_none());
    }
}
