pub mod admin;
pub mod completions;
pub mod ui;
pub mod visit;

use anyhow::{Result, anyhow};
use std::io::Write;
use std::sync::Arc;
use tracing::warn;
use wty_backend::{Backend, CredentialStore, HttpBackend};
use wty_config::Config;
use wty_core::{Error, ErrorKind};

/// HTTP backend for the configured base URL.
pub fn backend(config: &Config) -> Result<Arc<dyn Backend>> {
    let backend = HttpBackend::new(&config.backend.base_url, &config.backend.user_agent)?;
    tracing::debug!("Using backend at {}", backend.base_url());
    Ok(Arc::new(backend))
}

/// Asks a yes/no question on stdin; anything but "y" is a no.
pub fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<Error>().map(Error::kind)
}

/// A stored admin credential the backend rejects is removed, and the user
/// is sent back to `wty admin login`.
pub fn session_expired(store: &CredentialStore, err: anyhow::Error) -> anyhow::Error {
    if kind_of(&err) != Some(ErrorKind::Unauthorized) {
        return err;
    }
    match store.clear() {
        Ok(true) => {
            warn!("Stored admin credential was rejected: {}", err);
            anyhow!("{err}\nThe stored admin credential was removed. Run `wty admin login` again.")
        }
        Ok(false) => err,
        Err(e) => err.context(format!(
            "Failed to remove {}: {e}",
            store.path().display()
        )),
    }
}

/// Transport failures get a pointer at the configured backend.
pub fn retry_hint(err: anyhow::Error, base_url: &str) -> anyhow::Error {
    let retryable = err.downcast_ref::<Error>().is_some_and(Error::is_retryable);
    if !retryable {
        return err;
    }
    err.context(format!(
        "Could not reach the backend at {base_url}. Retry, or point --backend at a running one."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wty_backend::AdminToken;

    #[test]
    fn test_unauthorized_clears_stored_credential() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&AdminToken::new("revoked")).unwrap();

        let rejected = Error::Unauthorized("Invalid or expired token".into());
        let err = session_expired(&store, rejected.into());
        let message = err.to_string();
        assert!(message.starts_with("Invalid or expired token"));
        assert!(message.contains("wty admin login"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_other_errors_keep_the_credential() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&AdminToken::new("abc")).unwrap();

        let rejected = Error::Validation("Quantity too large".into());
        let err = session_expired(&store, rejected.into());
        assert_eq!(err.to_string(), "Quantity too large");
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn test_retry_hint_only_for_transport_failures() {
        let err = retry_hint(Error::Network("refused".into()).into(), "http://localhost:5000");
        assert!(err.to_string().contains("http://localhost:5000"));
        assert_eq!(kind_of(&err), Some(ErrorKind::Network));

        let err = retry_hint(Error::NotFound("QR code not found".into()).into(), "http://x");
        assert_eq!(err.to_string(), "QR code not found");
    }
}
