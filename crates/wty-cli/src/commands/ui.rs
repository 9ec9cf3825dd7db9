use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use wty_backend::{Backend, CredentialStore, MemoryBackend};
use wty_config::Config;
use wty_engine::AdminConsole;

pub async fn handle(config: &Config, demo: bool, out: PathBuf) -> Result<()> {
    let console = if demo {
        let backend = Arc::new(MemoryBackend::demo());
        let token = backend.admin_login("admin", "admin").await?;
        AdminConsole::open(backend, token).await?
    } else {
        let store = CredentialStore::new(config.credentials_path());
        let token = store.require()?;
        AdminConsole::open(super::backend(config)?, token)
            .await
            .map_err(|e| super::session_expired(&store, e.into()))?
    };

    wty_tui::run(console, out).await
}
