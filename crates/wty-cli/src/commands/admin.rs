use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use wty_backend::{Backend, CredentialStore, ExportArtifact, ExportFormat};
use wty_config::Config;
use wty_core::{BatchId, Code, CodeId, FilterCriteria, ProductId, ShopId};
use wty_engine::AdminConsole;

use crate::cli::AdminCommands;

pub async fn handle(cmd: AdminCommands, config: &Config) -> Result<()> {
    let store = CredentialStore::new(config.credentials_path());
    let backend = super::backend(config)?;

    match cmd {
        AdminCommands::Login { username, password } => {
            login(backend, &store, &username, &password).await
        }
        AdminCommands::Logout => logout(&store),
        cmd => with_console(backend, &store, cmd).await,
    }
}

/// Opens the console with the stored credential and runs `cmd`. A rejected
/// credential is cleared on the way out.
async fn with_console(
    backend: Arc<dyn Backend>,
    store: &CredentialStore,
    cmd: AdminCommands,
) -> Result<()> {
    let outcome = match open(backend, store).await {
        Ok(mut console) => run(&mut console, cmd).await,
        Err(e) => Err(e),
    };
    outcome.map_err(|e| super::session_expired(store, e))
}

async fn login(
    backend: Arc<dyn Backend>,
    store: &CredentialStore,
    username: &str,
    password: &str,
) -> Result<()> {
    let token = backend.admin_login(username, password).await?;
    store.save(&token)?;
    println!("✓ Logged in as {username}");
    println!("  Credential: {}", store.path().display());
    Ok(())
}

fn logout(store: &CredentialStore) -> Result<()> {
    if store.clear()? {
        println!("✓ Logged out");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

async fn open(backend: Arc<dyn Backend>, store: &CredentialStore) -> Result<AdminConsole> {
    let token = store.require()?;
    Ok(AdminConsole::open(backend, token).await?)
}

/// Commands that work through an open console. Split from [`handle`] so they
/// run against any backend.
async fn run(console: &mut AdminConsole, cmd: AdminCommands) -> Result<()> {
    match cmd {
        AdminCommands::Batches { search } => batches(console, search),
        AdminCommands::Codes {
            batch,
            search,
            status,
            shop,
        } => {
            let criteria = FilterCriteria {
                search: search.unwrap_or_default(),
                status: status.parse()?,
                shop: shop.parse()?,
                ..FilterCriteria::default()
            };
            codes(console, &BatchId::new(batch), criteria).await
        }
        AdminCommands::Assign { shop, ids } => {
            select(console, &ids);
            let shop_id = ShopId::new(shop);
            let count = console.assign_selected(&shop_id).await?;
            println!(
                "✓ Assigned {} codes to {}",
                count,
                console.shop_name(Some(&shop_id))
            );
            Ok(())
        }
        AdminCommands::Delete { ids, force } => {
            if !force && !super::confirm(&format!("Delete {} codes?", ids.len()))? {
                println!("Cancelled.");
                return Ok(());
            }
            select(console, &ids);
            let count = console.delete_selected().await?;
            println!("✓ Deleted {count} codes");
            Ok(())
        }
        AdminCommands::Export {
            ids,
            sticker_sheet,
            vertical_spacing,
            horizontal_spacing,
            out,
        } => {
            let format = if sticker_sheet {
                ExportFormat::StickerSheet {
                    vertical_spacing,
                    horizontal_spacing,
                }
            } else {
                ExportFormat::SelectedPdf
            };
            select(console, &ids);
            let artifact = console.export_selected(format).await?;
            save(&artifact, &out)
        }
        AdminCommands::ProductPdf { product, out } => {
            let artifact = console
                .download_product_pdf(&ProductId::new(product))
                .await?;
            save(&artifact, &out)
        }
        AdminCommands::Generate { product, quantity } => {
            let product_id = ProductId::new(product);
            console.generate(&product_id, quantity).await?;
            println!(
                "✓ Generated {} codes for {}",
                quantity,
                console.product_name(&product_id)
            );
            Ok(())
        }
        AdminCommands::DeleteBatch { batch, force } => {
            let batch_id = BatchId::new(batch);
            if !force
                && !super::confirm(&format!("Delete batch {batch_id} and all its codes?"))?
            {
                println!("Cancelled.");
                return Ok(());
            }
            console.delete_batch(&batch_id).await?;
            println!("✓ Deleted batch {batch_id}");
            Ok(())
        }
        AdminCommands::Stats => stats(console).await,
        AdminCommands::ShopCodes { shop } => {
            let shop_id = ShopId::new(shop);
            let codes = console.shop_codes(&shop_id).await?;
            println!(
                "{} ({} codes):",
                console.shop_name(Some(&shop_id)),
                codes.len()
            );
            for code in &codes {
                println!("  {}", code_line(console, code));
            }
            Ok(())
        }
        AdminCommands::Login { .. } | AdminCommands::Logout => Ok(()),
    }
}

/// Replaces the selection with `ids`. Repeated ids count once.
fn select(console: &mut AdminConsole, ids: &[String]) {
    console.clear_selection();
    let ids: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    for id in ids {
        console.toggle_code(&CodeId::new(id));
    }
}

fn save(artifact: &ExportArtifact, dir: &Path) -> Result<()> {
    let path = artifact
        .write_into(dir)
        .with_context(|| format!("Failed to write {}", artifact.file_name))?;
    println!("✓ Saved {}", path.display());
    Ok(())
}

fn batches(console: &mut AdminConsole, search: Option<String>) -> Result<()> {
    console.set_filter(FilterCriteria {
        search: search.unwrap_or_default(),
        ..FilterCriteria::default()
    });
    let batches = console.visible_batches();
    if batches.is_empty() {
        println!("No batches found.");
        return Ok(());
    }

    println!("Batches:");
    for batch in batches {
        println!(
            "  {}  {}",
            batch.id,
            console.product_name(&batch.product_id)
        );
        println!(
            "    Codes: {}  Activated: {}  Assigned: {}  Created: {}",
            batch.count,
            batch.activated_count,
            batch.assigned_count,
            batch.created_at.date()
        );
    }
    Ok(())
}

fn code_line(console: &AdminConsole, code: &Code) -> String {
    let status = if code.is_activated { "activated" } else { "pending" };
    format!(
        "{}  {}  {}  {}",
        code.id,
        code.serial_number,
        status,
        console.shop_name(code.assigned_shop_id.as_ref())
    )
}

async fn codes(
    console: &mut AdminConsole,
    batch_id: &BatchId,
    criteria: FilterCriteria,
) -> Result<()> {
    console.expand(batch_id).await?;
    console.set_filter(criteria);
    let codes = console.visible_codes(batch_id);
    let total = console.codes(batch_id).map(|c| c.len()).unwrap_or(0);

    println!("Batch {} ({} of {} codes):", batch_id, codes.len(), total);
    for code in &codes {
        println!("  {}", code_line(console, code));
    }
    Ok(())
}

async fn stats(console: &mut AdminConsole) -> Result<()> {
    let stats = console.dashboard().await?;
    println!("Shops:      {}", stats.total_shops);
    println!("Products:   {}", stats.total_products);
    println!("Codes:      {}", stats.total_codes);
    println!("Activated:  {}", stats.activated_codes);
    println!("Today:      {}", stats.today_activations);

    if !stats.top_products.is_empty() {
        println!("\nTop products:");
        for top in &stats.top_products {
            println!("  {:<24} {}", top.product_name, top.activation_count);
        }
    }
    if !stats.weekly_activations.is_empty() {
        println!("\nLast 7 days:");
        for day in &stats.weekly_activations {
            println!("  {}  {}", day.date, day.count);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wty_backend::{AdminToken, MemoryBackend};

    async fn console() -> (Arc<MemoryBackend>, AdminConsole) {
        let backend = Arc::new(MemoryBackend::demo());
        let token = backend.admin_login("admin", "admin").await.unwrap();
        let console = AdminConsole::open(backend.clone(), token).await.unwrap();
        (backend, console)
    }

    #[tokio::test]
    async fn test_login_persists_and_logout_clears() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::demo());

        assert!(open(backend.clone(), &store).await.is_err());
        login(backend.clone(), &store, "admin", "admin").await.unwrap();
        let console = open(backend, &store).await.unwrap();
        assert_eq!(console.batches().len(), 2);

        logout(&store).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_credential_is_cleared() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&AdminToken::new("revoked")).unwrap();
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::demo());

        let err = with_console(backend, &store, AdminCommands::Stats)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wty admin login"));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_with_repeated_ids() {
        let (backend, mut console) = console().await;
        let id = backend.code_by_serial("SN-003").unwrap().id;

        run(
            &mut console,
            AdminCommands::Delete {
                ids: vec![id.to_string(), id.to_string()],
                force: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(backend.request_count("delete_codes"), 1);
        assert!(backend.code(&id).is_none());
        assert_eq!(console.batch(&"B-KETTLE-01".into()).unwrap().count, 5);
    }

    #[tokio::test]
    async fn test_assign_by_id() {
        let (backend, mut console) = console().await;
        let sn1 = backend.code_by_serial("SN-001").unwrap().id;
        let sn2 = backend.code_by_serial("SN-002").unwrap().id;

        run(
            &mut console,
            AdminCommands::Assign {
                shop: "SHOP-1".into(),
                ids: vec![sn1.to_string(), sn2.to_string()],
            },
        )
        .await
        .unwrap();

        assert_eq!(backend.request_count("assign"), 1);
        assert_eq!(
            backend.code(&sn1).unwrap().assigned_shop_id,
            Some("SHOP-1".into())
        );
        assert!(console.selection().is_empty());
    }

    #[tokio::test]
    async fn test_export_sticker_sheet_writes_file() {
        let dir = TempDir::new().unwrap();
        let (backend, mut console) = console().await;
        let id = backend.code_by_serial("TS-001").unwrap().id;

        run(
            &mut console,
            AdminCommands::Export {
                ids: vec![id.to_string()],
                sticker_sheet: true,
                vertical_spacing: 0.05,
                horizontal_spacing: 0.0,
                out: dir.path().to_path_buf(),
            },
        )
        .await
        .unwrap();

        assert!(dir.path().join("StickerSheet-1-items.pdf").exists());
    }

    #[tokio::test]
    async fn test_forced_delete_batch() {
        let (backend, mut console) = console().await;
        run(
            &mut console,
            AdminCommands::DeleteBatch {
                batch: "B-TOASTER-01".into(),
                force: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(backend.request_count("delete_batch"), 1);
        assert!(console.batch(&"B-TOASTER-01".into()).is_none());
    }

    #[tokio::test]
    async fn test_codes_rejects_unknown_status() {
        let (_, mut console) = console().await;
        let err = run(
            &mut console,
            AdminCommands::Codes {
                batch: "B-KETTLE-01".into(),
                search: None,
                status: "sold".into(),
                shop: "any".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Unknown status filter"));
    }
}
