//! Bulk actions over the current selection.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use wty_backend::{AdminToken, Backend, ExportArtifact, ExportFormat};
use wty_core::{BatchId, Error, Result, SelectionStore, ShopId};

use crate::cache::BatchExpansionCache;

#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Assign(ShopId),
    Delete,
    Export(ExportFormat),
}

impl BulkAction {
    fn mutates(&self) -> bool {
        !matches!(self, Self::Export(_))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Assign(_) => "assign",
            Self::Delete => "delete",
            Self::Export(_) => "export",
        }
    }
}

#[derive(Debug)]
pub enum BulkOutcome {
    Assigned { count: usize, shop_id: ShopId },
    Deleted { count: usize },
    Exported(ExportArtifact),
}

/// Runs one bulk action at a time against the selection.
pub struct BulkActionCoordinator {
    backend: Arc<dyn Backend>,
    running: Mutex<()>,
}

impl BulkActionCoordinator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            running: Mutex::new(()),
        }
    }

    /// Sends one request carrying every selected id.
    ///
    /// On success the expanded batches are reloaded, the selection is cleared
    /// for assign and delete, kept for export, then pruned to codes that
    /// still exist. On failure nothing local changes.
    pub async fn run(
        &self,
        token: &AdminToken,
        action: BulkAction,
        selection: &mut SelectionStore,
        cache: &BatchExpansionCache,
        expanded: &[BatchId],
    ) -> Result<BulkOutcome> {
        if selection.is_empty() {
            return Err(Error::NoSelection);
        }
        let _running = self.running.lock().await;

        let ids = selection.ids();
        let count = ids.len();
        info!("Bulk {} of {} codes", action.name(), count);

        let outcome = match &action {
            BulkAction::Assign(shop_id) => {
                self.backend.assign(token, &ids, shop_id).await?;
                BulkOutcome::Assigned {
                    count,
                    shop_id: shop_id.clone(),
                }
            }
            BulkAction::Delete => {
                self.backend.delete_codes(token, &ids).await?;
                BulkOutcome::Deleted { count }
            }
            BulkAction::Export(format) => {
                let artifact = self.backend.export_codes(token, &ids, *format).await?;
                BulkOutcome::Exported(artifact)
            }
        };

        if action.mutates() {
            // Collapsed batches reload lazily on their next expansion.
            for batch_id in cache.batches_containing(&ids) {
                cache.invalidate(&batch_id);
            }
        }
        let mut reloaded = true;
        for batch_id in expanded {
            if let Err(e) = cache.refresh(token, batch_id).await {
                warn!("Reloading batch {} after bulk {} failed: {}", batch_id, action.name(), e);
                reloaded = false;
            }
        }

        if action.mutates() {
            selection.clear();
        }
        if reloaded {
            selection.prune(&cache.cached_ids());
        }
        Ok(outcome)
    }
}
