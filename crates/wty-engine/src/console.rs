//! Administrator console state.
//!
//! Holds what the batch management screen shows: reference data, which
//! batches are expanded, the filter, the selection and a banner line.
//! Actions return their result and also leave a banner describing it, so a
//! front end can either inspect the result or just redraw.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wty_backend::{AdminToken, Backend, ExportArtifact, ExportFormat};
use wty_core::filter;
use wty_core::{
    Batch, BatchId, Code, CodeId, DashboardStats, Error, ErrorKind, FilterCriteria, Product,
    ProductId, Result, SelectionStore, Shop, ShopId,
};

use crate::bulk::{BulkAction, BulkActionCoordinator, BulkOutcome};
use crate::cache::BatchExpansionCache;

pub struct AdminConsole {
    backend: Arc<dyn Backend>,
    token: AdminToken,
    batches: Vec<Batch>,
    products: Vec<Product>,
    shops: Vec<Shop>,
    expanded: Vec<BatchId>,
    batch_errors: HashMap<BatchId, String>,
    filter: FilterCriteria,
    selection: SelectionStore,
    cache: Arc<BatchExpansionCache>,
    coordinator: BulkActionCoordinator,
    banner: Option<String>,
    session_expired: bool,
}

impl AdminConsole {
    pub fn new(backend: Arc<dyn Backend>, token: AdminToken) -> Self {
        Self {
            cache: Arc::new(BatchExpansionCache::new(Arc::clone(&backend))),
            coordinator: BulkActionCoordinator::new(Arc::clone(&backend)),
            backend,
            token,
            batches: Vec::new(),
            products: Vec::new(),
            shops: Vec::new(),
            expanded: Vec::new(),
            batch_errors: HashMap::new(),
            filter: FilterCriteria::default(),
            selection: SelectionStore::new(),
            banner: None,
            session_expired: false,
        }
    }

    /// Creates the console and performs the initial load.
    pub async fn open(backend: Arc<dyn Backend>, token: AdminToken) -> Result<Self> {
        let mut console = Self::new(backend, token);
        console.load().await?;
        Ok(console)
    }

    /// Puts a failure on the banner. A rejected credential also marks the
    /// session as expired and points at the login command.
    fn note<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            let message = e.user_message();
            self.banner = Some(match e.kind() {
                ErrorKind::Unauthorized => {
                    self.session_expired = true;
                    let message = message.trim_end_matches('.');
                    format!("{message}. Log in again with `wty admin login`.")
                }
                _ => message,
            });
        }
        outcome
    }

    /// Whether the backend has rejected the admin credential.
    pub fn session_expired(&self) -> bool {
        self.session_expired
    }

    /// Fetches batches, products and shops together and replaces the
    /// reference data. Batches that disappeared are dropped from the cache
    /// and the expanded set.
    pub async fn load(&mut self) -> Result<()> {
        let fetched = tokio::try_join!(
            self.backend.list_batches(&self.token),
            self.backend.list_products(&self.token),
            self.backend.list_shops(&self.token),
        );
        let (batches, products, shops) = self.note(fetched)?;
        debug!(
            "Loaded {} batches, {} products, {} shops",
            batches.len(),
            products.len(),
            shops.len()
        );

        for batch in batches.iter().filter(|b| !b.is_consistent()) {
            warn!(
                "Batch {} reports {} activated and {} assigned of {} codes",
                batch.id, batch.activated_count, batch.assigned_count, batch.count
            );
        }
        self.session_expired = false;
        self.batches = batches;
        self.products = products;
        self.shops = shops;

        let known: HashSet<&BatchId> = self.batches.iter().map(|b| &b.id).collect();
        self.expanded.retain(|id| known.contains(id));
        self.batch_errors.retain(|id, _| known.contains(id));
        self.cache.retain_batches(&known);
        self.selection.prune(&self.cache.cached_ids());
        Ok(())
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn shops(&self) -> &[Shop] {
        &self.shops
    }

    pub fn batch(&self, batch_id: &BatchId) -> Option<&Batch> {
        self.batches.iter().find(|b| &b.id == batch_id)
    }

    pub fn product(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.product_id == product_id)
    }

    pub fn product_name(&self, product_id: &ProductId) -> String {
        self.product(product_id)
            .map(|p| p.product_name.clone())
            .unwrap_or_else(|| "Unknown Product".to_string())
    }

    /// Display name for a shop reference.
    pub fn shop_name(&self, shop_id: Option<&ShopId>) -> String {
        let Some(shop_id) = shop_id else {
            return "Not assigned".to_string();
        };
        self.shops
            .iter()
            .find(|s| &s.shop_id == shop_id)
            .map(|s| s.shop_name.clone())
            .unwrap_or_else(|| shop_id.to_string())
    }

    // Expansion

    pub fn is_expanded(&self, batch_id: &BatchId) -> bool {
        self.expanded.contains(batch_id)
    }

    pub fn expanded(&self) -> &[BatchId] {
        &self.expanded
    }

    /// Collapses an expanded batch, or expands it and loads its codes.
    /// Returns whether the batch is expanded afterwards.
    pub async fn toggle_expand(&mut self, batch_id: &BatchId) -> Result<bool> {
        if self.collapse(batch_id) {
            return Ok(false);
        }
        self.expand(batch_id).await?;
        Ok(true)
    }

    /// Returns whether the batch was expanded.
    pub fn collapse(&mut self, batch_id: &BatchId) -> bool {
        let before = self.expanded.len();
        self.expanded.retain(|id| id != batch_id);
        self.expanded.len() != before
    }

    /// Expands a batch if it is not already. A batch whose codes fail to
    /// load stays collapsed and keeps the error.
    pub async fn expand(&mut self, batch_id: &BatchId) -> Result<()> {
        if self.batch(batch_id).is_none() {
            return self.note(Err(Error::NotFound(format!("Batch {batch_id} not found"))));
        }
        let loaded = self.cache.ensure_loaded(&self.token, batch_id).await;
        self.finish_expand(batch_id, loaded.map(|_| ()))
    }

    /// Loads a batch's codes on a separate task, leaving the console free
    /// meanwhile. Hand the task's result to [`finish_expand`](Self::finish_expand).
    pub fn spawn_load(&self, batch_id: &BatchId) -> JoinHandle<Result<()>> {
        let cache = Arc::clone(&self.cache);
        let token = self.token.clone();
        let batch_id = batch_id.clone();
        tokio::spawn(async move { cache.ensure_loaded(&token, &batch_id).await.map(|_| ()) })
    }

    /// Applies the outcome of a batch load: the batch expands, or stays
    /// collapsed and keeps the error. A batch deleted meanwhile is ignored.
    pub fn finish_expand(&mut self, batch_id: &BatchId, loaded: Result<()>) -> Result<()> {
        if self.batch(batch_id).is_none() {
            debug!("Batch {} is gone, not expanding", batch_id);
            return Ok(());
        }
        match loaded {
            Ok(()) => {
                self.batch_errors.remove(batch_id);
                if !self.is_expanded(batch_id) {
                    self.expanded.push(batch_id.clone());
                }
                Ok(())
            }
            Err(e) => {
                self.batch_errors.insert(batch_id.clone(), e.user_message());
                self.note(Err(e))
            }
        }
    }

    pub fn batch_error(&self, batch_id: &BatchId) -> Option<&str> {
        self.batch_errors.get(batch_id).map(String::as_str)
    }

    /// Loaded codes of a batch, unfiltered.
    pub fn codes(&self, batch_id: &BatchId) -> Option<Arc<Vec<Code>>> {
        self.cache.get(batch_id)
    }

    pub fn cache(&self) -> &BatchExpansionCache {
        &self.cache
    }

    // Filtering

    pub fn filter(&self) -> &FilterCriteria {
        &self.filter
    }

    pub fn set_filter(&mut self, criteria: FilterCriteria) {
        self.filter = criteria;
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
    }

    pub fn visible_batches(&self) -> Vec<&Batch> {
        filter::apply_batches(&self.batches, &self.products, &self.filter)
    }

    /// Codes of a loaded batch that pass the filter.
    pub fn visible_codes(&self, batch_id: &BatchId) -> Vec<Code> {
        match self.cache.get(batch_id) {
            Some(codes) => filter::apply(&codes, &self.filter)
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn visible_ids(&self, batch_id: &BatchId) -> Vec<CodeId> {
        self.visible_codes(batch_id)
            .into_iter()
            .map(|c| c.id)
            .collect()
    }

    /// Every code visible in an expanded batch that passes the batch filter.
    pub fn all_visible_ids(&self) -> Vec<CodeId> {
        self.visible_batches()
            .into_iter()
            .filter(|b| self.is_expanded(&b.id))
            .flat_map(|b| self.visible_ids(&b.id))
            .collect()
    }

    // Selection

    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    pub fn toggle_code(&mut self, id: &CodeId) -> bool {
        self.selection.toggle(id)
    }

    /// Toggles the visible codes of one batch.
    pub fn select_batch(&mut self, batch_id: &BatchId) {
        let batch_ids: Vec<CodeId> = self
            .cache
            .get(batch_id)
            .map(|codes| codes.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default();
        let visible = self.visible_ids(batch_id);
        self.selection.select_batch(&batch_ids, &visible);
    }

    pub fn batch_fully_selected(&self, batch_id: &BatchId) -> bool {
        self.selection.all_selected(&self.visible_ids(batch_id))
    }

    pub fn select_all_visible(&mut self) {
        let visible = self.all_visible_ids();
        self.selection.select_all_visible(&visible);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // Bulk actions

    async fn run_bulk(&mut self, action: BulkAction) -> Result<BulkOutcome> {
        let outcome = self
            .coordinator
            .run(
                &self.token,
                action,
                &mut self.selection,
                &self.cache,
                &self.expanded,
            )
            .await;
        self.note(outcome)
    }

    /// Reloads the batch list so counters reflect a mutation. A failure here
    /// does not undo the action, so it only updates the banner.
    async fn reload_after_mutation(&mut self) {
        if let Err(e) = self.load().await {
            debug!("Reload after mutation failed: {}", e);
        }
    }

    pub async fn assign_selected(&mut self, shop_id: &ShopId) -> Result<usize> {
        let outcome = self.run_bulk(BulkAction::Assign(shop_id.clone())).await?;
        let count = match outcome {
            BulkOutcome::Assigned { count, .. } => count,
            _ => 0,
        };
        let shop_name = self.shop_name(Some(shop_id));
        info!("Assigned {} codes to {}", count, shop_id);
        self.banner = Some(format!("Assigned {count} codes to {shop_name}"));
        self.reload_after_mutation().await;
        Ok(count)
    }

    pub async fn delete_selected(&mut self) -> Result<usize> {
        let outcome = self.run_bulk(BulkAction::Delete).await?;
        let count = match outcome {
            BulkOutcome::Deleted { count } => count,
            _ => 0,
        };
        info!("Deleted {} codes", count);
        self.banner = Some(format!("Deleted {count} codes"));
        self.reload_after_mutation().await;
        Ok(count)
    }

    pub async fn export_selected(&mut self, format: ExportFormat) -> Result<ExportArtifact> {
        match self.run_bulk(BulkAction::Export(format)).await? {
            BulkOutcome::Exported(artifact) => {
                self.banner = Some(format!("Exported {}", artifact.file_name));
                Ok(artifact)
            }
            _ => self.note(Err(Error::Validation("Export produced no document".into()))),
        }
    }

    // Batch-level actions

    pub async fn delete_batch(&mut self, batch_id: &BatchId) -> Result<()> {
        let deleted = self.backend.delete_batch(&self.token, batch_id).await;
        self.note(deleted)?;

        self.cache.evict(batch_id);
        self.expanded.retain(|id| id != batch_id);
        self.batch_errors.remove(batch_id);
        self.selection.prune(&self.cache.cached_ids());
        info!("Deleted batch {}", batch_id);
        self.banner = Some(format!("Deleted batch {batch_id}"));
        self.reload_after_mutation().await;
        Ok(())
    }

    pub async fn generate(&mut self, product_id: &ProductId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.note(Err(Error::Validation(
                "Quantity must be at least 1".to_string(),
            )));
        }
        let generated = self
            .backend
            .generate(&self.token, product_id, quantity)
            .await;
        self.note(generated)?;

        info!("Generated {} codes for {}", quantity, product_id);
        self.banner = Some(format!(
            "Generated {quantity} codes for {}",
            self.product_name(product_id)
        ));
        self.reload_after_mutation().await;
        Ok(())
    }

    /// PDF of every code of a product.
    pub async fn download_product_pdf(&mut self, product_id: &ProductId) -> Result<ExportArtifact> {
        let product = self
            .product(product_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Product {product_id} not found")));
        let product = self.note(product)?;

        let downloaded = self.backend.product_pdf(&self.token, &product).await;
        let artifact = self.note(downloaded)?;
        self.banner = Some(format!("Downloaded {}", artifact.file_name));
        Ok(artifact)
    }

    /// Same document as [`Self::download_product_pdf`], named after the batch.
    pub async fn download_batch_pdf(&mut self, batch_id: &BatchId) -> Result<ExportArtifact> {
        let product_id = self
            .batch(batch_id)
            .map(|b| b.product_id.clone())
            .ok_or_else(|| Error::NotFound(format!("Batch {batch_id} not found")));
        let product_id = self.note(product_id)?;

        let mut artifact = self.download_product_pdf(&product_id).await?;
        let product_name = self.product_name(&product_id);
        artifact.file_name = ExportArtifact::product_file_name(&product_name, batch_id.as_str());
        self.banner = Some(format!("Downloaded {}", artifact.file_name));
        Ok(artifact)
    }

    pub async fn dashboard(&mut self) -> Result<DashboardStats> {
        let stats = self.backend.dashboard(&self.token).await;
        self.note(stats)
    }

    pub async fn shop_codes(&mut self, shop_id: &ShopId) -> Result<Vec<Code>> {
        let codes = self.backend.list_shop_codes(&self.token, shop_id).await;
        self.note(codes)
    }

    // Banner

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn set_banner(&mut self, message: impl Into<String>) {
        self.banner = Some(message.into());
    }

    pub fn clear_banner(&mut self) {
        self.banner = None;
    }
}
