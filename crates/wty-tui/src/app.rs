use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::debug;
use wty_backend::{ExportArtifact, ExportFormat};
use wty_core::{
    BatchId, CodeId, DashboardStats, Error, FilterCriteria, Result, ShopFilter, ShopId,
    StatusFilter,
};
use wty_engine::AdminConsole;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Batch(BatchId),
    Code { batch_id: BatchId, code_id: CodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Searching,
    AssigningShop,
    GeneratingCodes,
    ConfirmDeleteSelected,
    ConfirmDeleteBatch,
    ShowingHelp,
}

/// Work that waits on the backend. The run loop shows [`progress`](Self::progress)
/// until it finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Export(ExportFormat),
    BatchPdf,
    Refresh,
    Stats,
    Assign,
    DeleteSelected,
    DeleteBatch,
    Generate,
}

impl Action {
    pub fn progress(&self) -> &'static str {
        match self {
            Self::Export(_) => "Exporting...",
            Self::BatchPdf => "Downloading batch PDF...",
            Self::Refresh => "Refreshing...",
            Self::Stats => "Loading statistics...",
            Self::Assign => "Assigning codes...",
            Self::DeleteSelected => "Deleting codes...",
            Self::DeleteBatch => "Deleting batch...",
            Self::Generate => "Generating codes...",
        }
    }
}

pub struct App {
    pub console: AdminConsole,
    pub selected_row: usize,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub export_dir: PathBuf,
    pub stats: Option<DashboardStats>,
    loads: Vec<(BatchId, JoinHandle<Result<()>>)>,
}

impl App {
    pub fn new(console: AdminConsole, export_dir: PathBuf) -> Self {
        Self {
            console,
            selected_row: 0,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            export_dir,
            stats: None,
            loads: Vec::new(),
        }
    }

    /// Batch rows, each followed by its visible codes when expanded.
    pub fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        for batch in self.console.visible_batches() {
            rows.push(Row::Batch(batch.id.clone()));
            if self.console.is_expanded(&batch.id) {
                for code in self.console.visible_codes(&batch.id) {
                    rows.push(Row::Code {
                        batch_id: batch.id.clone(),
                        code_id: code.id,
                    });
                }
            }
        }
        rows
    }

    pub fn current_row(&self) -> Option<Row> {
        self.rows().into_iter().nth(self.selected_row)
    }

    fn current_batch(&self) -> Option<BatchId> {
        match self.current_row()? {
            Row::Batch(id) => Some(id),
            Row::Code { batch_id, .. } => Some(batch_id),
        }
    }

    fn clamp_cursor(&mut self) {
        let len = self.rows().len();
        if self.selected_row >= len {
            self.selected_row = len.saturating_sub(1);
        }
    }

    pub fn next(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        self.selected_row = (self.selected_row + 1) % len;
    }

    pub fn previous(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        self.selected_row = if self.selected_row == 0 {
            len - 1
        } else {
            self.selected_row - 1
        };
    }

    /// Collapses the batch under the cursor, or starts loading it. On a code
    /// row the owning batch collapses and the cursor moves onto it. Loading
    /// runs in the background; [`finish_loads`](Self::finish_loads) expands
    /// the batch once its codes arrive.
    pub fn toggle_expand(&mut self) {
        let Some(batch_id) = self.current_batch() else {
            return;
        };
        let on_code = matches!(self.current_row(), Some(Row::Code { .. }));
        if !self.console.collapse(&batch_id) {
            if !self.loads.iter().any(|(id, _)| id == &batch_id) {
                let load = self.console.spawn_load(&batch_id);
                self.loads.push((batch_id, load));
            }
            return;
        }
        if on_code
            && let Some(pos) = self
                .rows()
                .iter()
                .position(|r| r == &Row::Batch(batch_id.clone()))
        {
            self.selected_row = pos;
        }
        self.clamp_cursor();
    }

    pub fn is_loading(&self) -> bool {
        !self.loads.is_empty()
    }

    /// Applies every batch load that has completed; the rest keep running.
    pub async fn finish_loads(&mut self) {
        if self.loads.iter().all(|(_, load)| !load.is_finished()) {
            return;
        }
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.loads)
            .into_iter()
            .partition(|(_, load)| load.is_finished());
        self.loads = running;

        for (batch_id, load) in done {
            let loaded = load
                .await
                .unwrap_or_else(|e| Err(Error::Network(format!("Loading task failed: {e}"))));
            if let Err(e) = self.console.finish_expand(&batch_id, loaded) {
                debug!("Expanding {} failed: {}", batch_id, e);
            }
        }
        self.clamp_cursor();
    }

    /// Space: toggles a code, or the visible codes of a batch.
    pub fn toggle_selection(&mut self) {
        match self.current_row() {
            Some(Row::Code { code_id, .. }) => {
                self.console.toggle_code(&code_id);
            }
            Some(Row::Batch(batch_id)) => {
                if self.console.is_expanded(&batch_id) {
                    self.console.select_batch(&batch_id);
                } else {
                    self.console.set_banner("Expand the batch to select its codes");
                }
            }
            None => {}
        }
    }

    pub fn select_all_visible(&mut self) {
        self.console.select_all_visible();
        let count = self.console.selection().len();
        self.console.set_banner(format!("{count} codes selected"));
    }

    pub fn clear_selection(&mut self) {
        self.console.clear_selection();
        self.console.set_banner("Selection cleared");
    }

    // Filters

    pub fn cycle_status_filter(&mut self) {
        let mut criteria = self.console.filter().clone();
        criteria.status = match criteria.status {
            StatusFilter::Any => StatusFilter::Activated,
            StatusFilter::Activated => StatusFilter::Pending,
            StatusFilter::Pending => StatusFilter::Any,
        };
        self.apply_filter(criteria);
    }

    /// Any, then unassigned, then each known shop in turn.
    pub fn cycle_shop_filter(&mut self) {
        let shops: Vec<ShopId> = self
            .console
            .shops()
            .iter()
            .map(|s| s.shop_id.clone())
            .collect();
        let mut criteria = self.console.filter().clone();
        criteria.shop = match &criteria.shop {
            ShopFilter::Any => ShopFilter::Unassigned,
            ShopFilter::Unassigned => shops
                .first()
                .cloned()
                .map(ShopFilter::Only)
                .unwrap_or(ShopFilter::Any),
            ShopFilter::Only(current) => shops
                .iter()
                .position(|s| s == current)
                .and_then(|i| shops.get(i + 1))
                .cloned()
                .map(ShopFilter::Only)
                .unwrap_or(ShopFilter::Any),
        };
        self.apply_filter(criteria);
    }

    pub fn clear_filters(&mut self) {
        self.apply_filter(FilterCriteria::default());
        self.console.set_banner("Filters cleared");
    }

    fn apply_filter(&mut self, criteria: FilterCriteria) {
        self.console.set_filter(criteria);
        self.clamp_cursor();
    }

    pub fn start_search(&mut self) {
        self.input_mode = InputMode::Searching;
        self.input_buffer = self.console.filter().search.clone();
    }

    pub fn confirm_search(&mut self) {
        let mut criteria = self.console.filter().clone();
        criteria.search = self.input_buffer.trim().to_string();
        self.apply_filter(criteria);
        self.cancel_input();
    }

    // Bulk actions

    pub fn start_assign(&mut self) {
        if self.console.selection().is_empty() {
            self.console.set_banner("No codes selected");
            return;
        }
        self.input_mode = InputMode::AssigningShop;
        self.input_buffer.clear();
    }

    pub async fn confirm_assign(&mut self) {
        let shop_id = ShopId::new(self.input_buffer.trim());
        self.cancel_input();
        if shop_id.is_empty() {
            self.console.set_banner("Shop ID cannot be empty");
            return;
        }
        // Outcome is reported through the console banner.
        let _ = self.console.assign_selected(&shop_id).await;
        self.clamp_cursor();
    }

    pub fn start_delete_selected(&mut self) {
        if self.console.selection().is_empty() {
            self.console.set_banner("No codes selected");
            return;
        }
        self.input_mode = InputMode::ConfirmDeleteSelected;
    }

    pub async fn confirm_delete_selected(&mut self) {
        self.cancel_input();
        let _ = self.console.delete_selected().await;
        self.clamp_cursor();
    }

    pub async fn export(&mut self, format: ExportFormat) {
        if let Ok(artifact) = self.console.export_selected(format).await {
            self.save(artifact);
        }
    }

    pub async fn download_batch_pdf(&mut self) {
        let Some(batch_id) = self.current_batch() else {
            return;
        };
        if let Ok(artifact) = self.console.download_batch_pdf(&batch_id).await {
            self.save(artifact);
        }
    }

    fn save(&mut self, artifact: ExportArtifact) {
        match artifact.write_into(&self.export_dir) {
            Ok(path) => self
                .console
                .set_banner(format!("Saved {}", path.display())),
            Err(e) => self
                .console
                .set_banner(format!("Failed to save {}: {}", artifact.file_name, e)),
        }
    }

    // Batch actions

    pub fn start_delete_batch(&mut self) {
        if matches!(self.current_row(), Some(Row::Batch(_))) {
            self.input_mode = InputMode::ConfirmDeleteBatch;
        }
    }

    pub async fn confirm_delete_batch(&mut self) {
        self.cancel_input();
        if let Some(Row::Batch(batch_id)) = self.current_row() {
            let _ = self.console.delete_batch(&batch_id).await;
            self.clamp_cursor();
        }
    }

    pub fn start_generate(&mut self) {
        if self.current_batch().is_none() {
            self.console
                .set_banner("Move to a batch to generate more codes for its product");
            return;
        }
        self.input_mode = InputMode::GeneratingCodes;
        self.input_buffer.clear();
    }

    pub async fn confirm_generate(&mut self) {
        let quantity = self.input_buffer.trim().parse::<u32>();
        self.cancel_input();
        let Some(product_id) = self
            .current_batch()
            .and_then(|id| self.console.batch(&id).map(|b| b.product_id.clone()))
        else {
            return;
        };
        match quantity {
            Ok(quantity) => {
                let _ = self.console.generate(&product_id, quantity).await;
            }
            Err(_) => self.console.set_banner("Quantity must be a number"),
        }
    }

    pub async fn refresh(&mut self) {
        if self.console.load().await.is_ok() {
            self.console.set_banner("Refreshed");
        }
        if self.stats.is_some() {
            self.stats = self.console.dashboard().await.ok();
        }
        self.clamp_cursor();
    }

    pub async fn toggle_stats(&mut self) {
        if self.stats.is_some() {
            self.stats = None;
        } else {
            self.stats = self.console.dashboard().await.ok();
        }
    }

    /// Runs one backend action. Its progress line is cleared afterwards
    /// unless the action left a banner of its own.
    pub async fn perform(&mut self, action: Action) {
        let progress = action.progress();
        match action {
            Action::Export(format) => self.export(format).await,
            Action::BatchPdf => self.download_batch_pdf().await,
            Action::Refresh => self.refresh().await,
            Action::Stats => self.toggle_stats().await,
            Action::Assign => self.confirm_assign().await,
            Action::DeleteSelected => self.confirm_delete_selected().await,
            Action::DeleteBatch => self.confirm_delete_batch().await,
            Action::Generate => self.confirm_generate().await,
        }
        if self.console.banner() == Some(progress) {
            self.console.clear_banner();
        }
    }

    // Input

    pub fn toggle_help(&mut self) {
        self.input_mode = match self.input_mode {
            InputMode::ShowingHelp => InputMode::Normal,
            _ => InputMode::ShowingHelp,
        };
    }

    pub fn cancel_input(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
    }

    pub fn input_char(&mut self, c: char) {
        self.input_buffer.push(c);
    }

    pub fn input_backspace(&mut self) {
        self.input_buffer.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use wty_backend::{Backend, MemoryBackend};

    async fn app_with(dir: &TempDir, backend: Arc<MemoryBackend>) -> App {
        let token = backend.admin_login("admin", "admin").await.unwrap();
        let console = AdminConsole::open(backend, token).await.unwrap();
        App::new(console, dir.path().to_path_buf())
    }

    async fn app(dir: &TempDir) -> App {
        app_with(dir, Arc::new(MemoryBackend::demo())).await
    }

    /// Toggles the batch under the cursor and waits for its codes.
    async fn expand(app: &mut App) {
        app.toggle_expand();
        while app.is_loading() {
            tokio::task::yield_now().await;
            app.finish_loads().await;
        }
    }

    #[tokio::test]
    async fn test_rows_follow_expansion() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        assert_eq!(app.rows().len(), 2);

        expand(&mut app).await;
        assert_eq!(app.rows().len(), 2 + 6);

        app.next();
        assert!(matches!(app.current_row(), Some(Row::Code { .. })));
        app.toggle_expand();
        assert_eq!(app.rows().len(), 2);
        assert_eq!(app.selected_row, 0);
    }

    #[tokio::test]
    async fn test_navigation_continues_while_batch_loads() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::demo());
        let mut app = app_with(&dir, backend.clone()).await;
        let batch: BatchId = "B-KETTLE-01".into();
        backend.pause();

        app.toggle_expand();
        while !app.console.cache().is_loading(&batch) {
            tokio::task::yield_now().await;
        }
        app.finish_loads().await;
        assert!(app.is_loading());
        assert_eq!(app.rows().len(), 2);

        // A second Enter while loading does not start another fetch.
        app.toggle_expand();
        app.next();
        assert_eq!(app.selected_row, 1);

        backend.resume();
        while app.is_loading() {
            tokio::task::yield_now().await;
            app.finish_loads().await;
        }
        assert!(app.console.is_expanded(&batch));
        assert_eq!(app.rows().len(), 2 + 6);
        assert_eq!(backend.batch_fetches(&batch), 1);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_batch_collapsed() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(MemoryBackend::demo());
        let mut app = app_with(&dir, backend.clone()).await;
        backend.fail(
            "list_batch_codes:B-KETTLE-01",
            Error::Network("reset".into()),
        );

        expand(&mut app).await;
        assert_eq!(app.rows().len(), 2);
        assert_eq!(
            app.console.batch_error(&"B-KETTLE-01".into()),
            Some("Network error. Please try again.")
        );
    }

    #[tokio::test]
    async fn test_perform_clears_progress_line() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;

        app.console.set_banner(Action::Stats.progress());
        app.perform(Action::Stats).await;
        assert!(app.stats.is_some());
        assert_eq!(app.console.banner(), None);

        app.console.set_banner(Action::Refresh.progress());
        app.perform(Action::Refresh).await;
        assert_eq!(app.console.banner(), Some("Refreshed"));
    }

    #[tokio::test]
    async fn test_space_selects_code_and_batch() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;

        app.toggle_selection();
        assert_eq!(
            app.console.banner(),
            Some("Expand the batch to select its codes")
        );

        expand(&mut app).await;
        app.toggle_selection();
        assert_eq!(app.console.selection().len(), 6);

        app.next();
        app.toggle_selection();
        assert_eq!(app.console.selection().len(), 5);
    }

    #[tokio::test]
    async fn test_export_writes_into_dir() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        expand(&mut app).await;
        app.toggle_selection();

        app.export(ExportFormat::SelectedPdf).await;
        assert!(dir.path().join("Selected-QRCodes-6-items.pdf").exists());
        assert_eq!(app.console.selection().len(), 6);
    }

    #[tokio::test]
    async fn test_assign_flow() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;

        app.start_assign();
        assert_eq!(app.input_mode, InputMode::Normal);

        expand(&mut app).await;
        app.toggle_selection();
        app.start_assign();
        assert_eq!(app.input_mode, InputMode::AssigningShop);
        for c in "SHOP-2".chars() {
            app.input_char(c);
        }
        app.confirm_assign().await;
        assert!(app.console.selection().is_empty());
        assert_eq!(
            app.console.banner(),
            Some("Assigned 6 codes to Main Street Appliances")
        );
    }

    #[tokio::test]
    async fn test_shop_filter_cycles_through_shops() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        app.cycle_shop_filter();
        assert_eq!(app.console.filter().shop, ShopFilter::Unassigned);
        app.cycle_shop_filter();
        assert_eq!(app.console.filter().shop, ShopFilter::Only("SHOP-1".into()));
        app.cycle_shop_filter();
        app.cycle_shop_filter();
        assert_eq!(app.console.filter().shop, ShopFilter::Any);
    }
}
