//! Backend trait

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use wty_core::{
    Batch, BatchId, Code, CodeId, CodeRecord, CustomerDetails, DashboardStats, Product, ProductId,
    Result, Shop, ShopId,
};

use crate::session::{AdminToken, ShopToken};

/// Remote operations the engine depends on.
///
/// Credentials are passed explicitly; implementations hold no session state.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Public lookup of a single code by serial number.
    async fn fetch_code(&self, serial: &str) -> Result<CodeRecord>;

    async fn shop_login(&self, shop_id: &ShopId, password: &str) -> Result<ShopToken>;

    /// Records the customer and starts the warranty. Irreversible.
    async fn activate(
        &self,
        token: &ShopToken,
        serial: &str,
        customer: &CustomerDetails,
    ) -> Result<()>;

    async fn admin_login(&self, username: &str, password: &str) -> Result<AdminToken>;

    async fn list_batches(&self, token: &AdminToken) -> Result<Vec<Batch>>;

    async fn list_batch_codes(&self, token: &AdminToken, batch_id: &BatchId) -> Result<Vec<Code>>;

    async fn list_products(&self, token: &AdminToken) -> Result<Vec<Product>>;

    async fn list_shops(&self, token: &AdminToken) -> Result<Vec<Shop>>;

    async fn list_shop_codes(&self, token: &AdminToken, shop_id: &ShopId) -> Result<Vec<Code>>;

    /// Mints `quantity` new codes for a product as one batch.
    async fn generate(&self, token: &AdminToken, product_id: &ProductId, quantity: u32)
    -> Result<()>;

    async fn assign(&self, token: &AdminToken, ids: &[CodeId], shop_id: &ShopId) -> Result<()>;

    async fn delete_codes(&self, token: &AdminToken, ids: &[CodeId]) -> Result<()>;

    async fn delete_batch(&self, token: &AdminToken, batch_id: &BatchId) -> Result<()>;

    async fn export_codes(
        &self,
        token: &AdminToken,
        ids: &[CodeId],
        format: ExportFormat,
    ) -> Result<ExportArtifact>;

    /// Printable sheet of every code generated for a product.
    async fn product_pdf(&self, token: &AdminToken, product: &Product) -> Result<ExportArtifact>;

    async fn dashboard(&self, token: &AdminToken) -> Result<DashboardStats>;
}

/// Printable output for a set of selected codes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportFormat {
    /// One code per page.
    SelectedPdf,
    /// Label sheet; spacing is in inches.
    StickerSheet {
        vertical_spacing: f64,
        horizontal_spacing: f64,
    },
}

impl ExportFormat {
    /// Sticker sheet with the default label spacing.
    pub fn sticker_sheet() -> Self {
        Self::StickerSheet {
            vertical_spacing: 0.05,
            horizontal_spacing: 0.0,
        }
    }

    pub fn file_name(&self, count: usize) -> String {
        match self {
            Self::SelectedPdf => format!("Selected-QRCodes-{count}-items.pdf"),
            Self::StickerSheet { .. } => format!("StickerSheet-{count}-items.pdf"),
        }
    }
}

/// Opaque rendered document. Callers only store it.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// `tag` is the batch id when downloaded from a batch row.
    pub fn product_file_name(product_name: &str, tag: &str) -> String {
        format!("QRCodes-{product_name}-{tag}.pdf")
    }

    /// Writes the artifact into `dir` under its own file name.
    pub fn write_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

impl std::fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_file_names() {
        assert_eq!(
            ExportFormat::SelectedPdf.file_name(3),
            "Selected-QRCodes-3-items.pdf"
        );
        assert_eq!(
            ExportFormat::sticker_sheet().file_name(12),
            "StickerSheet-12-items.pdf"
        );
        assert_eq!(
            ExportArtifact::product_file_name("Kettle", "B-1"),
            "QRCodes-Kettle-B-1.pdf"
        );
    }

    #[test]
    fn test_default_sticker_spacing() {
        assert_eq!(
            ExportFormat::sticker_sheet(),
            ExportFormat::StickerSheet {
                vertical_spacing: 0.05,
                horizontal_spacing: 0.0
            }
        );
    }

    #[test]
    fn test_write_into_dir() {
        let dir = TempDir::new().unwrap();
        let artifact = ExportArtifact {
            file_name: "out.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
        };
        let path = artifact.write_into(dir.path()).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4");
        assert!(format!("{artifact:?}").contains("len: 8"));
    }
}
