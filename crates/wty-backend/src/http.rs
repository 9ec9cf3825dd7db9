//! REST implementation of [`Backend`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use wty_core::{
    Batch, BatchId, Code, CodeId, CodeRecord, CustomerDetails, DashboardStats, Error, Product,
    ProductId, Result, Shop, ShopId,
};

use crate::backend::{Backend, ExportArtifact, ExportFormat};
use crate::session::{AdminToken, ShopToken};

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdsBody<'a> {
    qr_ids: &'a [CodeId],
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint URL under the base URL. Each segment is percent-encoded, so
    /// a serial or id holding `/`, `?` or `#` stays one path segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || Error::Validation(format!("Invalid backend URL {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!("{} {}", method, url);
        Ok(self.client.request(method, url))
    }

    fn admin(
        &self,
        method: Method,
        segments: &[&str],
        token: &AdminToken,
    ) -> Result<RequestBuilder> {
        Ok(self.request(method, segments)?.bearer_auth(token.expose()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::Network(format!("Invalid response: {e}")))
    }

    async fn artifact(&self, request: RequestBuilder, file_name: String) -> Result<ExportArtifact> {
        let response = self.send(request).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response: {e}")))?;

        Ok(ExportArtifact {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

/// Maps a non-success response to the error taxonomy. The body's `message`
/// is passed through verbatim when present.
pub(crate) fn status_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_message(status).to_string());

    match status {
        404 => Error::NotFound(message),
        401 | 403 => Error::Unauthorized(message),
        400 | 409 | 422 => Error::Validation(message),
        _ => Error::Backend { status, message },
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        404 => "Not found",
        401 | 403 => "Not authorized",
        400 | 409 | 422 => "Request rejected",
        _ => "Request failed",
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_code(&self, serial: &str) -> Result<CodeRecord> {
        self.json(self.request(Method::GET, &["api", "public", "qr", serial])?)
            .await
    }

    async fn shop_login(&self, shop_id: &ShopId, password: &str) -> Result<ShopToken> {
        let request = self
            .request(Method::POST, &["api", "public", "shop", "login"])?
            .json(&json!({ "shopId": shop_id, "password": password }));
        let response: TokenResponse = self.json(request).await?;
        Ok(ShopToken::new(response.token))
    }

    async fn activate(
        &self,
        token: &ShopToken,
        serial: &str,
        customer: &CustomerDetails,
    ) -> Result<()> {
        let request = self
            .request(Method::POST, &["api", "public", "qr", serial, "activate"])?
            .bearer_auth(token.expose())
            .json(customer);
        self.send(request).await?;
        Ok(())
    }

    async fn admin_login(&self, username: &str, password: &str) -> Result<AdminToken> {
        let request = self
            .request(Method::POST, &["api", "admin", "login"])?
            .json(&json!({ "username": username, "password": password }));
        let response: TokenResponse = self.json(request).await?;
        Ok(AdminToken::new(response.token))
    }

    async fn list_batches(&self, token: &AdminToken) -> Result<Vec<Batch>> {
        self.json(self.admin(Method::GET, &["api", "admin", "qrcodes", "batches"], token)?)
            .await
    }

    async fn list_batch_codes(&self, token: &AdminToken, batch_id: &BatchId) -> Result<Vec<Code>> {
        let path = ["api", "admin", "qrcodes", "batch", batch_id.as_str()];
        self.json(self.admin(Method::GET, &path, token)?).await
    }

    async fn list_products(&self, token: &AdminToken) -> Result<Vec<Product>> {
        self.json(self.admin(Method::GET, &["api", "admin", "products"], token)?)
            .await
    }

    async fn list_shops(&self, token: &AdminToken) -> Result<Vec<Shop>> {
        self.json(self.admin(Method::GET, &["api", "admin", "shops"], token)?)
            .await
    }

    async fn list_shop_codes(&self, token: &AdminToken, shop_id: &ShopId) -> Result<Vec<Code>> {
        let path = ["api", "admin", "shops", shop_id.as_str(), "qrcodes"];
        self.json(self.admin(Method::GET, &path, token)?).await
    }

    async fn generate(
        &self,
        token: &AdminToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        let request = self
            .admin(Method::POST, &["api", "admin", "qrcodes", "generate"], token)?
            .json(&json!({ "productId": product_id, "quantity": quantity }));
        self.send(request).await?;
        Ok(())
    }

    async fn assign(&self, token: &AdminToken, ids: &[CodeId], shop_id: &ShopId) -> Result<()> {
        let request = self
            .admin(Method::POST, &["api", "admin", "qrcodes", "assign"], token)?
            .json(&json!({ "qrIds": ids, "shopId": shop_id }));
        self.send(request).await?;
        Ok(())
    }

    async fn delete_codes(&self, token: &AdminToken, ids: &[CodeId]) -> Result<()> {
        let request = self
            .admin(Method::DELETE, &["api", "admin", "qrcodes"], token)?
            .json(&IdsBody { qr_ids: ids });
        self.send(request).await?;
        Ok(())
    }

    async fn delete_batch(&self, token: &AdminToken, batch_id: &BatchId) -> Result<()> {
        let path = ["api", "admin", "qrcodes", "batch", batch_id.as_str()];
        self.send(self.admin(Method::DELETE, &path, token)?).await?;
        Ok(())
    }

    async fn export_codes(
        &self,
        token: &AdminToken,
        ids: &[CodeId],
        format: ExportFormat,
    ) -> Result<ExportArtifact> {
        let request = match format {
            ExportFormat::SelectedPdf => self
                .admin(
                    Method::POST,
                    &["api", "admin", "qrcodes", "download-selected-pdf"],
                    token,
                )?
                .json(&IdsBody { qr_ids: ids }),
            ExportFormat::StickerSheet {
                vertical_spacing,
                horizontal_spacing,
            } => self
                .admin(Method::POST, &["api", "admin", "qrcodes", "sticker-sheet"], token)?
                .json(&json!({
                    "qrIds": ids,
                    "verticalSpacing": vertical_spacing,
                    "horizontalSpacing": horizontal_spacing,
                })),
        };
        self.artifact(request, format.file_name(ids.len())).await
    }

    async fn product_pdf(&self, token: &AdminToken, product: &Product) -> Result<ExportArtifact> {
        let path = [
            "api",
            "admin",
            "qrcodes",
            "download-pdf",
            product.product_id.as_str(),
        ];
        let file_name =
            ExportArtifact::product_file_name(&product.product_name, product.product_id.as_str());
        self.artifact(self.admin(Method::GET, &path, token)?, file_name)
            .await
    }

    async fn dashboard(&self, token: &AdminToken) -> Result<DashboardStats> {
        self.json(self.admin(Method::GET, &["api", "admin", "dashboard"], token)?)
            .await
    }
}
