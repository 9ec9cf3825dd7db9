//! In-process backend.
//!
//! Holds the same records the REST API would and enforces the same
//! credential rules. Counts requests per operation so callers can check how
//! often the network would have been hit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::debug;
use wty_core::{
    Batch, BatchId, Code, CodeDetails, CodeId, CodeRecord, CustomerDetails, DashboardStats, Error,
    Product, ProductId, Result, Shop, ShopId,
    model::{DailyActivations, TopProduct},
};

use crate::backend::{Backend, ExportArtifact, ExportFormat};
use crate::session::{AdminToken, ShopToken};

const MAX_GENERATE: u32 = 1000;

#[derive(Default)]
struct State {
    products: Vec<Product>,
    shops: Vec<Shop>,
    batches: Vec<Batch>,
    codes: Vec<Code>,
    shop_passwords: HashMap<ShopId, String>,
    admins: HashMap<String, String>,
    admin_tokens: HashSet<String>,
    shop_tokens: HashMap<String, ShopId>,
    requests: Vec<String>,
    failures: HashMap<String, Error>,
    offline: bool,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    next_id: AtomicU64,
    latency: Mutex<Option<Duration>>,
    gate: watch::Sender<bool>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            state: Mutex::new(State::default()),
            next_id: AtomicU64::new(1),
            latency: Mutex::new(None),
            gate,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn with_admin(self, username: &str, password: &str) -> Self {
        self.state()
            .admins
            .insert(username.to_string(), password.to_string());
        self
    }

    pub fn with_product(self, product: Product) -> Self {
        self.state().products.push(product);
        self
    }

    pub fn with_shop(self, shop: Shop, password: &str) -> Self {
        {
            let mut state = self.state();
            state
                .shop_passwords
                .insert(shop.shop_id.clone(), password.to_string());
            state.shops.push(shop);
        }
        self
    }

    /// Small seeded catalog for trying the console without a server.
    /// Admin login is `admin` / `admin`; shops log in with `demo`.
    pub fn demo() -> Self {
        let product = |id: &str, name: &str, category: &str, days: u32| Product {
            product_id: id.into(),
            product_name: name.to_string(),
            manufacturer: "Acme".to_string(),
            category: category.to_string(),
            image_url: String::new(),
            warranty_duration: days,
        };
        let shop = |id: &str, name: &str, owner: &str| Shop {
            shop_id: id.into(),
            shop_name: name.to_string(),
            owner_name: owner.to_string(),
            phone_number: "555-0100".to_string(),
            is_active: true,
        };

        let backend = Self::new()
            .with_admin("admin", "admin")
            .with_product(product("P-100", "Kettle", "Kitchen", 365))
            .with_product(product("P-200", "Toaster", "Kitchen", 730))
            .with_shop(shop("SHOP-1", "Corner Electronics", "Dana"), "demo")
            .with_shop(shop("SHOP-2", "Main Street Appliances", "Lee"), "demo");
        backend.seed_batch(
            "B-KETTLE-01",
            "P-100",
            &["SN-001", "SN-002", "SN-003", "SN-004", "SN-005", "SN-006"],
        );
        backend.seed_batch("B-TOASTER-01", "P-200", &["TS-001", "TS-002", "TS-003", "TS-004"]);
        backend
    }

    /// Adds a batch holding one unassigned code per serial.
    pub fn seed_batch(&self, batch_id: &str, product_id: &str, serials: &[&str]) -> Vec<CodeId> {
        let now = OffsetDateTime::now_utc();
        let batch_id = BatchId::new(batch_id);
        let product_id = ProductId::new(product_id);
        let codes: Vec<Code> = serials
            .iter()
            .map(|serial| self.new_code(serial, &product_id, &batch_id, now))
            .collect();
        let ids = codes.iter().map(|c| c.id.clone()).collect();

        let mut state = self.state();
        state.batches.push(Batch {
            id: batch_id,
            product_id,
            count: codes.len() as u32,
            activated_count: 0,
            assigned_count: 0,
            created_at: now,
        });
        state.codes.extend(codes);
        ids
    }

    fn new_code(
        &self,
        serial: &str,
        product_id: &ProductId,
        batch_id: &BatchId,
        now: OffsetDateTime,
    ) -> Code {
        Code {
            id: CodeId::new(format!("qr{:06}", self.next_id())),
            serial_number: serial.to_string(),
            product_id: product_id.clone(),
            batch_id: batch_id.clone(),
            assigned_shop_id: None,
            is_activated: false,
            activation_date: None,
            customer_name: None,
            customer_phone: None,
            customer_address: None,
            created_at: Some(now),
        }
    }

    /// Every later call of `operation` fails with `error` until cleared.
    /// Batch code listings can be targeted per batch as
    /// `list_batch_codes:<batch id>`.
    pub fn fail(&self, operation: &str, error: Error) {
        self.state().failures.insert(operation.to_string(), error);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Every call fails with a transport error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Delay applied to code lookups and batch code listings.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Holds code lookups and batch code listings until
    /// [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume(&self) {
        self.gate.send_replace(false);
    }

    /// Operation names of every request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn request_count(&self, operation: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.as_str() == operation)
            .count()
    }

    pub fn batch_fetches(&self, batch_id: &BatchId) -> usize {
        self.request_count(&format!("list_batch_codes:{batch_id}"))
    }

    pub fn code(&self, id: &CodeId) -> Option<Code> {
        self.state().codes.iter().find(|c| &c.id == id).cloned()
    }

    pub fn code_by_serial(&self, serial: &str) -> Option<Code> {
        self.state()
            .codes
            .iter()
            .find(|c| c.serial_number == serial)
            .cloned()
    }

    fn record(&self, operation: &str) {
        self.state().requests.push(operation.to_string());
    }

    /// Logs the request and applies injected failures.
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        self.record(operation);
        self.checked(operation)
    }

    fn checked(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        let state = self.state();
        if state.offline {
            return Err(Error::Network("connection refused".to_string()));
        }
        if let Some(error) = state.failures.get(operation) {
            return Err(error.clone());
        }
        Ok(state)
    }

    async fn wait_turn(&self) {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut gate = self.gate.subscribe();
        // The sender lives as long as self, so this only returns once resumed.
        let _ = gate.wait_for(|paused| !*paused).await;
    }
}

impl State {
    fn check_admin(&self, token: &AdminToken) -> Result<()> {
        if self.admin_tokens.contains(token.expose()) {
            Ok(())
        } else {
            Err(Error::Unauthorized("Invalid or expired token".to_string()))
        }
    }

    fn product(&self, product_id: &ProductId) -> Result<&Product> {
        self.products
            .iter()
            .find(|p| &p.product_id == product_id)
            .ok_or_else(|| Error::NotFound("Product not found".to_string()))
    }

    /// Batch counters derived from the codes they hold.
    fn batch_view(&self, batch: &Batch) -> Batch {
        let codes = self.codes.iter().filter(|c| c.batch_id == batch.id);
        let (mut count, mut activated, mut assigned) = (0, 0, 0);
        for code in codes {
            count += 1;
            activated += u32::from(code.is_activated);
            assigned += u32::from(code.is_assigned());
        }
        Batch {
            count,
            activated_count: activated,
            assigned_count: assigned,
            ..batch.clone()
        }
    }

    fn known_ids(&self, ids: &[CodeId]) -> Result<()> {
        if ids.is_empty() {
            return Err(Error::Validation("No QR codes provided".to_string()));
        }
        let known: HashSet<&CodeId> = self.codes.iter().map(|c| &c.id).collect();
        if let Some(missing) = ids.iter().find(|id| !known.contains(id)) {
            return Err(Error::NotFound(format!("QR code {missing} not found")));
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_code(&self, serial: &str) -> Result<CodeRecord> {
        self.record("fetch_code");
        self.wait_turn().await;

        let state = self.checked("fetch_code")?;
        let code = state
            .codes
            .iter()
            .find(|c| c.serial_number == serial)
            .ok_or_else(|| Error::NotFound("QR code not found".to_string()))?;
        let product = state.product(&code.product_id)?.clone();
        let shop = code
            .assigned_shop_id
            .as_ref()
            .and_then(|id| state.shops.iter().find(|s| &s.shop_id == id))
            .cloned();

        Ok(CodeRecord {
            code: CodeDetails {
                serial_number: code.serial_number.clone(),
                product_id: code.product_id.clone(),
                assigned_shop_id: code.assigned_shop_id.clone(),
                is_activated: code.is_activated,
                activation_date: code.activation_date,
                customer_name: code.customer_name.clone(),
                customer_phone: code.customer_phone.clone(),
                customer_address: code.customer_address.clone(),
            },
            product,
            shop,
        })
    }

    async fn shop_login(&self, shop_id: &ShopId, password: &str) -> Result<ShopToken> {
        let mut state = self.enter("shop_login")?;
        if state.shop_passwords.get(shop_id).map(String::as_str) != Some(password) {
            return Err(Error::Unauthorized("Invalid shop ID or password".to_string()));
        }
        if state.shops.iter().any(|s| &s.shop_id == shop_id && !s.is_active) {
            return Err(Error::Unauthorized("Shop is inactive".to_string()));
        }
        let token = format!("shop-{}", self.next_id());
        state.shop_tokens.insert(token.clone(), shop_id.clone());
        Ok(ShopToken::new(token))
    }

    async fn activate(
        &self,
        token: &ShopToken,
        serial: &str,
        customer: &CustomerDetails,
    ) -> Result<()> {
        let mut state = self.enter("activate")?;
        let shop_id = state
            .shop_tokens
            .get(token.expose())
            .cloned()
            .ok_or_else(|| Error::Unauthorized("Invalid or expired token".to_string()))?;
        let code = state
            .codes
            .iter_mut()
            .find(|c| c.serial_number == serial)
            .ok_or_else(|| Error::NotFound("QR code not found".to_string()))?;
        if code.is_activated {
            return Err(Error::Validation("QR code already activated".to_string()));
        }
        if code.assigned_shop_id.as_ref().is_some_and(|s| s != &shop_id) {
            return Err(Error::Validation(
                "QR code is assigned to a different shop".to_string(),
            ));
        }

        code.is_activated = true;
        code.activation_date = Some(OffsetDateTime::now_utc());
        code.assigned_shop_id.get_or_insert(shop_id);
        code.customer_name = non_empty(&customer.name);
        code.customer_phone = non_empty(&customer.phone);
        code.customer_address = non_empty(&customer.address);
        debug!("Activated {}", serial);
        Ok(())
    }

    async fn admin_login(&self, username: &str, password: &str) -> Result<AdminToken> {
        let mut state = self.enter("admin_login")?;
        if state.admins.get(username).map(String::as_str) != Some(password) {
            return Err(Error::Unauthorized("Invalid credentials".to_string()));
        }
        let token = format!("admin-{}", self.next_id());
        state.admin_tokens.insert(token.clone());
        Ok(AdminToken::new(token))
    }

    async fn list_batches(&self, token: &AdminToken) -> Result<Vec<Batch>> {
        let state = self.enter("list_batches")?;
        state.check_admin(token)?;
        Ok(state.batches.iter().map(|b| state.batch_view(b)).collect())
    }

    async fn list_batch_codes(&self, token: &AdminToken, batch_id: &BatchId) -> Result<Vec<Code>> {
        let operation = format!("list_batch_codes:{batch_id}");
        self.record(&operation);
        self.wait_turn().await;

        let state = self.checked(&operation)?;
        state.check_admin(token)?;
        if !state.batches.iter().any(|b| &b.id == batch_id) {
            return Err(Error::NotFound("Batch not found".to_string()));
        }
        Ok(state
            .codes
            .iter()
            .filter(|c| &c.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn list_products(&self, token: &AdminToken) -> Result<Vec<Product>> {
        let state = self.enter("list_products")?;
        state.check_admin(token)?;
        Ok(state.products.clone())
    }

    async fn list_shops(&self, token: &AdminToken) -> Result<Vec<Shop>> {
        let state = self.enter("list_shops")?;
        state.check_admin(token)?;
        Ok(state.shops.clone())
    }

    async fn list_shop_codes(&self, token: &AdminToken, shop_id: &ShopId) -> Result<Vec<Code>> {
        let state = self.enter("list_shop_codes")?;
        state.check_admin(token)?;
        if !state.shops.iter().any(|s| &s.shop_id == shop_id) {
            return Err(Error::NotFound("Shop not found".to_string()));
        }
        Ok(state
            .codes
            .iter()
            .filter(|c| c.assigned_shop_id.as_ref() == Some(shop_id))
            .cloned()
            .collect())
    }

    async fn generate(
        &self,
        token: &AdminToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        let mut state = self.enter("generate")?;
        state.check_admin(token)?;
        state.product(product_id)?;
        if quantity == 0 || quantity > MAX_GENERATE {
            return Err(Error::Validation(format!(
                "Quantity must be between 1 and {MAX_GENERATE}"
            )));
        }

        let now = OffsetDateTime::now_utc();
        let batch_id = BatchId::new(format!("batch{:06}", self.next_id()));
        let codes: Vec<Code> = (0..quantity)
            .map(|_| {
                let serial = format!("SN-{:06}", self.next_id());
                self.new_code(&serial, product_id, &batch_id, now)
            })
            .collect();
        state.batches.push(Batch {
            id: batch_id,
            product_id: product_id.clone(),
            count: quantity,
            activated_count: 0,
            assigned_count: 0,
            created_at: now,
        });
        state.codes.extend(codes);
        Ok(())
    }

    async fn assign(&self, token: &AdminToken, ids: &[CodeId], shop_id: &ShopId) -> Result<()> {
        let mut state = self.enter("assign")?;
        state.check_admin(token)?;
        state.known_ids(ids)?;
        if !state.shops.iter().any(|s| &s.shop_id == shop_id) {
            return Err(Error::NotFound("Shop not found".to_string()));
        }
        let targets: HashSet<&CodeId> = ids.iter().collect();
        for code in state.codes.iter_mut().filter(|c| targets.contains(&c.id)) {
            code.assigned_shop_id = Some(shop_id.clone());
        }
        Ok(())
    }

    async fn delete_codes(&self, token: &AdminToken, ids: &[CodeId]) -> Result<()> {
        let mut state = self.enter("delete_codes")?;
        state.check_admin(token)?;
        state.known_ids(ids)?;
        let targets: HashSet<&CodeId> = ids.iter().collect();
        state.codes.retain(|c| !targets.contains(&c.id));
        Ok(())
    }

    async fn delete_batch(&self, token: &AdminToken, batch_id: &BatchId) -> Result<()> {
        let mut state = self.enter("delete_batch")?;
        state.check_admin(token)?;
        let before = state.batches.len();
        state.batches.retain(|b| &b.id != batch_id);
        if state.batches.len() == before {
            return Err(Error::NotFound("Batch not found".to_string()));
        }
        state.codes.retain(|c| &c.batch_id != batch_id);
        Ok(())
    }

    async fn export_codes(
        &self,
        token: &AdminToken,
        ids: &[CodeId],
        format: ExportFormat,
    ) -> Result<ExportArtifact> {
        let state = self.enter("export_codes")?;
        state.check_admin(token)?;
        state.known_ids(ids)?;
        let serials: Vec<&str> = state
            .codes
            .iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| c.serial_number.as_str())
            .collect();

        Ok(ExportArtifact {
            file_name: format.file_name(ids.len()),
            content_type: "application/pdf".to_string(),
            bytes: serials.join("\n").into_bytes(),
        })
    }

    async fn product_pdf(&self, token: &AdminToken, product: &Product) -> Result<ExportArtifact> {
        let state = self.enter("product_pdf")?;
        state.check_admin(token)?;
        state.product(&product.product_id)?;
        let serials: Vec<&str> = state
            .codes
            .iter()
            .filter(|c| c.product_id == product.product_id)
            .map(|c| c.serial_number.as_str())
            .collect();

        Ok(ExportArtifact {
            file_name: ExportArtifact::product_file_name(
                &product.product_name,
                product.product_id.as_str(),
            ),
            content_type: "application/pdf".to_string(),
            bytes: serials.join("\n").into_bytes(),
        })
    }

    async fn dashboard(&self, token: &AdminToken) -> Result<DashboardStats> {
        let state = self.enter("dashboard")?;
        state.check_admin(token)?;

        let today = OffsetDateTime::now_utc().date();
        let activated: Vec<&Code> = state.codes.iter().filter(|c| c.is_activated).collect();
        let activated_on = |date: time::Date| {
            activated
                .iter()
                .filter(|c| c.activation_date.is_some_and(|d| d.date() == date))
                .count() as u64
        };

        let mut top_products: Vec<TopProduct> = state
            .products
            .iter()
            .map(|p| TopProduct {
                product_name: p.product_name.clone(),
                activation_count: activated
                    .iter()
                    .filter(|c| c.product_id == p.product_id)
                    .count() as u64,
                image_url: p.image_url.clone(),
            })
            .filter(|t| t.activation_count > 0)
            .collect();
        top_products.sort_by(|a, b| b.activation_count.cmp(&a.activation_count));
        top_products.truncate(5);

        let weekly_activations = (0..7)
            .rev()
            .map(|days_ago| {
                let date = today - time::Duration::days(days_ago);
                DailyActivations {
                    date: date.to_string(),
                    count: activated_on(date),
                }
            })
            .collect();

        Ok(DashboardStats {
            total_shops: state.shops.len() as u64,
            total_products: state.products.len() as u64,
            total_codes: state.codes.len() as u64,
            activated_codes: activated.len() as u64,
            today_activations: activated_on(today),
            top_products,
            weekly_activations,
        })
    }
}
