//! Public code workflow: scan, shop login, activation, warranty.

use std::sync::{Arc, Mutex, MutexGuard};

use time::{Date, UtcOffset};
use tracing::{debug, info, warn};
use wty_backend::{Backend, ShopSession};
use wty_core::{
    CodeRecord, CustomerDetails, Error, ErrorKind, Resolution, Result, RouteDecision, ShopId, WarrantyStatus,
};

use crate::navigation::Navigator;

/// A code record together with its computed coverage.
#[derive(Debug, Clone)]
pub struct WarrantyView {
    pub record: CodeRecord,
    pub status: WarrantyStatus,
}

pub struct VisitFlow {
    backend: Arc<dyn Backend>,
    session: Mutex<ShopSession>,
    resolution: Mutex<Resolution>,
    navigator: Navigator,
}

impl VisitFlow {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            session: Mutex::new(ShopSession::new()),
            resolution: Mutex::new(Resolution::Unresolved),
            navigator: Navigator::new(),
        }
    }

    fn session(&self) -> MutexGuard<'_, ShopSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_resolution(&self, resolution: Resolution) {
        *self.resolution.lock().unwrap_or_else(|e| e.into_inner()) = resolution;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_shop_session(&self) -> bool {
        self.session().is_held()
    }

    /// Leaves the current view; a lookup still in flight is discarded.
    pub fn navigate_away(&self) {
        self.navigator.navigate();
        self.set_resolution(Resolution::Unresolved);
    }

    /// Looks the serial up and decides where the visitor goes next.
    ///
    /// Returns [`Resolution::Unresolved`] when the view was left before the
    /// lookup finished. Transport failures are returned as errors and leave
    /// the view unresolved.
    pub async fn resolve(&self, serial: &str) -> Result<Resolution> {
        let ticket = self.navigator.ticket();
        self.set_resolution(Resolution::Unresolved);

        let lookup = self.backend.fetch_code(serial).await;
        let Some(lookup) = ticket.accept(lookup) else {
            debug!("Dropping lookup of {} after navigation", serial);
            return Ok(Resolution::Unresolved);
        };

        let decision = RouteDecision::from_lookup(lookup, self.has_shop_session())?;
        debug!("{} resolved to {:?}", serial, decision);
        let resolution = Resolution::Resolved(decision);
        self.set_resolution(resolution.clone());
        Ok(resolution)
    }

    pub async fn shop_login(&self, shop_id: &ShopId, password: &str) -> Result<()> {
        let token = self.backend.shop_login(shop_id, password).await?;
        self.session().hold(token);
        info!("Shop {} logged in", shop_id);
        Ok(())
    }

    /// Activates with the held shop credential, which is consumed on
    /// success. Without one, or when the backend rejects it, the visitor is
    /// sent back to shop login.
    pub async fn activate(
        &self,
        serial: &str,
        customer: &CustomerDetails,
    ) -> Result<RouteDecision> {
        let Some(token) = self.session().token().cloned() else {
            return Err(self.back_to_login(
                serial,
                Error::Unauthorized("Shop login required before activation".to_string()),
            ));
        };

        if let Err(e) = self.backend.activate(&token, serial, customer).await {
            if e.kind() == ErrorKind::Unauthorized {
                self.session().discard();
                return Err(self.back_to_login(serial, e));
            }
            return Err(e);
        }
        self.session().discard();
        info!("Activated {}", serial);

        let shown = RouteDecision::ShowWarrantyInfo {
            serial: serial.to_string(),
        };
        match self.resolve(serial).await {
            Ok(Resolution::Resolved(decision)) => Ok(decision),
            Ok(Resolution::Unresolved) => Ok(shown),
            Err(e) => {
                warn!("Activated {} but the follow-up lookup failed: {}", serial, e);
                self.set_resolution(Resolution::Resolved(shown.clone()));
                Ok(shown)
            }
        }
    }

    /// Routes the view to the shop login step and hands the error back.
    fn back_to_login(&self, serial: &str, e: Error) -> Error {
        debug!("{} needs a shop login: {}", serial, e);
        self.set_resolution(Resolution::Resolved(
            RouteDecision::NeedsShopAuthentication {
                serial: serial.to_string(),
            },
        ));
        e
    }

    /// Coverage of an activated code as of `today`, with the activation
    /// timestamp read in `offset`.
    pub async fn warranty(
        &self,
        serial: &str,
        today: Date,
        offset: UtcOffset,
    ) -> Result<WarrantyView> {
        let record = self.backend.fetch_code(serial).await?;
        let activated_at = match (record.code.is_activated, record.code.activation_date) {
            (true, Some(at)) => at,
            _ => {
                return Err(Error::Validation(format!(
                    "{serial} has not been activated yet"
                )));
            }
        };
        let status = WarrantyStatus::from_activation(
            activated_at,
            record.product.warranty_duration,
            today,
            offset,
        );
        Ok(WarrantyView { record, status })
    }
}
