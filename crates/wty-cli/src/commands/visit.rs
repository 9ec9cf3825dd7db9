use anyhow::{Result, anyhow, bail};
use time::{OffsetDateTime, UtcOffset};
use wty_config::Config;
use wty_core::warranty::NEAR_EXPIRY_DAYS;
use wty_core::{
    CustomerDetails, Error, ErrorKind, Resolution, RouteDecision, ShopId, WarrantyState,
};
use wty_engine::{VisitFlow, WarrantyView};

use crate::cli::ActivateArgs;

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn describe(decision: &RouteDecision) -> String {
    match decision {
        RouteDecision::NeedsShopAuthentication { serial } => format!(
            "{serial} is not activated yet. A shop has to log in to activate it:\n  wty activate {serial} --shop <SHOP_ID> --name ... --phone ... --address ..."
        ),
        RouteDecision::NeedsActivationDetails { serial } => {
            format!("{serial} is ready for activation. Customer details are required.")
        }
        RouteDecision::ShowWarrantyInfo { serial } => {
            format!("{serial} is activated:\n  wty warranty {serial}")
        }
        RouteDecision::NotFound { message } => message.clone(),
    }
}

pub async fn scan(config: &Config, serial: &str) -> Result<()> {
    let flow = VisitFlow::new(super::backend(config)?);
    match flow.resolve(serial).await? {
        Resolution::Resolved(RouteDecision::NotFound { message }) => bail!(message),
        Resolution::Resolved(decision) => {
            println!("{}", describe(&decision));
            if let Some(path) = decision.path() {
                println!("  Next: {path}");
            }
        }
        Resolution::Unresolved => bail!("Lookup of {serial} did not complete"),
    }
    Ok(())
}

/// Logs the shop in and activates in one go; the shop credential is
/// single-use and never leaves this process.
pub async fn activate(config: &Config, args: ActivateArgs) -> Result<()> {
    let flow = VisitFlow::new(super::backend(config)?);
    let serial = args.serial.clone();
    let customer_name = args.name.clone();
    let next = run_activation(&flow, args).await?;

    println!("✓ Activated {serial}");
    println!("  Customer: {customer_name}");
    if let Some(path) = next.path() {
        println!("  Next: {path}");
    }
    Ok(())
}

async fn run_activation(flow: &VisitFlow, args: ActivateArgs) -> Result<RouteDecision> {
    let Resolution::Resolved(decision) = flow.resolve(&args.serial).await? else {
        bail!("Lookup of {} did not complete", args.serial);
    };
    match decision {
        RouteDecision::NotFound { message } => bail!(message),
        RouteDecision::ShowWarrantyInfo { serial } => {
            bail!("{serial} is already activated")
        }
        RouteDecision::NeedsShopAuthentication { .. }
        | RouteDecision::NeedsActivationDetails { .. } => {}
    }

    let shop_id = ShopId::new(args.shop);
    if let Err(e) = flow.shop_login(&shop_id, &args.password).await {
        return Err(rejected_login(flow, &args.serial, e));
    }
    let customer = CustomerDetails {
        name: args.name,
        phone: args.phone,
        address: args.address,
    };
    flow.activate(&args.serial, &customer)
        .await
        .map_err(|e| rejected_login(flow, &args.serial, e))
}

/// A rejected shop credential sends the user back to the login step.
fn rejected_login(flow: &VisitFlow, serial: &str, e: Error) -> anyhow::Error {
    if e.kind() != ErrorKind::Unauthorized {
        return e.into();
    }
    let route = match flow.resolution() {
        Resolution::Resolved(decision) => decision,
        Resolution::Unresolved => RouteDecision::NeedsShopAuthentication {
            serial: serial.to_string(),
        },
    };
    anyhow!("{}\n{}", e.user_message(), describe(&route))
}

fn render_warranty(view: &WarrantyView) -> Vec<String> {
    let code = &view.record.code;
    let status = &view.status;
    let mut lines = vec![
        format!("Serial:    {}", code.serial_number),
        format!(
            "Product:   {} ({})",
            view.record.product.product_name, view.record.product.manufacturer
        ),
        format!("Coverage:  {} days", view.record.product.warranty_duration),
        format!("Status:    {}", status.state.label()),
        format!("Expires:   {}", status.end_date),
        format!("Remaining: {} days", status.display_remaining_days()),
    ];
    if status.state == WarrantyState::NearExpiry {
        lines.push(format!("Coverage ends within {NEAR_EXPIRY_DAYS} days."));
    }
    if let Some(shop) = &view.record.shop {
        lines.push(format!("Sold by:   {}", shop.shop_name));
    }
    if view.record.has_customer() {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        lines.push(format!("Customer:  {}", field(&code.customer_name)));
        lines.push(format!("Phone:     {}", field(&code.customer_phone)));
        lines.push(format!("Address:   {}", field(&code.customer_address)));
    }
    lines
}

pub async fn warranty(config: &Config, serial: &str, json: bool) -> Result<()> {
    let flow = VisitFlow::new(super::backend(config)?);
    let offset = local_offset();
    let today = OffsetDateTime::now_utc().to_offset(offset).date();
    let view = flow.warranty(serial, today, offset).await?;

    if json {
        let value = serde_json::json!({
            "record": view.record,
            "warranty": view.status,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for line in render_warranty(&view) {
            println!("{line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wty_backend::MemoryBackend;

    #[tokio::test]
    async fn test_render_activated_warranty() {
        let backend = Arc::new(MemoryBackend::demo());
        let flow = VisitFlow::new(backend);
        flow.shop_login(&"SHOP-2".into(), "demo").await.unwrap();
        let customer = CustomerDetails {
            name: "Ada".into(),
            phone: "555".into(),
            address: "Somewhere".into(),
        };
        flow.activate("SN-002", &customer).await.unwrap();

        let today = OffsetDateTime::now_utc().date();
        let view = flow.warranty("SN-002", today, UtcOffset::UTC).await.unwrap();
        let lines = render_warranty(&view);
        assert!(lines.contains(&"Status:    Active".to_string()));
        assert!(lines.contains(&"Remaining: 365 days".to_string()));
        assert!(lines.contains(&"Sold by:   Main Street Appliances".to_string()));
        assert!(lines.contains(&"Customer:  Ada".to_string()));
        assert!(lines.contains(&"Phone:     555".to_string()));
    }

    #[tokio::test]
    async fn test_render_without_customer_details() {
        let backend = Arc::new(MemoryBackend::demo());
        let flow = VisitFlow::new(backend);
        flow.shop_login(&"SHOP-1".into(), "demo").await.unwrap();
        flow.activate("TS-002", &CustomerDetails::default())
            .await
            .unwrap();

        let today = OffsetDateTime::now_utc().date();
        let view = flow.warranty("TS-002", today, UtcOffset::UTC).await.unwrap();
        let lines = render_warranty(&view);
        assert!(!lines.iter().any(|l| l.starts_with("Customer:")));
        assert!(lines.contains(&"Sold by:   Corner Electronics".to_string()));
    }

    fn activation(serial: &str, password: &str) -> ActivateArgs {
        ActivateArgs {
            serial: serial.into(),
            shop: "SHOP-1".into(),
            password: password.into(),
            name: "Ada".into(),
            phone: "555".into(),
            address: "Somewhere".into(),
        }
    }

    #[tokio::test]
    async fn test_rejected_activation_points_to_shop_login() {
        let backend = Arc::new(MemoryBackend::demo());
        let flow = VisitFlow::new(backend.clone());
        backend.fail("activate", Error::Unauthorized("Token expired".into()));

        let err = run_activation(&flow, activation("SN-004", "demo"))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Token expired"));
        assert!(err.contains("wty activate SN-004 --shop"));
        assert!(!backend.code_by_serial("SN-004").unwrap().is_activated);
    }

    #[tokio::test]
    async fn test_wrong_shop_password_points_to_shop_login() {
        let backend = Arc::new(MemoryBackend::demo());
        let flow = VisitFlow::new(backend.clone());

        let err = run_activation(&flow, activation("SN-005", "wrong"))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("A shop has to log in"));
        assert_eq!(backend.request_count("activate"), 0);
    }

    #[tokio::test]
    async fn test_activation_reports_next_step() {
        let backend = Arc::new(MemoryBackend::demo());
        let flow = VisitFlow::new(backend);
        let next = run_activation(&flow, activation("SN-006", "demo"))
            .await
            .unwrap();
        assert_eq!(next.path().as_deref(), Some("/warranty/SN-006"));
    }

    #[test]
    fn test_describe_not_found() {
        let decision = RouteDecision::NotFound {
            message: "QR code not found".into(),
        };
        assert_eq!(describe(&decision), "QR code not found");
        assert!(decision.path().is_none());
    }
}
