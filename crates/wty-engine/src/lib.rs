//! Stateful workflows on top of a [`wty_backend::Backend`]
//!
//! - [`BatchExpansionCache`]: lazy, single-flight code lists per batch
//! - [`BulkActionCoordinator`]: assign, delete and export over a selection
//! - [`AdminConsole`]: everything an administrator screen holds
//! - [`VisitFlow`]: the public scan, activate and warranty workflow

pub mod bulk;
pub mod cache;
pub mod console;
pub mod navigation;
pub mod visit;

pub use bulk::{BulkAction, BulkActionCoordinator, BulkOutcome};
pub use cache::BatchExpansionCache;
pub use console::AdminConsole;
pub use navigation::{Navigator, ViewTicket};
pub use visit::{VisitFlow, WarrantyView};
