//! Core domain models and logic for wty
//!
//! This crate contains:
//! - Domain models (Code, Batch, Product, Shop, CodeRecord)
//! - Warranty computation
//! - Code lifecycle resolution
//! - Filtering and selection over batches of codes
//!
//! Nothing in here performs I/O.

pub mod error;
pub mod filter;
pub mod ids;
pub mod lifecycle;
pub mod model;
pub mod selection;
pub mod warranty;

pub use error::{Error, ErrorKind, Result};
pub use filter::{FilterCriteria, ProductFilter, ShopFilter, StatusFilter};
pub use ids::{BatchId, CodeId, ProductId, ShopId};
pub use lifecycle::{Resolution, RouteDecision};
pub use model::{
    Batch, Code, CodeDetails, CodeRecord, CustomerDetails, DashboardStats, Product, Shop,
};
pub use selection::SelectionStore;
pub use warranty::{WarrantyState, WarrantyStatus};
