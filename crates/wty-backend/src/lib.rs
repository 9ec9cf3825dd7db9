//! Backend access for wty
//!
//! The [`Backend`] trait is the only way the engine talks to the outside
//! world. [`HttpBackend`] speaks the REST API; [`MemoryBackend`] keeps
//! everything in process for tests and offline demos.

pub mod backend;
pub mod http;
pub mod memory;
pub mod session;

pub use backend::{Backend, ExportArtifact, ExportFormat};
pub use http::HttpBackend;
pub use memory::MemoryBackend;
pub use session::{AdminToken, CredentialStore, ShopSession, ShopToken};
