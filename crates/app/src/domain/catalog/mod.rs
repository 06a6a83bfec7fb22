//! Product Catalog

pub mod errors;
pub mod memory;
pub mod models;
pub mod service;

pub use errors::CatalogError;
pub use memory::InMemoryCatalog;
pub use service::*;
