//! Sheaf Client - HTTP adapters for sheaf
//!
//! - [`catalog`] - CMS Provider Data Catalog metastore
//! - [`fetcher`] - plain HTTP download of dataset payloads
//!
//! Both map transport failures into [`sheaf_core::AppError`] so the engine
//! can tell transient from permanent failures.

pub mod catalog;
pub mod fetcher;
mod http;

pub use catalog::CmsCatalogClient;
pub use fetcher::HttpFetcher;
