//! Sheaf Store - local persistence for sheaf
//!
//! - [`state`] - the sync cursor as a JSON file, replaced atomically
//! - [`output`] - CSV artifacts with normalized headers

mod atomic;
pub mod output;
pub mod state;

pub use output::CsvDirectoryWriter;
pub use state::JsonStateStore;
