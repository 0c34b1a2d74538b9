//! Sheaf CLI - command-line interface for sheaf
//!
//! Ties the catalog client, the local stores and the sync engine together.

pub mod config;
pub mod report;
pub mod shutdown;

pub use config::{Command, Config, SyncArgs};
