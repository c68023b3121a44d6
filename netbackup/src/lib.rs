//! netbackup library
//!
//! Host-to-host backups: find a reachable backup server (waking it over the
//! LAN when needed), transfer with rsync over SSH, optionally encrypted or
//! incremental, verify, and audit on the server.

pub mod cli;
pub mod config;
pub mod executor;
pub mod fs;
pub mod models;
pub mod remote;
pub mod services;
pub mod tools;
pub mod transfer;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{Error, Result};
