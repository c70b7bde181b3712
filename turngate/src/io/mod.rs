//! I/O helpers for turngate commands.

pub mod config;
pub mod init;
pub mod record_store;
pub mod scenario_source;
pub mod transcript;
