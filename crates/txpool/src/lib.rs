//! Transaction layer for the tablet server
//!
//! This crate multiplexes client transactions onto pooled sessions:
//! - TxPool: Begin / Commit / Rollback, shutdown, and the timeout reaper
//! - ActivePool: id -> transaction registry with busy-flag claiming
//! - TxConnection: one open transaction and its statement log
//! - TxPoolConfig: `txpool.toml` settings
//! - TxPoolMetrics: begin / conclusion / kill / stray counters
//!
//! Every error returned to callers is a [`TabletError`](tablet_core::TabletError),
//! so it classifies into a canonical errno and SQLSTATE.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod active_pool;
pub mod config;
pub mod metrics;
pub mod tx_connection;
pub mod tx_pool;

pub use active_pool::{ActiveError, ActivePool};
pub use config::{ConfigError, TxPoolConfig, CONFIG_FILE_NAME};
pub use metrics::{Conclusion, TxPoolMetrics};
pub use tx_connection::TxConnection;
pub use tx_pool::{TxPool, TxPoolState};
