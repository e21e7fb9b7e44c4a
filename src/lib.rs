//! Tablet - per-node transaction layer for a MySQL-compatible query server
//!
//! Many logical client transactions are multiplexed onto a bounded pool of
//! real database sessions. Transaction lifetime is enforced by a background
//! reaper, and shutdown reclaims every outstanding session exactly once.
//!
//! # Quick Start
//!
//! ```ignore
//! use tablet::{CallContext, FakeDb, TabletServer, TxPoolConfig};
//!
//! let db = FakeDb::new("demo");
//! let server = TabletServer::builder()
//!     .config(TxPoolConfig::default())
//!     .on_startup("warmup", |_| Ok(()))
//!     .build()?;
//! server.open(db.connector())?;
//!
//! let ctx = CallContext::background();
//! let id = server.begin(&ctx)?;
//! server.commit(&ctx, id)?;
//! server.shutdown();
//! ```
//!
//! # Architecture
//!
//! - `tablet-core`: canonical errors, classification, call contexts
//! - `tablet-pool`: driver seam and the bounded connection pool
//! - `tablet-txpool`: transaction registry, pool, and reaper
//!
//! Every error leaving [`TabletServer`] is a classified [`SqlError`].

pub mod server;

pub use server::{HookResult, ServerError, TabletServer, TabletServerBuilder};
pub use tablet_core::codes;
pub use tablet_core::{
    classify, classify_message, truncate_for_log, CallContext, CancelHandle, Classify,
    ErrorState, RpcCode, SqlError, TabletError, TransactionId,
};
pub use tablet_pool::{
    Connection, ConnectionPool, Connector, FakeDb, PoolError, PoolStats, PooledConnection,
    QueryResult,
};
pub use tablet_txpool::{
    ActivePool, Conclusion, ConfigError, TxConnection, TxPool, TxPoolConfig, TxPoolMetrics,
    TxPoolState, CONFIG_FILE_NAME,
};
