//! Database session pooling for the tablet server
//!
//! This crate provides:
//! - Connector / Connection: the seam to the database driver
//! - ConnectionPool: bounded, lazily-dialed pool of sessions
//! - Ticker: periodic background work (idle sweeping, reaping)
//! - FakeDb: scripted in-memory server for tests
//!
//! The pool knows nothing about transactions. It hands out sessions, takes
//! them back, and enforces capacity.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod error;
pub mod fakedb;
pub mod pool;
pub mod ticker;

pub use driver::{Connection, Connector, QueryResult};
pub use error::{PoolError, Result};
pub use fakedb::FakeDb;
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use ticker::Ticker;
