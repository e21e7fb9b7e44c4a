//! Tablet server facade
//!
//! `TabletServer` owns a [`TxPool`] and exposes the transaction operations
//! at the RPC boundary: every failure leaves here as a canonical
//! [`SqlError`] produced by the classifier.
//!
//! Startup hooks are registered on the builder and run in registration
//! order each time the server opens. There is no process-wide registry.

use std::path::Path;
use std::sync::Arc;
use tablet_core::{classify, CallContext, SqlError, TransactionId};
use tablet_pool::{Connector, QueryResult};
use tablet_txpool::{ConfigError, TxPool, TxPoolConfig, TxPoolMetrics};
use thiserror::Error;
use tracing::{error, info};

/// Errors opening or configuring a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `open` was called on a server that is already open.
    #[error("server is already open")]
    AlreadyOpen,

    /// A startup hook failed; the server was closed again.
    #[error("startup hook '{name}' failed: {message}")]
    Hook {
        /// Name the hook was registered under
        name: String,
        /// What the hook reported
        message: String,
    },
}

/// Result of a startup hook.
pub type HookResult = Result<(), String>;

type StartupHook = Box<dyn Fn(&TabletServer) -> HookResult + Send + Sync>;

/// Builder for [`TabletServer`].
pub struct TabletServerBuilder {
    config: TxPoolConfig,
    hooks: Vec<(String, StartupHook)>,
}

impl Default for TabletServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TabletServerBuilder {
    /// Builder with the default transaction pool configuration.
    pub fn new() -> Self {
        Self {
            config: TxPoolConfig::default(),
            hooks: Vec::new(),
        }
    }

    /// Use `config` for the transaction pool.
    pub fn config(mut self, config: TxPoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the transaction pool configuration from a TOML file.
    pub fn config_file(mut self, path: &Path) -> Result<Self, ServerError> {
        self.config = TxPoolConfig::from_file(path)?;
        Ok(self)
    }

    /// Register a hook run after the pool opens.
    pub fn on_startup<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&TabletServer) -> HookResult + Send + Sync + 'static,
    {
        self.hooks.push((name.into(), Box::new(hook)));
        self
    }

    /// Validate the configuration and build a closed server.
    pub fn build(self) -> Result<TabletServer, ServerError> {
        self.config.validate()?;
        Ok(TabletServer {
            tx_pool: TxPool::new(self.config),
            hooks: self.hooks,
        })
    }
}

/// Serves transactions for one tablet.
pub struct TabletServer {
    tx_pool: TxPool,
    hooks: Vec<(String, StartupHook)>,
}

impl TabletServer {
    /// Start building a server.
    pub fn builder() -> TabletServerBuilder {
        TabletServerBuilder::new()
    }

    /// Open the transaction pool against `connector`, then run the startup
    /// hooks in registration order.
    ///
    /// If a hook fails the pool is closed again and the error returned.
    /// Opening a server that is already open fails without running the
    /// hooks again.
    pub fn open(&self, connector: Arc<dyn Connector>) -> Result<(), ServerError> {
        if !self.tx_pool.open(connector) {
            return Err(ServerError::AlreadyOpen);
        }
        for (name, hook) in &self.hooks {
            if let Err(message) = hook(self) {
                error!(target: "tablet::server", hook = %name, error = %message, "Startup hook failed");
                self.tx_pool.close();
                return Err(ServerError::Hook {
                    name: name.clone(),
                    message,
                });
            }
        }
        info!(target: "tablet::server", hooks = self.hooks.len(), "Tablet server serving");
        Ok(())
    }

    /// The underlying transaction pool.
    pub fn tx_pool(&self) -> &TxPool {
        &self.tx_pool
    }

    /// Begin a transaction.
    pub fn begin(&self, ctx: &CallContext) -> Result<TransactionId, SqlError> {
        self.tx_pool.begin(ctx).map_err(|e| classify(&e))
    }

    /// Run `sql` inside transaction `id`.
    pub fn execute(
        &self,
        ctx: &CallContext,
        id: TransactionId,
        sql: &str,
        max_rows: usize,
    ) -> Result<QueryResult, SqlError> {
        let tx = self.tx_pool.get(id, "for query").map_err(|e| classify(&e))?;
        tx.record_query(sql);
        let result = tx.exec(ctx, sql, max_rows, true);
        tx.recycle();
        result.map_err(|e| classify(&e))
    }

    /// Commit transaction `id`.
    pub fn commit(&self, ctx: &CallContext, id: TransactionId) -> Result<(), SqlError> {
        self.tx_pool.commit(ctx, id).map_err(|e| classify(&e))
    }

    /// Roll back transaction `id`.
    pub fn rollback(&self, ctx: &CallContext, id: TransactionId) -> Result<(), SqlError> {
        self.tx_pool.rollback(ctx, id).map_err(|e| classify(&e))
    }

    /// Transaction pool counters.
    pub fn metrics(&self) -> TxPoolMetrics {
        self.tx_pool.metrics()
    }

    /// Roll back idle transactions and close the pool.
    pub fn shutdown(&self) {
        self.tx_pool.rollback_non_busy(&CallContext::background());
        self.tx_pool.close();
        info!(target: "tablet::server", "Tablet server stopped");
    }
}
