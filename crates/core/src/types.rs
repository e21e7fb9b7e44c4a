//! Identifier types shared by the pool layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle naming one open transaction.
///
/// Issued by the transaction pool, valid only while the transaction is open.
/// Serializes as a bare integer so it round-trips exactly through RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wrap a raw id received from a client.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
