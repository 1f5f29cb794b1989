//! Opaque identifiers for tokens and accounts.
//!
//! The engine never interprets these beyond equality and sort order; the
//! token ledger they index lives outside the core. `token0 < token1` ordering
//! uses the derived lexicographic order.

use serde::{Deserialize, Serialize};

/// Identifier of a token in the external ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TokenId(pub [u8; 32]);

/// Identifier of a balance-holding account (pool, position owner, recipient).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AccountId(pub [u8; 32]);

impl TokenId {
    /// Build an id with the low 8 bytes set. Convenient for tests and tools.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl AccountId {
    /// Build an id with the low 8 bytes set. Convenient for tests and tools.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}
