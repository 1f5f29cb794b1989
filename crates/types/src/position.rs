//! Position state, keyed by owner and tick range.

use serde::{Deserialize, Serialize};

use crate::ids::AccountId;
use crate::num::U256;

/// Composite key of a position. A direct tuple key; the hash-addressed
/// storage of the original is unnecessary off-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub owner: AccountId,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// Liquidity and fee bookkeeping for one (owner, range) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Virtual liquidity owned over the range.
    pub liquidity: u128,
    /// Fee growth inside the range as of the last touch, token0.
    pub fee_growth_inside_0_last_x128: U256,
    /// Fee growth inside the range as of the last touch, token1.
    pub fee_growth_inside_1_last_x128: U256,
    /// Fees and burned principal owed to the owner, token0. Monotonically
    /// non-decreasing until collected.
    pub tokens_owed_0: u128,
    /// Same for token1.
    pub tokens_owed_1: u128,
}
