//! Pool-level state structs.
//!
//! The original packs price, tick and protocol-fee configuration into a
//! single storage word; off-chain there is no slot to save, so everything is
//! an explicit named field.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, TokenId};
use crate::num::U256;

/// Immutable pool parameters, fixed at construction.
///
/// The factory that resolves `(tokenA, tokenB, fee) -> tick_spacing` and the
/// owner authorization live outside the engine; both arrive here as
/// already-resolved values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Ledger account holding the pool's token balances.
    pub account: AccountId,
    /// Account authorized for protocol-fee actions.
    pub owner: AccountId,
    /// First pool token by sort order.
    pub token0: TokenId,
    /// Second pool token by sort order. Invariant: `token0 < token1`.
    pub token1: TokenId,
    /// Swap fee in hundredths of a bip (parts per million).
    pub fee: u32,
    /// Spacing between usable ticks. Positive; all position bounds must be
    /// multiples of it.
    pub tick_spacing: i32,
    /// Cap on `liquidity_gross` at any single tick, derived from
    /// `tick_spacing` at construction.
    pub max_liquidity_per_tick: u128,
}

/// The pool's hot mutable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot0 {
    /// Current sqrt price as a Q64.96. Zero means the pool is uninitialized.
    pub sqrt_price_x96: U256,
    /// Current tick. The greatest tick whose sqrt ratio is at most
    /// `sqrt_price_x96`.
    pub tick: i32,
    /// Index of the most recently written oracle observation.
    pub observation_index: u16,
    /// Number of populated oracle observations.
    pub observation_cardinality: u16,
    /// Reserved oracle capacity the buffer may grow into.
    pub observation_cardinality_next: u16,
    /// Protocol-fee denominator for token0 fees: 0 (off) or 4..=10.
    pub fee_protocol_0: u8,
    /// Protocol-fee denominator for token1 fees: 0 (off) or 4..=10.
    pub fee_protocol_1: u8,
    /// Mutual-exclusion flag. Every mutating entry point requires `true` and
    /// holds `false` for its duration.
    pub unlocked: bool,
}

/// Protocol fees accrued and not yet collected, in raw token units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolFees {
    pub token0: u128,
    pub token1: u128,
}
