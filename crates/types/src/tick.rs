//! Per-tick state.

use serde::{Deserialize, Serialize};

use crate::num::U256;

/// Everything the pool tracks for one initialized tick.
///
/// The `*_outside` accumulators are only meaningful relative to a snapshot
/// taken on the same side of the tick; their absolute values depend on when
/// the tick was last crossed and must never be read as ground truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    /// Total position liquidity referencing this tick as a bound.
    pub liquidity_gross: u128,
    /// Net liquidity added when the price crosses this tick left to right.
    pub liquidity_net: i128,
    /// Fee growth per unit of liquidity on the other side of this tick
    /// (relative to the current tick), token0.
    pub fee_growth_outside_0_x128: U256,
    /// Same for token1.
    pub fee_growth_outside_1_x128: U256,
    /// Cumulative tick value on the other side of this tick.
    pub tick_cumulative_outside: i64,
    /// Seconds per unit of in-range liquidity on the other side of this tick.
    pub seconds_per_liquidity_outside_x128: U256,
    /// Seconds spent on the other side of this tick.
    pub seconds_outside: u32,
    /// True iff `liquidity_gross > 0`. Kept explicit so a tick crossed while
    /// uninitialized is distinguishable from a cleared one.
    pub initialized: bool,
}
