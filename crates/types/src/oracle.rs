//! Oracle observation entry.

use serde::{Deserialize, Serialize};

use crate::num::U256;

/// One slot of the oracle's ring buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Timestamp of the observation, truncated to 32 bits. Comparisons must
    /// be wraparound-safe; the raw ordering is meaningless across the 2^32
    /// boundary.
    pub block_timestamp: u32,
    /// Running sum of tick * seconds since pool initialization.
    pub tick_cumulative: i64,
    /// Running sum of seconds / max(1, liquidity), as a Q128.128.
    pub seconds_per_liquidity_cumulative_x128: U256,
    /// Whether the slot has ever been written. Reserved-but-unwritten slots
    /// carry a sentinel timestamp and `initialized = false`.
    pub initialized: bool,
}
