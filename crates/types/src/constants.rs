//! # Engine Constants
//!
//! Tick bounds, sqrt-price bounds and the fixed-point scales shared by every
//! crate in the workspace.

use crate::num::U256;

/// Lowest tick the engine supports. 1.0001^MIN_TICK is the smallest
/// representable price ratio.
pub const MIN_TICK: i32 = -887272;

/// Highest tick the engine supports. Always `-MIN_TICK`.
pub const MAX_TICK: i32 = -MIN_TICK;

/// sqrt(1.0001^MIN_TICK) * 2^96, the sqrt price at [`MIN_TICK`].
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]);

/// sqrt(1.0001^MAX_TICK) * 2^96, the sqrt price at [`MAX_TICK`].
/// Equal to 1461446703485210103287273052203988822378723970342.
pub const MAX_SQRT_RATIO: U256 = U256([
    0x5d951d5263988d26,
    0xefd1fc6a50648849,
    0x00000000fffd8963,
    0,
]);

/// 2^96, the Q64.96 fixed-point unit used for sqrt prices.
pub const Q96: U256 = U256([0, 1 << 32, 0, 0]);

/// 2^128, the Q128.128 fixed-point unit used for fee-growth and
/// seconds-per-liquidity accumulators.
pub const Q128: U256 = U256([0, 0, 1, 0]);

/// Fees are expressed in hundredths of a bip (parts per million).
pub const FEE_PIPS_DENOMINATOR: u32 = 1_000_000;
