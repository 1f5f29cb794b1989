//! # Liquidity Math

use defione_types::{CoreResult, EngineError};

/// Apply a signed liquidity delta to an unsigned total.
///
/// Removing more than is present and exceeding `u128::MAX` are both errors,
/// never wraps.
pub fn add_delta(x: u128, y: i128) -> CoreResult<u128> {
    if y < 0 {
        x.checked_sub(y.unsigned_abs())
            .ok_or(EngineError::InsufficientLiquidity)
    } else {
        x.checked_add(y as u128)
            .ok_or(EngineError::LiquidityOverflow)
    }
}
