//! # Core Error Types
//!
//! Every failure the engine can surface, as a single taxonomy so integrators
//! can branch on the kind (bad range vs. insufficient liquidity vs.
//! reentrancy) instead of a generic fault. All errors are fatal and atomic:
//! a failing operation leaves no partial state behind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine errors shared across the math and pool crates.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    // ========================================================================
    // Arithmetic
    // ========================================================================
    #[error("Multiplication result exceeds 256 bits")]
    Overflow,

    #[error("Division by zero")]
    DivideByZero,

    // ========================================================================
    // Ticks and prices
    // ========================================================================
    #[error("Tick outside the supported range")]
    TickOutOfRange,

    #[error("Sqrt price outside the supported range")]
    PriceOutOfRange,

    #[error("Invalid tick range")]
    InvalidTickRange,

    #[error("Invalid initial sqrt price")]
    InvalidPrice,

    // ========================================================================
    // Liquidity and positions
    // ========================================================================
    #[error("Liquidity exceeds the per-tick maximum")]
    LiquidityOverflow,

    #[error("Insufficient liquidity")]
    InsufficientLiquidity,

    // ========================================================================
    // Pool state machine
    // ========================================================================
    #[error("Invalid pool configuration")]
    InvalidConfig,

    #[error("Pool already initialized")]
    AlreadyInitialized,

    #[error("Pool not initialized")]
    NotInitialized,

    #[error("Pool is locked")]
    Reentrant,

    #[error("Unauthorized")]
    Unauthorized,

    // ========================================================================
    // Swap and payment
    // ========================================================================
    #[error("Amount specified must be nonzero")]
    AmountSpecifiedZero,

    #[error("Price limit already exceeded")]
    PriceLimitAlreadyExceeded,

    #[error("Callback under-paid the pool")]
    InsufficientPayment,

    #[error("Insufficient input amount")]
    InsufficientInputAmount,

    #[error("Invalid protocol fee value")]
    InvalidFeeProtocol,

    // ========================================================================
    // Oracle
    // ========================================================================
    #[error("No observation at or before the requested time")]
    ObservationNotFound,
}

/// Result type using engine errors.
pub type CoreResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert_ne!(EngineError::Overflow, EngineError::DivideByZero);
        assert_eq!(format!("{}", EngineError::Reentrant), "Pool is locked");
    }
}
