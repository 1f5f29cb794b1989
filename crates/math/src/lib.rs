//! # DeFiOne Math
//!
//! Deterministic fixed-point math for the pool engine: full-precision
//! multiply-divide, tick/sqrt-price conversions, token deltas for price
//! moves, and the single-step swap kernel. Everything here is pure; all
//! fallible paths return [`defione_types::CoreResult`].

pub mod full_math;
pub mod liquidity_math;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick_math;

pub use full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
pub use liquidity_math::add_delta;
pub use swap_math::{compute_swap_step, SwapStep};
pub use tick_math::{get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio};
