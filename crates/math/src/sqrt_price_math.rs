//! # Sqrt Price Math
//!
//! Token deltas for a sqrt-price move at constant liquidity, and the next
//! sqrt price reached by a given input or output amount. Rounding always
//! favors the pool: amounts owed to it round up, amounts paid out round
//! down, and price moves round toward less output.

use defione_types::{CoreResult, EngineError, U256, Q96};

use crate::full_math::{div_rounding_up, mul_div, mul_div_rounding_up, to_u128};

/// Amount of token0 between two sqrt prices at `liquidity`:
/// `L * (upper - lower) / (upper * lower)`, scaled out of Q64.96.
pub fn get_amount0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> CoreResult<u128> {
    let (lower, upper) = if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    } else {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    };
    if lower.is_zero() {
        return Err(EngineError::InvalidPrice);
    }

    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = upper - lower;

    let amount = if round_up {
        div_rounding_up(mul_div_rounding_up(numerator1, numerator2, upper)?, lower)?
    } else {
        mul_div(numerator1, numerator2, upper)? / lower
    };
    to_u128(amount)
}

/// Amount of token1 between two sqrt prices at `liquidity`:
/// `L * (upper - lower)`, scaled out of Q64.96.
pub fn get_amount1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> CoreResult<u128> {
    let (lower, upper) = if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    } else {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96)
    };

    let amount = if round_up {
        mul_div_rounding_up(U256::from(liquidity), upper - lower, Q96)?
    } else {
        mul_div(U256::from(liquidity), upper - lower, Q96)?
    };
    to_u128(amount)
}

/// Signed token0 delta for a liquidity change: negative deltas round down
/// (paid out), positive deltas round up (owed in).
pub fn get_amount0_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> CoreResult<i128> {
    if liquidity < 0 {
        let amount = get_amount0_delta(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-as_i128(amount)?)
    } else {
        let amount = get_amount0_delta(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        as_i128(amount)
    }
}

/// Signed token1 delta for a liquidity change; same rounding as
/// [`get_amount0_delta_signed`].
pub fn get_amount1_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> CoreResult<i128> {
    if liquidity < 0 {
        let amount = get_amount1_delta(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity.unsigned_abs(),
            false,
        )?;
        Ok(-as_i128(amount)?)
    } else {
        let amount = get_amount1_delta(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        as_i128(amount)
    }
}

fn as_i128(amount: u128) -> CoreResult<i128> {
    i128::try_from(amount).map_err(|_| EngineError::Overflow)
}

/// Next sqrt price after swapping in `amount_in` of token0 (`zero_for_one`)
/// or token1, rounded so the pool never under-charges.
pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: u128,
    zero_for_one: bool,
) -> CoreResult<U256> {
    if sqrt_price_x96.is_zero() {
        return Err(EngineError::InvalidPrice);
    }
    if liquidity == 0 {
        return Err(EngineError::InsufficientLiquidity);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Next sqrt price after swapping out `amount_out`, rounded so the pool
/// never over-pays.
pub fn get_next_sqrt_price_from_output(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_out: u128,
    zero_for_one: bool,
) -> CoreResult<U256> {
    if sqrt_price_x96.is_zero() {
        return Err(EngineError::InvalidPrice);
    }
    if liquidity == 0 {
        return Err(EngineError::InsufficientLiquidity);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}

/// `sqrt_price * L / (L ± amount * sqrt_price)`, rounded up.
///
/// Prefers the precise form; when `L + amount * sqrt_price` exceeds 256 bits
/// it falls back to the equivalent `L / (L / sqrt_price ± amount)`.
fn get_next_sqrt_price_from_amount0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> CoreResult<U256> {
    if amount == 0 {
        return Ok(sqrt_price_x96);
    }
    let numerator1 = U256::from(liquidity) << 96;
    let amount = U256::from(amount);

    if add {
        if let Some(product) = amount.checked_mul(sqrt_price_x96) {
            if let Some(denominator) = numerator1.checked_add(product) {
                return mul_div_rounding_up(numerator1, sqrt_price_x96, denominator);
            }
        }
        div_rounding_up(numerator1, (numerator1 / sqrt_price_x96) + amount)
    } else {
        let product = amount
            .checked_mul(sqrt_price_x96)
            .ok_or(EngineError::Overflow)?;
        if numerator1 <= product {
            // Not enough virtual reserves of token0 to withdraw `amount`.
            return Err(EngineError::InsufficientLiquidity);
        }
        mul_div_rounding_up(numerator1, sqrt_price_x96, numerator1 - product)
    }
}

/// `sqrt_price ± amount / L`, rounded down.
fn get_next_sqrt_price_from_amount1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> CoreResult<U256> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = mul_div(U256::from(amount), Q96, liquidity)?;
        let next = sqrt_price_x96
            .checked_add(quotient)
            .ok_or(EngineError::Overflow)?;
        // Sqrt prices are 160-bit quantities.
        if next.bits() > 160 {
            return Err(EngineError::PriceOutOfRange);
        }
        Ok(next)
    } else {
        let quotient = mul_div_rounding_up(U256::from(amount), Q96, liquidity)?;
        if sqrt_price_x96 <= quotient {
            return Err(EngineError::InsufficientLiquidity);
        }
        Ok(sqrt_price_x96 - quotient)
    }
}
