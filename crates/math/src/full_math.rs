//! # Full-Precision Multiply-Divide
//!
//! `floor(a * b / d)` and its round-up variant over 256-bit operands, with
//! the product carried in 512 bits so it never loses precision. The result
//! must fit back in 256 bits or the call fails with `Overflow`.

use defione_types::{CoreResult, EngineError, U256};
use uint::construct_uint;

construct_uint! {
    /// 512-bit intermediate for products of two 256-bit values.
    pub(crate) struct U512(8);
}

pub(crate) fn to_u512(x: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(&x.0);
    U512(limbs)
}

pub(crate) fn to_u256(x: U512) -> CoreResult<U256> {
    if x.0[4..].iter().any(|&limb| limb != 0) {
        return Err(EngineError::Overflow);
    }
    let mut limbs = [0u64; 4];
    limbs.copy_from_slice(&x.0[..4]);
    Ok(U256(limbs))
}

/// `floor(a * b / denominator)` at full precision.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> CoreResult<U256> {
    if denominator.is_zero() {
        return Err(EngineError::DivideByZero);
    }
    let product = to_u512(a) * to_u512(b);
    to_u256(product / to_u512(denominator))
}

/// `ceil(a * b / denominator)` at full precision.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> CoreResult<U256> {
    if denominator.is_zero() {
        return Err(EngineError::DivideByZero);
    }
    let product = to_u512(a) * to_u512(b);
    let (quotient, remainder) = product.div_mod(to_u512(denominator));
    let result = to_u256(quotient)?;
    if remainder.is_zero() {
        Ok(result)
    } else {
        result
            .checked_add(U256::one())
            .ok_or(EngineError::Overflow)
    }
}

/// `ceil(a / denominator)`.
pub fn div_rounding_up(a: U256, denominator: U256) -> CoreResult<U256> {
    if denominator.is_zero() {
        return Err(EngineError::DivideByZero);
    }
    let (quotient, remainder) = a.div_mod(denominator);
    if remainder.is_zero() {
        Ok(quotient)
    } else {
        // quotient < a, so the increment cannot overflow
        Ok(quotient + U256::one())
    }
}

/// Narrow a [`U256`] into a `u128`, failing if the high bits are set.
pub fn to_u128(x: U256) -> CoreResult<u128> {
    if x.bits() > 128 {
        return Err(EngineError::Overflow);
    }
    Ok(x.low_u128())
}

/// Narrow a [`U256`] into an `i128`, failing if it exceeds `i128::MAX`.
pub fn to_i128(x: U256) -> CoreResult<i128> {
    let value = to_u128(x)?;
    i128::try_from(value).map_err(|_| EngineError::Overflow)
}
