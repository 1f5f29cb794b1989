//! # Tick Math
//!
//! Conversions between ticks and Q64.96 sqrt prices. A tick `i` maps to
//! `sqrt(1.0001^i) * 2^96`; the inverse returns the greatest tick whose
//! ratio does not exceed the input, so the pair round-trips exactly.

use defione_types::{CoreResult, EngineError, U256, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK};

use crate::full_math::to_u512;

/// `floor(sqrt(1.0001^-(2^k)) * 2^128)` for each bit `k` of a tick's
/// magnitude, precomputed so the forward conversion is twenty multiplies at
/// worst.
const TICK_MULTIPLIERS: [u128; 20] = [
    0xfffcb933bd6fad37aa2d162d1a594001,
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// `(a * b) >> 128` where `b < 2^128`, so the result fits 256 bits.
fn mul_shift(ratio: U256, multiplier: u128) -> U256 {
    let product = to_u512(ratio) * to_u512(U256::from(multiplier));
    let shifted = product >> 128;
    let mut limbs = [0u64; 4];
    limbs.copy_from_slice(&shifted.0[..4]);
    U256(limbs)
}

/// Sqrt price at `tick` as a Q64.96.
///
/// Multiplies out the Q128.128 factors for each set bit of `|tick|`, takes
/// the reciprocal for positive ticks, then narrows to Q64.96 rounding up so
/// that [`get_tick_at_sqrt_ratio`] of the result returns `tick` exactly.
pub fn get_sqrt_ratio_at_tick(tick: i32) -> CoreResult<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(EngineError::TickOutOfRange);
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 {
        U256::from(TICK_MULTIPLIERS[0])
    } else {
        U256::one() << 128
    };
    for (bit, &multiplier) in TICK_MULTIPLIERS.iter().enumerate().skip(1) {
        if abs_tick & (1 << bit) != 0 {
            ratio = mul_shift(ratio, multiplier);
        }
    }
    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    let shifted = ratio >> 32;
    if (ratio & U256::from(u32::MAX)).is_zero() {
        Ok(shifted)
    } else {
        Ok(shifted + U256::one())
    }
}

/// Greatest tick whose sqrt ratio is at most `sqrt_ratio_x96`.
///
/// The input must lie in `[MIN_SQRT_RATIO, MAX_SQRT_RATIO]`, the exact image
/// of the valid tick range, so converting a tick to its ratio and back is
/// the identity at both endpoints.
pub fn get_tick_at_sqrt_ratio(sqrt_ratio_x96: U256) -> CoreResult<i32> {
    if sqrt_ratio_x96 < MIN_SQRT_RATIO || sqrt_ratio_x96 > MAX_SQRT_RATIO {
        return Err(EngineError::PriceOutOfRange);
    }

    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    while lo < hi {
        // biased toward hi so the loop terminates when lo == hi - 1
        let mid = lo + (hi - lo + 1) / 2;
        if get_sqrt_ratio_at_tick(mid)? <= sqrt_ratio_x96 {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}
