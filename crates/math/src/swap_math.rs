//! # Swap Step Math
//!
//! One step of a swap: move the price from the current value toward a target
//! (the next initialized tick or the caller's price limit), bounded by the
//! amount remaining and charging the fee on the input side.

use defione_types::{CoreResult, U256, FEE_PIPS_DENOMINATOR};

use crate::full_math::{mul_div, mul_div_rounding_up, to_u128};
use crate::sqrt_price_math::{
    get_amount0_delta, get_amount1_delta, get_next_sqrt_price_from_input,
    get_next_sqrt_price_from_output,
};

/// Result of a single swap step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStep {
    /// Price after the step. Equals the target iff the step exhausted the
    /// range rather than the remaining amount.
    pub sqrt_ratio_next_x96: U256,
    /// Input consumed, excluding the fee.
    pub amount_in: u128,
    /// Output produced.
    pub amount_out: u128,
    /// Fee taken from the input token.
    pub fee_amount: u128,
}

/// Compute how far `amount_remaining` moves the price toward
/// `sqrt_ratio_target_x96` at constant `liquidity`.
///
/// `amount_remaining >= 0` means exact input (fee deducted from it first);
/// negative means exact output. The direction is implied by the target being
/// below (`zero_for_one`) or above the current price.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_pips: u32,
) -> CoreResult<SwapStep> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = amount_remaining >= 0;

    let sqrt_ratio_next_x96;
    let mut amount_in = 0u128;
    let mut amount_out = 0u128;

    if exact_in {
        let amount_remaining_less_fee = to_u128(mul_div(
            U256::from(amount_remaining as u128),
            U256::from(FEE_PIPS_DENOMINATOR - fee_pips),
            U256::from(FEE_PIPS_DENOMINATOR),
        )?)?;
        amount_in = if zero_for_one {
            get_amount0_delta(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?
        } else {
            get_amount1_delta(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                true,
            )?
        };
        if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_next_x96 = sqrt_ratio_target_x96;
        } else {
            sqrt_ratio_next_x96 = get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?;
        }
    } else {
        amount_out = if zero_for_one {
            get_amount1_delta(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?
        } else {
            get_amount0_delta(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                false,
            )?
        };
        let amount_out_requested = amount_remaining.unsigned_abs();
        if amount_out_requested >= amount_out {
            sqrt_ratio_next_x96 = sqrt_ratio_target_x96;
        } else {
            sqrt_ratio_next_x96 = get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                amount_out_requested,
                zero_for_one,
            )?;
        }
    }

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    if zero_for_one {
        if !(max && exact_in) {
            amount_in = get_amount0_delta(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = get_amount1_delta(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?;
        }
    } else {
        if !(max && exact_in) {
            amount_in = get_amount1_delta(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = get_amount0_delta(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                false,
            )?;
        }
    }

    // Rounding in the recomputation must never pay out more than requested.
    if !exact_in && amount_out > amount_remaining.unsigned_abs() {
        amount_out = amount_remaining.unsigned_abs();
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // The range absorbed everything; the leftover input is the fee.
        (amount_remaining as u128) - amount_in
    } else {
        to_u128(mul_div_rounding_up(
            U256::from(amount_in),
            U256::from(fee_pips),
            U256::from(FEE_PIPS_DENOMINATOR - fee_pips),
        )?)?
    };

    Ok(SwapStep {
        sqrt_ratio_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use defione_types::Q96;
    use proptest::prelude::*;

    const LIQUIDITY: u128 = 2_000_000_000_000_000_000;

    fn q96_times(numerator: u128, denominator: u128) -> U256 {
        Q96 * U256::from(numerator) / U256::from(denominator)
    }

    #[test]
    fn test_exact_in_partial_fill_consumes_everything() {
        // Far target, small amount: in + fee == amount_remaining exactly.
        let step =
            compute_swap_step(Q96, q96_times(8, 10), LIQUIDITY, 1_000_000, 3000).unwrap();
        assert!(step.sqrt_ratio_next_x96 > q96_times(8, 10));
        assert!(step.sqrt_ratio_next_x96 < Q96);
        assert_eq!(step.amount_in + step.fee_amount, 1_000_000);
        assert!(step.amount_out > 0);
    }

    #[test]
    fn test_exact_in_reaches_target() {
        let target = q96_times(9_999, 10_000);
        let step =
            compute_swap_step(Q96, target, LIQUIDITY, 1_000_000_000_000_000, 3000).unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, target);
        // Reaching the target leaves input unspent; total consumed is less.
        assert!(step.amount_in + step.fee_amount < 1_000_000_000_000_000);
    }

    #[test]
    fn test_exact_in_fee_exact_small_amount() {
        // 1000 in at 0.3%: fee-less remainder is 997, the wide range absorbs
        // it, and the step fee is the remaining 3.
        let step = compute_swap_step(Q96, q96_times(1, 2), LIQUIDITY, 1_000, 3000).unwrap();
        assert_eq!(step.fee_amount, 3);
        assert_eq!(step.amount_in, 997);
    }

    #[test]
    fn test_exact_out_capped_at_request() {
        let step = compute_swap_step(Q96, q96_times(99, 100), LIQUIDITY, -1_000_000, 3000)
            .unwrap();
        assert!(step.amount_out <= 1_000_000);
        assert!(step.amount_in > 0);
        assert!(step.fee_amount > 0);
        assert!(step.sqrt_ratio_next_x96 < Q96);
    }

    #[test]
    fn test_exact_out_target_bound() {
        // Huge requested output stops at the target price.
        let target = q96_times(999, 1000);
        let step = compute_swap_step(Q96, target, LIQUIDITY, -(i128::MAX / 2), 3000).unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, target);
    }

    #[test]
    fn test_one_for_zero_direction() {
        let step = compute_swap_step(Q96, q96_times(101, 100), LIQUIDITY, 1_000_000, 3000)
            .unwrap();
        assert!(step.sqrt_ratio_next_x96 > Q96);
    }

    #[test]
    fn test_zero_fee_tier() {
        let step = compute_swap_step(Q96, q96_times(99, 100), LIQUIDITY, 1_000_000, 0).unwrap();
        assert_eq!(step.fee_amount, 0);
        assert_eq!(step.amount_in, 1_000_000);
    }

    #[test]
    fn test_current_equals_target_is_a_noop() {
        let step = compute_swap_step(Q96, Q96, LIQUIDITY, 1_000, 3000).unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, Q96);
        assert_eq!(step.amount_in, 0);
        assert_eq!(step.amount_out, 0);
    }

    proptest! {
        #[test]
        fn prop_exact_in_never_overspends(
            amount in 1i128..1_000_000_000_000i128,
            fee in 0u32..100_000u32,
        ) {
            let step = compute_swap_step(
                Q96,
                q96_times(9, 10),
                LIQUIDITY,
                amount,
                fee,
            ).unwrap();
            prop_assert!(step.amount_in + step.fee_amount <= amount as u128);
        }

        #[test]
        fn prop_exact_out_never_overpays(
            amount in 1i128..1_000_000_000i128,
            fee in 0u32..100_000u32,
        ) {
            let step = compute_swap_step(
                Q96,
                q96_times(9, 10),
                LIQUIDITY,
                -amount,
                fee,
            ).unwrap();
            prop_assert!(step.amount_out <= amount as u128);
        }
    }
}
