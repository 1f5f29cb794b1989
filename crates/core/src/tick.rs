//! # Tick Registry
//!
//! Per-tick liquidity totals and outside-accumulator bookkeeping. The
//! registry only stores ticks that back at least one position; crossing
//! mirrors the outside accumulators so fee growth inside a range stays
//! consistent no matter how often the price passes through it.

use std::collections::BTreeMap;

use defione_math::liquidity_math;
use defione_types::{CoreResult, EngineError, TickInfo, U256, MAX_TICK, MIN_TICK};
use serde::{Deserialize, Serialize};

/// All initialized ticks of one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickMap {
    ticks: BTreeMap<i32, TickInfo>,
}

/// Cap on `liquidity_gross` per tick so that the sum over every usable tick
/// cannot exceed `u128::MAX`.
pub fn tick_spacing_to_max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}

impl TickMap {
    /// Snapshot of one tick; default (all zero) when uninitialized.
    pub fn get(&self, tick: i32) -> TickInfo {
        self.ticks.get(&tick).cloned().unwrap_or_default()
    }

    /// Apply a liquidity delta to `tick` as the `upper` or lower bound of a
    /// position. Returns whether the tick flipped between initialized and
    /// uninitialized.
    ///
    /// A tick initialized at or below the current tick snapshots the global
    /// accumulators into its outside values, so that "growth outside"
    /// is measured relative to the moment of initialization.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: i64,
        time: u32,
        upper: bool,
        max_liquidity: u128,
    ) -> CoreResult<bool> {
        let mut info = self.get(tick);

        let liquidity_gross_before = info.liquidity_gross;
        let liquidity_gross_after =
            liquidity_math::add_delta(liquidity_gross_before, liquidity_delta)?;
        if liquidity_gross_after > max_liquidity {
            return Err(EngineError::LiquidityOverflow);
        }

        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            if tick <= tick_current {
                info.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                info.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
                info.seconds_per_liquidity_outside_x128 =
                    seconds_per_liquidity_cumulative_x128;
                info.tick_cumulative_outside = tick_cumulative;
                info.seconds_outside = time;
            }
            info.initialized = true;
        }

        info.liquidity_gross = liquidity_gross_after;
        info.liquidity_net = if upper {
            info.liquidity_net
                .checked_sub(liquidity_delta)
                .ok_or(EngineError::Overflow)?
        } else {
            info.liquidity_net
                .checked_add(liquidity_delta)
                .ok_or(EngineError::Overflow)?
        };

        self.ticks.insert(tick, info);
        Ok(flipped)
    }

    /// Drop a tick's state entirely.
    pub fn clear(&mut self, tick: i32) {
        self.ticks.remove(&tick);
    }

    /// Transition `tick` as the price crosses it; every outside accumulator
    /// mirrors to the other side. Returns the tick's `liquidity_net`.
    pub fn cross(
        &mut self,
        tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: i64,
        time: u32,
    ) -> i128 {
        let info = self.ticks.entry(tick).or_default();
        info.fee_growth_outside_0_x128 =
            fee_growth_global_0_x128.wrapping_sub(info.fee_growth_outside_0_x128);
        info.fee_growth_outside_1_x128 =
            fee_growth_global_1_x128.wrapping_sub(info.fee_growth_outside_1_x128);
        info.seconds_per_liquidity_outside_x128 = seconds_per_liquidity_cumulative_x128
            .wrapping_sub(info.seconds_per_liquidity_outside_x128);
        info.tick_cumulative_outside =
            tick_cumulative.wrapping_sub(info.tick_cumulative_outside);
        info.seconds_outside = time.wrapping_sub(info.seconds_outside);
        info.liquidity_net
    }

    /// Fee growth per unit of liquidity inside `[tick_lower, tick_upper)`
    /// for both tokens. Values wrap modulo 2^256; only differences between
    /// two readings are meaningful.
    pub fn get_fee_growth_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        tick_current: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> (U256, U256) {
        let lower = self.get(tick_lower);
        let upper = self.get(tick_upper);

        let (below_0, below_1) = if tick_current >= tick_lower {
            (lower.fee_growth_outside_0_x128, lower.fee_growth_outside_1_x128)
        } else {
            (
                fee_growth_global_0_x128.wrapping_sub(lower.fee_growth_outside_0_x128),
                fee_growth_global_1_x128.wrapping_sub(lower.fee_growth_outside_1_x128),
            )
        };

        let (above_0, above_1) = if tick_current < tick_upper {
            (upper.fee_growth_outside_0_x128, upper.fee_growth_outside_1_x128)
        } else {
            (
                fee_growth_global_0_x128.wrapping_sub(upper.fee_growth_outside_0_x128),
                fee_growth_global_1_x128.wrapping_sub(upper.fee_growth_outside_1_x128),
            )
        };

        (
            fee_growth_global_0_x128
                .wrapping_sub(below_0)
                .wrapping_sub(above_0),
            fee_growth_global_1_x128
                .wrapping_sub(below_1)
                .wrapping_sub(above_1),
        )
    }
}
