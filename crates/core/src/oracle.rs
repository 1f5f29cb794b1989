//! # Price Oracle
//!
//! Ring buffer of cumulative observations (tick-seconds and seconds per
//! unit of liquidity). At most one observation is stored per timestamp;
//! readers interpolate between stored slots and may extrapolate from the
//! newest one to the current time. Timestamps are 32-bit and wrap; all
//! comparisons go through a comparator anchored at the current time.

use defione_types::{CoreResult, EngineError, Observation, U256};
use serde::{Deserialize, Serialize};

/// Observation ring buffer. The vector's length always equals the reserved
/// cardinality; reserved-but-unwritten slots hold a nonzero sentinel
/// timestamp so their slot is paid for ahead of use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationBuffer {
    observations: Vec<Observation>,
}

/// Comparator for 32-bit timestamps that may have wrapped, anchored at
/// `time`: everything at or before `time` (modulo 2^32) keeps its order.
fn lte(time: u32, a: u32, b: u32) -> bool {
    if a <= time && b <= time {
        return a <= b;
    }
    let a_adjusted = if a > time { a as u64 } else { a as u64 + (1 << 32) };
    let b_adjusted = if b > time { b as u64 } else { b as u64 + (1 << 32) };
    a_adjusted <= b_adjusted
}

/// Accumulate from `last` to `time` at the prevailing tick and liquidity.
fn transform(last: &Observation, time: u32, tick: i32, liquidity: u128) -> Observation {
    let delta = time.wrapping_sub(last.block_timestamp);
    Observation {
        block_timestamp: time,
        tick_cumulative: last
            .tick_cumulative
            .wrapping_add(tick as i64 * delta as i64),
        seconds_per_liquidity_cumulative_x128: last
            .seconds_per_liquidity_cumulative_x128
            .wrapping_add((U256::from(delta) << 128) / U256::from(liquidity.max(1))),
        initialized: true,
    }
}

impl ObservationBuffer {
    /// Write the first observation. Returns `(cardinality, cardinality_next)`.
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.observations.clear();
        self.observations.push(Observation {
            block_timestamp: time,
            tick_cumulative: 0,
            seconds_per_liquidity_cumulative_x128: U256::zero(),
            initialized: true,
        });
        (1, 1)
    }

    /// Write an observation for `time`, no more than once per timestamp.
    /// Returns the updated `(index, cardinality)`; cardinality only grows
    /// into reserved slots when the write lands on the last live slot.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        index: u16,
        time: u32,
        tick: i32,
        liquidity: u128,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.observations[index as usize];
        if last.block_timestamp == time {
            return (index, cardinality);
        }

        let cardinality_updated = if cardinality_next > cardinality && index == cardinality - 1 {
            cardinality_next
        } else {
            cardinality
        };
        let index_updated = (index + 1) % cardinality_updated;
        self.observations[index_updated as usize] = transform(&last, time, tick, liquidity);
        (index_updated, cardinality_updated)
    }

    /// Reserve capacity for `next` observations. No-op when not growing.
    pub fn grow(&mut self, current: u16, next: u16) -> u16 {
        if next <= current {
            return current;
        }
        for _ in current..next {
            // nonzero sentinel timestamp marks the slot reserved
            self.observations.push(Observation {
                block_timestamp: 1,
                ..Observation::default()
            });
        }
        next
    }

    /// Cumulative values as of `seconds_ago` before `time`.
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> CoreResult<(i64, U256)> {
        if cardinality == 0 {
            return Err(EngineError::NotInitialized);
        }
        if seconds_ago == 0 {
            let mut last = self.observations[index as usize];
            if last.block_timestamp != time {
                last = transform(&last, time, tick, liquidity);
            }
            return Ok((
                last.tick_cumulative,
                last.seconds_per_liquidity_cumulative_x128,
            ));
        }

        let target = time.wrapping_sub(seconds_ago);
        let (before_or_at, at_or_after) =
            self.get_surrounding_observations(time, target, tick, index, liquidity, cardinality)?;

        if target == before_or_at.block_timestamp {
            Ok((
                before_or_at.tick_cumulative,
                before_or_at.seconds_per_liquidity_cumulative_x128,
            ))
        } else if target == at_or_after.block_timestamp {
            Ok((
                at_or_after.tick_cumulative,
                at_or_after.seconds_per_liquidity_cumulative_x128,
            ))
        } else {
            // interpolate between the two surrounding observations
            let observation_delta = at_or_after
                .block_timestamp
                .wrapping_sub(before_or_at.block_timestamp);
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp);
            let tick_cumulative = before_or_at.tick_cumulative.wrapping_add(
                at_or_after
                    .tick_cumulative
                    .wrapping_sub(before_or_at.tick_cumulative)
                    / observation_delta as i64
                    * target_delta as i64,
            );
            let seconds_per_liquidity = before_or_at
                .seconds_per_liquidity_cumulative_x128
                .wrapping_add(
                    at_or_after
                        .seconds_per_liquidity_cumulative_x128
                        .wrapping_sub(before_or_at.seconds_per_liquidity_cumulative_x128)
                        * U256::from(target_delta)
                        / U256::from(observation_delta),
                );
            Ok((tick_cumulative, seconds_per_liquidity))
        }
    }

    /// Batched [`Self::observe_single`] over several lookback offsets.
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> CoreResult<(Vec<i64>, Vec<U256>)> {
        if cardinality == 0 {
            return Err(EngineError::NotInitialized);
        }
        let mut tick_cumulatives = Vec::with_capacity(seconds_agos.len());
        let mut seconds_per_liquidity_cumulatives = Vec::with_capacity(seconds_agos.len());
        for &seconds_ago in seconds_agos {
            let (tick_cumulative, seconds_per_liquidity) =
                self.observe_single(time, seconds_ago, tick, index, liquidity, cardinality)?;
            tick_cumulatives.push(tick_cumulative);
            seconds_per_liquidity_cumulatives.push(seconds_per_liquidity);
        }
        Ok((tick_cumulatives, seconds_per_liquidity_cumulatives))
    }

    /// Observations straddling `target`: the newest at or before it, and the
    /// one after. When `target` is at or past the newest observation, the
    /// upper bound is synthesized by extrapolation.
    fn get_surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> CoreResult<(Observation, Observation)> {
        let mut before_or_at = self.observations[index as usize];

        if lte(time, before_or_at.block_timestamp, target) {
            if before_or_at.block_timestamp == target {
                return Ok((before_or_at, before_or_at));
            }
            return Ok((before_or_at, transform(&before_or_at, target, tick, liquidity)));
        }

        // oldest live observation
        before_or_at = self.observations[((index + 1) % cardinality) as usize];
        if !before_or_at.initialized {
            before_or_at = self.observations[0];
        }
        if !lte(time, before_or_at.block_timestamp, target) {
            return Err(EngineError::ObservationNotFound);
        }

        Ok(self.binary_search(time, target, index, cardinality))
    }

    /// Find the pair of initialized observations straddling `target`. Only
    /// called once the target is known to be within the recorded window.
    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> (Observation, Observation) {
        let mut l = ((index as usize + 1) % cardinality as usize) as i64;
        let mut r = l + cardinality as i64 - 1;

        loop {
            let i = (l + r) / 2;
            let before_or_at = self.observations[(i % cardinality as i64) as usize];
            if !before_or_at.initialized {
                // reserved slot; the live window is entirely above it
                l = i + 1;
                continue;
            }
            let at_or_after = self.observations[((i + 1) % cardinality as i64) as usize];

            let target_at_or_after = lte(time, before_or_at.block_timestamp, target);
            if target_at_or_after && lte(time, target, at_or_after.block_timestamp) {
                return (before_or_at, at_or_after);
            }
            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }
}
