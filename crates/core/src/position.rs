//! # Position Registry
//!
//! Positions keyed by `(owner, tick_lower, tick_upper)`. Fees are settled
//! lazily: every liquidity change (including a zero-delta poke) differences
//! the range's fee growth against the position's last checkpoint and banks
//! the result into `tokens_owed`.

use std::collections::BTreeMap;

use defione_math::{full_math, liquidity_math};
use defione_types::{CoreResult, EngineError, Position, PositionKey, U256, Q128};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// All positions of one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionMap {
    positions: BTreeMap<PositionKey, Position>,
}

impl PositionMap {
    /// Snapshot of one position; default (all zero) when absent.
    pub fn get(&self, key: &PositionKey) -> Position {
        self.positions.get(key).cloned().unwrap_or_default()
    }

    /// Number of stored positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Apply a liquidity delta and settle accrued fees against the given
    /// inside-growth checkpoints.
    ///
    /// A zero delta on an empty position is rejected; there is nothing to
    /// poke. Fee amounts are truncated to 128 bits the same way growth
    /// accumulators wrap, and `tokens_owed` saturates rather than wraps, so
    /// an owner who never collects cannot corrupt later accounting.
    pub fn update(
        &mut self,
        key: &PositionKey,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> CoreResult<()> {
        let mut position = self.get(key);

        let liquidity_next = if liquidity_delta == 0 {
            if position.liquidity == 0 {
                return Err(EngineError::InsufficientLiquidity);
            }
            position.liquidity
        } else {
            liquidity_math::add_delta(position.liquidity, liquidity_delta)?
        };

        let tokens_owed_0 = full_math::mul_div(
            fee_growth_inside_0_x128.wrapping_sub(position.fee_growth_inside_0_last_x128),
            U256::from(position.liquidity),
            Q128,
        )?
        .low_u128();
        let tokens_owed_1 = full_math::mul_div(
            fee_growth_inside_1_x128.wrapping_sub(position.fee_growth_inside_1_last_x128),
            U256::from(position.liquidity),
            Q128,
        )?
        .low_u128();

        position.liquidity = liquidity_next;
        position.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
        position.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;
        if tokens_owed_0 > 0 || tokens_owed_1 > 0 {
            position.tokens_owed_0 = position.tokens_owed_0.saturating_add(tokens_owed_0);
            position.tokens_owed_1 = position.tokens_owed_1.saturating_add(tokens_owed_1);
        }

        self.positions.insert(*key, position);
        Ok(())
    }

    /// Add burned principal to `tokens_owed` so it becomes collectable.
    pub fn credit_owed(&mut self, key: &PositionKey, amount0: u128, amount1: u128) {
        if let Some(position) = self.positions.get_mut(key) {
            position.tokens_owed_0 = position.tokens_owed_0.saturating_add(amount0);
            position.tokens_owed_1 = position.tokens_owed_1.saturating_add(amount1);
        }
    }

    /// Deduct up to the requested amounts from `tokens_owed`, returning what
    /// was actually taken.
    pub fn take_owed(
        &mut self,
        key: &PositionKey,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> (u128, u128) {
        match self.positions.get_mut(key) {
            Some(position) => {
                let amount0 = amount0_requested.min(position.tokens_owed_0);
                let amount1 = amount1_requested.min(position.tokens_owed_1);
                position.tokens_owed_0 -= amount0;
                position.tokens_owed_1 -= amount1;
                (amount0, amount1)
            }
            None => (0, 0),
        }
    }
}

// Struct keys don't survive JSON maps, so positions serialize as an entry
// list.
impl Serialize for PositionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.positions.iter())
    }
}

impl<'de> Deserialize<'de> for PositionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries: Vec<(PositionKey, Position)> = Vec::deserialize(deserializer)?;
        Ok(Self {
            positions: entries.into_iter().collect(),
        })
    }
}
