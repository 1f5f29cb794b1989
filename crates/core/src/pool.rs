//! # Pool Engine
//!
//! The concentrated-liquidity pool itself: positions over tick ranges,
//! tick-by-tick swaps, flash loans, protocol fees and the price oracle,
//! glued together over an external [`TokenLedger`].
//!
//! Every mutating entry point takes the pool lock, runs against live state
//! and rolls the pool back to its pre-call snapshot on error, so a failed
//! call leaves no partial pool state behind. Transfers already executed by
//! a callback are the ledger's concern, not the pool's.

use defione_math::{
    full_math, liquidity_math, swap_math,
    sqrt_price_math::{get_amount0_delta_signed, get_amount1_delta_signed},
    tick_math::{get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio},
};
use defione_types::{
    AccountId, CoreResult, EngineError, PoolConfig, Position, PositionKey, ProtocolFees, Slot0,
    TickInfo, TokenId, U256, FEE_PIPS_DENOMINATOR, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO,
    MIN_TICK, Q128,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ledger::{FlashCallback, MintCallback, SwapCallback, TokenLedger};
use crate::oracle::ObservationBuffer;
use crate::position::PositionMap;
use crate::tick::{tick_spacing_to_max_liquidity_per_tick, TickMap};
use crate::tick_bitmap::TickBitmap;

/// A single pool. Construct with [`Pool::new`], then [`Pool::initialize`]
/// with a starting price before any other operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    config: PoolConfig,
    slot0: Slot0,
    liquidity: u128,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    protocol_fees: ProtocolFees,
    ticks: TickMap,
    tick_bitmap: TickBitmap,
    positions: PositionMap,
    observations: ObservationBuffer,
}

/// Cached values for the duration of one swap.
struct SwapCache {
    liquidity_start: u128,
    fee_protocol: u8,
    seconds_per_liquidity_cumulative_x128: U256,
    tick_cumulative: i64,
    computed_latest_observation: bool,
}

/// Running state of the swap loop, committed to storage at the end.
struct SwapState {
    amount_specified_remaining: i128,
    amount_calculated: i128,
    sqrt_price_x96: U256,
    tick: i32,
    fee_growth_global_x128: U256,
    protocol_fee: u128,
    liquidity: u128,
}

impl Pool {
    /// Create an uninitialized pool.
    ///
    /// `token0` must sort strictly below `token1`; the fee is in hundredths
    /// of a bip and must be below 100%.
    pub fn new(
        account: AccountId,
        owner: AccountId,
        token0: TokenId,
        token1: TokenId,
        fee: u32,
        tick_spacing: i32,
    ) -> CoreResult<Self> {
        if token0 >= token1
            || fee >= FEE_PIPS_DENOMINATOR
            || tick_spacing <= 0
            || tick_spacing > 16_384
        {
            return Err(EngineError::InvalidConfig);
        }
        let max_liquidity_per_tick = tick_spacing_to_max_liquidity_per_tick(tick_spacing);
        Ok(Self {
            config: PoolConfig {
                account,
                owner,
                token0,
                token1,
                fee,
                tick_spacing,
                max_liquidity_per_tick,
            },
            slot0: Slot0::default(),
            liquidity: 0,
            fee_growth_global_0_x128: U256::zero(),
            fee_growth_global_1_x128: U256::zero(),
            protocol_fees: ProtocolFees::default(),
            ticks: TickMap::default(),
            tick_bitmap: TickBitmap::default(),
            positions: PositionMap::default(),
            observations: ObservationBuffer::default(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn slot0(&self) -> &Slot0 {
        &self.slot0
    }

    /// Liquidity currently in range.
    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn fee_growth_global_0_x128(&self) -> U256 {
        self.fee_growth_global_0_x128
    }

    pub fn fee_growth_global_1_x128(&self) -> U256 {
        self.fee_growth_global_1_x128
    }

    pub fn protocol_fees(&self) -> ProtocolFees {
        self.protocol_fees
    }

    pub fn position(&self, owner: AccountId, tick_lower: i32, tick_upper: i32) -> Position {
        self.positions.get(&PositionKey {
            owner,
            tick_lower,
            tick_upper,
        })
    }

    pub fn tick_info(&self, tick: i32) -> TickInfo {
        self.ticks.get(tick)
    }

    /// Set the initial price and write the first oracle observation. Fails
    /// if called twice.
    pub fn initialize(&mut self, sqrt_price_x96: U256, now: u32) -> CoreResult<i32> {
        if !self.slot0.sqrt_price_x96.is_zero() {
            return Err(EngineError::AlreadyInitialized);
        }
        let tick =
            get_tick_at_sqrt_ratio(sqrt_price_x96).map_err(|_| EngineError::InvalidPrice)?;
        let (cardinality, cardinality_next) = self.observations.initialize(now);
        self.slot0 = Slot0 {
            sqrt_price_x96,
            tick,
            observation_index: 0,
            observation_cardinality: cardinality,
            observation_cardinality_next: cardinality_next,
            fee_protocol_0: 0,
            fee_protocol_1: 0,
            unlocked: true,
        };
        debug!(tick, price = %sqrt_price_x96, "pool initialized");
        Ok(tick)
    }

    /// Add `amount` liquidity to `recipient`'s position over the range.
    ///
    /// The owed token amounts are computed first, then the callback must pay
    /// them into the pool account; payment is verified by balance
    /// difference. Returns the amounts charged.
    #[allow(clippy::too_many_arguments)]
    pub fn mint(
        &mut self,
        ledger: &mut dyn TokenLedger,
        callback: &mut dyn MintCallback,
        recipient: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        now: u32,
    ) -> CoreResult<(u128, u128)> {
        self.guarded(|pool| {
            pool.mint_locked(ledger, callback, recipient, tick_lower, tick_upper, amount, now)
        })
    }

    /// Remove `amount` liquidity from the caller's position, crediting the
    /// withdrawn principal to `tokens_owed` for later [`Pool::collect`].
    ///
    /// `amount == 0` is a poke: it settles fees into `tokens_owed` without
    /// changing liquidity.
    pub fn burn(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        now: u32,
    ) -> CoreResult<(u128, u128)> {
        self.guarded(|pool| pool.burn_locked(owner, tick_lower, tick_upper, amount, now))
    }

    /// Pay out up to the requested amounts from the position's
    /// `tokens_owed` balances.
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        &mut self,
        ledger: &mut dyn TokenLedger,
        owner: AccountId,
        recipient: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> CoreResult<(u128, u128)> {
        self.guarded(|pool| {
            let key = PositionKey {
                owner,
                tick_lower,
                tick_upper,
            };
            let (amount0, amount1) =
                pool.positions
                    .take_owed(&key, amount0_requested, amount1_requested);
            if amount0 > 0 {
                ledger.transfer(pool.config.token0, pool.config.account, recipient, amount0)?;
            }
            if amount1 > 0 {
                ledger.transfer(pool.config.token1, pool.config.account, recipient, amount1)?;
            }
            debug!(amount0, amount1, "collected");
            Ok((amount0, amount1))
        })
    }

    /// Swap along the price curve until the specified amount or the price
    /// limit is exhausted.
    ///
    /// `amount_specified > 0` is exact input of the sold token, negative is
    /// exact output of the bought token. Returns the balance deltas
    /// `(amount0, amount1)` from the pool's point of view: positive amounts
    /// are owed to the pool, negative were paid out.
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        &mut self,
        ledger: &mut dyn TokenLedger,
        callback: &mut dyn SwapCallback,
        recipient: AccountId,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        now: u32,
    ) -> CoreResult<(i128, i128)> {
        self.guarded(|pool| {
            pool.swap_locked(
                ledger,
                callback,
                recipient,
                zero_for_one,
                amount_specified,
                sqrt_price_limit_x96,
                now,
            )
        })
    }

    /// Lend out any amount of either token for the duration of the callback,
    /// charging the swap fee on the amounts lent. Overpayment beyond the fee
    /// is donated to in-range liquidity.
    pub fn flash(
        &mut self,
        ledger: &mut dyn TokenLedger,
        callback: &mut dyn FlashCallback,
        recipient: AccountId,
        amount0: u128,
        amount1: u128,
    ) -> CoreResult<()> {
        self.guarded(|pool| pool.flash_locked(ledger, callback, recipient, amount0, amount1))
    }

    /// Set the protocol's share of swap fees per token: 0 (off) or a
    /// denominator in 4..=10 (1/4 .. 1/10 of fees). Owner only.
    pub fn set_fee_protocol(
        &mut self,
        caller: AccountId,
        fee_protocol_0: u8,
        fee_protocol_1: u8,
    ) -> CoreResult<()> {
        self.guarded(|pool| {
            if caller != pool.config.owner {
                return Err(EngineError::Unauthorized);
            }
            let valid = |fp: u8| fp == 0 || (4..=10).contains(&fp);
            if !valid(fee_protocol_0) || !valid(fee_protocol_1) {
                return Err(EngineError::InvalidFeeProtocol);
            }
            pool.slot0.fee_protocol_0 = fee_protocol_0;
            pool.slot0.fee_protocol_1 = fee_protocol_1;
            debug!(fee_protocol_0, fee_protocol_1, "protocol fee set");
            Ok(())
        })
    }

    /// Withdraw accrued protocol fees, up to the requested amounts. Owner
    /// only.
    pub fn collect_protocol(
        &mut self,
        ledger: &mut dyn TokenLedger,
        caller: AccountId,
        recipient: AccountId,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> CoreResult<(u128, u128)> {
        self.guarded(|pool| {
            if caller != pool.config.owner {
                return Err(EngineError::Unauthorized);
            }
            let amount0 = amount0_requested.min(pool.protocol_fees.token0);
            let amount1 = amount1_requested.min(pool.protocol_fees.token1);
            if amount0 > 0 {
                pool.protocol_fees.token0 -= amount0;
                ledger.transfer(pool.config.token0, pool.config.account, recipient, amount0)?;
            }
            if amount1 > 0 {
                pool.protocol_fees.token1 -= amount1;
                ledger.transfer(pool.config.token1, pool.config.account, recipient, amount1)?;
            }
            debug!(amount0, amount1, "protocol fees collected");
            Ok((amount0, amount1))
        })
    }

    /// Cumulative tick and seconds-per-liquidity values as of each
    /// `seconds_ago` before `now`.
    pub fn observe(&self, now: u32, seconds_agos: &[u32]) -> CoreResult<(Vec<i64>, Vec<U256>)> {
        if self.slot0.sqrt_price_x96.is_zero() {
            return Err(EngineError::NotInitialized);
        }
        self.observations.observe(
            now,
            seconds_agos,
            self.slot0.tick,
            self.slot0.observation_index,
            self.liquidity,
            self.slot0.observation_cardinality,
        )
    }

    /// Reserve oracle capacity. Returns the cardinality actually reserved;
    /// never shrinks.
    pub fn increase_observation_cardinality_next(&mut self, next: u16) -> CoreResult<u16> {
        self.guarded(|pool| {
            let old = pool.slot0.observation_cardinality_next;
            let grown = pool.observations.grow(old, next);
            pool.slot0.observation_cardinality_next = grown;
            if grown != old {
                debug!(old, new = grown, "observation cardinality increased");
            }
            Ok(grown)
        })
    }

    /// Cumulative snapshots inside a tick range: tick-seconds, seconds per
    /// liquidity and elapsed seconds. Both boundary ticks must be
    /// initialized. Only differences between two snapshots taken while the
    /// range held liquidity are meaningful.
    pub fn snapshot_cumulatives_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        now: u32,
    ) -> CoreResult<(i64, U256, u32)> {
        if self.slot0.sqrt_price_x96.is_zero() {
            return Err(EngineError::NotInitialized);
        }
        self.check_ticks(tick_lower, tick_upper)?;
        let lower = self.ticks.get(tick_lower);
        let upper = self.ticks.get(tick_upper);
        if !lower.initialized || !upper.initialized {
            return Err(EngineError::InvalidTickRange);
        }

        let tick = self.slot0.tick;
        if tick < tick_lower {
            Ok((
                lower
                    .tick_cumulative_outside
                    .wrapping_sub(upper.tick_cumulative_outside),
                lower
                    .seconds_per_liquidity_outside_x128
                    .wrapping_sub(upper.seconds_per_liquidity_outside_x128),
                lower.seconds_outside.wrapping_sub(upper.seconds_outside),
            ))
        } else if tick < tick_upper {
            let (tick_cumulative, seconds_per_liquidity) = self.observations.observe_single(
                now,
                0,
                tick,
                self.slot0.observation_index,
                self.liquidity,
                self.slot0.observation_cardinality,
            )?;
            Ok((
                tick_cumulative
                    .wrapping_sub(lower.tick_cumulative_outside)
                    .wrapping_sub(upper.tick_cumulative_outside),
                seconds_per_liquidity
                    .wrapping_sub(lower.seconds_per_liquidity_outside_x128)
                    .wrapping_sub(upper.seconds_per_liquidity_outside_x128),
                now.wrapping_sub(lower.seconds_outside)
                    .wrapping_sub(upper.seconds_outside),
            ))
        } else {
            Ok((
                upper
                    .tick_cumulative_outside
                    .wrapping_sub(lower.tick_cumulative_outside),
                upper
                    .seconds_per_liquidity_outside_x128
                    .wrapping_sub(lower.seconds_per_liquidity_outside_x128),
                upper.seconds_outside.wrapping_sub(lower.seconds_outside),
            ))
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    /// Take the lock, run `op`, and roll back to the pre-call state if it
    /// fails.
    fn guarded<T, F>(&mut self, op: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Self) -> CoreResult<T>,
    {
        if self.slot0.sqrt_price_x96.is_zero() {
            return Err(EngineError::NotInitialized);
        }
        if !self.slot0.unlocked {
            return Err(EngineError::Reentrant);
        }
        self.slot0.unlocked = false;
        let snapshot = self.clone();
        match op(self) {
            Ok(value) => {
                self.slot0.unlocked = true;
                Ok(value)
            }
            Err(error) => {
                *self = snapshot;
                self.slot0.unlocked = true;
                Err(error)
            }
        }
    }

    fn check_ticks(&self, tick_lower: i32, tick_upper: i32) -> CoreResult<()> {
        if tick_lower >= tick_upper
            || tick_lower < MIN_TICK
            || tick_upper > MAX_TICK
            || tick_lower % self.config.tick_spacing != 0
            || tick_upper % self.config.tick_spacing != 0
        {
            return Err(EngineError::InvalidTickRange);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn mint_locked(
        &mut self,
        ledger: &mut dyn TokenLedger,
        callback: &mut dyn MintCallback,
        recipient: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        now: u32,
    ) -> CoreResult<(u128, u128)> {
        if amount == 0 {
            return Err(EngineError::InsufficientLiquidity);
        }
        let delta = i128::try_from(amount).map_err(|_| EngineError::LiquidityOverflow)?;
        let (amount0_int, amount1_int) =
            self.modify_position(recipient, tick_lower, tick_upper, delta, now)?;
        // positive liquidity delta never pays out
        let amount0 = amount0_int as u128;
        let amount1 = amount1_int as u128;

        let balance0_before = if amount0 > 0 {
            ledger.balance_of(self.config.token0, self.config.account)
        } else {
            0
        };
        let balance1_before = if amount1 > 0 {
            ledger.balance_of(self.config.token1, self.config.account)
        } else {
            0
        };
        callback.on_mint(ledger, amount0, amount1)?;
        if amount0 > 0 {
            let required = balance0_before
                .checked_add(amount0)
                .ok_or(EngineError::Overflow)?;
            if ledger.balance_of(self.config.token0, self.config.account) < required {
                return Err(EngineError::InsufficientPayment);
            }
        }
        if amount1 > 0 {
            let required = balance1_before
                .checked_add(amount1)
                .ok_or(EngineError::Overflow)?;
            if ledger.balance_of(self.config.token1, self.config.account) < required {
                return Err(EngineError::InsufficientPayment);
            }
        }

        debug!(tick_lower, tick_upper, amount, amount0, amount1, "minted");
        Ok((amount0, amount1))
    }

    fn burn_locked(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        now: u32,
    ) -> CoreResult<(u128, u128)> {
        let delta = i128::try_from(amount).map_err(|_| EngineError::LiquidityOverflow)?;
        let (amount0_int, amount1_int) =
            self.modify_position(owner, tick_lower, tick_upper, -delta, now)?;
        let amount0 = amount0_int.unsigned_abs();
        let amount1 = amount1_int.unsigned_abs();

        if amount0 > 0 || amount1 > 0 {
            let key = PositionKey {
                owner,
                tick_lower,
                tick_upper,
            };
            self.positions.credit_owed(&key, amount0, amount1);
        }

        debug!(tick_lower, tick_upper, amount, amount0, amount1, "burned");
        Ok((amount0, amount1))
    }

    /// Apply a liquidity delta to a position and return the signed token
    /// amounts it implies at the current price.
    fn modify_position(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        now: u32,
    ) -> CoreResult<(i128, i128)> {
        self.check_ticks(tick_lower, tick_upper)?;
        self.update_position(owner, tick_lower, tick_upper, liquidity_delta, now)?;

        let mut amount0 = 0i128;
        let mut amount1 = 0i128;
        if liquidity_delta != 0 {
            let tick = self.slot0.tick;
            if tick < tick_lower {
                // all token0: the price can only enter the range from below
                amount0 = get_amount0_delta_signed(
                    get_sqrt_ratio_at_tick(tick_lower)?,
                    get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            } else if tick < tick_upper {
                // in range: liquidity becomes active, so record an
                // observation at the pre-change liquidity first
                let (index, cardinality) = self.observations.write(
                    self.slot0.observation_index,
                    now,
                    tick,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                    self.slot0.observation_cardinality_next,
                );
                self.slot0.observation_index = index;
                self.slot0.observation_cardinality = cardinality;

                amount0 = get_amount0_delta_signed(
                    self.slot0.sqrt_price_x96,
                    get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
                amount1 = get_amount1_delta_signed(
                    get_sqrt_ratio_at_tick(tick_lower)?,
                    self.slot0.sqrt_price_x96,
                    liquidity_delta,
                )?;
                self.liquidity = liquidity_math::add_delta(self.liquidity, liquidity_delta)?;
            } else {
                amount1 = get_amount1_delta_signed(
                    get_sqrt_ratio_at_tick(tick_lower)?,
                    get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            }
        }
        Ok((amount0, amount1))
    }

    /// Update the boundary ticks, the bitmap and the position record.
    fn update_position(
        &mut self,
        owner: AccountId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        now: u32,
    ) -> CoreResult<()> {
        let tick = self.slot0.tick;
        let mut flipped_lower = false;
        let mut flipped_upper = false;

        if liquidity_delta != 0 {
            let (tick_cumulative, seconds_per_liquidity) = self.observations.observe_single(
                now,
                0,
                tick,
                self.slot0.observation_index,
                self.liquidity,
                self.slot0.observation_cardinality,
            )?;

            flipped_lower = self.ticks.update(
                tick_lower,
                tick,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity,
                tick_cumulative,
                now,
                false,
                self.config.max_liquidity_per_tick,
            )?;
            flipped_upper = self.ticks.update(
                tick_upper,
                tick,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity,
                tick_cumulative,
                now,
                true,
                self.config.max_liquidity_per_tick,
            )?;
            if flipped_lower {
                self.tick_bitmap.flip_tick(tick_lower, self.config.tick_spacing)?;
            }
            if flipped_upper {
                self.tick_bitmap.flip_tick(tick_upper, self.config.tick_spacing)?;
            }
        }

        let (fee_growth_inside_0, fee_growth_inside_1) = self.ticks.get_fee_growth_inside(
            tick_lower,
            tick_upper,
            tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );
        let key = PositionKey {
            owner,
            tick_lower,
            tick_upper,
        };
        self.positions
            .update(&key, liquidity_delta, fee_growth_inside_0, fee_growth_inside_1)?;

        if liquidity_delta < 0 {
            if flipped_lower {
                self.ticks.clear(tick_lower);
            }
            if flipped_upper {
                self.ticks.clear(tick_upper);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_locked(
        &mut self,
        ledger: &mut dyn TokenLedger,
        callback: &mut dyn SwapCallback,
        recipient: AccountId,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        now: u32,
    ) -> CoreResult<(i128, i128)> {
        if amount_specified == 0 {
            return Err(EngineError::AmountSpecifiedZero);
        }
        let slot0_start = self.slot0.clone();
        let limit_ok = if zero_for_one {
            sqrt_price_limit_x96 < slot0_start.sqrt_price_x96
                && sqrt_price_limit_x96 > MIN_SQRT_RATIO
        } else {
            sqrt_price_limit_x96 > slot0_start.sqrt_price_x96
                && sqrt_price_limit_x96 < MAX_SQRT_RATIO
        };
        if !limit_ok {
            return Err(EngineError::PriceLimitAlreadyExceeded);
        }

        let exact_input = amount_specified > 0;
        let mut cache = SwapCache {
            liquidity_start: self.liquidity,
            fee_protocol: if zero_for_one {
                slot0_start.fee_protocol_0
            } else {
                slot0_start.fee_protocol_1
            },
            seconds_per_liquidity_cumulative_x128: U256::zero(),
            tick_cumulative: 0,
            computed_latest_observation: false,
        };
        let mut state = SwapState {
            amount_specified_remaining: amount_specified,
            amount_calculated: 0,
            sqrt_price_x96: slot0_start.sqrt_price_x96,
            tick: slot0_start.tick,
            fee_growth_global_x128: if zero_for_one {
                self.fee_growth_global_0_x128
            } else {
                self.fee_growth_global_1_x128
            },
            protocol_fee: 0,
            liquidity: cache.liquidity_start,
        };

        while state.amount_specified_remaining != 0
            && state.sqrt_price_x96 != sqrt_price_limit_x96
        {
            let sqrt_price_start_x96 = state.sqrt_price_x96;
            let (mut tick_next, initialized) = self
                .tick_bitmap
                .next_initialized_tick_within_one_word(
                    state.tick,
                    self.config.tick_spacing,
                    zero_for_one,
                );
            // the bitmap is unaware of the global bounds
            tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
            let sqrt_price_next_x96 = get_sqrt_ratio_at_tick(tick_next)?;

            let past_limit = if zero_for_one {
                sqrt_price_next_x96 < sqrt_price_limit_x96
            } else {
                sqrt_price_next_x96 > sqrt_price_limit_x96
            };
            let target = if past_limit {
                sqrt_price_limit_x96
            } else {
                sqrt_price_next_x96
            };

            let mut step = swap_math::compute_swap_step(
                state.sqrt_price_x96,
                target,
                state.liquidity,
                state.amount_specified_remaining,
                self.config.fee,
            )?;
            state.sqrt_price_x96 = step.sqrt_ratio_next_x96;

            if exact_input {
                // in + fee never exceeds the remainder by construction
                state.amount_specified_remaining -= (step.amount_in + step.fee_amount) as i128;
                state.amount_calculated = state
                    .amount_calculated
                    .checked_sub(i128::try_from(step.amount_out).map_err(|_| EngineError::Overflow)?)
                    .ok_or(EngineError::Overflow)?;
            } else {
                state.amount_specified_remaining += step.amount_out as i128;
                state.amount_calculated = state
                    .amount_calculated
                    .checked_add(
                        i128::try_from(step.amount_in + step.fee_amount)
                            .map_err(|_| EngineError::Overflow)?,
                    )
                    .ok_or(EngineError::Overflow)?;
            }

            if cache.fee_protocol > 0 {
                let delta = step.fee_amount / cache.fee_protocol as u128;
                step.fee_amount -= delta;
                state.protocol_fee = state.protocol_fee.saturating_add(delta);
            }

            if state.liquidity > 0 {
                state.fee_growth_global_x128 = state.fee_growth_global_x128.wrapping_add(
                    full_math::mul_div(
                        U256::from(step.fee_amount),
                        Q128,
                        U256::from(state.liquidity),
                    )?,
                );
            }

            if state.sqrt_price_x96 == sqrt_price_next_x96 {
                if initialized {
                    // crossing an initialized tick; the oracle snapshot is
                    // computed once per swap, on first use
                    if !cache.computed_latest_observation {
                        let (tick_cumulative, seconds_per_liquidity) =
                            self.observations.observe_single(
                                now,
                                0,
                                slot0_start.tick,
                                slot0_start.observation_index,
                                cache.liquidity_start,
                                slot0_start.observation_cardinality,
                            )?;
                        cache.tick_cumulative = tick_cumulative;
                        cache.seconds_per_liquidity_cumulative_x128 = seconds_per_liquidity;
                        cache.computed_latest_observation = true;
                    }
                    let mut liquidity_net = self.ticks.cross(
                        tick_next,
                        if zero_for_one {
                            state.fee_growth_global_x128
                        } else {
                            self.fee_growth_global_0_x128
                        },
                        if zero_for_one {
                            self.fee_growth_global_1_x128
                        } else {
                            state.fee_growth_global_x128
                        },
                        cache.seconds_per_liquidity_cumulative_x128,
                        cache.tick_cumulative,
                        now,
                    );
                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }
                    state.liquidity = liquidity_math::add_delta(state.liquidity, liquidity_net)?;
                }
                state.tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if state.sqrt_price_x96 != sqrt_price_start_x96 {
                state.tick = get_tick_at_sqrt_ratio(state.sqrt_price_x96)?;
            }

            trace!(
                tick = state.tick,
                price = %state.sqrt_price_x96,
                amount_in = step.amount_in,
                amount_out = step.amount_out,
                fee = step.fee_amount,
                "swap step"
            );
        }

        // commit price, tick and oracle
        if state.tick != slot0_start.tick {
            let (index, cardinality) = self.observations.write(
                slot0_start.observation_index,
                now,
                slot0_start.tick,
                cache.liquidity_start,
                slot0_start.observation_cardinality,
                slot0_start.observation_cardinality_next,
            );
            self.slot0.observation_index = index;
            self.slot0.observation_cardinality = cardinality;
            self.slot0.tick = state.tick;
        }
        self.slot0.sqrt_price_x96 = state.sqrt_price_x96;

        if cache.liquidity_start != state.liquidity {
            self.liquidity = state.liquidity;
        }
        if zero_for_one {
            self.fee_growth_global_0_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token0 =
                    self.protocol_fees.token0.saturating_add(state.protocol_fee);
            }
        } else {
            self.fee_growth_global_1_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token1 =
                    self.protocol_fees.token1.saturating_add(state.protocol_fee);
            }
        }

        let (amount0, amount1) = if zero_for_one == exact_input {
            (
                amount_specified - state.amount_specified_remaining,
                state.amount_calculated,
            )
        } else {
            (
                state.amount_calculated,
                amount_specified - state.amount_specified_remaining,
            )
        };

        // pay the output, then demand the input through the callback
        let (token_in, token_out, amount_in, amount_out) = if zero_for_one {
            (self.config.token0, self.config.token1, amount0, amount1)
        } else {
            (self.config.token1, self.config.token0, amount1, amount0)
        };
        if amount_out < 0 {
            ledger.transfer(
                token_out,
                self.config.account,
                recipient,
                amount_out.unsigned_abs(),
            )?;
        }
        let balance_before = ledger.balance_of(token_in, self.config.account);
        callback.on_swap(ledger, amount0, amount1)?;
        let required = balance_before
            .checked_add(amount_in as u128)
            .ok_or(EngineError::Overflow)?;
        if ledger.balance_of(token_in, self.config.account) < required {
            return Err(EngineError::InsufficientInputAmount);
        }

        debug!(
            zero_for_one,
            amount0,
            amount1,
            tick = self.slot0.tick,
            "swapped"
        );
        Ok((amount0, amount1))
    }

    fn flash_locked(
        &mut self,
        ledger: &mut dyn TokenLedger,
        callback: &mut dyn FlashCallback,
        recipient: AccountId,
        amount0: u128,
        amount1: u128,
    ) -> CoreResult<()> {
        if self.liquidity == 0 {
            return Err(EngineError::InsufficientLiquidity);
        }
        let fee0 = full_math::to_u128(full_math::mul_div_rounding_up(
            U256::from(amount0),
            U256::from(self.config.fee),
            U256::from(FEE_PIPS_DENOMINATOR),
        )?)?;
        let fee1 = full_math::to_u128(full_math::mul_div_rounding_up(
            U256::from(amount1),
            U256::from(self.config.fee),
            U256::from(FEE_PIPS_DENOMINATOR),
        )?)?;
        let balance0_before = ledger.balance_of(self.config.token0, self.config.account);
        let balance1_before = ledger.balance_of(self.config.token1, self.config.account);

        if amount0 > 0 {
            ledger.transfer(self.config.token0, self.config.account, recipient, amount0)?;
        }
        if amount1 > 0 {
            ledger.transfer(self.config.token1, self.config.account, recipient, amount1)?;
        }
        callback.on_flash(ledger, fee0, fee1)?;

        let balance0_after = ledger.balance_of(self.config.token0, self.config.account);
        let balance1_after = ledger.balance_of(self.config.token1, self.config.account);
        let required0 = balance0_before
            .checked_add(fee0)
            .ok_or(EngineError::Overflow)?;
        let required1 = balance1_before
            .checked_add(fee1)
            .ok_or(EngineError::Overflow)?;
        if balance0_after < required0 || balance1_after < required1 {
            return Err(EngineError::InsufficientPayment);
        }

        // everything paid beyond the loan is income, protocol share first
        let paid0 = balance0_after - balance0_before;
        let paid1 = balance1_after - balance1_before;
        if paid0 > 0 {
            let fee_protocol = self.slot0.fee_protocol_0;
            let protocol_share = if fee_protocol == 0 {
                0
            } else {
                paid0 / fee_protocol as u128
            };
            self.protocol_fees.token0 = self.protocol_fees.token0.saturating_add(protocol_share);
            self.fee_growth_global_0_x128 = self.fee_growth_global_0_x128.wrapping_add(
                full_math::mul_div(
                    U256::from(paid0 - protocol_share),
                    Q128,
                    U256::from(self.liquidity),
                )?,
            );
        }
        if paid1 > 0 {
            let fee_protocol = self.slot0.fee_protocol_1;
            let protocol_share = if fee_protocol == 0 {
                0
            } else {
                paid1 / fee_protocol as u128
            };
            self.protocol_fees.token1 = self.protocol_fees.token1.saturating_add(protocol_share);
            self.fee_growth_global_1_x128 = self.fee_growth_global_1_x128.wrapping_add(
                full_math::mul_div(
                    U256::from(paid1 - protocol_share),
                    Q128,
                    U256::from(self.liquidity),
                )?,
            );
        }

        debug!(amount0, amount1, paid0, paid1, "flash settled");
        Ok(())
    }
}
