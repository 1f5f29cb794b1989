//! End-to-end pool tests over an in-memory token ledger: mint/burn/collect
//! lifecycles, swaps within and across ticks, protocol fees, flash loans and
//! the oracle surface.

use std::collections::BTreeMap;

use defione_core::{FlashCallback, MintCallback, Pool, SwapCallback, TokenLedger};
use defione_math::tick_math::get_sqrt_ratio_at_tick;
use defione_types::{
    AccountId, CoreResult, EngineError, TokenId, U256, MIN_SQRT_RATIO, Q128, Q96,
};

const FEE: u32 = 3000;
const SPACING: i32 = 60;
const WIDE_LOWER: i32 = -887_220;
const WIDE_UPPER: i32 = 887_220;
const WIDE_LIQUIDITY: u128 = 2_000_000_000_000_000_000;
const T0: u32 = 100;

fn token0() -> TokenId {
    TokenId::from_low_u64(1)
}
fn token1() -> TokenId {
    TokenId::from_low_u64(2)
}
fn pool_account() -> AccountId {
    AccountId::from_low_u64(100)
}
fn owner() -> AccountId {
    AccountId::from_low_u64(1)
}
fn trader() -> AccountId {
    AccountId::from_low_u64(7)
}

#[derive(Default)]
struct Ledger {
    balances: BTreeMap<(TokenId, AccountId), u128>,
}

impl Ledger {
    fn fund(&mut self, token: TokenId, account: AccountId, amount: u128) {
        *self.balances.entry((token, account)).or_default() += amount;
    }
}

impl TokenLedger for Ledger {
    fn balance_of(&self, token: TokenId, account: AccountId) -> u128 {
        self.balances.get(&(token, account)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: u128,
    ) -> CoreResult<()> {
        if self.balance_of(token, from) < amount {
            return Err(EngineError::InsufficientPayment);
        }
        *self.balances.get_mut(&(token, from)).unwrap() -= amount;
        *self.balances.entry((token, to)).or_default() += amount;
        Ok(())
    }
}

/// Callback that pays exactly what the pool demands from the trader account.
struct Payer;

impl MintCallback for Payer {
    fn on_mint(
        &mut self,
        ledger: &mut dyn TokenLedger,
        amount0_owed: u128,
        amount1_owed: u128,
    ) -> CoreResult<()> {
        if amount0_owed > 0 {
            ledger.transfer(token0(), trader(), pool_account(), amount0_owed)?;
        }
        if amount1_owed > 0 {
            ledger.transfer(token1(), trader(), pool_account(), amount1_owed)?;
        }
        Ok(())
    }
}

impl SwapCallback for Payer {
    fn on_swap(
        &mut self,
        ledger: &mut dyn TokenLedger,
        amount0_delta: i128,
        amount1_delta: i128,
    ) -> CoreResult<()> {
        if amount0_delta > 0 {
            ledger.transfer(token0(), trader(), pool_account(), amount0_delta as u128)?;
        }
        if amount1_delta > 0 {
            ledger.transfer(token1(), trader(), pool_account(), amount1_delta as u128)?;
        }
        Ok(())
    }
}

/// Callback that pays nothing.
struct Deadbeat;

impl MintCallback for Deadbeat {
    fn on_mint(&mut self, _: &mut dyn TokenLedger, _: u128, _: u128) -> CoreResult<()> {
        Ok(())
    }
}

impl SwapCallback for Deadbeat {
    fn on_swap(&mut self, _: &mut dyn TokenLedger, _: i128, _: i128) -> CoreResult<()> {
        Ok(())
    }
}

/// Flash borrower that returns the loan plus fees from the trader account.
struct Borrower {
    loan0: u128,
    loan1: u128,
    pay_fees: bool,
}

impl FlashCallback for Borrower {
    fn on_flash(
        &mut self,
        ledger: &mut dyn TokenLedger,
        fee0: u128,
        fee1: u128,
    ) -> CoreResult<()> {
        let owed0 = self.loan0 + if self.pay_fees { fee0 } else { 0 };
        let owed1 = self.loan1 + if self.pay_fees { fee1 } else { 0 };
        if owed0 > 0 {
            ledger.transfer(token0(), trader(), pool_account(), owed0)?;
        }
        if owed1 > 0 {
            ledger.transfer(token1(), trader(), pool_account(), owed1)?;
        }
        Ok(())
    }
}

fn setup() -> (Pool, Ledger) {
    let pool = Pool::new(pool_account(), owner(), token0(), token1(), FEE, SPACING).unwrap();
    let mut ledger = Ledger::default();
    ledger.fund(token0(), trader(), u128::MAX / 4);
    ledger.fund(token1(), trader(), u128::MAX / 4);
    (pool, ledger)
}

/// Pool at price 1.0 with a full-range position of `WIDE_LIQUIDITY`.
fn setup_wide(now: u32) -> (Pool, Ledger) {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, now).unwrap();
    let (amount0, amount1) = pool
        .mint(
            &mut ledger,
            &mut Payer,
            trader(),
            WIDE_LOWER,
            WIDE_UPPER,
            WIDE_LIQUIDITY,
            now,
        )
        .unwrap();
    assert_eq!((amount0, amount1), (WIDE_LIQUIDITY, WIDE_LIQUIDITY));
    (pool, ledger)
}

#[test]
fn test_new_rejects_bad_config() {
    // tokens out of order
    assert_eq!(
        Pool::new(pool_account(), owner(), token1(), token0(), FEE, SPACING),
        Err(EngineError::InvalidConfig)
    );
    // fee at or above 100%
    assert_eq!(
        Pool::new(pool_account(), owner(), token0(), token1(), 1_000_000, SPACING),
        Err(EngineError::InvalidConfig)
    );
    assert_eq!(
        Pool::new(pool_account(), owner(), token0(), token1(), FEE, 0),
        Err(EngineError::InvalidConfig)
    );
}

#[test]
fn test_initialize_sets_price_and_rejects_reinit() {
    let (mut pool, _) = setup();
    assert_eq!(pool.initialize(Q96, T0).unwrap(), 0);
    assert_eq!(pool.slot0().tick, 0);
    assert_eq!(pool.slot0().sqrt_price_x96, Q96);
    assert!(pool.slot0().unlocked);
    assert_eq!(pool.slot0().observation_cardinality, 1);
    assert_eq!(
        pool.initialize(Q96, T0),
        Err(EngineError::AlreadyInitialized)
    );
}

#[test]
fn test_initialize_rejects_out_of_range_price() {
    let (mut pool, _) = setup();
    assert_eq!(
        pool.initialize(U256::zero(), T0),
        Err(EngineError::InvalidPrice)
    );
    assert_eq!(
        pool.initialize(MIN_SQRT_RATIO - U256::one(), T0),
        Err(EngineError::InvalidPrice)
    );
}

#[test]
fn test_operations_require_initialization() {
    let (mut pool, mut ledger) = setup();
    assert_eq!(
        pool.mint(&mut ledger, &mut Payer, trader(), -60, 60, 1_000, T0),
        Err(EngineError::NotInitialized)
    );
    assert_eq!(
        pool.observe(T0, &[0]),
        Err(EngineError::NotInitialized)
    );
}

#[test]
fn test_mint_in_range_charges_both_tokens() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    let (amount0, amount1) = pool
        .mint(&mut ledger, &mut Payer, trader(), -60, 60, 1_000, T0)
        .unwrap();
    assert_eq!((amount0, amount1), (3, 3));
    assert_eq!(pool.liquidity(), 1_000);
    assert_eq!(pool.tick_info(-60).liquidity_net, 1_000);
    assert_eq!(pool.tick_info(60).liquidity_net, -1_000);
    assert_eq!(pool.tick_info(-60).liquidity_gross, 1_000);
    assert_eq!(ledger.balance_of(token0(), pool_account()), 3);
    assert_eq!(ledger.balance_of(token1(), pool_account()), 3);
    assert_eq!(pool.position(trader(), -60, 60).liquidity, 1_000);
}

#[test]
fn test_mint_out_of_range_is_single_sided() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    // entirely above the current price: token0 only
    let (amount0, amount1) = pool
        .mint(&mut ledger, &mut Payer, trader(), 60, 120, 1_000_000, T0)
        .unwrap();
    assert!(amount0 > 0);
    assert_eq!(amount1, 0);
    // entirely below: token1 only
    let (amount0, amount1) = pool
        .mint(&mut ledger, &mut Payer, trader(), -120, -60, 1_000_000, T0)
        .unwrap();
    assert_eq!(amount0, 0);
    assert!(amount1 > 0);
    // out-of-range liquidity is not active
    assert_eq!(pool.liquidity(), 0);
}

#[test]
fn test_mint_rejects_bad_ranges() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    for (lower, upper) in [(-61, 60), (-60, 61), (60, -60), (0, 0), (-887_280, 60)] {
        assert_eq!(
            pool.mint(&mut ledger, &mut Payer, trader(), lower, upper, 1_000, T0),
            Err(EngineError::InvalidTickRange),
            "range ({lower}, {upper})"
        );
    }
    assert_eq!(
        pool.mint(&mut ledger, &mut Payer, trader(), -60, 60, 0, T0),
        Err(EngineError::InsufficientLiquidity)
    );
}

#[test]
fn test_mint_underpayment_rolls_back() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    assert_eq!(
        pool.mint(&mut ledger, &mut Deadbeat, trader(), -60, 60, 1_000, T0),
        Err(EngineError::InsufficientPayment)
    );
    assert_eq!(pool.liquidity(), 0);
    assert_eq!(pool.position(trader(), -60, 60).liquidity, 0);
    assert!(!pool.tick_info(-60).initialized);
    // the lock was released; an honest mint goes through
    pool.mint(&mut ledger, &mut Payer, trader(), -60, 60, 1_000, T0)
        .unwrap();
    assert_eq!(pool.liquidity(), 1_000);
}

#[test]
fn test_swap_within_range_exact_in() {
    let (mut pool, mut ledger) = setup_wide(T0);
    let trader_token1_before = ledger.balance_of(token1(), trader());

    let (amount0, amount1) = pool
        .swap(
            &mut ledger,
            &mut Payer,
            trader(),
            true,
            1_000,
            MIN_SQRT_RATIO + U256::one(),
            T0 + 10,
        )
        .unwrap();
    // 0.3% of 1000 input is a fee of 3; the rest trades at ~price 1
    assert_eq!((amount0, amount1), (1_000, -996));
    assert_eq!(pool.slot0().tick, -1);
    assert!(pool.slot0().sqrt_price_x96 < Q96);
    assert_eq!(
        pool.fee_growth_global_0_x128(),
        (U256::from(3u8) * Q128) / U256::from(WIDE_LIQUIDITY)
    );
    assert_eq!(pool.fee_growth_global_1_x128(), U256::zero());
    assert_eq!(
        ledger.balance_of(token1(), trader()),
        trader_token1_before + 996
    );

    // a poke settles the accrued fees into tokens_owed (rounded down)
    pool.burn(trader(), WIDE_LOWER, WIDE_UPPER, 0, T0 + 10).unwrap();
    let position = pool.position(trader(), WIDE_LOWER, WIDE_UPPER);
    assert_eq!(position.tokens_owed_0, 2);
    assert_eq!(position.tokens_owed_1, 0);
}

#[test]
fn test_swap_exact_out() {
    let (mut pool, mut ledger) = setup_wide(T0);
    let (amount0, amount1) = pool
        .swap(
            &mut ledger,
            &mut Payer,
            trader(),
            true,
            -500,
            MIN_SQRT_RATIO + U256::one(),
            T0 + 10,
        )
        .unwrap();
    // 500 out costs 501 in plus a fee of 2
    assert_eq!((amount0, amount1), (503, -500));
}

#[test]
fn test_swap_crosses_initialized_tick() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    let liquidity = 1_000_000_000_000u128;
    pool.mint(&mut ledger, &mut Payer, trader(), -60, 60, liquidity, T0)
        .unwrap();

    let limit = get_sqrt_ratio_at_tick(-120).unwrap();
    let (amount0, amount1) = pool
        .swap(
            &mut ledger,
            &mut Payer,
            trader(),
            true,
            10_000_000_000,
            limit,
            T0 + 10,
        )
        .unwrap();
    // the range only holds ~3e9 of token1; the rest of the input is unspent
    assert_eq!((amount0, amount1), (3_013_394_246, -2_995_354_955));
    assert_eq!(pool.liquidity(), 0);
    assert_eq!(pool.slot0().tick, -120);
    assert_eq!(pool.slot0().sqrt_price_x96, limit);

    // the crossed tick mirrored the whole global fee growth outside
    assert_eq!(
        pool.tick_info(-60).fee_growth_outside_0_x128,
        pool.fee_growth_global_0_x128()
    );

    // burn below the range returns principal entirely in token0
    let (burn0, burn1) = pool
        .burn(trader(), -60, 60, liquidity, T0 + 10)
        .unwrap();
    assert_eq!((burn0, burn1), (5_999_709_018, 0));
    let position = pool.position(trader(), -60, 60);
    assert_eq!(position.liquidity, 0);
    // principal plus the swap fees, both collectable
    assert_eq!(position.tokens_owed_0, 5_999_709_018 + 9_040_182);

    let (collected0, collected1) = pool
        .collect(
            &mut ledger,
            trader(),
            trader(),
            -60,
            60,
            u128::MAX,
            u128::MAX,
        )
        .unwrap();
    assert_eq!((collected0, collected1), (5_999_709_018 + 9_040_182, 0));
    assert_eq!(pool.position(trader(), -60, 60).tokens_owed_0, 0);
    // cleared ticks are gone
    assert!(!pool.tick_info(-60).initialized);
    assert!(!pool.tick_info(60).initialized);
}

#[test]
fn test_swap_rejects_bad_arguments() {
    let (mut pool, mut ledger) = setup_wide(T0);
    assert_eq!(
        pool.swap(&mut ledger, &mut Payer, trader(), true, 0, MIN_SQRT_RATIO + U256::one(), T0),
        Err(EngineError::AmountSpecifiedZero)
    );
    // limit on the wrong side of the current price
    assert_eq!(
        pool.swap(&mut ledger, &mut Payer, trader(), true, 1_000, Q96 * U256::from(2u8), T0),
        Err(EngineError::PriceLimitAlreadyExceeded)
    );
    assert_eq!(
        pool.swap(&mut ledger, &mut Payer, trader(), false, 1_000, Q96 - U256::one(), T0),
        Err(EngineError::PriceLimitAlreadyExceeded)
    );
}

#[test]
fn test_swap_underpayment_rolls_back() {
    let (mut pool, mut ledger) = setup_wide(T0);
    let slot0_before = pool.slot0().clone();
    assert_eq!(
        pool.swap(
            &mut ledger,
            &mut Deadbeat,
            trader(),
            true,
            1_000,
            MIN_SQRT_RATIO + U256::one(),
            T0 + 10,
        ),
        Err(EngineError::InsufficientInputAmount)
    );
    assert_eq!(pool.slot0(), &slot0_before);
    assert_eq!(pool.fee_growth_global_0_x128(), U256::zero());
}

#[test]
fn test_protocol_fee_lifecycle() {
    let (mut pool, mut ledger) = setup_wide(T0);

    assert_eq!(
        pool.set_fee_protocol(trader(), 4, 4),
        Err(EngineError::Unauthorized)
    );
    assert_eq!(
        pool.set_fee_protocol(owner(), 3, 4),
        Err(EngineError::InvalidFeeProtocol)
    );
    pool.set_fee_protocol(owner(), 4, 4).unwrap();
    assert_eq!(pool.slot0().fee_protocol_0, 4);

    pool.swap(
        &mut ledger,
        &mut Payer,
        trader(),
        true,
        1_000_000,
        MIN_SQRT_RATIO + U256::one(),
        T0 + 10,
    )
    .unwrap();
    // total fee 3000: a quarter to the protocol, the rest to liquidity
    assert_eq!(pool.protocol_fees().token0, 750);
    assert_eq!(
        pool.fee_growth_global_0_x128(),
        (U256::from(2_250u16) * Q128) / U256::from(WIDE_LIQUIDITY)
    );

    let recipient = AccountId::from_low_u64(55);
    assert_eq!(
        pool.collect_protocol(&mut ledger, trader(), recipient, u128::MAX, u128::MAX),
        Err(EngineError::Unauthorized)
    );
    // the full accrued amount pays out
    let (collected0, collected1) = pool
        .collect_protocol(&mut ledger, owner(), recipient, u128::MAX, u128::MAX)
        .unwrap();
    assert_eq!((collected0, collected1), (750, 0));
    assert_eq!(pool.protocol_fees().token0, 0);
    assert_eq!(ledger.balance_of(token0(), recipient), 750);
}

#[test]
fn test_flash_charges_fee_and_donates_overpayment() {
    let (mut pool, mut ledger) = setup_wide(T0);
    let pool_balance0 = ledger.balance_of(token0(), pool_account());

    pool.flash(
        &mut ledger,
        &mut Borrower {
            loan0: 1_000,
            loan1: 2_000,
            pay_fees: true,
        },
        trader(),
        1_000,
        2_000,
    )
    .unwrap();
    // fees: ceil(0.3% of the loans)
    assert_eq!(
        ledger.balance_of(token0(), pool_account()),
        pool_balance0 + 3
    );
    assert_eq!(
        pool.fee_growth_global_0_x128(),
        (U256::from(3u8) * Q128) / U256::from(WIDE_LIQUIDITY)
    );
    assert_eq!(
        pool.fee_growth_global_1_x128(),
        (U256::from(6u8) * Q128) / U256::from(WIDE_LIQUIDITY)
    );
}

#[test]
fn test_flash_underpayment_rolls_back() {
    let (mut pool, mut ledger) = setup_wide(T0);
    let pool_balance0 = ledger.balance_of(token0(), pool_account());
    assert_eq!(
        pool.flash(
            &mut ledger,
            &mut Borrower {
                loan0: 1_000,
                loan1: 0,
                pay_fees: false,
            },
            trader(),
            1_000,
            0,
        ),
        Err(EngineError::InsufficientPayment)
    );
    assert_eq!(pool.fee_growth_global_0_x128(), U256::zero());
    // the loan itself did come back through the callback
    assert_eq!(ledger.balance_of(token0(), pool_account()), pool_balance0);
}

#[test]
fn test_flash_requires_liquidity() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    assert_eq!(
        pool.flash(
            &mut ledger,
            &mut Borrower {
                loan0: 0,
                loan1: 0,
                pay_fees: true,
            },
            trader(),
            0,
            0,
        ),
        Err(EngineError::InsufficientLiquidity)
    );
}

#[test]
fn test_oracle_observe_and_cardinality() {
    let (mut pool, mut ledger) = setup_wide(T0);
    assert_eq!(pool.increase_observation_cardinality_next(4).unwrap(), 4);
    // never shrinks
    assert_eq!(pool.increase_observation_cardinality_next(2).unwrap(), 4);

    // move the tick to -1 at T0+10
    pool.swap(
        &mut ledger,
        &mut Payer,
        trader(),
        true,
        1_000,
        MIN_SQRT_RATIO + U256::one(),
        T0 + 10,
    )
    .unwrap();
    assert_eq!(pool.slot0().observation_cardinality, 4);

    let (tick_cumulatives, seconds_per_liquidity) = pool.observe(T0 + 20, &[0, 20]).unwrap();
    // tick 0 for the first 10 seconds, then tick -1 for 10 seconds
    assert_eq!(tick_cumulatives, vec![-10, 0]);
    assert!(seconds_per_liquidity[0] > seconds_per_liquidity[1]);

    assert_eq!(
        pool.observe(T0 + 20, &[21]),
        Err(EngineError::ObservationNotFound)
    );
}

#[test]
fn test_snapshot_cumulatives_inside() {
    let (mut pool, mut ledger) = setup();
    pool.initialize(Q96, T0).unwrap();
    let liquidity = 1_000u128;
    pool.mint(&mut ledger, &mut Payer, trader(), -60, 60, liquidity, T0)
        .unwrap();

    let (tick_cumulative, seconds_per_liquidity, seconds) = pool
        .snapshot_cumulatives_inside(-60, 60, T0 + 30)
        .unwrap();
    assert_eq!(seconds, 30);
    assert_eq!(tick_cumulative, 0);
    assert_eq!(
        seconds_per_liquidity,
        (U256::from(30u8) << 128) / U256::from(liquidity)
    );

    // boundary ticks must exist
    assert_eq!(
        pool.snapshot_cumulatives_inside(-120, 60, T0 + 30),
        Err(EngineError::InvalidTickRange)
    );
}

#[test]
fn test_collect_missing_position_is_empty() {
    let (mut pool, mut ledger) = setup_wide(T0);
    let stranger = AccountId::from_low_u64(99);
    assert_eq!(
        pool.collect(&mut ledger, stranger, stranger, -60, 60, u128::MAX, u128::MAX)
            .unwrap(),
        (0, 0)
    );
}

#[test]
fn test_pool_serde_round_trip() {
    let (mut pool, mut ledger) = setup_wide(T0);
    pool.swap(
        &mut ledger,
        &mut Payer,
        trader(),
        true,
        1_000,
        MIN_SQRT_RATIO + U256::one(),
        T0 + 10,
    )
    .unwrap();

    let json = serde_json::to_string(&pool).unwrap();
    let back: Pool = serde_json::from_str(&json).unwrap();
    assert_eq!(back, pool);
}
