//! # Token Ledger and Callbacks
//!
//! The engine never holds tokens itself; it reads and moves balances
//! through a [`TokenLedger`] owned by the integrator. Payment flows in
//! through callbacks and is verified by balance difference, so the pool
//! does not care how the callback sources funds.

use defione_types::{AccountId, CoreResult, TokenId};

/// External balance book. Implementations must be atomic per call: a failed
/// transfer moves nothing.
pub trait TokenLedger {
    /// Current balance of `account` in `token`.
    fn balance_of(&self, token: TokenId, account: AccountId) -> u128;

    /// Move `amount` from `from` to `to`.
    fn transfer(
        &mut self,
        token: TokenId,
        from: AccountId,
        to: AccountId,
        amount: u128,
    ) -> CoreResult<()>;
}

/// Invoked during mint after amounts are computed; must pay the pool at
/// least `amount0_owed` / `amount1_owed` before returning.
pub trait MintCallback {
    fn on_mint(
        &mut self,
        ledger: &mut dyn TokenLedger,
        amount0_owed: u128,
        amount1_owed: u128,
    ) -> CoreResult<()>;
}

/// Invoked during swap after the output has been sent; must pay the pool
/// the positive delta of the input token before returning.
pub trait SwapCallback {
    fn on_swap(
        &mut self,
        ledger: &mut dyn TokenLedger,
        amount0_delta: i128,
        amount1_delta: i128,
    ) -> CoreResult<()>;
}

/// Invoked during flash after the loan has been sent; must return the loan
/// plus `fee0` / `fee1` before returning.
pub trait FlashCallback {
    fn on_flash(&mut self, ledger: &mut dyn TokenLedger, fee0: u128, fee1: u128)
        -> CoreResult<()>;
}
