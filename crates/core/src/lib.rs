//! # DeFiOne Core
//!
//! The concentrated-liquidity pool engine: tick and position registries,
//! the sparse tick bitmap, the observation oracle, and the [`pool::Pool`]
//! state machine that ties them to an external token ledger.

pub mod ledger;
pub mod oracle;
pub mod pool;
pub mod position;
pub mod tick;
pub mod tick_bitmap;

pub use ledger::{FlashCallback, MintCallback, SwapCallback, TokenLedger};
pub use oracle::ObservationBuffer;
pub use pool::Pool;
pub use position::PositionMap;
pub use tick::{tick_spacing_to_max_liquidity_per_tick, TickMap};
pub use tick_bitmap::TickBitmap;
