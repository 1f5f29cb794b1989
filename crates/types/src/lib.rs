//! # DeFiOne Types
//!
//! Shared data model for the DeFiOne V1 concentrated-liquidity pool engine:
//! wide integers, tick/position/observation state, pool configuration, the
//! error taxonomy, and the constants every other crate builds on.

pub mod constants;
pub mod errors;
pub mod ids;
pub mod num;
pub mod oracle;
pub mod pool;
pub mod position;
pub mod tick;

pub use constants::*;
pub use errors::{CoreResult, EngineError};
pub use ids::{AccountId, TokenId};
pub use num::U256;
pub use oracle::Observation;
pub use pool::{PoolConfig, ProtocolFees, Slot0};
pub use position::{Position, PositionKey};
pub use tick::TickInfo;
