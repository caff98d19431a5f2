//! Stability Pool - depositors absorb liquidated debt for liquidated collateral
//!
//! `accountant` holds the pure P/S/epoch/scale arithmetic, `stability_pool`
//! the sub-module that stores it inside the trove manager.

pub mod accountant;
pub mod stability_pool;
pub mod events;

pub use accountant::{DepositSnapshot, OffsetOutcome, PoolState};
pub use stability_pool::{DepositChange, StabilityPool};
pub use events::*;
