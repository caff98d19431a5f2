//! Troves - collateralized debt positions, liquidations and redemptions
//!
//! Pure accounting lives in `trove`, `redistribution`, `liquidation` and
//! `redemption`; `trove_manager` loads it from storage, runs it and moves
//! the tokens.

pub mod trove;
pub mod params;
pub mod redistribution;
pub mod liquidation;
pub mod redemption;
pub mod sorted_troves;
pub mod trove_manager;
pub mod events;


pub use trove::{SystemTotals, Trove, TroveStatus};
pub use params::ProtocolParams;
pub use redistribution::RewardState;
pub use redemption::BaseRateState;
pub use sorted_troves::SortedTroves;
pub use trove_manager::TroveManager;
pub use events::*;
