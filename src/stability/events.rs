//! Events for the Stability Pool

use odra::prelude::*;
use odra::casper_types::U256;

/// Event emitted when liquidated debt is cancelled against the pool
#[odra::event]
pub struct StabilityPoolOffset {
    pub debt_cancelled: U256,
    pub collateral_added: U256,
    pub total_deposits: U256,
    pub p: U256,
}

/// Event emitted when a deposit changes
#[odra::event]
pub struct StabilityDepositUpdated {
    pub depositor: Address,
    pub new_deposit: U256,
    pub p: U256,
    pub s: U256,
    pub scale: u64,
    pub epoch: u64,
}

/// Event emitted when a depositor's collateral gain is paid out
#[odra::event]
pub struct CollateralGainWithdrawn {
    pub depositor: Address,
    pub collateral: U256,
    /// Deposit lost to offsets since the previous snapshot
    pub deposit_loss: U256,
}

/// Event emitted when the pool is drained and a new epoch begins
#[odra::event]
pub struct EpochUpdated {
    pub current_epoch: u64,
    /// Pool collateral left unclaimed by the closed epoch
    pub forfeited_collateral: U256,
}

/// Event emitted when `P` is renormalised
#[odra::event]
pub struct ScaleUpdated {
    pub current_scale: u64,
    pub p: U256,
}
