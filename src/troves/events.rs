//! Events for the Trove Manager

use odra::prelude::*;
use odra::casper_types::U256;
use super::params::ProtocolParams;

/// What changed a trove
#[odra::odra_type]
pub enum TroveOperation {
    Open,
    Close,
    Redeem,
}

/// Event emitted when a trove is opened, closed or redeemed against
#[odra::event]
pub struct TroveUpdated {
    pub trove_id: u64,
    pub owner: Address,
    pub coll: U256,
    pub debt: U256,
    pub stake: U256,
    pub operation: TroveOperation,
}

/// Event emitted for every trove closed by a liquidation
#[odra::event]
pub struct TroveLiquidated {
    pub trove_id: u64,
    pub owner: Address,
    pub debt: U256,
    pub coll: U256,
    /// Liquidated in recovery mode with capped collateral
    pub capped: bool,
}

/// Event emitted once per liquidation call with the batch totals
#[odra::event]
pub struct Liquidation {
    pub liquidated_debt: U256,
    pub liquidated_coll: U256,
    pub coll_gas_compensation: U256,
    /// Stablecoin reserve paid to the liquidator
    pub gas_reserve_compensation: U256,
}

/// Event emitted when a remainder is spread over all stakes
#[odra::event]
pub struct Redistribution {
    pub coll: U256,
    pub debt: U256,
    pub l_coll: U256,
    pub l_debt: U256,
}

/// Event emitted once per redemption call
#[odra::event]
pub struct Redemption {
    pub attempted_amount: U256,
    pub actual_amount: U256,
    /// Collateral paid to the redeemer
    pub coll_sent: U256,
    pub fee: U256,
}

/// Event emitted when the redemption base rate changes
#[odra::event]
pub struct BaseRateUpdated {
    pub base_rate: U256,
    pub last_fee_operation_time: u64,
}

/// Event emitted when an owner claims surplus collateral
#[odra::event]
pub struct CollSurplusClaimed {
    pub owner: Address,
    pub amount: U256,
}

/// Event emitted when the admin replaces the parameters
#[odra::event]
pub struct ParamsUpdated {
    pub params: ProtocolParams,
}
