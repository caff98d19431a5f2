//! Event definitions shared by the token, oracle and treasury contracts
use odra::prelude::*;
use odra::casper_types::U256;
use odra::prelude::Address;

/// Event emitted when tokens are transferred, minted or burned
#[odra::event]
pub struct Transfer {
    /// From address
    pub from: Address,
    /// To address
    pub to: Address,
    /// Amount transferred
    pub value: U256,
}

/// Event emitted when approval is granted
#[odra::event]
pub struct Approval {
    /// Owner address
    pub owner: Address,
    /// Spender address
    pub spender: Address,
    /// Amount approved
    pub value: U256,
}

/// Event emitted when the token minter changes
#[odra::event]
pub struct MinterChanged {
    /// Previous minter
    pub old_minter: Address,
    /// New minter
    pub new_minter: Address,
}

/// Event emitted when the price feed is updated
#[odra::event]
pub struct PriceUpdated {
    /// New price (scaled by 1e18)
    pub price: U256,
    /// Block time of the update
    pub timestamp: u64,
}

/// Event emitted when the treasury is notified of a fee
#[odra::event]
pub struct FeeReceived {
    /// Contract that paid the fee
    pub payer: Address,
    /// Fee amount in collateral
    pub amount: U256,
    /// Running total of fees received
    pub total_received: U256,
}
