//! Fee treasury - receiver of redemption fees and forfeited pool collateral
//!
//! The collateral itself is moved by the payer before `receive_fee` is
//! called; the treasury only books it.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::events::FeeReceived;

/// Interface the trove manager uses to notify the fee receiver
#[odra::external_contract]
pub trait Treasury {
    /// Book a fee that was just transferred in
    fn receive_fee(&mut self, amount: U256);
}

/// Minimal fee treasury
#[odra::module]
pub struct FeeTreasury {
    /// Total collateral received
    total_received: Var<U256>,
    /// Fees received per payer contract
    received_from: Mapping<Address, U256>,
}

#[odra::module]
impl FeeTreasury {
    /// Book a fee from the calling contract
    pub fn receive_fee(&mut self, amount: U256) {
        let payer = self.env().caller();
        let total_received = self.total_received.get_or_default() + amount;
        self.total_received.set(total_received);

        let from_payer = self.received_from.get(&payer).unwrap_or_default();
        self.received_from.set(&payer, from_payer + amount);

        self.env().emit_event(FeeReceived {
            payer,
            amount,
            total_received,
        });
    }

    /// Total fees booked
    pub fn total_received(&self) -> U256 {
        self.total_received.get_or_default()
    }

    /// Fees booked from one payer
    pub fn received_from(&self, payer: Address) -> U256 {
        self.received_from.get(&payer).unwrap_or_default()
    }
}
