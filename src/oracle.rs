//! Price Feed - collateral price consumed by liquidations and redemptions
//!
//! An admin-pushed feed with a staleness guard. A stale or missing price
//! makes every price read revert, so callers fail closed.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::events::PriceUpdated;

/// Latest pushed price
#[odra::odra_type]
pub struct PriceRecord {
    /// Stablecoin per unit of collateral (scaled by 1e18)
    pub price: U256,
    /// Block time of the last update (milliseconds)
    pub last_update: u64,
}

/// Price Feed contract
#[odra::module]
pub struct PriceFeed {
    /// Last pushed price
    record: Var<PriceRecord>,

    /// Admin address
    admin: Var<Address>,

    /// Maximum price age in milliseconds
    max_staleness: Var<u64>,
}

#[odra::module]
impl PriceFeed {
    /// Initialize the feed with a first price
    pub fn init(&mut self, initial_price: U256) {
        let caller = self.env().caller();
        self.admin.set(caller);
        self.max_staleness.set(3_600_000); // 1 hour default
        self.write_price(initial_price);
    }

    /// Push a new price (admin only)
    pub fn set_price(&mut self, price: U256) {
        self.only_admin();
        self.write_price(price);
    }

    /// Current price, reverting when missing or stale
    pub fn get_price(&self) -> U256 {
        let record = self.record.get_or_revert_with(CdpError::PriceFeedNotAvailable);

        let current_time = self.env().get_block_time();
        let max_staleness = self.max_staleness.get_or_default();
        if current_time.saturating_sub(record.last_update) > max_staleness {
            self.env().revert(CdpError::InvalidPrice);
        }

        record.price
    }

    /// Last price regardless of age
    pub fn get_last_record(&self) -> Option<PriceRecord> {
        self.record.get()
    }

    /// Update max staleness period (admin only)
    pub fn set_max_staleness(&mut self, millis: u64) {
        self.only_admin();
        self.max_staleness.set(millis);
    }

    /// Get admin address
    pub fn get_admin(&self) -> Address {
        self.admin.get_or_revert_with(CdpError::Unauthorized)
    }

    fn write_price(&mut self, price: U256) {
        if price.is_zero() {
            self.env().revert(CdpError::InvalidPrice);
        }
        let timestamp = self.env().get_block_time();
        self.record.set(PriceRecord {
            price,
            last_update: timestamp,
        });
        self.env().emit_event(PriceUpdated { price, timestamp });
    }

    fn only_admin(&self) {
        let caller = self.env().caller();
        let admin = self.admin.get_or_revert_with(CdpError::Unauthorized);
        if caller != admin {
            self.env().revert(CdpError::Unauthorized);
        }
    }
}
