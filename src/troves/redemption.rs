//! Redemption fee and per-trove redemption arithmetic
use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::{one, DecimalMath, SafeMath};

/// One minute of block time, in milliseconds
pub const MINUTE_MILLIS: u64 = 60_000;

/// Decaying base rate of the redemption fee
#[odra::odra_type]
#[derive(Default)]
pub struct BaseRateState {
    /// Current base rate, decimal in [0, 1]
    pub base_rate: U256,
    /// Block time of the last fee operation (milliseconds)
    pub last_fee_operation_time: u64,
}

impl BaseRateState {
    /// Whole minutes elapsed since the last fee operation
    pub fn minutes_passed(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / MINUTE_MILLIS
    }

    /// Base rate after `minute_decay_factor ^ minutes`
    pub fn decayed_base_rate(&self, now: u64, minute_decay_factor: U256) -> Result<U256, CdpError> {
        let decay = DecimalMath::pow(minute_decay_factor, self.minutes_passed(now))?;
        DecimalMath::mul(self.base_rate, decay)
    }

    /// Raise the base rate by the redeemed fraction of supply over `beta`.
    ///
    /// `coll_drawn * price / total_supply` is the fraction redeemed.
    pub fn update_from_redemption(
        &mut self,
        coll_drawn: U256,
        price: U256,
        total_supply: U256,
        beta: U256,
        minute_decay_factor: U256,
        now: u64,
    ) -> Result<U256, CdpError> {
        let decayed = self.decayed_base_rate(now, minute_decay_factor)?;
        let redeemed_fraction = SafeMath::mul_div(coll_drawn, price, total_supply)?;
        let raised = SafeMath::add(decayed, SafeMath::div(redeemed_fraction, beta)?)?;
        let new_base_rate = SafeMath::min(raised, one());

        self.base_rate = new_base_rate;
        self.update_last_fee_op_time(now);
        Ok(new_base_rate)
    }

    /// Only moves forward in whole minutes so repeated calls cannot
    /// stall the decay
    fn update_last_fee_op_time(&mut self, now: u64) {
        if now.saturating_sub(self.last_fee_operation_time) >= MINUTE_MILLIS {
            self.last_fee_operation_time = now;
        }
    }
}

/// Fee rate for a base rate: `floor + base_rate`, capped at 100%
pub fn redemption_rate(base_rate: U256, fee_floor: U256) -> U256 {
    SafeMath::min(fee_floor.saturating_add(base_rate), one())
}

/// Fee taken from `coll_drawn` at `rate`, rounded up
pub fn redemption_fee(rate: U256, coll_drawn: U256) -> Result<U256, CdpError> {
    let fee = SafeMath::mul_div_up(rate, coll_drawn, one())?;
    if fee >= coll_drawn {
        return Err(CdpError::FeeConsumesAllCollateral);
    }
    Ok(fee)
}

/// Check the fee against the redeemer's ceiling, both as decimals of `coll_drawn`
pub fn require_fee_accepted(fee: U256, coll_drawn: U256, max_fee_percentage: U256) -> Result<(), CdpError> {
    let fee_percentage = SafeMath::mul_div(fee, one(), coll_drawn)?;
    if fee_percentage > max_fee_percentage {
        return Err(CdpError::FeeExceedsMax);
    }
    Ok(())
}

/// Outcome of redeeming against one trove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TroveRedemption {
    /// Debt reached exactly the reserve; the trove closes and
    /// `surplus` collateral goes to its owner
    Full { debt_lot: U256, coll_lot: U256, surplus: U256 },
    /// Trove stays open with the new collateral and debt
    Partial { debt_lot: U256, coll_lot: U256, new_coll: U256, new_debt: U256 },
    /// A partial redemption would leave less than the minimum net debt
    Cancelled,
}

/// Redeem up to `remaining` stablecoin against a trove holding `coll` and `debt`
pub fn redeem_from_trove(
    coll: U256,
    debt: U256,
    remaining: U256,
    price: U256,
    gas_compensation: U256,
    min_net_debt: U256,
) -> Result<TroveRedemption, CdpError> {
    let redeemable = SafeMath::sub(debt, gas_compensation)?;
    let debt_lot = SafeMath::min(remaining, redeemable);
    let coll_lot = SafeMath::mul_div(debt_lot, one(), price)?;

    let new_debt = debt - debt_lot;
    let new_coll = SafeMath::sub(coll, coll_lot)?;

    if new_debt == gas_compensation {
        return Ok(TroveRedemption::Full { debt_lot, coll_lot, surplus: new_coll });
    }
    if new_debt - gas_compensation < min_net_debt {
        return Ok(TroveRedemption::Cancelled);
    }
    Ok(TroveRedemption::Partial { debt_lot, coll_lot, new_coll, new_debt })
}
