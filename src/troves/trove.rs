//! Position ledger types
use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::{DecimalMath, SafeMath};

/// Lifecycle of a trove
#[odra::odra_type]
pub enum TroveStatus {
    Nonexistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

/// A single collateralized debt position
#[odra::odra_type]
pub struct Trove {
    pub id: u64,
    pub owner: Address,
    /// Collateral, without pending redistribution rewards
    pub coll: U256,
    /// Debt including the gas compensation reserve
    pub debt: U256,
    /// Weight in redistributions
    pub stake: U256,
    pub status: TroveStatus,
    /// `L_coll` when rewards were last applied
    pub l_coll_snapshot: U256,
    /// `L_debt` when rewards were last applied
    pub l_debt_snapshot: U256,
}

impl Trove {
    pub fn is_active(&self) -> bool {
        self.status == TroveStatus::Active
    }

    /// Collateral ratio at `price`
    pub fn icr(&self, price: U256) -> Result<U256, CdpError> {
        DecimalMath::compute_cr(self.coll, self.debt, price)
    }

    /// Price-independent ratio used to order the index
    pub fn nicr(&self) -> Result<U256, CdpError> {
        DecimalMath::compute_nominal_cr(self.coll, self.debt)
    }

    /// Zero the position and mark it closed
    pub fn close(&mut self, status: TroveStatus) {
        self.coll = U256::zero();
        self.debt = U256::zero();
        self.stake = U256::zero();
        self.l_coll_snapshot = U256::zero();
        self.l_debt_snapshot = U256::zero();
        self.status = status;
    }
}

/// Collateral and debt buckets held by the trove manager
#[odra::odra_type]
#[derive(Default)]
pub struct SystemTotals {
    /// Collateral and debt of open troves, pending rewards excluded
    pub active_coll: U256,
    pub active_debt: U256,
    /// Redistributed amounts not yet applied to troves
    pub default_coll: U256,
    pub default_debt: U256,
    /// Collateral claimable by owners of closed troves
    pub surplus_coll: U256,
    /// Stablecoin reserve held by the contract for liquidators
    pub gas_reserve: U256,
}

impl SystemTotals {
    pub fn entire_coll(&self) -> Result<U256, CdpError> {
        SafeMath::add(self.active_coll, self.default_coll)
    }

    pub fn entire_debt(&self) -> Result<U256, CdpError> {
        SafeMath::add(self.active_debt, self.default_debt)
    }

    /// Total collateral ratio at `price`
    pub fn tcr(&self, price: U256) -> Result<U256, CdpError> {
        DecimalMath::compute_cr(self.entire_coll()?, self.entire_debt()?, price)
    }

    /// Pending rewards applied to a trove leave the default bucket
    pub fn move_pending_to_active(&mut self, coll: U256, debt: U256) -> Result<(), CdpError> {
        self.default_coll = SafeMath::sub(self.default_coll, coll)?;
        self.default_debt = SafeMath::sub(self.default_debt, debt)?;
        self.active_coll = SafeMath::add(self.active_coll, coll)?;
        self.active_debt = SafeMath::add(self.active_debt, debt)?;
        Ok(())
    }

    /// Redistributed amounts leave the active bucket
    pub fn move_active_to_default(&mut self, coll: U256, debt: U256) -> Result<(), CdpError> {
        self.active_coll = SafeMath::sub(self.active_coll, coll)?;
        self.active_debt = SafeMath::sub(self.active_debt, debt)?;
        self.default_coll = SafeMath::add(self.default_coll, coll)?;
        self.default_debt = SafeMath::add(self.default_debt, debt)?;
        Ok(())
    }

    pub fn decrease_active(&mut self, coll: U256, debt: U256) -> Result<(), CdpError> {
        self.active_coll = SafeMath::sub(self.active_coll, coll)?;
        self.active_debt = SafeMath::sub(self.active_debt, debt)?;
        Ok(())
    }

    pub fn increase_active(&mut self, coll: U256, debt: U256) -> Result<(), CdpError> {
        self.active_coll = SafeMath::add(self.active_coll, coll)?;
        self.active_debt = SafeMath::add(self.active_debt, debt)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::one;

    fn dec(n: u64) -> U256 {
        U256::from(n) * one()
    }

    #[test]
    fn test_tcr_counts_pending_buckets() {
        let mut totals = SystemTotals::default();
        totals.increase_active(dec(10), dec(1_000)).unwrap();
        totals.move_active_to_default(dec(2), dec(500)).unwrap();

        assert_eq!(totals.entire_coll().unwrap(), dec(10));
        assert_eq!(totals.entire_debt().unwrap(), dec(1_000));
        // 10 * 200 / 1000
        assert_eq!(totals.tcr(dec(200)).unwrap(), dec(2));

        totals.move_pending_to_active(dec(2), dec(500)).unwrap();
        assert_eq!(totals.default_coll, U256::zero());
        assert_eq!(totals.active_debt, dec(1_000));
    }

    #[test]
    fn test_bucket_underflow_is_an_error() {
        let mut totals = SystemTotals::default();
        assert!(matches!(totals.decrease_active(U256::one(), U256::zero()), Err(CdpError::Underflow)));
    }
}
