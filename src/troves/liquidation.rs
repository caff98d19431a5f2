//! Liquidation arithmetic
//!
//! Splits a trove's collateral and debt between gas compensation, the
//! stability pool offset, redistribution and the owner's surplus.

use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::{DecimalMath, SafeMath};

/// How a trove is treated by a liquidation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationPath {
    /// ICR under MCR: offset what the pool can take, redistribute the rest
    Standard,
    /// Recovery mode with MCR <= ICR < TCR and enough pool deposits:
    /// full offset with collateral capped at `debt * MCR / price`
    Capped,
    /// Not liquidatable right now
    Skip,
}

/// Pick the liquidation path for a trove
pub fn classify(
    icr: U256,
    tcr: U256,
    recovery_mode: bool,
    mcr: U256,
    debt: U256,
    pool_deposits: U256,
) -> LiquidationPath {
    if icr < mcr {
        return LiquidationPath::Standard;
    }
    if recovery_mode && icr < tcr && debt <= pool_deposits {
        return LiquidationPath::Capped;
    }
    LiquidationPath::Skip
}

/// Whether a sequential walk stops at a trove it could not liquidate.
///
/// Troves are visited by ascending ratio, so a trove at or above MCR ends
/// the walk in normal mode. In recovery mode a later trove may still fit a
/// capped liquidation while the pool has deposits left.
pub fn ends_sequence(icr: U256, mcr: U256, recovery_mode: bool, pool_deposits: U256) -> bool {
    icr >= mcr && (!recovery_mode || pool_deposits.is_zero())
}

/// Breakdown of one liquidated trove, or of a whole batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquidationValues {
    pub entire_coll: U256,
    pub entire_debt: U256,
    pub coll_gas_compensation: U256,
    pub debt_to_offset: U256,
    pub coll_to_send_to_pool: U256,
    pub debt_to_redistribute: U256,
    pub coll_to_redistribute: U256,
    pub coll_surplus: U256,
}

impl LiquidationValues {
    /// Offset up to `pool_deposits`, redistribute the remainder
    pub fn standard(
        coll: U256,
        debt: U256,
        pool_deposits: U256,
        coll_gas_comp_divisor: U256,
    ) -> Result<Self, CdpError> {
        let coll_gas_compensation = SafeMath::div(coll, coll_gas_comp_divisor)?;
        let coll_to_liquidate = SafeMath::sub(coll, coll_gas_compensation)?;

        let debt_to_offset = SafeMath::min(debt, pool_deposits);
        let coll_to_send_to_pool = if debt_to_offset.is_zero() {
            U256::zero()
        } else {
            SafeMath::mul_div(coll_to_liquidate, debt_to_offset, debt)?
        };

        Ok(Self {
            entire_coll: coll,
            entire_debt: debt,
            coll_gas_compensation,
            debt_to_offset,
            coll_to_send_to_pool,
            debt_to_redistribute: debt - debt_to_offset,
            coll_to_redistribute: coll_to_liquidate - coll_to_send_to_pool,
            coll_surplus: U256::zero(),
        })
    }

    /// Full offset with collateral capped at `debt * mcr / price`; the
    /// excess stays with the owner
    pub fn capped(
        coll: U256,
        debt: U256,
        price: U256,
        mcr: U256,
        coll_gas_comp_divisor: U256,
    ) -> Result<Self, CdpError> {
        let capped_coll = SafeMath::min(SafeMath::mul_div(debt, mcr, price)?, coll);
        let coll_gas_compensation = SafeMath::div(capped_coll, coll_gas_comp_divisor)?;

        Ok(Self {
            entire_coll: coll,
            entire_debt: debt,
            coll_gas_compensation,
            debt_to_offset: debt,
            coll_to_send_to_pool: capped_coll - coll_gas_compensation,
            debt_to_redistribute: U256::zero(),
            coll_to_redistribute: U256::zero(),
            coll_surplus: coll - capped_coll,
        })
    }

    /// Fold another trove into a batch total
    pub fn accumulate(&mut self, other: &Self) -> Result<(), CdpError> {
        self.entire_coll = SafeMath::add(self.entire_coll, other.entire_coll)?;
        self.entire_debt = SafeMath::add(self.entire_debt, other.entire_debt)?;
        self.coll_gas_compensation = SafeMath::add(self.coll_gas_compensation, other.coll_gas_compensation)?;
        self.debt_to_offset = SafeMath::add(self.debt_to_offset, other.debt_to_offset)?;
        self.coll_to_send_to_pool = SafeMath::add(self.coll_to_send_to_pool, other.coll_to_send_to_pool)?;
        self.debt_to_redistribute = SafeMath::add(self.debt_to_redistribute, other.debt_to_redistribute)?;
        self.coll_to_redistribute = SafeMath::add(self.coll_to_redistribute, other.coll_to_redistribute)?;
        self.coll_surplus = SafeMath::add(self.coll_surplus, other.coll_surplus)?;
        Ok(())
    }

    /// Collateral that leaves the system: pool share, gas compensation and surplus
    pub fn coll_removed_from_system(&self) -> Result<U256, CdpError> {
        SafeMath::add(
            SafeMath::add(self.coll_to_send_to_pool, self.coll_gas_compensation)?,
            self.coll_surplus,
        )
    }
}

/// Running totals used to re-evaluate TCR while a batch is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub coll: U256,
    pub debt: U256,
    pub pool_deposits: U256,
}

impl SystemSnapshot {
    pub fn tcr(&self, price: U256) -> Result<U256, CdpError> {
        DecimalMath::compute_cr(self.coll, self.debt, price)
    }

    /// Account for one liquidated trove; redistributed amounts stay in the system
    pub fn apply(&mut self, values: &LiquidationValues) -> Result<(), CdpError> {
        self.coll = SafeMath::sub(self.coll, values.coll_removed_from_system()?)?;
        self.debt = SafeMath::sub(self.debt, values.debt_to_offset)?;
        self.pool_deposits = SafeMath::sub(self.pool_deposits, values.debt_to_offset)?;
        Ok(())
    }
}

/// Whether `tcr` is under `ccr`
pub fn is_recovery_mode(tcr: U256, ccr: U256) -> bool {
    tcr < ccr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::one;

    fn dec(n: u64) -> U256 {
        U256::from(n) * one()
    }

    fn percent(n: u64) -> U256 {
        one() * U256::from(n) / U256::from(100u64)
    }

    fn assert_conserved(v: &LiquidationValues) {
        assert_eq!(
            v.entire_coll,
            v.coll_gas_compensation + v.coll_to_send_to_pool + v.coll_to_redistribute + v.coll_surplus
        );
        assert_eq!(v.entire_debt, v.debt_to_offset + v.debt_to_redistribute);
    }

    #[test]
    fn test_sequence_walks_past_recovery_skips() {
        let mcr = percent(110);
        // under MCR never ends the walk
        assert!(!ends_sequence(percent(105), mcr, false, U256::zero()));
        assert!(ends_sequence(percent(120), mcr, false, dec(5_000)));
        // recovery mode keeps walking while the pool can absorb debt
        assert!(!ends_sequence(percent(112), mcr, true, dec(3_000)));
        assert!(ends_sequence(percent(112), mcr, true, U256::zero()));
    }

    #[test]
    fn test_classify() {
        let mcr = percent(110);
        let tcr = percent(140);
        let debt = dec(2_000);

        assert_eq!(classify(percent(105), tcr, false, mcr, debt, U256::zero()), LiquidationPath::Standard);
        assert_eq!(classify(percent(120), tcr, false, mcr, debt, dec(5_000)), LiquidationPath::Skip);
        assert_eq!(classify(percent(120), tcr, true, mcr, debt, dec(5_000)), LiquidationPath::Capped);
        // pool too small for a full offset
        assert_eq!(classify(percent(120), tcr, true, mcr, debt, dec(1_000)), LiquidationPath::Skip);
        // immune above TCR
        assert_eq!(classify(percent(145), tcr, true, mcr, debt, dec(5_000)), LiquidationPath::Skip);
    }

    #[test]
    fn test_gas_compensation_is_flat_half_percent() {
        for (coll, debt, pool) in [
            (dec(1), dec(150), dec(0)),
            (dec(10), dec(2_000), dec(500)),
            (U256::from(777_777_777_777u64), dec(1), dec(1)),
            (dec(100_000), dec(10_000_000), dec(10_000_000)),
        ] {
            let v = LiquidationValues::standard(coll, debt, pool, U256::from(200u64)).unwrap();
            assert_eq!(v.coll_gas_compensation, coll / 200);
            assert_conserved(&v);
        }
    }

    #[test]
    fn test_standard_split_between_pool_and_redistribution() {
        // 10 coll, 2000 debt, pool of 500
        let v = LiquidationValues::standard(dec(10), dec(2_000), dec(500), U256::from(200u64)).unwrap();
        assert_eq!(v.coll_gas_compensation, one() / 20);
        assert_eq!(v.debt_to_offset, dec(500));
        assert_eq!(v.debt_to_redistribute, dec(1_500));
        // a quarter of the 9.95 liquidated collateral
        assert_eq!(v.coll_to_send_to_pool, one() * 995 / 400);
        assert_conserved(&v);
    }

    #[test]
    fn test_empty_pool_redistributes_everything() {
        let v = LiquidationValues::standard(dec(10), dec(2_000), U256::zero(), U256::from(200u64)).unwrap();
        assert_eq!(v.debt_to_offset, U256::zero());
        assert_eq!(v.coll_to_send_to_pool, U256::zero());
        assert_eq!(v.debt_to_redistribute, dec(2_000));
        assert_conserved(&v);
    }

    #[test]
    fn test_capped_leaves_surplus() {
        // 12 coll at price 200 against 2000 debt: ICR 120%
        let v = LiquidationValues::capped(dec(12), dec(2_000), dec(200), percent(110), U256::from(200u64)).unwrap();
        assert_eq!(v.debt_to_offset, dec(2_000));
        // capped at 2000 * 1.1 / 200 = 11
        assert_eq!(v.coll_surplus, dec(1));
        assert_eq!(v.coll_gas_compensation, dec(11) / 200);
        assert_eq!(v.coll_to_redistribute, U256::zero());
        assert_conserved(&v);
    }

    #[test]
    fn test_batch_totals_are_conserved() {
        let mut total = LiquidationValues::default();
        let a = LiquidationValues::standard(dec(3), dec(500), dec(300), U256::from(200u64)).unwrap();
        let b = LiquidationValues::capped(dec(12), dec(2_000), dec(200), percent(110), U256::from(200u64)).unwrap();
        total.accumulate(&a).unwrap();
        total.accumulate(&b).unwrap();
        assert_conserved(&total);
        assert_eq!(total.coll_gas_compensation, a.coll_gas_compensation + b.coll_gas_compensation);
    }

    #[test]
    fn test_system_snapshot_tracks_tcr() {
        let mut system = SystemSnapshot { coll: dec(30), debt: dec(4_000), pool_deposits: dec(1_000) };
        let v = LiquidationValues::standard(dec(10), dec(2_000), system.pool_deposits, U256::from(200u64)).unwrap();
        system.apply(&v).unwrap();
        assert_eq!(system.pool_deposits, U256::zero());
        assert_eq!(system.debt, dec(3_000));
        assert_eq!(system.coll, dec(30) - v.coll_removed_from_system().unwrap());
    }
}
