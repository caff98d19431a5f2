//! Pro-rata redistribution of liquidation remainders
//!
//! Every open trove earns `stake * (L - L_snapshot)` of redistributed
//! collateral and debt. Rewards stay pending until the trove is touched.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::{one, SafeMath};
use super::trove::Trove;

/// Global redistribution accumulator
#[odra::odra_type]
#[derive(Default)]
pub struct RewardState {
    /// Collateral per unit of stake redistributed so far
    pub l_coll: U256,
    /// Debt per unit of stake redistributed so far
    pub l_debt: U256,
    /// Sum of stakes of open troves
    pub total_stakes: U256,
    /// `total_stakes` right after the last liquidation
    pub total_stakes_snapshot: U256,
    /// System collateral right after the last liquidation
    pub total_collateral_snapshot: U256,
    pub last_coll_error: U256,
    pub last_debt_error: U256,
}

impl RewardState {
    /// Spread `coll` and `debt` over all stakes
    pub fn redistribute(&mut self, coll: U256, debt: U256) -> Result<(), CdpError> {
        if coll.is_zero() && debt.is_zero() {
            return Ok(());
        }
        if self.total_stakes.is_zero() {
            return Err(CdpError::OnlyOneTroveLeft);
        }

        let coll_numerator = SafeMath::add(SafeMath::mul(coll, one())?, self.last_coll_error)?;
        let debt_numerator = SafeMath::add(SafeMath::mul(debt, one())?, self.last_debt_error)?;

        let coll_per_stake = coll_numerator / self.total_stakes;
        let debt_per_stake = debt_numerator / self.total_stakes;
        self.last_coll_error = coll_numerator - coll_per_stake * self.total_stakes;
        self.last_debt_error = debt_numerator - debt_per_stake * self.total_stakes;

        self.l_coll = SafeMath::add(self.l_coll, coll_per_stake)?;
        self.l_debt = SafeMath::add(self.l_debt, debt_per_stake)?;
        Ok(())
    }

    /// Rewards a trove would receive if touched now
    pub fn pending_rewards(&self, trove: &Trove) -> Result<(U256, U256), CdpError> {
        if !trove.is_active() || trove.stake.is_zero() {
            return Ok((U256::zero(), U256::zero()));
        }
        let coll = SafeMath::mul_div(trove.stake, SafeMath::sub(self.l_coll, trove.l_coll_snapshot)?, one())?;
        let debt = SafeMath::mul_div(trove.stake, SafeMath::sub(self.l_debt, trove.l_debt_snapshot)?, one())?;
        Ok((coll, debt))
    }

    /// Fold pending rewards into the trove and refresh its snapshot.
    ///
    /// Returns the applied (coll, debt) so the caller can move them out of
    /// the default bucket.
    pub fn apply_pending_rewards(&self, trove: &mut Trove) -> Result<(U256, U256), CdpError> {
        if !trove.is_active() {
            return Ok((U256::zero(), U256::zero()));
        }
        let (coll, debt) = self.pending_rewards(trove)?;
        trove.coll = SafeMath::add(trove.coll, coll)?;
        trove.debt = SafeMath::add(trove.debt, debt)?;
        self.update_reward_snapshot(trove);
        Ok((coll, debt))
    }

    pub fn update_reward_snapshot(&self, trove: &mut Trove) {
        trove.l_coll_snapshot = self.l_coll;
        trove.l_debt_snapshot = self.l_debt;
    }

    /// Stake for a trove holding `coll`
    pub fn compute_stake(&self, coll: U256) -> Result<U256, CdpError> {
        if self.total_collateral_snapshot.is_zero() {
            return Ok(coll);
        }
        SafeMath::mul_div(coll, self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    /// Recompute the trove's stake from its current collateral
    pub fn update_stake(&mut self, trove: &mut Trove) -> Result<U256, CdpError> {
        let new_stake = self.compute_stake(trove.coll)?;
        let without_old = SafeMath::sub(self.total_stakes, trove.stake)?;
        self.total_stakes = SafeMath::add(without_old, new_stake)?;
        trove.stake = new_stake;
        Ok(new_stake)
    }

    pub fn remove_stake(&mut self, trove: &mut Trove) -> Result<(), CdpError> {
        self.total_stakes = SafeMath::sub(self.total_stakes, trove.stake)?;
        trove.stake = U256::zero();
        Ok(())
    }

    /// Freeze the stake/collateral ratio after a liquidation.
    ///
    /// `system_coll` is the collateral left in the system, pending
    /// redistributions included.
    pub fn update_system_snapshots(&mut self, system_coll: U256) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = system_coll;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::troves::trove::TroveStatus;
    use odra::host::HostEnv;

    fn dec(n: u64) -> U256 {
        U256::from(n) * one()
    }

    fn trove(env: &HostEnv, id: u64, coll: U256, debt: U256) -> Trove {
        Trove {
            id,
            owner: env.get_account(id as usize),
            coll,
            debt,
            stake: U256::zero(),
            status: TroveStatus::Active,
            l_coll_snapshot: U256::zero(),
            l_debt_snapshot: U256::zero(),
        }
    }

    #[test]
    fn test_redistribution_by_stake() {
        let env = odra_test::env();
        let mut rewards = RewardState::default();
        let mut a = trove(&env, 1, dec(3), dec(100));
        let mut b = trove(&env, 2, dec(1), dec(100));
        rewards.update_stake(&mut a).unwrap();
        rewards.update_stake(&mut b).unwrap();
        assert_eq!(rewards.total_stakes, dec(4));

        rewards.redistribute(dec(4), dec(40)).unwrap();

        assert_eq!(rewards.pending_rewards(&a).unwrap(), (dec(3), dec(30)));
        assert_eq!(rewards.pending_rewards(&b).unwrap(), (dec(1), dec(10)));
    }

    #[test]
    fn test_apply_pending_rewards_is_idempotent() {
        let env = odra_test::env();
        let mut rewards = RewardState::default();
        let mut a = trove(&env, 1, dec(3), dec(100));
        rewards.update_stake(&mut a).unwrap();
        rewards.redistribute(dec(6), dec(60)).unwrap();

        let applied = rewards.apply_pending_rewards(&mut a).unwrap();
        assert_eq!(applied, (dec(6), dec(60)));
        let after_first = a.clone();

        let applied = rewards.apply_pending_rewards(&mut a).unwrap();
        assert_eq!(applied, (U256::zero(), U256::zero()));
        assert_eq!(a, after_first);
        assert_eq!(a.coll, dec(9));
        assert_eq!(a.debt, dec(160));
    }

    #[test]
    fn test_remainder_is_carried() {
        let env = odra_test::env();
        let mut rewards = RewardState::default();
        let mut a = trove(&env, 1, dec(3), dec(100));
        rewards.update_stake(&mut a).unwrap();

        // 1 wei over 3e18 stake truncates to zero per stake
        rewards.redistribute(U256::one(), U256::one()).unwrap();
        assert_eq!(rewards.l_coll, U256::zero());
        assert_eq!(rewards.last_coll_error, one());

        rewards.redistribute(U256::from(2), U256::from(2)).unwrap();
        assert_eq!(rewards.l_coll, U256::one());
        assert_eq!(rewards.last_coll_error, U256::zero());
        assert_eq!(rewards.pending_rewards(&a).unwrap().0, U256::from(3));
    }

    #[test]
    fn test_redistribute_without_stakes_fails() {
        let mut rewards = RewardState::default();
        assert!(matches!(rewards.redistribute(dec(1), dec(1)), Err(CdpError::OnlyOneTroveLeft)));
        assert!(rewards.redistribute(U256::zero(), U256::zero()).is_ok());
    }

    #[test]
    fn test_stake_follows_collateral_snapshot() {
        let env = odra_test::env();
        let mut rewards = RewardState::default();
        assert_eq!(rewards.compute_stake(dec(5)).unwrap(), dec(5));

        // after a liquidation 8 units of stake back 10 units of collateral
        rewards.total_stakes = dec(8);
        rewards.update_system_snapshots(dec(10));
        let mut c = trove(&env, 3, dec(5), dec(100));
        rewards.update_stake(&mut c).unwrap();
        assert_eq!(c.stake, dec(4));
        assert_eq!(rewards.total_stakes, dec(12));

        rewards.remove_stake(&mut c).unwrap();
        assert_eq!(rewards.total_stakes, dec(8));
        assert_eq!(c.stake, U256::zero());
    }
}
