//! Stability pool accounting
//!
//! Deposits shrink through a running product `P` and earn collateral through
//! per-(epoch, scale) sums `S`. Each depositor only keeps a snapshot, so an
//! offset touches a constant amount of state whatever the number of
//! depositors.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::{one, SafeMath, SCALE_FACTOR};

/// Global pool accumulator
#[odra::odra_type]
pub struct PoolState {
    /// Stablecoin currently deposited
    pub total_deposits: U256,
    /// Running product, in (0, 1e18]
    pub p: U256,
    /// Number of 1e9 renormalisations in the current epoch
    pub current_scale: u64,
    /// Number of times the pool was fully drained
    pub current_epoch: u64,
    /// Remainder carried by the collateral gain division
    pub last_coll_error: U256,
    /// Remainder carried by the debt loss division
    pub last_debt_loss_error: U256,
}

/// Per-depositor snapshot taken at the last provide/withdraw
#[odra::odra_type]
pub struct DepositSnapshot {
    /// Deposit right after the snapshot
    pub initial_deposit: U256,
    /// `P` at snapshot time
    pub p: U256,
    /// `S[epoch][scale]` at snapshot time
    pub s: U256,
    pub scale: u64,
    pub epoch: u64,
}

/// Result of one offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetOutcome {
    /// Bucket that received the collateral gain
    pub sum_epoch: u64,
    pub sum_scale: u64,
    /// Amount to add to `S[sum_epoch][sum_scale]`
    pub sum_increment: U256,
    /// The pool was drained and a new epoch started
    pub epoch_closed: bool,
    /// `P` was renormalised into a new scale
    pub scale_changed: bool,
}

impl PoolState {
    /// Empty pool at epoch 0, scale 0, `P = 1`
    pub fn new() -> Self {
        Self {
            total_deposits: U256::zero(),
            p: one(),
            current_scale: 0,
            current_epoch: 0,
            last_coll_error: U256::zero(),
            last_debt_loss_error: U256::zero(),
        }
    }

    /// Cancel `debt` against deposits and credit `coll` as gain.
    ///
    /// The caller stores `sum_increment` into its sum table.
    pub fn offset(&mut self, debt: U256, coll: U256) -> Result<OffsetOutcome, CdpError> {
        if debt > self.total_deposits {
            return Err(CdpError::InsufficientPoolBalance);
        }
        let mut outcome = OffsetOutcome {
            sum_epoch: self.current_epoch,
            sum_scale: self.current_scale,
            sum_increment: U256::zero(),
            epoch_closed: false,
            scale_changed: false,
        };
        if debt.is_zero() || self.total_deposits.is_zero() {
            return Ok(outcome);
        }

        let (gain_per_unit, loss_per_unit) = self.per_unit_rewards(debt, coll)?;
        outcome.sum_increment = SafeMath::mul(gain_per_unit, self.p)?;

        self.total_deposits = SafeMath::sub(self.total_deposits, debt)?;

        let product_factor = SafeMath::sub(one(), loss_per_unit)?;
        if product_factor.is_zero() || self.total_deposits.is_zero() {
            // wei left behind by a rounded-up total loss belong to no snapshot
            self.total_deposits = U256::zero();
            self.current_epoch += 1;
            self.current_scale = 0;
            self.p = one();
            self.last_debt_loss_error = U256::zero();
            outcome.epoch_closed = true;
            return Ok(outcome);
        }

        let scaled = SafeMath::mul(self.p, product_factor)?;
        let new_p = scaled / one();
        if new_p < U256::from(SCALE_FACTOR) {
            self.p = SafeMath::mul(scaled, U256::from(SCALE_FACTOR))? / one();
            self.current_scale += 1;
            outcome.scale_changed = true;
        } else {
            self.p = new_p;
        }
        Ok(outcome)
    }

    /// Gain per unit rounds down and loss per unit rounds up; both carry
    /// their remainder into the next offset.
    fn per_unit_rewards(&mut self, debt: U256, coll: U256) -> Result<(U256, U256), CdpError> {
        let total = self.total_deposits;

        let coll_numerator = SafeMath::add(SafeMath::mul(coll, one())?, self.last_coll_error)?;
        let gain_per_unit = coll_numerator / total;
        self.last_coll_error = coll_numerator - gain_per_unit * total;

        let loss_per_unit = if debt == total {
            self.last_debt_loss_error = U256::zero();
            one()
        } else {
            let debt_numerator = SafeMath::mul(debt, one())?;
            if debt_numerator <= self.last_debt_loss_error {
                // the loss was already charged by an earlier round-up
                self.last_debt_loss_error -= debt_numerator;
                return Ok((gain_per_unit, U256::zero()));
            }
            let loss_numerator = debt_numerator - self.last_debt_loss_error;
            let loss = SafeMath::div_up(loss_numerator, total)?;
            self.last_debt_loss_error = SafeMath::sub(SafeMath::mul(loss, total)?, loss_numerator)?;
            loss
        };
        Ok((gain_per_unit, loss_per_unit))
    }

    /// Snapshot for a depositor whose deposit is now `initial_deposit`
    pub fn snapshot(&self, initial_deposit: U256, current_sum: U256) -> DepositSnapshot {
        DepositSnapshot {
            initial_deposit,
            p: self.p,
            s: current_sum,
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    /// Deposit left after every offset since the snapshot
    pub fn compounded_deposit(&self, snapshot: &DepositSnapshot) -> Result<U256, CdpError> {
        let initial = snapshot.initial_deposit;
        if initial.is_zero() || snapshot.epoch != self.current_epoch {
            return Ok(U256::zero());
        }

        let scale_diff = self.current_scale.saturating_sub(snapshot.scale);
        let compounded = match scale_diff {
            0 => SafeMath::mul_div(initial, self.p, snapshot.p)?,
            1 => SafeMath::mul_div(initial, self.p, snapshot.p)? / U256::from(SCALE_FACTOR),
            _ => U256::zero(),
        };

        // under a billionth of the initial deposit is rounding noise
        if compounded < initial / U256::from(SCALE_FACTOR) {
            return Ok(U256::zero());
        }
        Ok(compounded)
    }

    /// Collateral earned since the snapshot.
    ///
    /// `sum_at_scale` and `sum_at_next_scale` are `S[epoch][scale]` and
    /// `S[epoch][scale + 1]` for the snapshot's epoch and scale.
    pub fn collateral_gain(
        &self,
        snapshot: &DepositSnapshot,
        sum_at_scale: U256,
        sum_at_next_scale: U256,
    ) -> Result<U256, CdpError> {
        let initial = snapshot.initial_deposit;
        if initial.is_zero() || snapshot.epoch != self.current_epoch {
            return Ok(U256::zero());
        }
        let first_portion = SafeMath::sub(sum_at_scale, snapshot.s)?;
        let second_portion = sum_at_next_scale / U256::from(SCALE_FACTOR);
        let gain = SafeMath::mul_div(initial, SafeMath::add(first_portion, second_portion)?, snapshot.p)?;
        Ok(gain / one())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    fn dec(n: u64) -> U256 {
        U256::from(n) * one()
    }

    /// Pool plus its sum table, the way the contract stores them
    struct Harness {
        state: PoolState,
        sums: BTreeMap<(u64, u64), U256>,
    }

    impl Harness {
        fn new() -> Self {
            Self { state: PoolState::new(), sums: BTreeMap::new() }
        }

        fn sum(&self, epoch: u64, scale: u64) -> U256 {
            self.sums.get(&(epoch, scale)).copied().unwrap_or_default()
        }

        fn provide(&mut self, amount: U256) -> DepositSnapshot {
            self.state.total_deposits += amount;
            let s = self.sum(self.state.current_epoch, self.state.current_scale);
            self.state.snapshot(amount, s)
        }

        fn offset(&mut self, debt: U256, coll: U256) -> OffsetOutcome {
            let outcome = self.state.offset(debt, coll).unwrap();
            let key = (outcome.sum_epoch, outcome.sum_scale);
            let current = self.sum(key.0, key.1);
            self.sums.insert(key, current + outcome.sum_increment);
            outcome
        }

        fn gain(&self, snap: &DepositSnapshot) -> U256 {
            self.state
                .collateral_gain(snap, self.sum(snap.epoch, snap.scale), self.sum(snap.epoch, snap.scale + 1))
                .unwrap()
        }

        fn deposit(&self, snap: &DepositSnapshot) -> U256 {
            self.state.compounded_deposit(snap).unwrap()
        }
    }

    #[test]
    fn test_offset_scenario_1000_600_3() {
        let mut pool = Harness::new();
        let alice = pool.provide(dec(500));
        let bob = pool.provide(dec(500));

        pool.offset(dec(600), dec(3));

        assert_eq!(pool.state.total_deposits, dec(400));
        assert_eq!(pool.state.p, one() * 4 / 10);
        assert_eq!(pool.deposit(&alice), dec(200));
        assert_eq!(pool.deposit(&bob), dec(200));
        assert_eq!(pool.gain(&alice), one() * 3 / 2);
        assert_eq!(pool.gain(&alice) + pool.gain(&bob), dec(3));
    }

    #[test]
    fn test_full_drain_starts_new_epoch() {
        let mut pool = Harness::new();
        let alice = pool.provide(dec(1000));

        let outcome = pool.offset(dec(1000), dec(5));
        assert!(outcome.epoch_closed);
        assert_eq!(pool.state.current_epoch, 1);
        assert_eq!(pool.state.current_scale, 0);
        assert_eq!(pool.state.p, one());
        assert_eq!(pool.state.total_deposits, U256::zero());

        assert_eq!(pool.deposit(&alice), U256::zero());
        assert_eq!(pool.gain(&alice), U256::zero());

        // new depositors start clean in the new epoch
        let bob = pool.provide(dec(100));
        pool.offset(dec(50), dec(1));
        assert_eq!(pool.deposit(&bob), dec(50));
        assert_eq!(pool.gain(&bob), dec(1));
    }

    #[test]
    fn test_offset_above_deposits_rejected() {
        let mut state = PoolState::new();
        state.total_deposits = dec(10);
        assert!(matches!(state.offset(dec(11), dec(1)), Err(CdpError::InsufficientPoolBalance)));
        assert_eq!(state.total_deposits, dec(10));
    }

    #[test]
    fn test_zero_debt_offset_is_noop() {
        let mut pool = Harness::new();
        pool.provide(dec(10));
        let outcome = pool.offset(U256::zero(), dec(1));
        assert_eq!(outcome.sum_increment, U256::zero());
        assert_eq!(pool.state.p, one());
    }

    #[test]
    fn test_scale_bump_keeps_recent_depositor() {
        let mut pool = Harness::new();
        let alice = pool.provide(dec(1000));

        // P falls to 1e-5
        pool.offset(dec(1000) - U256::from(10_000_000_000_000_000u128), U256::zero());
        assert_eq!(pool.state.p, U256::from(10_000_000_000_000u64));
        assert_eq!(pool.state.current_scale, 0);
        assert_eq!(pool.deposit(&alice), U256::from(10_000_000_000_000_000u128));

        let bob = pool.provide(dec(1000));
        let total = pool.state.total_deposits;
        let outcome = pool.offset(total - total / 100_000, U256::zero());
        assert!(outcome.scale_changed);
        assert_eq!(pool.state.current_scale, 1);
        assert_eq!(pool.state.p, U256::from(100_000_000_000_000_000u128));

        // bob keeps 1e-5 of his deposit across the scale boundary
        assert_eq!(pool.deposit(&bob), U256::from(10_000_000_000_000_000u128));
        // alice is below a billionth of her deposit and reads zero
        assert_eq!(pool.deposit(&alice), U256::zero());

        // gains earned in the new scale reach bob through S[e][s + 1]
        let total = pool.state.total_deposits;
        pool.offset(total / 2, dec(1));
        let gain = pool.gain(&bob);
        assert!(gain <= dec(1));
        assert!(gain >= one() * 99_998 / 100_000);
    }

    #[test]
    fn test_rounded_up_total_loss_clears_deposits() {
        let mut pool = Harness::new();
        let alice = pool.provide(dec(2));

        // 2e18 - 1 over 2e18 rounds up to a full loss
        let outcome = pool.offset(dec(2) - U256::one(), dec(1));
        assert!(outcome.epoch_closed);
        assert_eq!(pool.state.current_epoch, 1);
        assert_eq!(pool.state.total_deposits, U256::zero());
        assert_eq!(pool.deposit(&alice), U256::zero());
    }

    /// Depositors with their snapshots and the gains already paid out
    struct Ledger {
        pool: Harness,
        snapshots: Vec<DepositSnapshot>,
        paid: Vec<U256>,
        operations: u64,
    }

    impl Ledger {
        fn new(depositors: usize) -> Self {
            Self {
                pool: Harness::new(),
                snapshots: vec![PoolState::new().snapshot(U256::zero(), U256::zero()); depositors],
                paid: vec![U256::zero(); depositors],
                operations: 0,
            }
        }

        fn settle(&mut self, who: usize) -> U256 {
            let snap = self.snapshots[who].clone();
            self.paid[who] += self.pool.gain(&snap);
            self.pool.deposit(&snap)
        }

        fn resnapshot(&mut self, who: usize, deposit: U256) {
            let s = self.pool.sum(self.pool.state.current_epoch, self.pool.state.current_scale);
            self.snapshots[who] = self.pool.state.snapshot(deposit, s);
        }

        fn provide(&mut self, who: usize, amount: u128) {
            self.operations += 1;
            let compounded = self.settle(who);
            self.pool.state.total_deposits += U256::from(amount);
            self.resnapshot(who, compounded + U256::from(amount));
        }

        fn withdraw(&mut self, who: usize, amount: u128) {
            self.operations += 1;
            let compounded = self.settle(who);
            let amount = U256::from(amount);
            assert!(amount <= compounded);
            self.pool.state.total_deposits -= amount;
            self.resnapshot(who, compounded - amount);
        }

        fn offset(&mut self, debt: u128, coll: u128) {
            self.operations += 1;
            self.pool.offset(U256::from(debt), U256::from(coll));
        }

        fn deposits(&self) -> U256 {
            self.snapshots.iter().fold(U256::zero(), |acc, s| acc + self.pool.deposit(s))
        }

        fn gains(&self) -> U256 {
            self.snapshots
                .iter()
                .zip(self.paid.iter())
                .fold(U256::zero(), |acc, (s, paid)| acc + *paid + self.pool.gain(s))
        }

        /// One wei per depositor per operation
        fn dust_bound(&self) -> U256 {
            U256::from(self.operations * self.snapshots.len() as u64)
        }
    }

    #[test]
    fn test_mixed_operations_keep_dust_bounded() {
        let mut ledger = Ledger::new(3);
        ledger.provide(0, 333_333_333_333_333_333);
        ledger.provide(1, 444_444_444_444_444_444);
        ledger.provide(2, 123_456_789_123_456_789);
        ledger.offset(100_000_000_000_000_007, 3_333_333_333_333_333);
        ledger.withdraw(1, 111_111_111_111_111_111);
        ledger.offset(77_777_777_777_777_777, 7_777_777);
        ledger.provide(0, 222_222_222_222_222_222);
        ledger.offset(33_333_333_333_333_333, 1_000_000_000_000_001);
        ledger.withdraw(2, 50_000_000_000_000_000);
        ledger.offset(99_999_999_999_999_999, 2_222_222_222_222_222);
        ledger.provide(1, 10_000_000_000_000_000);
        ledger.offset(1, 1);
        ledger.offset(12_345_678_901_234_567, 5_555_555_555_555_555);

        // loss rounds up, so depositors never hold more than the pool
        let total = ledger.pool.state.total_deposits;
        let deposits = ledger.deposits();
        assert!(deposits <= total);
        assert!(total - deposits <= ledger.dust_bound());

        // gain rounds down, so depositors never receive more than was added
        let added = U256::from(
            3_333_333_333_333_333u128 + 7_777_777 + 1_000_000_000_000_001 + 2_222_222_222_222_222 + 1
                + 5_555_555_555_555_555,
        );
        let gains = ledger.gains();
        assert!(gains <= added);
        assert!(added - gains <= ledger.dust_bound());
    }

    #[test]
    fn test_error_carry_recovers_dust() {
        let mut pool = Harness::new();
        let alice = pool.provide(dec(3));
        // 1 wei of collateral over 3e18 deposit units truncates to 0 per unit
        pool.offset(U256::one(), U256::one());
        pool.offset(U256::one(), U256::one());
        assert_eq!(pool.gain(&alice), U256::zero());

        // the third wei tips the carried remainder over one unit
        pool.offset(U256::one(), U256::one());
        assert_eq!(pool.sum(0, 0), pool.state.p);
        assert_eq!(pool.state.last_coll_error, U256::from(2));
        // P lost 1 wei to the first round-up, so 3 * (1e18 - 1) / 1e18 floors to 2
        assert_eq!(pool.gain(&alice), U256::from(2));
        assert_eq!(pool.state.total_deposits, dec(3) - U256::from(3));
    }
}
