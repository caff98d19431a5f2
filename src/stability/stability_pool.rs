//! Stability Pool - pooled stablecoin deposits absorbing liquidated debt
//!
//! Embedded in the trove manager as a sub-module. Token and collateral
//! movements are done by the parent; this module only keeps the books.

use odra::prelude::*;
use odra::casper_types::U256;
use crate::errors::CdpError;
use crate::math::SafeMath;
use super::accountant::{DepositSnapshot, PoolState};
use super::events::*;

/// Payout of a provide or withdraw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositChange {
    /// Collateral gain released to the depositor
    pub collateral_gain: U256,
    /// Stablecoin handed back to the depositor
    pub withdrawn: U256,
    /// Deposit after the change
    pub new_deposit: U256,
}

/// Stability Pool sub-module
#[odra::module]
pub struct StabilityPool {
    /// P, scale, epoch and error carries
    state: Var<PoolState>,
    /// S per (epoch, scale)
    sums: Mapping<(u64, u64), U256>,
    /// Depositor snapshots
    deposits: Mapping<Address, DepositSnapshot>,
    /// Collateral gained from offsets and not yet paid out
    collateral: Var<U256>,
}

#[odra::module]
impl StabilityPool {
    /// Total stablecoin deposited
    pub fn total_deposits(&self) -> U256 {
        self.pool_state().total_deposits
    }

    /// Collateral held for depositors
    pub fn pool_collateral(&self) -> U256 {
        self.collateral.get_or_default()
    }

    /// Current accumulator state
    pub fn pool_state(&self) -> PoolState {
        self.state.get().unwrap_or_else(PoolState::new)
    }

    /// `S[epoch][scale]`
    pub fn sum_at(&self, epoch: u64, scale: u64) -> U256 {
        self.sums.get(&(epoch, scale)).unwrap_or_default()
    }

    /// Snapshot stored for a depositor
    pub fn deposit_snapshot(&self, depositor: Address) -> Option<DepositSnapshot> {
        self.deposits.get(&depositor)
    }

    /// Deposit left after offsets
    pub fn compounded_deposit(&self, depositor: Address) -> U256 {
        let state = self.pool_state();
        let result = match self.deposits.get(&depositor) {
            Some(snapshot) => state.compounded_deposit(&snapshot),
            None => Ok(U256::zero()),
        };
        self.unwrap_or_revert(result)
    }

    /// Collateral earned and not yet paid out
    pub fn depositor_collateral_gain(&self, depositor: Address) -> U256 {
        let state = self.pool_state();
        let result = match self.deposits.get(&depositor) {
            Some(snapshot) => self.gain_for(&state, &snapshot),
            None => Ok(U256::zero()),
        };
        self.unwrap_or_revert(result)
    }
}

impl StabilityPool {
    /// Add `amount` to the depositor's compounded balance, releasing
    /// the pending gain.
    pub fn provide(&mut self, depositor: Address, amount: U256) -> Result<DepositChange, CdpError> {
        if amount.is_zero() {
            return Err(CdpError::AmountMustBePositive);
        }
        let mut state = self.pool_state();
        let (compounded, gain) = self.settle(&state, depositor)?;

        state.total_deposits = SafeMath::add(state.total_deposits, amount)?;
        let new_deposit = SafeMath::add(compounded, amount)?;
        self.write_snapshot(&state, depositor, new_deposit);
        self.state.set(state);

        Ok(DepositChange {
            collateral_gain: gain,
            withdrawn: U256::zero(),
            new_deposit,
        })
    }

    /// Take `amount` out of the compounded balance; zero only releases the gain
    pub fn withdraw(&mut self, depositor: Address, amount: U256) -> Result<DepositChange, CdpError> {
        let mut state = self.pool_state();
        let (compounded, gain) = self.settle(&state, depositor)?;
        if amount > compounded {
            return Err(CdpError::InsufficientBalance);
        }

        state.total_deposits = SafeMath::sub(state.total_deposits, amount)?;
        let new_deposit = compounded - amount;
        self.write_snapshot(&state, depositor, new_deposit);
        self.state.set(state);

        Ok(DepositChange {
            collateral_gain: gain,
            withdrawn: amount,
            new_deposit,
        })
    }

    /// Cancel `debt` against deposits and book `coll` for depositors.
    ///
    /// Returns the collateral forfeited when the offset closes an epoch;
    /// the caller moves it out of the pool.
    pub fn offset(&mut self, debt: U256, coll: U256) -> Result<U256, CdpError> {
        let mut state = self.pool_state();
        let outcome = state.offset(debt, coll)?;
        if debt.is_zero() {
            return Ok(U256::zero());
        }

        let key = (outcome.sum_epoch, outcome.sum_scale);
        let sum = SafeMath::add(self.sum_at(key.0, key.1), outcome.sum_increment)?;
        self.sums.set(&key, sum);

        let mut pool_coll = SafeMath::add(self.pool_collateral(), coll)?;
        let mut forfeited = U256::zero();
        if outcome.epoch_closed {
            forfeited = pool_coll;
            pool_coll = U256::zero();
            self.env().emit_event(EpochUpdated {
                current_epoch: state.current_epoch,
                forfeited_collateral: forfeited,
            });
        }
        if outcome.scale_changed {
            self.env().emit_event(ScaleUpdated {
                current_scale: state.current_scale,
                p: state.p,
            });
        }
        self.collateral.set(pool_coll);

        self.env().emit_event(StabilityPoolOffset {
            debt_cancelled: debt,
            collateral_added: coll,
            total_deposits: state.total_deposits,
            p: state.p,
        });
        self.state.set(state);
        Ok(forfeited)
    }

    /// Pay out the pending gain and return (compounded deposit, gain)
    fn settle(&mut self, state: &PoolState, depositor: Address) -> Result<(U256, U256), CdpError> {
        let Some(snapshot) = self.deposits.get(&depositor) else {
            return Ok((U256::zero(), U256::zero()));
        };
        let compounded = state.compounded_deposit(&snapshot)?;
        let pool_coll = self.pool_collateral();
        let gain = SafeMath::min(self.gain_for(state, &snapshot)?, pool_coll);
        self.collateral.set(pool_coll - gain);

        let deposit_loss = snapshot.initial_deposit.saturating_sub(compounded);
        if !gain.is_zero() || !deposit_loss.is_zero() {
            self.env().emit_event(CollateralGainWithdrawn {
                depositor,
                collateral: gain,
                deposit_loss,
            });
        }
        Ok((compounded, gain))
    }

    fn gain_for(&self, state: &PoolState, snapshot: &DepositSnapshot) -> Result<U256, CdpError> {
        state.collateral_gain(
            snapshot,
            self.sum_at(snapshot.epoch, snapshot.scale),
            self.sum_at(snapshot.epoch, snapshot.scale + 1),
        )
    }

    fn write_snapshot(&mut self, state: &PoolState, depositor: Address, new_deposit: U256) {
        let s = self.sum_at(state.current_epoch, state.current_scale);
        let snapshot = state.snapshot(new_deposit, s);
        self.env().emit_event(StabilityDepositUpdated {
            depositor,
            new_deposit,
            p: snapshot.p,
            s: snapshot.s,
            scale: snapshot.scale,
            epoch: snapshot.epoch,
        });
        self.deposits.set(&depositor, snapshot);
    }

    fn unwrap_or_revert<T>(&self, result: Result<T, CdpError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => self.env().revert(err),
        }
    }
}
