//! Trove Manager - troves, liquidations and redemptions
//!
//! Owns the position ledger, the redistribution accumulator, the sorted
//! index and the stability pool. Collateral is held by this contract; the
//! stablecoin is minted and burned through the token's minter role.

use odra::prelude::*;
use odra::casper_types::U256;
use odra::ContractRef;
use crate::assets::{collateral_asset, TransferableAsset};
use crate::errors::CdpError;
use crate::math::{one, DecimalMath, SafeMath};
use crate::oracle::PriceFeedContractRef;
use crate::stability::{PoolState, StabilityPool};
use crate::token::StableTokenContractRef;
use crate::treasury::TreasuryContractRef;
use super::events::*;
use super::liquidation::{
    classify, ends_sequence, is_recovery_mode, LiquidationPath, LiquidationValues, SystemSnapshot,
};
use super::params::ProtocolParams;
use super::redemption::{
    redeem_from_trove, redemption_fee, redemption_rate, require_fee_accepted, BaseRateState, TroveRedemption,
};
use super::redistribution::RewardState;
use super::sorted_troves::SortedTroves;
use super::trove::{SystemTotals, Trove, TroveStatus};

/// Which troves a liquidation call looks at
enum LiquidationOrder {
    /// Walk the index from the riskiest trove, visiting at most n troves;
    /// stops at the first trove that `ends_sequence`
    Sequence(u64),
    /// Explicit ids; unknown and closed ids are skipped
    Batch(Vec<u64>),
}

/// What happened to one trove of a liquidation pass
enum TroveLiquidation {
    Liquidated(LiquidationValues),
    /// Not eligible; `ends_sequence` tells a sequential walk to stop here
    Skipped { ends_sequence: bool },
}

/// Trove Manager contract
#[odra::module]
pub struct TroveManager {
    /// Admin address
    admin: Var<Address>,
    /// Risk and fee parameters
    params: Var<ProtocolParams>,
    /// Stablecoin contract; this contract must be its minter
    stable_token: Var<Address>,
    /// CEP-18 collateral token, `None` for native CSPR
    collateral_token: Var<Option<Address>>,
    price_feed: Var<Address>,
    treasury: Var<Address>,

    /// Trove id -> trove
    troves: Mapping<u64, Trove>,
    /// Last issued trove id
    trove_count: Var<u64>,
    totals: Var<SystemTotals>,
    rewards: Var<RewardState>,
    base_rate: Var<BaseRateState>,
    /// Claimable collateral of closed troves, per owner
    coll_surplus: Mapping<Address, U256>,

    stability_pool: SubModule<StabilityPool>,
    sorted_troves: SubModule<SortedTroves>,
}

#[odra::module]
impl TroveManager {
    /// Wire the manager to its collaborators
    pub fn init(
        &mut self,
        stable_token: Address,
        collateral_token: Option<Address>,
        price_feed: Address,
        treasury: Address,
    ) {
        let caller = self.env().caller();
        self.admin.set(caller);
        self.params.set(ProtocolParams::default());
        self.stable_token.set(stable_token);
        self.collateral_token.set(collateral_token);
        self.price_feed.set(price_feed);
        self.treasury.set(treasury);
        self.trove_count.set(0);
        self.totals.set(SystemTotals::default());
        self.rewards.set(RewardState::default());
        self.base_rate.set(BaseRateState::default());
    }

    // ========== Troves ==========

    /// Open a trove with `coll_amount` collateral, minting `net_debt` to the caller.
    ///
    /// For native collateral the attached value must equal `coll_amount`;
    /// for CEP-18 collateral the caller approves this contract first.
    #[odra(payable)]
    pub fn open_trove(&mut self, coll_amount: U256, net_debt: U256, hint: Option<u64>) -> u64 {
        let result = self.execute_open(coll_amount, net_debt, hint);
        self.or_revert(result)
    }

    /// Repay the trove's debt and take its collateral back (owner only)
    pub fn close_trove(&mut self, trove_id: u64) {
        let result = self.execute_close(trove_id);
        self.or_revert(result)
    }

    /// Withdraw collateral left over by a redemption or a capped liquidation
    pub fn claim_coll_surplus(&mut self) {
        let owner = self.env().caller();
        let amount = self.coll_surplus.get(&owner).unwrap_or_default();
        if amount.is_zero() {
            self.env().revert(CdpError::NoCollSurplus);
        }
        self.coll_surplus.set(&owner, U256::zero());

        let mut totals = self.totals.get_or_default();
        totals.surplus_coll = self.or_revert(SafeMath::sub(totals.surplus_coll, amount));
        self.totals.set(totals);

        self.collateral().withdraw(owner, amount);
        self.env().emit_event(CollSurplusClaimed { owner, amount });
    }

    // ========== Liquidations ==========

    /// Liquidate a single trove
    pub fn liquidate(&mut self, trove_id: u64) {
        let result = self.execute_single_liquidation(trove_id);
        self.or_revert(result)
    }

    /// Liquidate up to `n` troves starting from the lowest collateral ratio
    pub fn liquidate_troves(&mut self, n: u64) {
        let result = self.execute_liquidation(LiquidationOrder::Sequence(n));
        self.or_revert(result)
    }

    /// Liquidate every eligible trove in `trove_ids`
    pub fn batch_liquidate_troves(&mut self, trove_ids: Vec<u64>) {
        if trove_ids.is_empty() {
            self.env().revert(CdpError::EmptyBatch);
        }
        let result = self.execute_liquidation(LiquidationOrder::Batch(trove_ids));
        self.or_revert(result)
    }

    // ========== Redemptions ==========

    /// Swap `amount` stablecoin for collateral from the riskiest troves.
    ///
    /// `max_iterations == 0` means no limit. `start_hint` skips the walk to
    /// the first trove at or above MCR when it is correct.
    pub fn redeem_collateral(
        &mut self,
        amount: U256,
        max_fee_percentage: U256,
        max_iterations: u64,
        start_hint: Option<u64>,
    ) {
        let result = self.execute_redemption(amount, max_fee_percentage, max_iterations, start_hint);
        self.or_revert(result)
    }

    // ========== Stability Pool ==========

    /// Deposit stablecoin into the stability pool, collecting any pending gain
    pub fn provide_to_sp(&mut self, amount: U256) {
        let depositor = self.env().caller();
        let mut stable = self.stable_token_ref();
        if stable.balance_of(depositor) < amount {
            self.env().revert(CdpError::InsufficientBalance);
        }

        let result = self.stability_pool.provide(depositor, amount);
        let change = self.or_revert(result);

        stable.burn(depositor, amount);
        self.collateral().withdraw(depositor, change.collateral_gain);
    }

    /// Withdraw from the stability pool; zero only collects the gain
    pub fn withdraw_from_sp(&mut self, amount: U256) {
        let depositor = self.env().caller();
        if !amount.is_zero() {
            let result = self.require_no_undercollateralized_troves();
            self.or_revert(result);
        }

        let result = self.stability_pool.withdraw(depositor, amount);
        let change = self.or_revert(result);

        if !change.withdrawn.is_zero() {
            self.stable_token_ref().mint(depositor, change.withdrawn);
        }
        self.collateral().withdraw(depositor, change.collateral_gain);
    }

    // ========== Admin ==========

    /// Replace the protocol parameters (admin only)
    pub fn set_params(&mut self, params: ProtocolParams) {
        self.only_admin();
        self.or_revert(params.validate());
        let current = self.params();
        if params.gas_compensation != current.gas_compensation && self.sorted_troves.size() > 0 {
            // open troves carry the old reserve
            self.env().revert(CdpError::InvalidConfiguration);
        }
        self.params.set(params.clone());
        self.env().emit_event(ParamsUpdated { params });
    }

    // ========== Views ==========

    pub fn get_admin(&self) -> Address {
        self.admin.get_or_revert_with(CdpError::Unauthorized)
    }

    pub fn get_params(&self) -> ProtocolParams {
        self.params()
    }

    pub fn get_trove(&self, trove_id: u64) -> Option<Trove> {
        self.troves.get(&trove_id)
    }

    pub fn get_trove_status(&self, trove_id: u64) -> TroveStatus {
        self.troves
            .get(&trove_id)
            .map(|trove| trove.status)
            .unwrap_or(TroveStatus::Nonexistent)
    }

    pub fn trove_count(&self) -> u64 {
        self.trove_count.get_or_default()
    }

    /// Pending redistribution rewards as (coll, debt)
    pub fn get_pending_rewards(&self, trove_id: u64) -> (U256, U256) {
        let rewards = self.rewards.get_or_default();
        let result = self.load_trove(trove_id).and_then(|trove| rewards.pending_rewards(&trove));
        self.or_revert(result)
    }

    /// Debt and collateral including pending rewards, as (debt, coll)
    pub fn get_entire_debt_and_coll(&self, trove_id: u64) -> (U256, U256) {
        let result = self.entire_trove(trove_id).map(|trove| (trove.debt, trove.coll));
        self.or_revert(result)
    }

    /// Collateral ratio at the current price, pending rewards included
    pub fn get_current_icr(&self, trove_id: u64) -> U256 {
        let price = self.fetch_price();
        let result = self.entire_trove(trove_id).and_then(|trove| trove.icr(price));
        self.or_revert(result)
    }

    /// Nominal collateral ratio, pending rewards included
    pub fn get_nominal_icr(&self, trove_id: u64) -> U256 {
        let result = self.entire_trove(trove_id).and_then(|trove| trove.nicr());
        self.or_revert(result)
    }

    /// Total collateral ratio at the current price
    pub fn get_tcr(&self) -> U256 {
        let price = self.fetch_price();
        self.or_revert(self.totals.get_or_default().tcr(price))
    }

    pub fn is_recovery_mode(&self) -> bool {
        let tcr = self.get_tcr();
        is_recovery_mode(tcr, self.params().ccr)
    }

    pub fn get_system_totals(&self) -> SystemTotals {
        self.totals.get_or_default()
    }

    pub fn get_reward_state(&self) -> RewardState {
        self.rewards.get_or_default()
    }

    pub fn get_base_rate(&self) -> U256 {
        self.base_rate.get_or_default().base_rate
    }

    /// Fee rate a redemption would start from now
    pub fn get_redemption_rate(&self) -> U256 {
        let params = self.params();
        let now = self.env().get_block_time();
        let decayed = self.base_rate.get_or_default().decayed_base_rate(now, params.minute_decay_factor);
        let decayed = self.or_revert(decayed);
        redemption_rate(decayed, params.redemption_fee_floor)
    }

    pub fn get_coll_surplus(&self, owner: Address) -> U256 {
        self.coll_surplus.get(&owner).unwrap_or_default()
    }

    pub fn get_pool_state(&self) -> PoolState {
        self.stability_pool.pool_state()
    }

    pub fn get_total_deposits(&self) -> U256 {
        self.stability_pool.total_deposits()
    }

    pub fn get_pool_collateral(&self) -> U256 {
        self.stability_pool.pool_collateral()
    }

    pub fn get_compounded_deposit(&self, depositor: Address) -> U256 {
        self.stability_pool.compounded_deposit(depositor)
    }

    pub fn get_depositor_collateral_gain(&self, depositor: Address) -> U256 {
        self.stability_pool.depositor_collateral_gain(depositor)
    }

    pub fn first_trove(&self) -> Option<u64> {
        self.sorted_troves.first()
    }

    pub fn last_trove(&self) -> Option<u64> {
        self.sorted_troves.last()
    }

    pub fn next_trove(&self, trove_id: u64) -> Option<u64> {
        self.sorted_troves.next(trove_id)
    }

    pub fn prev_trove(&self, trove_id: u64) -> Option<u64> {
        self.sorted_troves.prev(trove_id)
    }

    pub fn sorted_troves_size(&self) -> u64 {
        self.sorted_troves.size()
    }
}

impl TroveManager {
    fn execute_open(&mut self, coll_amount: U256, net_debt: U256, hint: Option<u64>) -> Result<u64, CdpError> {
        let params = self.params();
        if coll_amount.is_zero() {
            return Err(CdpError::AmountMustBePositive);
        }
        if net_debt < params.min_net_debt {
            return Err(CdpError::NetDebtBelowMinimum);
        }

        let price = self.fetch_price();
        let mut totals = self.totals.get_or_default();
        let mut rewards = self.rewards.get_or_default();
        let debt = SafeMath::add(net_debt, params.gas_compensation)?;
        let icr = DecimalMath::compute_cr(coll_amount, debt, price)?;

        if is_recovery_mode(totals.tcr(price)?, params.ccr) {
            if icr < params.ccr {
                return Err(CdpError::IcrBelowCritical);
            }
        } else {
            if icr < params.mcr {
                return Err(CdpError::IcrBelowMinimum);
            }
            let new_tcr = DecimalMath::compute_cr(
                SafeMath::add(totals.entire_coll()?, coll_amount)?,
                SafeMath::add(totals.entire_debt()?, debt)?,
                price,
            )?;
            if new_tcr < params.ccr {
                return Err(CdpError::TcrBelowCritical);
            }
        }

        let owner = self.env().caller();
        self.collateral().deposit(owner, coll_amount);

        let id = self.trove_count.get_or_default() + 1;
        self.trove_count.set(id);

        let mut trove = Trove {
            id,
            owner,
            coll: coll_amount,
            debt,
            stake: U256::zero(),
            status: TroveStatus::Active,
            l_coll_snapshot: U256::zero(),
            l_debt_snapshot: U256::zero(),
        };
        rewards.update_reward_snapshot(&mut trove);
        rewards.update_stake(&mut trove)?;
        self.sorted_troves.insert(id, trove.nicr()?, hint)?;

        totals.increase_active(coll_amount, debt)?;
        totals.gas_reserve = SafeMath::add(totals.gas_reserve, params.gas_compensation)?;
        self.totals.set(totals);
        self.rewards.set(rewards);

        let mut stable = self.stable_token_ref();
        stable.mint(owner, net_debt);
        stable.mint(self.env().self_address(), params.gas_compensation);

        self.emit_trove_updated(&trove, TroveOperation::Open);
        self.troves.set(&id, trove);
        Ok(id)
    }

    fn execute_close(&mut self, trove_id: u64) -> Result<(), CdpError> {
        let params = self.params();
        let mut trove = self.load_active_trove(trove_id)?;
        if trove.owner != self.env().caller() {
            return Err(CdpError::NotTroveOwner);
        }

        let price = self.fetch_price();
        let mut totals = self.totals.get_or_default();
        let mut rewards = self.rewards.get_or_default();
        if is_recovery_mode(totals.tcr(price)?, params.ccr) {
            return Err(CdpError::RecoveryModeActive);
        }
        if self.sorted_troves.size() <= 1 {
            return Err(CdpError::OnlyOneTroveLeft);
        }

        let (pending_coll, pending_debt) = rewards.apply_pending_rewards(&mut trove)?;
        totals.move_pending_to_active(pending_coll, pending_debt)?;

        let new_tcr = DecimalMath::compute_cr(
            SafeMath::sub(totals.entire_coll()?, trove.coll)?,
            SafeMath::sub(totals.entire_debt()?, trove.debt)?,
            price,
        )?;
        if new_tcr < params.ccr {
            return Err(CdpError::TcrBelowCritical);
        }

        let coll = trove.coll;
        let repay = SafeMath::sub(trove.debt, params.gas_compensation)?;
        totals.decrease_active(coll, trove.debt)?;
        totals.gas_reserve = SafeMath::sub(totals.gas_reserve, params.gas_compensation)?;
        rewards.remove_stake(&mut trove)?;
        self.sorted_troves.remove(trove_id)?;
        trove.close(TroveStatus::ClosedByOwner);

        self.totals.set(totals);
        self.rewards.set(rewards);
        self.emit_trove_updated(&trove, TroveOperation::Close);
        let owner = trove.owner;
        self.troves.set(&trove_id, trove);

        let mut stable = self.stable_token_ref();
        stable.burn(owner, repay);
        stable.burn(self.env().self_address(), params.gas_compensation);
        self.collateral().withdraw(owner, coll);
        Ok(())
    }

    fn execute_single_liquidation(&mut self, trove_id: u64) -> Result<(), CdpError> {
        self.load_active_trove(trove_id)?;
        self.execute_liquidation(LiquidationOrder::Batch(Vec::from([trove_id])))
    }

    fn execute_liquidation(&mut self, order: LiquidationOrder) -> Result<(), CdpError> {
        let params = self.params();
        let price = self.fetch_price();
        let mut totals = self.totals.get_or_default();
        let mut rewards = self.rewards.get_or_default();
        let mut system = SystemSnapshot {
            coll: totals.entire_coll()?,
            debt: totals.entire_debt()?,
            pool_deposits: self.stability_pool.total_deposits(),
        };
        let mut batch = LiquidationValues::default();
        let mut liquidated = 0u64;

        match order {
            LiquidationOrder::Sequence(n) => {
                let mut cursor = self.sorted_troves.first();
                let mut visited = 0u64;
                while let Some(id) = cursor {
                    if visited >= n {
                        break;
                    }
                    visited += 1;
                    // removal unlinks the node, read the successor first
                    let next = self.sorted_troves.next(id);
                    let trove = self.load_trove(id)?;
                    match self.liquidate_trove(trove, price, &params, &mut totals, &mut rewards, &mut system)? {
                        TroveLiquidation::Liquidated(values) => {
                            batch.accumulate(&values)?;
                            liquidated += 1;
                        }
                        TroveLiquidation::Skipped { ends_sequence: true } => break,
                        TroveLiquidation::Skipped { ends_sequence: false } => {}
                    }
                    cursor = next;
                }
            }
            LiquidationOrder::Batch(ids) => {
                for id in ids {
                    let trove = match self.troves.get(&id) {
                        Some(trove) if trove.is_active() => trove,
                        _ => continue,
                    };
                    if let TroveLiquidation::Liquidated(values) =
                        self.liquidate_trove(trove, price, &params, &mut totals, &mut rewards, &mut system)?
                    {
                        batch.accumulate(&values)?;
                        liquidated += 1;
                    }
                }
            }
        }

        if liquidated == 0 {
            return Err(CdpError::NothingToLiquidate);
        }
        self.settle_liquidation(&batch, liquidated, &params, totals, rewards)
    }

    /// Close one trove if it is eligible and return its share of the batch
    fn liquidate_trove(
        &mut self,
        mut trove: Trove,
        price: U256,
        params: &ProtocolParams,
        totals: &mut SystemTotals,
        rewards: &mut RewardState,
        system: &mut SystemSnapshot,
    ) -> Result<TroveLiquidation, CdpError> {
        let (pending_coll, pending_debt) = rewards.apply_pending_rewards(&mut trove)?;
        totals.move_pending_to_active(pending_coll, pending_debt)?;

        let icr = trove.icr(price)?;
        let tcr = system.tcr(price)?;
        let recovery = is_recovery_mode(tcr, params.ccr);
        let path = classify(icr, tcr, recovery, params.mcr, trove.debt, system.pool_deposits);
        let values = match path {
            LiquidationPath::Standard => LiquidationValues::standard(
                trove.coll,
                trove.debt,
                system.pool_deposits,
                params.coll_gas_comp_divisor,
            )?,
            LiquidationPath::Capped => LiquidationValues::capped(
                trove.coll,
                trove.debt,
                price,
                params.mcr,
                params.coll_gas_comp_divisor,
            )?,
            LiquidationPath::Skip => {
                self.troves.set(&{ trove.id }, trove);
                return Ok(TroveLiquidation::Skipped {
                    ends_sequence: ends_sequence(icr, params.mcr, recovery, system.pool_deposits),
                });
            }
        };

        if !values.coll_surplus.is_zero() {
            self.credit_surplus(trove.owner, values.coll_surplus)?;
        }
        rewards.remove_stake(&mut trove)?;
        self.sorted_troves.remove(trove.id)?;
        system.apply(&values)?;

        self.env().emit_event(TroveLiquidated {
            trove_id: trove.id,
            owner: trove.owner,
            debt: values.entire_debt,
            coll: values.entire_coll,
            capped: path == LiquidationPath::Capped,
        });
        trove.close(TroveStatus::ClosedByLiquidation);
        self.troves.set(&{ trove.id }, trove);
        Ok(TroveLiquidation::Liquidated(values))
    }

    /// One offset, one redistribution and one gas payout for the whole batch
    fn settle_liquidation(
        &mut self,
        batch: &LiquidationValues,
        liquidated: u64,
        params: &ProtocolParams,
        mut totals: SystemTotals,
        mut rewards: RewardState,
    ) -> Result<(), CdpError> {
        let liquidator = self.env().caller();

        totals.decrease_active(batch.coll_to_send_to_pool, batch.debt_to_offset)?;
        let forfeited = self.stability_pool.offset(batch.debt_to_offset, batch.coll_to_send_to_pool)?;

        if !batch.coll_to_redistribute.is_zero() || !batch.debt_to_redistribute.is_zero() {
            rewards.redistribute(batch.coll_to_redistribute, batch.debt_to_redistribute)?;
            totals.move_active_to_default(batch.coll_to_redistribute, batch.debt_to_redistribute)?;
            self.env().emit_event(Redistribution {
                coll: batch.coll_to_redistribute,
                debt: batch.debt_to_redistribute,
                l_coll: rewards.l_coll,
                l_debt: rewards.l_debt,
            });
        }

        totals.decrease_active(SafeMath::add(batch.coll_gas_compensation, batch.coll_surplus)?, U256::zero())?;
        totals.surplus_coll = SafeMath::add(totals.surplus_coll, batch.coll_surplus)?;
        let reserve_paid = SafeMath::mul(params.gas_compensation, U256::from(liquidated))?;
        totals.gas_reserve = SafeMath::sub(totals.gas_reserve, reserve_paid)?;

        rewards.update_system_snapshots(totals.entire_coll()?);
        self.totals.set(totals);
        self.rewards.set(rewards);

        self.env().emit_event(Liquidation {
            liquidated_debt: batch.entire_debt,
            liquidated_coll: batch.entire_coll,
            coll_gas_compensation: batch.coll_gas_compensation,
            gas_reserve_compensation: reserve_paid,
        });

        let mut collateral = self.collateral();
        collateral.withdraw(liquidator, batch.coll_gas_compensation);
        self.stable_token_ref().transfer(liquidator, reserve_paid);
        self.forward_to_treasury(collateral.as_mut(), forfeited);
        Ok(())
    }

    fn execute_redemption(
        &mut self,
        amount: U256,
        max_fee_percentage: U256,
        max_iterations: u64,
        start_hint: Option<u64>,
    ) -> Result<(), CdpError> {
        let params = self.params();
        if amount.is_zero() {
            return Err(CdpError::AmountMustBePositive);
        }
        if max_fee_percentage < params.redemption_fee_floor || max_fee_percentage > one() {
            return Err(CdpError::InvalidMaxFeePercentage);
        }

        let price = self.fetch_price();
        let mut totals = self.totals.get_or_default();
        let mut rewards = self.rewards.get_or_default();
        if totals.tcr(price)? < params.mcr {
            return Err(CdpError::SystemBelowMinimumRatio);
        }

        let redeemer = self.env().caller();
        let mut stable = self.stable_token_ref();
        if stable.balance_of(redeemer) < amount {
            return Err(CdpError::InsufficientBalance);
        }
        let supply_at_start = totals.entire_debt()?;

        let mut remaining = amount;
        let mut coll_drawn = U256::zero();
        let mut closed = 0u64;
        let mut iterations = 0u64;
        let mut cursor = self.first_redemption_candidate(start_hint, price, params.mcr, &rewards)?;

        while let Some(id) = cursor {
            if remaining.is_zero() || (max_iterations != 0 && iterations >= max_iterations) {
                break;
            }
            iterations += 1;
            let next = self.sorted_troves.next(id);

            let mut trove = self.load_trove(id)?;
            let (pending_coll, pending_debt) = rewards.apply_pending_rewards(&mut trove)?;
            totals.move_pending_to_active(pending_coll, pending_debt)?;

            if trove.icr(price)? < params.mcr {
                self.troves.set(&id, trove);
                cursor = next;
                continue;
            }

            let redemption = redeem_from_trove(
                trove.coll,
                trove.debt,
                remaining,
                price,
                params.gas_compensation,
                params.min_net_debt,
            )?;
            let (debt_lot, coll_lot) = match redemption {
                TroveRedemption::Cancelled => {
                    self.troves.set(&id, trove);
                    break;
                }
                TroveRedemption::Full { debt_lot, coll_lot, surplus } => {
                    totals.decrease_active(
                        SafeMath::add(coll_lot, surplus)?,
                        SafeMath::add(debt_lot, params.gas_compensation)?,
                    )?;
                    totals.gas_reserve = SafeMath::sub(totals.gas_reserve, params.gas_compensation)?;
                    totals.surplus_coll = SafeMath::add(totals.surplus_coll, surplus)?;
                    self.credit_surplus(trove.owner, surplus)?;
                    rewards.remove_stake(&mut trove)?;
                    self.sorted_troves.remove(id)?;
                    trove.close(TroveStatus::ClosedByRedemption);
                    closed += 1;
                    (debt_lot, coll_lot)
                }
                TroveRedemption::Partial { debt_lot, coll_lot, new_coll, new_debt } => {
                    totals.decrease_active(coll_lot, debt_lot)?;
                    trove.coll = new_coll;
                    trove.debt = new_debt;
                    rewards.update_stake(&mut trove)?;
                    self.sorted_troves.reinsert(id, trove.nicr()?, None)?;
                    (debt_lot, coll_lot)
                }
            };

            remaining = SafeMath::sub(remaining, debt_lot)?;
            coll_drawn = SafeMath::add(coll_drawn, coll_lot)?;
            self.emit_trove_updated(&trove, TroveOperation::Redeem);
            self.troves.set(&id, trove);
            cursor = next;
        }

        if coll_drawn.is_zero() {
            return Err(CdpError::UnableToRedeem);
        }

        let now = self.env().get_block_time();
        let mut base_rate = self.base_rate.get_or_default();
        let new_base_rate = base_rate.update_from_redemption(
            coll_drawn,
            price,
            supply_at_start,
            params.beta,
            params.minute_decay_factor,
            now,
        )?;
        let fee = redemption_fee(redemption_rate(new_base_rate, params.redemption_fee_floor), coll_drawn)?;
        require_fee_accepted(fee, coll_drawn, max_fee_percentage)?;

        self.env().emit_event(BaseRateUpdated {
            base_rate: base_rate.base_rate,
            last_fee_operation_time: base_rate.last_fee_operation_time,
        });
        self.base_rate.set(base_rate);
        self.totals.set(totals);
        self.rewards.set(rewards);

        let actual_amount = amount - remaining;
        stable.burn(redeemer, actual_amount);
        if closed > 0 {
            let reserve = SafeMath::mul(params.gas_compensation, U256::from(closed))?;
            stable.burn(self.env().self_address(), reserve);
        }

        let coll_sent = coll_drawn - fee;
        let mut collateral = self.collateral();
        self.forward_to_treasury(collateral.as_mut(), fee);
        collateral.withdraw(redeemer, coll_sent);

        self.env().emit_event(Redemption {
            attempted_amount: amount,
            actual_amount,
            coll_sent,
            fee,
        });
        Ok(())
    }

    /// The hint if it is the first trove at or above MCR, else a walk from the head
    fn first_redemption_candidate(
        &self,
        hint: Option<u64>,
        price: U256,
        mcr: U256,
        rewards: &RewardState,
    ) -> Result<Option<u64>, CdpError> {
        if let Some(hint) = hint {
            if self.is_valid_first_redemption_hint(hint, price, mcr, rewards)? {
                return Ok(Some(hint));
            }
        }
        let mut cursor = self.sorted_troves.first();
        while let Some(id) = cursor {
            if self.current_icr(id, price, rewards)? >= mcr {
                break;
            }
            cursor = self.sorted_troves.next(id);
        }
        Ok(cursor)
    }

    fn is_valid_first_redemption_hint(
        &self,
        hint: u64,
        price: U256,
        mcr: U256,
        rewards: &RewardState,
    ) -> Result<bool, CdpError> {
        if !self.sorted_troves.contains(hint) || self.current_icr(hint, price, rewards)? < mcr {
            return Ok(false);
        }
        match self.sorted_troves.prev(hint) {
            None => Ok(true),
            Some(prev) => Ok(self.current_icr(prev, price, rewards)? < mcr),
        }
    }

    fn require_no_undercollateralized_troves(&self) -> Result<(), CdpError> {
        let Some(first) = self.sorted_troves.first() else {
            return Ok(());
        };
        let price = self.fetch_price();
        let rewards = self.rewards.get_or_default();
        if self.current_icr(first, price, &rewards)? < self.params().mcr {
            return Err(CdpError::UndercollateralizedTroves);
        }
        Ok(())
    }

    fn current_icr(&self, trove_id: u64, price: U256, rewards: &RewardState) -> Result<U256, CdpError> {
        let trove = self.load_trove(trove_id)?;
        let (pending_coll, pending_debt) = rewards.pending_rewards(&trove)?;
        DecimalMath::compute_cr(
            SafeMath::add(trove.coll, pending_coll)?,
            SafeMath::add(trove.debt, pending_debt)?,
            price,
        )
    }

    /// Trove with pending rewards folded in, without storing it
    fn entire_trove(&self, trove_id: u64) -> Result<Trove, CdpError> {
        let mut trove = self.load_trove(trove_id)?;
        self.rewards.get_or_default().apply_pending_rewards(&mut trove)?;
        Ok(trove)
    }

    fn load_trove(&self, trove_id: u64) -> Result<Trove, CdpError> {
        self.troves.get(&trove_id).ok_or(CdpError::TroveNotFound)
    }

    fn load_active_trove(&self, trove_id: u64) -> Result<Trove, CdpError> {
        let trove = self.load_trove(trove_id)?;
        if !trove.is_active() {
            return Err(CdpError::AlreadyClosed);
        }
        Ok(trove)
    }

    fn credit_surplus(&mut self, owner: Address, amount: U256) -> Result<(), CdpError> {
        if amount.is_zero() {
            return Ok(());
        }
        let owed = self.coll_surplus.get(&owner).unwrap_or_default();
        self.coll_surplus.set(&owner, SafeMath::add(owed, amount)?);
        Ok(())
    }

    fn forward_to_treasury(&self, collateral: &mut dyn TransferableAsset, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let treasury = self.treasury.get_or_revert_with(CdpError::InvalidConfiguration);
        collateral.withdraw(treasury, amount);
        TreasuryContractRef::new(self.env(), treasury).receive_fee(amount);
    }

    fn emit_trove_updated(&self, trove: &Trove, operation: TroveOperation) {
        self.env().emit_event(TroveUpdated {
            trove_id: trove.id,
            owner: trove.owner,
            coll: trove.coll,
            debt: trove.debt,
            stake: trove.stake,
            operation,
        });
    }

    fn params(&self) -> ProtocolParams {
        self.params.get_or_default()
    }

    fn fetch_price(&self) -> U256 {
        let feed = self.price_feed.get_or_revert_with(CdpError::PriceFeedNotAvailable);
        PriceFeedContractRef::new(self.env(), feed).get_price()
    }

    fn stable_token_ref(&self) -> StableTokenContractRef {
        let token = self.stable_token.get_or_revert_with(CdpError::InvalidConfiguration);
        StableTokenContractRef::new(self.env(), token)
    }

    fn collateral(&self) -> Box<dyn TransferableAsset> {
        collateral_asset(self.env(), self.collateral_token.get().flatten())
    }

    fn only_admin(&self) {
        let caller = self.env().caller();
        let admin = self.admin.get_or_revert_with(CdpError::Unauthorized);
        if caller != admin {
            self.env().revert(CdpError::Unauthorized);
        }
    }

    fn or_revert<T>(&self, result: Result<T, CdpError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => self.env().revert(err),
        }
    }
}
