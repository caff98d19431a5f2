//! Collateral transfer capability
//!
//! The trove manager holds collateral either as native CSPR or as a CEP-18
//! token. Both sit behind [`TransferableAsset`] so the accounting code only
//! ever sees amounts.

use alloc::boxed::Box;
use alloc::rc::Rc;
use odra::casper_types::{U256, U512};
use odra::prelude::*;
use odra::{ContractEnv, ContractRef};
use crate::errors::CdpError;
use crate::token::Cep18TokenContractRef;

/// Moves collateral in and out of the calling contract
pub trait TransferableAsset {
    /// Pull `amount` from `from` into the contract
    fn deposit(&mut self, from: Address, amount: U256);

    /// Send `amount` held by the contract to `to`
    fn withdraw(&mut self, to: Address, amount: U256);
}

/// Native CSPR collateral, received as attached value
pub struct NativeCollateral {
    env: Rc<ContractEnv>,
}

impl NativeCollateral {
    pub fn new(env: Rc<ContractEnv>) -> Self {
        Self { env }
    }

    fn to_motes(&self, amount: U256) -> U512 {
        if amount > U256::from(u128::MAX) {
            self.env.revert(CdpError::InvalidCollateralAmount);
        }
        U512::from(amount.as_u128())
    }
}

impl TransferableAsset for NativeCollateral {
    fn deposit(&mut self, _from: Address, amount: U256) {
        // value is already in the contract purse; it has to match the claim
        if self.env.attached_value() != self.to_motes(amount) {
            self.env.revert(CdpError::InvalidCollateralAmount);
        }
    }

    fn withdraw(&mut self, to: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let motes = self.to_motes(amount);
        self.env.transfer_tokens(&to, &motes);
    }
}

/// CEP-18 token collateral, pulled with `transfer_from`
pub struct TokenCollateral {
    env: Rc<ContractEnv>,
    token: Address,
}

impl TokenCollateral {
    pub fn new(env: Rc<ContractEnv>, token: Address) -> Self {
        Self { env, token }
    }

    fn token_ref(&self) -> Cep18TokenContractRef {
        Cep18TokenContractRef::new(self.env.clone(), self.token)
    }
}

impl TransferableAsset for TokenCollateral {
    fn deposit(&mut self, from: Address, amount: U256) {
        // native value sent alongside token collateral would be stranded
        if !self.env.attached_value().is_zero() {
            self.env.revert(CdpError::InvalidCollateralAmount);
        }
        if amount.is_zero() {
            return;
        }
        let this = self.env.self_address();
        self.token_ref().transfer_from(from, this, amount);
    }

    fn withdraw(&mut self, to: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        self.token_ref().transfer(to, amount);
    }
}

/// Picks the collateral variant; `None` means native CSPR
pub fn collateral_asset(env: Rc<ContractEnv>, token: Option<Address>) -> Box<dyn TransferableAsset> {
    match token {
        Some(token) => Box::new(TokenCollateral::new(env, token)),
        None => Box::new(NativeCollateral::new(env)),
    }
}
