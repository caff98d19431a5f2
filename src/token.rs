//! CEP-18 token used for the stablecoin
//! Minting and burning are reserved to a single minter, which is the
//! trove manager once the protocol is wired up.
use odra::prelude::*;
use odra::casper_types::U256;
use crate::events::{Approval, MinterChanged, Transfer};
use crate::errors::TokenError;

/// Stablecoin module implementing CEP-18 standard
#[odra::module]
pub struct StableToken {
    /// Token name
    name: Var<String>,
    /// Token symbol
    symbol: Var<String>,
    /// Token decimals
    decimals: Var<u8>,
    /// Total supply of tokens
    total_supply: Var<U256>,
    /// Balance mapping: owner -> balance
    balances: Mapping<Address, U256>,
    /// Allowance mapping: owner -> spender -> amount
    allowances: Mapping<(Address, Address), U256>,
    /// Only account allowed to mint and burn
    minter: Var<Address>,
}

#[odra::module]
impl StableToken {
    /// Initialize the token; the deployer is the first minter
    pub fn init(&mut self, name: String, symbol: String) {
        self.name.set(name);
        self.symbol.set(symbol);
        self.decimals.set(18);
        self.total_supply.set(U256::zero());
        self.minter.set(self.env().caller());
    }

    /// Get the token name
    pub fn name(&self) -> String {
        self.name.get_or_default()
    }

    /// Get the token symbol
    pub fn symbol(&self) -> String {
        self.symbol.get_or_default()
    }

    /// Get the token decimals
    pub fn decimals(&self) -> u8 {
        self.decimals.get_or_default()
    }

    /// Get the total supply
    pub fn total_supply(&self) -> U256 {
        self.total_supply.get_or_default()
    }

    /// Get the balance of an address
    pub fn balance_of(&self, owner: Address) -> U256 {
        self.balances.get(&owner).unwrap_or_default()
    }

    /// Get the allowance for a spender
    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances.get(&(owner, spender)).unwrap_or_default()
    }

    /// Current minter
    pub fn minter(&self) -> Address {
        self.minter.get_or_revert_with(TokenError::NotMinter)
    }

    /// Transfer tokens to another address
    pub fn transfer(&mut self, to: Address, amount: U256) -> bool {
        let caller = self.env().caller();
        self.transfer_internal(caller, to, amount);
        true
    }

    /// Approve a spender to spend tokens
    pub fn approve(&mut self, spender: Address, amount: U256) -> bool {
        let caller = self.env().caller();
        self.approve_internal(caller, spender, amount);
        true
    }

    /// Transfer tokens from one address to another (requires approval)
    pub fn transfer_from(&mut self, from: Address, to: Address, amount: U256) -> bool {
        let caller = self.env().caller();
        let current_allowance = self.allowance(from, caller);

        if current_allowance < amount {
            self.env().revert(TokenError::InsufficientAllowance);
        }

        self.approve_internal(from, caller, current_allowance - amount);
        self.transfer_internal(from, to, amount);
        true
    }

    /// Hand the minter role to another account (minter only)
    pub fn set_minter(&mut self, new_minter: Address) {
        self.only_minter();
        let old_minter = self.minter();
        self.minter.set(new_minter);
        self.env().emit_event(MinterChanged {
            old_minter,
            new_minter,
        });
    }

    /// Mint new tokens (minter only)
    pub fn mint(&mut self, to: Address, amount: U256) {
        self.only_minter();
        let current_supply = self.total_supply();
        self.total_supply.set(current_supply + amount);

        let current_balance = self.balance_of(to);
        self.balances.set(&to, current_balance + amount);

        self.env().emit_event(Transfer {
            from: self.env().self_address(),
            to,
            value: amount,
        });
    }

    /// Burn tokens (minter only)
    pub fn burn(&mut self, from: Address, amount: U256) {
        self.only_minter();
        let current_balance = self.balance_of(from);
        if current_balance < amount {
            self.env().revert(TokenError::InsufficientBalance);
        }

        self.balances.set(&from, current_balance - amount);

        let current_supply = self.total_supply();
        self.total_supply.set(current_supply - amount);

        self.env().emit_event(Transfer {
            from,
            to: self.env().self_address(),
            value: amount,
        });
    }

    fn transfer_internal(&mut self, from: Address, to: Address, amount: U256) {
        let from_balance = self.balance_of(from);
        if from_balance < amount {
            self.env().revert(TokenError::InsufficientBalance);
        }

        self.balances.set(&from, from_balance - amount);
        let to_balance = self.balance_of(to);
        self.balances.set(&to, to_balance + amount);

        self.env().emit_event(Transfer {
            from,
            to,
            value: amount,
        });
    }

    fn approve_internal(&mut self, owner: Address, spender: Address, amount: U256) {
        self.allowances.set(&(owner, spender), amount);

        self.env().emit_event(Approval {
            owner,
            spender,
            value: amount,
        });
    }

    fn only_minter(&self) {
        let caller = self.env().caller();
        let minter = self.minter.get_or_revert_with(TokenError::NotMinter);
        if caller != minter {
            self.env().revert(TokenError::NotMinter);
        }
    }
}

/// External token interface for CEP-18 collateral tokens
#[odra::external_contract]
pub trait Cep18Token {
    /// Get the balance of an address
    fn balance_of(&self, owner: Address) -> U256;

    /// Transfer tokens
    fn transfer(&mut self, to: Address, amount: U256) -> bool;

    /// Transfer tokens from another address
    fn transfer_from(&mut self, from: Address, to: Address, amount: U256) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use odra::host::{Deployer, HostEnv};

    fn setup() -> (HostEnv, StableTokenHostRef) {
        let env = odra_test::env();
        let init_args = StableTokenInitArgs {
            name: String::from("CDP Dollar"),
            symbol: String::from("CUSD"),
        };
        let token = StableToken::deploy(&env, init_args);
        (env, token)
    }

    #[test]
    fn test_init() {
        let (env, token) = setup();
        assert_eq!(token.name(), "CDP Dollar");
        assert_eq!(token.symbol(), "CUSD");
        assert_eq!(token.decimals(), 18);
        assert_eq!(token.total_supply(), U256::zero());
        assert_eq!(token.minter(), env.get_account(0));
    }

    #[test]
    fn test_mint_and_burn() {
        let (env, mut token) = setup();
        let user = env.get_account(1);
        let amount = U256::from(1000);

        token.mint(user, amount);
        assert_eq!(token.balance_of(user), amount);
        assert_eq!(token.total_supply(), amount);

        token.burn(user, amount);
        assert_eq!(token.balance_of(user), U256::zero());
        assert_eq!(token.total_supply(), U256::zero());
    }

    #[test]
    fn test_only_minter_can_mint() {
        let (env, mut token) = setup();
        let user = env.get_account(1);

        env.set_caller(user);
        assert_eq!(
            token.try_mint(user, U256::from(1)),
            Err(TokenError::NotMinter.into())
        );
    }

    #[test]
    fn test_minter_handover() {
        let (env, mut token) = setup();
        let new_minter = env.get_account(2);
        token.set_minter(new_minter);
        assert_eq!(token.minter(), new_minter);

        // old minter lost the role
        assert_eq!(
            token.try_mint(new_minter, U256::from(1)),
            Err(TokenError::NotMinter.into())
        );
        env.set_caller(new_minter);
        token.mint(new_minter, U256::from(1));
        assert_eq!(token.balance_of(new_minter), U256::from(1));
    }

    #[test]
    fn test_transfer_from_requires_allowance() {
        let (env, mut token) = setup();
        let owner = env.get_account(0);
        let spender = env.get_account(1);
        token.mint(owner, U256::from(1000));

        env.set_caller(spender);
        assert_eq!(
            token.try_transfer_from(owner, spender, U256::from(10)),
            Err(TokenError::InsufficientAllowance.into())
        );

        env.set_caller(owner);
        token.approve(spender, U256::from(10));
        env.set_caller(spender);
        token.transfer_from(owner, spender, U256::from(10));
        assert_eq!(token.balance_of(spender), U256::from(10));
        assert_eq!(token.allowance(owner, spender), U256::zero());
    }
}
