//! # Share Ledger
//!
//! Each vault owns a dedicated fungible ledger (`FungibleToken` under a
//! vault-scoped storage prefix): one NFT equals [`crate::BASE`] share units.
//! The vault is the sole mint/burn authority while `token_owner` is the
//! contract itself; migration may hand that authority to a successor, after
//! which minting against the vault permanently rejects.
//!
//! Accounts are registered implicitly on first credit; the ledger is
//! internal to the contract, so the NEP-145 storage-deposit ceremony is
//! unnecessary friction here.

use near_contract_standards::fungible_token::core::FungibleTokenCore;
use near_contract_standards::fungible_token::events::{FtBurn, FtMint};
use near_contract_standards::fungible_token::metadata::FungibleTokenMetadata;
use near_sdk::json_types::U128;
use near_sdk::{assert_one_yocto, env, near, require, AccountId};

use crate::timelock::GovernedOp;
use crate::vault::Vault;
use crate::{Contract, ContractExt};

impl Contract {
    /// Credits `amount` share units to `account_id`, registering the account
    /// on first touch, and emits the standard mint event.
    pub fn internal_mint_shares(vault: &mut Vault, account_id: &AccountId, amount: u128, memo: &str) {
        if !vault.token.accounts.contains_key(account_id) {
            vault.token.internal_register_account(account_id);
        }
        vault.token.internal_deposit(account_id, amount);
        FtMint {
            owner_id: account_id,
            amount: U128(amount),
            memo: Some(memo),
        }
        .emit();
    }

    /// Debits `amount` share units from `account_id` and emits the standard
    /// burn event.
    ///
    /// # Panics
    ///
    /// Panics if the account's balance is insufficient.
    pub fn internal_burn_shares(vault: &mut Vault, account_id: &AccountId, amount: u128, memo: &str) {
        require!(
            vault.token.accounts.contains_key(account_id)
                && vault.token.ft_balance_of(account_id.clone()).0 >= amount,
            "insufficient share balance"
        );
        vault.token.internal_withdraw(account_id, amount);
        FtBurn {
            owner_id: account_id,
            amount: U128(amount),
            memo: Some(memo),
        }
        .emit();
    }
}

#[near]
impl Contract {
    /// Transfers share units between accounts on a vault's ledger.
    ///
    /// Requires exactly one attached yoctoNEAR, mirroring `ft_transfer`.
    #[payable]
    pub fn share_transfer(
        &mut self,
        vault_id: u64,
        receiver_id: AccountId,
        amount: U128,
        memo: Option<String>,
    ) {
        assert_one_yocto();
        self.require_not_paused();
        let sender_id = env::predecessor_account_id();
        require!(amount.0 > 0, "zero amount");
        require!(sender_id != receiver_id, "self transfer");
        let vault = self.internal_vault_mut(vault_id);
        require!(
            vault.token.accounts.contains_key(&sender_id)
                && vault.token.ft_balance_of(sender_id.clone()).0 >= amount.0,
            "insufficient share balance"
        );
        if !vault.token.accounts.contains_key(&receiver_id) {
            vault.token.internal_register_account(&receiver_id);
        }
        vault
            .token
            .internal_transfer(&sender_id, &receiver_id, amount.0, memo);
    }

    /// Renames a vault's share token. Medium tier.
    pub fn change_token_name(&mut self, vault_id: u64, name: String) {
        self.require_governed(GovernedOp::ChangeTokenName);
        let vault = self.internal_vault_mut(vault_id);
        vault.metadata.name = name;
    }

    /// Changes a vault's share token symbol. Medium tier.
    pub fn change_token_symbol(&mut self, vault_id: u64, symbol: String) {
        self.require_governed(GovernedOp::ChangeTokenSymbol);
        let vault = self.internal_vault_mut(vault_id);
        vault.metadata.symbol = symbol;
    }

    // ==================== View Methods ====================

    pub fn share_balance_of(&self, vault_id: u64, account_id: AccountId) -> U128 {
        let vault = self.internal_vault(vault_id);
        if vault.token.accounts.contains_key(&account_id) {
            vault.token.ft_balance_of(account_id)
        } else {
            U128(0)
        }
    }

    pub fn share_total_supply(&self, vault_id: u64) -> U128 {
        U128(self.internal_vault(vault_id).token.total_supply)
    }

    pub fn share_metadata(&self, vault_id: u64) -> FungibleTokenMetadata {
        self.internal_vault(vault_id).metadata.clone()
    }
}
