//! # Vault Migration
//!
//! Long-tier escape hatch for moving a vault to a successor contract. The
//! holdings are drained in bounded batches (each `migrate` call transfers at
//! most `count` tokens so a large vault never outruns the gas limit), and a
//! final call against the emptied vault marks it migrated and hands the
//! share-ledger mint authority to the destination. A migrated vault rejects
//! minting permanently.
//!
//! Separately, a vault can be paired with a successor vault on this same
//! contract (`migrate_vault_to_v2`), after which any holder may exchange
//! their old shares for new ones, permissionlessly and one way.

use near_sdk::json_types::U128;
use near_sdk::{env, ext_contract, near, require, AccountId, Gas, NearToken, PromiseResult};

use crate::events::VaultMigration;
use crate::operations::ext_nft;
use crate::timelock::GovernedOp;
use crate::{Contract, ContractExt, TokenId};

const GAS_FOR_NFT_TRANSFER: Gas = Gas::from_tgas(15);
const GAS_FOR_FT_TRANSFER: Gas = Gas::from_tgas(30);
const GAS_FOR_RESOLVE: Gas = Gas::from_tgas(10);

#[ext_contract(ext_self_migration)]
pub trait _ExtSelfMigration {
    /// Confirms or rolls back one migrated NFT.
    fn resolve_migration(&mut self, vault_id: u64, token_id: TokenId);
    /// Re-credits the D2 balance if the bulk transfer failed.
    fn resolve_d2_migration(&mut self, vault_id: u64, amount: U128);
}

#[near]
impl Contract {
    /// Drains up to `count` holdings to `destination`. Called against an
    /// already-empty vault it instead completes the migration: the vault is
    /// marked migrated and the share-ledger authority moves to the
    /// destination. Long tier.
    pub fn migrate(&mut self, vault_id: u64, count: u64, destination: AccountId) {
        self.require_governed(GovernedOp::Migrate);
        let vault = self.internal_vault_mut(vault_id);
        require!(!vault.migrated, "vault is migrated");

        if vault.is_d2 {
            Self::internal_migrate_d2(vault, vault_id, destination);
            return;
        }

        if vault.num_holdings() == 0 {
            // a drained batch may still be awaiting its transfer callbacks;
            // completing now would let a rollback strand a token inside a
            // migrated vault
            require!(vault.reserves.is_empty(), "vault has in-flight transfers");
            vault.migrated = true;
            vault.token_owner = destination.clone();
            VaultMigration {
                vault_id,
                destination: &destination,
                count: 0,
                complete: true,
            }
            .emit();
            return;
        }

        let n = count.min(vault.num_holdings());
        let mut moved = Vec::with_capacity(n as usize);
        for _ in 0..n {
            // drain from the tail so no index patching is needed
            let token_id = vault.remove_holding_at(vault.holdings.len() - 1);
            vault.reserves.insert(token_id.clone());
            moved.push(token_id);
        }
        let asset = vault.asset.clone();

        VaultMigration {
            vault_id,
            destination: &destination,
            count: n,
            complete: false,
        }
        .emit();
        for token_id in moved {
            let _ = ext_nft::ext(asset.clone())
                .with_attached_deposit(NearToken::from_yoctonear(1))
                .with_static_gas(GAS_FOR_NFT_TRANSFER)
                .nft_transfer(destination.clone(), token_id.clone(), None, None)
                .then(
                    ext_self_migration::ext(env::current_account_id())
                        .with_static_gas(GAS_FOR_RESOLVE)
                        .resolve_migration(vault_id, token_id),
                );
        }
    }

    /// Hands the share-ledger authority over without marking the vault
    /// migrated. Requires the vault to be fully drained first. Long tier.
    pub fn transfer_token_ownership(&mut self, vault_id: u64, new_owner: AccountId) {
        self.require_governed(GovernedOp::TransferTokenOwnership);
        let vault = self.internal_vault_mut(vault_id);
        require!(
            vault.num_holdings() == 0
                && vault.reserves.is_empty()
                && vault.d2_balance == 0
                && vault.d2_in_flight == 0,
            "vault still holds assets"
        );
        env::log_str(&format!(
            "token_ownership vault_id={} {} -> {}",
            vault_id, vault.token_owner, new_owner
        ));
        vault.token_owner = new_owner;
    }

    /// Pairs a vault with its successor on this contract. Set-once. Long
    /// tier.
    pub fn migrate_vault_to_v2(&mut self, vault_id: u64, v2_vault_id: u64) {
        self.require_governed(GovernedOp::MigrateVaultToV2);
        require!(vault_id != v2_vault_id, "vault cannot pair with itself");
        // both ends must exist
        self.internal_vault(v2_vault_id);
        let vault = self.internal_vault_mut(vault_id);
        require!(vault.v2_pair.is_none(), "cannot overwrite migration pair");
        vault.v2_pair = Some(v2_vault_id);
    }

    /// Exchanges the caller's entire v1 share balance for an equal balance
    /// on the paired successor vault. Permissionless and one way.
    pub fn migrate_v1_tokens(&mut self, vault_id: u64) {
        self.require_not_paused();
        let caller = env::predecessor_account_id();
        let vault = self.internal_vault(vault_id);
        let v2_vault_id = vault
            .v2_pair
            .unwrap_or_else(|| env::panic_str("no migration pair"));
        let balance = self.share_balance_of(vault_id, caller.clone()).0;
        require!(balance > 0, "insufficient share balance");

        let vault = self.internal_vault_mut(vault_id);
        Contract::internal_burn_shares(vault, &caller, balance, "V1 exchange");
        let v2_vault = self.internal_vault_mut(v2_vault_id);
        Contract::internal_mint_shares(v2_vault, &caller, balance, "V2 exchange");
    }

    /// Marks a vault migrated without draining it, abandoning whatever is
    /// stuck inside. Last resort for a broken underlying contract. Long
    /// tier.
    pub fn force_migration_complete(&mut self, vault_id: u64, destination: AccountId) {
        self.require_governed(GovernedOp::ForceMigrationComplete);
        let vault = self.internal_vault_mut(vault_id);
        vault.migrated = true;
        vault.token_owner = destination.clone();
        VaultMigration {
            vault_id,
            destination: &destination,
            count: 0,
            complete: true,
        }
        .emit();
    }

    #[private]
    pub fn resolve_migration(&mut self, vault_id: u64, token_id: TokenId) -> bool {
        let vault = self.internal_vault_mut(vault_id);
        vault.reserves.remove(&token_id);
        match env::promise_result(0) {
            PromiseResult::Successful(_) => true,
            _ => {
                vault.insert_holding(token_id.clone());
                env::log_str(&format!("migration_rollback token_id={}", token_id));
                false
            }
        }
    }
}

impl Contract {
    fn internal_migrate_d2(vault: &mut crate::vault::Vault, vault_id: u64, destination: AccountId) {
        if vault.d2_balance == 0 {
            require!(vault.d2_in_flight == 0, "vault has in-flight transfers");
            vault.migrated = true;
            vault.token_owner = destination.clone();
            VaultMigration {
                vault_id,
                destination: &destination,
                count: 0,
                complete: true,
            }
            .emit();
            return;
        }
        let amount = vault.d2_balance;
        vault.d2_balance = 0;
        vault.d2_in_flight = vault
            .d2_in_flight
            .checked_add(amount)
            .unwrap_or_else(|| env::panic_str("balance overflow"));
        VaultMigration {
            vault_id,
            destination: &destination,
            count: 0,
            complete: false,
        }
        .emit();
        let _ = near_contract_standards::fungible_token::core::ext_ft_core::ext(
            vault.asset.clone(),
        )
        .with_attached_deposit(NearToken::from_yoctonear(1))
        .with_static_gas(GAS_FOR_FT_TRANSFER)
        .ft_transfer(destination, U128(amount), Some("Migration".to_string()))
        .then(
            ext_self_migration::ext(env::current_account_id())
                .with_static_gas(GAS_FOR_RESOLVE)
                .resolve_d2_migration(vault_id, U128(amount)),
        );
    }
}

#[near]
impl Contract {
    #[private]
    pub fn resolve_d2_migration(&mut self, vault_id: u64, amount: U128) -> bool {
        let vault = self.internal_vault_mut(vault_id);
        vault.d2_in_flight = vault.d2_in_flight.saturating_sub(amount.0);
        match env::promise_result(0) {
            PromiseResult::Successful(_) => true,
            _ => {
                vault.d2_balance = vault
                    .d2_balance
                    .checked_add(amount.0)
                    .unwrap_or_else(|| env::panic_str("balance overflow"));
                false
            }
        }
    }
}
