//! # NFTX Vault Contract
//!
//! Fractionalizes NFT collections into fungible share tokens. Each vault
//! binds one underlying asset contract to a dedicated share ledger: minting
//! deposits items and issues [`BASE`] share units per item, redeeming burns
//! shares and releases pseudo-randomly selected items back out.
//!
//! The contract also carries per-vault eligibility predicates, fee and
//! supplier-bounty schedules settled in attached NEAR, a three-tier
//! governance timelock over every privileged entry point, and a migration
//! path that can drain a vault and hand its share ledger to a successor
//! contract.

use near_sdk::borsh::{self, BorshDeserialize, BorshSerialize};
use near_sdk::store::{IterableMap, IterableSet};
use near_sdk::{env, near, require, AccountId, BorshStorageKey, PanicOnDefault};

pub mod eligibility;
pub mod events;
pub mod fees;
pub mod migration;
pub mod mul_div;
pub mod operations;
#[cfg(test)]
pub mod test_utils;
pub mod timelock;
pub mod token;
pub mod vault;

use crate::timelock::{GovernedOp, Timelock};
use crate::vault::Vault;

/// Token identifier on the underlying NEP-171 contract.
pub type TokenId = near_contract_standards::non_fungible_token::TokenId;

/// Share units minted per custodied NFT (18 decimals).
pub const BASE: u128 = 1_000_000_000_000_000_000;

/// Storage prefixes for NEAR SDK collections. Vault-scoped variants fold
/// the vault id into the prefix so per-vault collections never collide.
#[derive(BorshSerialize, BorshDeserialize, BorshStorageKey)]
pub enum StorageKey {
    Vaults,
    Integrators,
    ShareToken { vault_id: u64 },
    Holdings { vault_id: u64 },
    HoldingsIndex { vault_id: u64 },
    Reserves { vault_id: u64 },
    PendingNfts { vault_id: u64 },
    PendingD2 { vault_id: u64 },
    Eligibility { vault_id: u64 },
    Flipped { vault_id: u64 },
}

#[near(contract_state)]
#[derive(PanicOnDefault)]
pub struct Contract {
    /// Governance account; every privileged entry point checks it.
    pub owner_id: AccountId,
    /// Global circuit breaker. While set, only governance, views, and the
    /// degraded single-unit redemption path are reachable.
    pub is_paused: bool,
    pub vaults: IterableMap<u64, Vault>,
    /// Next vault ordinal; ids are never reused.
    pub vault_count: u64,
    /// Accounts exempt from fees and allowed to redeem exact ids.
    pub integrators: IterableSet<AccountId>,
    pub timelock: Timelock,
    /// Monotonic salt folded into the redemption entropy.
    pub entropy_nonce: u64,
}

#[near]
impl Contract {
    #[init]
    pub fn new(owner_id: AccountId) -> Self {
        Self {
            owner_id,
            is_paused: false,
            vaults: IterableMap::new(StorageKey::Vaults),
            vault_count: 0,
            integrators: IterableSet::new(StorageKey::Integrators),
            timelock: Timelock::default(),
            entropy_nonce: 0,
        }
    }

    /// Halts user-facing operations. Owner-only and untimed.
    pub fn pause(&mut self) {
        self.require_owner();
        self.is_paused = true;
        env::log_str("paused");
    }

    pub fn unpause(&mut self) {
        self.require_owner();
        self.is_paused = false;
        env::log_str("unpaused");
    }

    /// Grants or revokes integrator status. Medium tier.
    pub fn set_is_integrator(&mut self, account_id: AccountId, value: bool) {
        self.require_governed(GovernedOp::SetIsIntegrator);
        if value {
            self.integrators.insert(account_id);
        } else {
            self.integrators.remove(&account_id);
        }
    }

    /// Hands the governance account over. The timelock state carries across
    /// unchanged.
    pub fn transfer_ownership(&mut self, new_owner_id: AccountId) {
        self.require_owner();
        env::log_str(&format!(
            "ownership {} -> {}",
            self.owner_id, new_owner_id
        ));
        self.owner_id = new_owner_id;
    }

    // ==================== View Methods ====================

    pub fn owner_id(&self) -> &AccountId {
        &self.owner_id
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_integrator(&self, account_id: AccountId) -> bool {
        self.integrators.contains(&account_id)
    }

    pub fn num_integrators(&self) -> u32 {
        self.integrators.len()
    }
}

impl Contract {
    pub fn require_owner(&self) {
        require!(
            env::predecessor_account_id() == self.owner_id,
            "caller is not the owner"
        );
    }

    pub fn require_not_paused(&self) {
        require!(!self.is_paused, "contract is paused");
    }
}
