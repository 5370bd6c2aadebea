//! # Vault Ledger
//!
//! Per-vault bookkeeping: the immutable asset binding, the holdings arena,
//! transient reserves, pending-deposit custody, the share-token ledger, and
//! all vault configuration (fees, bounty, eligibility mode, safe mode).
//!
//! ## Holdings Arena
//!
//! NFT-mode holdings are a dense swap-remove structure: a `Vector` of token
//! ids plus an id-to-index map. Membership tests, removal by id, and "pick
//! the Nth remaining element" (needed for randomized redemption) are all
//! O(1). D2 vaults track a single aggregate balance instead.

use near_contract_standards::fungible_token::metadata::{FungibleTokenMetadata, FT_METADATA_SPEC};
use near_contract_standards::fungible_token::FungibleToken;
use near_sdk::borsh::{self, BorshDeserialize, BorshSerialize};
use near_sdk::json_types::U128;
use near_sdk::serde::Serialize;
use near_sdk::store::{IterableMap, IterableSet, LookupMap, Vector};
use near_sdk::{env, near, require, AccountId};
use schemars::JsonSchema;

use crate::events::VaultCreated;
use crate::fees::{FeeSchedule, FeeScheduleView, SupplierBounty, SupplierBountyView};
use crate::{Contract, ContractExt, StorageKey, TokenId, BASE};

/// One fractionalization unit: an NFT collection (or a D2 fungible asset)
/// paired with a dedicated fungible share ledger.
#[derive(BorshSerialize, BorshDeserialize)]
pub struct Vault {
    /// Ordinal id assigned at creation, immutable.
    pub vault_id: u64,
    /// The underlying NEP-171 (or, for D2, NEP-141) asset contract.
    pub asset: AccountId,
    /// Selects fungible-collateral accounting instead of per-id holdings.
    pub is_d2: bool,
    /// Optional delegate allowed to configure the vault pre-finalize.
    pub controller: Option<AccountId>,
    /// One-way flag; post-finalize configuration goes through the timelock.
    pub finalized: bool,
    /// Set when migration completes; minting rejects permanently afterwards.
    pub migrated: bool,
    /// Circuit breaker: batches larger than one item are rejected while set.
    pub is_safe_mode: bool,
    /// The fungible share ledger this vault mints and burns against.
    pub token: FungibleToken,
    /// Metadata for the share ledger (name/symbol are governance-mutable).
    pub metadata: FungibleTokenMetadata,
    /// Holder of mint/burn authority; the contract itself until migration
    /// hands the ledger to a successor.
    pub token_owner: AccountId,
    /// Dense arena of custodied token ids (NFT mode only).
    pub holdings: Vector<TokenId>,
    /// Id-to-arena-index map backing O(1) removal.
    pub holdings_index: LookupMap<TokenId, u32>,
    /// Ids logically assigned but awaiting cross-contract confirmation.
    pub reserves: IterableSet<TokenId>,
    /// Custody ledger: tokens pushed in via `nft_on_transfer` but not yet
    /// minted against, keyed by id, valued by depositor.
    pub pending_nfts: IterableMap<TokenId, AccountId>,
    /// D2 deposits pushed in via `ft_on_transfer` but not yet minted against.
    pub pending_d2: LookupMap<AccountId, u128>,
    /// Aggregate custodied balance (D2 mode only).
    pub d2_balance: u128,
    /// Units debited but awaiting cross-contract confirmation (D2 mode only).
    pub d2_in_flight: u128,
    /// The eligibility id-set.
    pub eligible: IterableSet<TokenId>,
    /// Deny-list interpretation of the id-set. `true` with an empty set is
    /// the default open vault.
    pub negate_eligibility: bool,
    /// Flip an id's membership the first time it is redeemed out.
    pub flip_elig_on_redeem: bool,
    /// Ids already flipped, so each flips at most once.
    pub flipped: IterableSet<TokenId>,
    pub mint_fees: FeeSchedule,
    pub burn_fees: FeeSchedule,
    pub dual_fees: FeeSchedule,
    pub supplier_bounty: SupplierBounty,
    /// Native-token reserve funding bounty payouts, in yoctoNEAR.
    pub eth_reserve: u128,
    /// Fixed v1-to-v2 exchange pair, set once by `migrate_vault_to_v2`.
    pub v2_pair: Option<u64>,
}

impl Vault {
    pub fn new(
        vault_id: u64,
        asset: AccountId,
        is_d2: bool,
        name: String,
        symbol: String,
    ) -> Self {
        let metadata = FungibleTokenMetadata {
            spec: FT_METADATA_SPEC.to_string(),
            name,
            symbol,
            icon: None,
            reference: None,
            reference_hash: None,
            decimals: 18,
        };
        Self {
            vault_id,
            asset,
            is_d2,
            controller: None,
            finalized: false,
            migrated: false,
            is_safe_mode: false,
            token: FungibleToken::new(StorageKey::ShareToken { vault_id }),
            metadata,
            token_owner: env::current_account_id(),
            holdings: Vector::new(StorageKey::Holdings { vault_id }),
            holdings_index: LookupMap::new(StorageKey::HoldingsIndex { vault_id }),
            reserves: IterableSet::new(StorageKey::Reserves { vault_id }),
            pending_nfts: IterableMap::new(StorageKey::PendingNfts { vault_id }),
            pending_d2: LookupMap::new(StorageKey::PendingD2 { vault_id }),
            d2_balance: 0,
            d2_in_flight: 0,
            eligible: IterableSet::new(StorageKey::Eligibility { vault_id }),
            negate_eligibility: true,
            flip_elig_on_redeem: false,
            flipped: IterableSet::new(StorageKey::Flipped { vault_id }),
            mint_fees: FeeSchedule::default(),
            burn_fees: FeeSchedule::default(),
            dual_fees: FeeSchedule::default(),
            supplier_bounty: SupplierBounty::default(),
            eth_reserve: 0,
            v2_pair: None,
        }
    }

    /// Membership test under the configured interpretation.
    pub fn is_eligible_id(&self, token_id: &TokenId) -> bool {
        if self.negate_eligibility {
            !self.eligible.contains(token_id)
        } else {
            self.eligible.contains(token_id)
        }
    }

    pub fn num_holdings(&self) -> u64 {
        self.holdings.len() as u64
    }

    pub fn contains_holding(&self, token_id: &TokenId) -> bool {
        self.holdings_index.contains_key(token_id)
    }

    /// Appends an id to the holdings arena.
    pub fn insert_holding(&mut self, token_id: TokenId) {
        require!(
            !self.holdings_index.contains_key(&token_id),
            "token already held"
        );
        self.holdings_index.insert(token_id.clone(), self.holdings.len());
        self.holdings.push(token_id);
    }

    /// Removes and returns the id at `index`, swapping the last element into
    /// its slot and patching the index map.
    pub fn remove_holding_at(&mut self, index: u32) -> TokenId {
        let removed = self.holdings.swap_remove(index);
        self.holdings_index.remove(&removed);
        if let Some(moved) = self.holdings.get(index) {
            self.holdings_index.insert(moved.clone(), index);
        }
        removed
    }

    /// Removes a specific id from the holdings arena.
    ///
    /// # Panics
    ///
    /// Panics if the id is not held.
    pub fn remove_holding_by_id(&mut self, token_id: &TokenId) -> TokenId {
        let index = *self
            .holdings_index
            .get(token_id)
            .unwrap_or_else(|| env::panic_str("token not held by vault"));
        self.remove_holding_at(index)
    }
}

/// JSON view of a vault's configuration and balances.
#[derive(Serialize, JsonSchema, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct VaultView {
    pub vault_id: u64,
    pub asset: String,
    pub is_d2: bool,
    pub finalized: bool,
    pub migrated: bool,
    pub is_safe_mode: bool,
    pub negate_eligibility: bool,
    pub flip_elig_on_redeem: bool,
    pub num_holdings: u64,
    pub d2_balance: String,
    pub eth_reserve: String,
    pub share_supply: String,
    pub name: String,
    pub symbol: String,
    pub mint_fees: FeeScheduleView,
    pub burn_fees: FeeScheduleView,
    pub dual_fees: FeeScheduleView,
    pub supplier_bounty: SupplierBountyView,
    pub v2_pair: Option<u64>,
}

impl From<&Vault> for VaultView {
    fn from(vault: &Vault) -> Self {
        VaultView {
            vault_id: vault.vault_id,
            asset: vault.asset.to_string(),
            is_d2: vault.is_d2,
            finalized: vault.finalized,
            migrated: vault.migrated,
            is_safe_mode: vault.is_safe_mode,
            negate_eligibility: vault.negate_eligibility,
            flip_elig_on_redeem: vault.flip_elig_on_redeem,
            num_holdings: vault.num_holdings(),
            d2_balance: vault.d2_balance.to_string(),
            eth_reserve: vault.eth_reserve.to_string(),
            share_supply: vault.token.total_supply.to_string(),
            name: vault.metadata.name.clone(),
            symbol: vault.metadata.symbol.clone(),
            mint_fees: vault.mint_fees.into(),
            burn_fees: vault.burn_fees.into(),
            dual_fees: vault.dual_fees.into(),
            supplier_bounty: vault.supplier_bounty.into(),
            v2_pair: vault.v2_pair,
        }
    }
}

#[near]
impl Contract {
    /// Creates a new vault bound to `asset` and returns its ordinal id.
    ///
    /// The id is assigned synchronously so the caller can chain configuration
    /// calls. New vaults default to open eligibility (empty deny-list), zero
    /// fees, zero bounty, and are not finalized.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not the contract owner.
    pub fn create_vault(
        &mut self,
        asset: AccountId,
        is_d2: bool,
        name: String,
        symbol: String,
    ) -> u64 {
        self.require_not_paused();
        self.require_owner();
        let vault_id = self.vault_count;
        self.vault_count += 1;

        let vault = Vault::new(vault_id, asset.clone(), is_d2, name, symbol);
        self.vaults.insert(vault_id, vault);

        VaultCreated {
            vault_id,
            asset: &asset,
            is_d2,
        }
        .emit();

        vault_id
    }

    /// Marks a vault finalized. One-way and idempotent: calling it again is
    /// a no-op, not an error, so composed deployment scripts cannot strand
    /// themselves.
    pub fn finalize_vault(&mut self, vault_id: u64) {
        self.require_not_paused();
        self.require_owner();
        let vault = self.internal_vault_mut(vault_id);
        vault.finalized = true;
    }

    /// Assigns or clears the vault's pre-finalize configuration delegate.
    pub fn set_controller(&mut self, vault_id: u64, controller: Option<AccountId>) {
        self.require_config_auth(vault_id, crate::timelock::GovernedOp::SetController);
        let vault = self.internal_vault_mut(vault_id);
        vault.controller = controller;
    }

    /// Toggles the safe-mode circuit breaker. Owner-only and untimed: a
    /// circuit breaker must not wait on an unlock countdown.
    pub fn set_safe_mode(&mut self, vault_id: u64, is_safe_mode: bool) {
        self.require_owner();
        let vault = self.internal_vault_mut(vault_id);
        vault.is_safe_mode = is_safe_mode;
    }

    /// Permissionless top-up of the vault's bounty reserve.
    #[payable]
    pub fn deposit_eth(&mut self, vault_id: u64) {
        self.require_not_paused();
        let attached = env::attached_deposit().as_yoctonear();
        let vault = self.internal_vault_mut(vault_id);
        vault.eth_reserve = vault
            .eth_reserve
            .checked_add(attached)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
    }

    // ==================== View Methods ====================

    pub fn get_vault(&self, vault_id: u64) -> VaultView {
        self.internal_vault(vault_id).into()
    }

    pub fn num_vaults(&self) -> u64 {
        self.vault_count
    }

    pub fn num_holdings(&self, vault_id: u64) -> u64 {
        self.internal_vault(vault_id).num_holdings()
    }

    /// Paginated listing of a vault's custodied token ids.
    pub fn holdings_of(&self, vault_id: u64, from_index: Option<u32>, limit: Option<u32>) -> Vec<TokenId> {
        let vault = self.internal_vault(vault_id);
        let from = from_index.unwrap_or(0);
        let limit = limit.unwrap_or(vault.holdings.len());
        vault
            .holdings
            .iter()
            .skip(from as usize)
            .take(limit as usize)
            .cloned()
            .collect()
    }

    /// Token ids the account has pushed into the vault but not yet minted
    /// against.
    pub fn pending_deposits_of(&self, vault_id: u64, account_id: AccountId) -> Vec<TokenId> {
        let vault = self.internal_vault(vault_id);
        vault
            .pending_nfts
            .iter()
            .filter(|(_, depositor)| **depositor == account_id)
            .map(|(token_id, _)| token_id.clone())
            .collect()
    }

    pub fn pending_d2_balance_of(&self, vault_id: u64, account_id: AccountId) -> U128 {
        let vault = self.internal_vault(vault_id);
        U128(vault.pending_d2.get(&account_id).copied().unwrap_or(0))
    }

    pub fn eth_reserve_of(&self, vault_id: u64) -> U128 {
        U128(self.internal_vault(vault_id).eth_reserve)
    }

    pub fn mint_cost(&self, vault_id: u64, n: u64) -> U128 {
        U128(self.internal_vault(vault_id).mint_fees.cost(n))
    }

    pub fn burn_cost(&self, vault_id: u64, n: u64) -> U128 {
        U128(self.internal_vault(vault_id).burn_fees.cost(n))
    }

    pub fn dual_cost(&self, vault_id: u64, n: u64) -> U128 {
        U128(self.internal_vault(vault_id).dual_fees.cost(n))
    }
}

impl Contract {
    /// Fetches a vault or panics with a consistency error.
    pub fn internal_vault(&self, vault_id: u64) -> &Vault {
        self.vaults
            .get(&vault_id)
            .unwrap_or_else(|| env::panic_str("vault not found"))
    }

    pub fn internal_vault_mut(&mut self, vault_id: u64) -> &mut Vault {
        self.vaults
            .get_mut(&vault_id)
            .unwrap_or_else(|| env::panic_str("vault not found"))
    }

    /// Common preamble for user-facing vault operations.
    pub fn require_active(&self, vault_id: u64) -> &Vault {
        let vault = self.internal_vault(vault_id);
        require!(vault.finalized, "vault not finalized");
        require!(!vault.migrated, "vault is migrated");
        require!(
            vault.token_owner == env::current_account_id(),
            "share ledger ownership transferred"
        );
        vault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::{init_contract, init_ctx, new_nft_vault};

    #[test]
    fn create_vault_assigns_sequential_ids() {
        let mut contract = init_contract("owner.test");
        let a = contract.create_vault(
            "punks.test".parse().unwrap(),
            false,
            "Punk".into(),
            "PUNK".into(),
        );
        let b = contract.create_vault(
            "glyphs.test".parse().unwrap(),
            false,
            "Glyph".into(),
            "GLYPH".into(),
        );
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(contract.num_vaults(), 2);
    }

    #[test]
    #[should_panic(expected = "caller is not the owner")]
    fn create_vault_is_owner_gated() {
        let mut contract = init_contract("owner.test");
        init_ctx("alice.test", 0);
        contract.create_vault(
            "punks.test".parse().unwrap(),
            false,
            "Punk".into(),
            "PUNK".into(),
        );
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.finalize_vault(vault_id);
        assert!(contract.get_vault(vault_id).finalized);
    }

    #[test]
    fn new_vault_defaults_to_open_eligibility() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        let view = contract.get_vault(vault_id);
        assert!(view.negate_eligibility);
        assert!(contract.is_eligible(vault_id, "7".to_string()));
    }

    #[test]
    fn holdings_arena_swap_remove_keeps_index_consistent() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        let vault = contract.internal_vault_mut(vault_id);
        for id in ["1", "2", "3", "4"] {
            vault.insert_holding(id.to_string());
        }
        // removing from the middle swaps "4" into slot 1
        assert_eq!(vault.remove_holding_at(1), "2".to_string());
        assert_eq!(vault.num_holdings(), 3);
        assert!(vault.contains_holding(&"4".to_string()));
        assert_eq!(vault.remove_holding_by_id(&"4".to_string()), "4".to_string());
        assert!(!vault.contains_holding(&"4".to_string()));
        assert!(vault.contains_holding(&"1".to_string()));
        assert!(vault.contains_holding(&"3".to_string()));
    }

    #[test]
    #[should_panic(expected = "token not held by vault")]
    fn removing_unheld_token_panics() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        let vault = contract.internal_vault_mut(vault_id);
        vault.remove_holding_by_id(&"9".to_string());
    }

    #[test]
    fn deposit_eth_credits_the_reserve() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        init_ctx("alice.test", 1_000);
        contract.deposit_eth(vault_id);
        assert_eq!(contract.eth_reserve_of(vault_id).0, 1_000);
    }
}
