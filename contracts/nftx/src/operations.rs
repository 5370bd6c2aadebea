//! # Vault Operations
//!
//! The user-facing mint/redeem surface. Depositing is a two-step push model:
//! the underlying contract calls us back (`nft_on_transfer` /
//! `ft_on_transfer`) and the items land in per-account pending custody, then
//! the depositor calls `mint` to convert custody into holdings and shares.
//!
//! Outbound transfers follow CEI: shares are burned and holdings moved into
//! the transient reserve before the cross-contract transfer fires, and a
//! `#[private]` resolve callback either finalizes (flip-on-redeem, reserve
//! cleanup) or rolls the state back.
//!
//! Redemption picks holdings pseudo-randomly: the block's random seed is
//! hashed together with a monotonically increasing nonce so every pick
//! within one batch lands on a distinct index distribution.

use near_contract_standards::fungible_token::core::ext_ft_core;
use near_contract_standards::fungible_token::receiver::FungibleTokenReceiver;
use near_contract_standards::non_fungible_token::core::NonFungibleTokenReceiver;
use near_contract_standards::non_fungible_token::Token;
use near_sdk::json_types::U128;
use near_sdk::serde::Deserialize;
use near_sdk::{
    env, ext_contract, near, require, AccountId, Gas, NearToken, Promise, PromiseOrValue,
    PromiseResult,
};
use sha2::{Digest, Sha256};

use crate::events::{VaultMint, VaultRedeem, VaultSwap};
use crate::{Contract, ContractExt, TokenId, BASE};

const GAS_FOR_NFT_TRANSFER: Gas = Gas::from_tgas(15);
const GAS_FOR_FT_TRANSFER: Gas = Gas::from_tgas(30);
const GAS_FOR_NFT_TOKEN: Gas = Gas::from_tgas(10);
const GAS_FOR_RESOLVE: Gas = Gas::from_tgas(10);

/// Expected `msg` payload on `nft_transfer_call` / `ft_transfer_call`.
#[derive(Deserialize)]
#[serde(crate = "near_sdk::serde")]
pub struct TransferMsg {
    pub vault_id: u64,
}

#[ext_contract(ext_nft)]
pub trait _ExtNft {
    fn nft_transfer(
        &mut self,
        receiver_id: AccountId,
        token_id: TokenId,
        approval_id: Option<u64>,
        memo: Option<String>,
    );
    fn nft_token(&self, token_id: TokenId) -> Option<Token>;
}

#[ext_contract(ext_self)]
pub trait _ExtSelf {
    /// Finalizes or rolls back one outbound NFT transfer.
    fn resolve_nft_redeem(&mut self, vault_id: u64, refund_to: AccountId, token_id: TokenId);
    /// Rolls back a D2 withdrawal on transfer failure.
    fn resolve_d2_redeem(&mut self, vault_id: u64, refund_to: AccountId, amount: U128);
    /// Credits holdings and shares after verifying on-chain ownership.
    fn on_mint_retroactively(&mut self, vault_id: u64, token_id: TokenId, to: AccountId) -> bool;
}

/// Picks an index in `0..bound` from the block seed salted with a
/// monotonically increasing nonce.
fn random_index(entropy_nonce: &mut u64, bound: u64) -> u32 {
    *entropy_nonce = entropy_nonce.wrapping_add(1);
    let mut hasher = Sha256::new();
    hasher.update(env::random_seed_array());
    hasher.update(entropy_nonce.to_le_bytes());
    let digest = hasher.finalize();
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&digest[..16]);
    (u128::from_le_bytes(buf) % bound as u128) as u32
}

#[near]
impl NonFungibleTokenReceiver for Contract {
    /// NEP-171 receiver: the underlying collection pushes a token in and it
    /// lands in the previous owner's pending custody.
    ///
    /// Returning `true` bounces the token back to its owner; ineligible ids
    /// and inactive vaults bounce rather than panic so a batched
    /// `nft_transfer_call` cannot strand tokens.
    fn nft_on_transfer(
        &mut self,
        sender_id: AccountId,
        previous_owner_id: AccountId,
        token_id: TokenId,
        msg: String,
    ) -> PromiseOrValue<bool> {
        let _ = sender_id;
        let msg: TransferMsg = serde_json::from_str(&msg)
            .unwrap_or_else(|_| env::panic_str("invalid transfer message"));
        let vault = self.internal_vault(msg.vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(
            env::predecessor_account_id() == vault.asset,
            "unknown asset contract"
        );
        let accepting = !self.is_paused
            && vault.finalized
            && !vault.migrated
            && vault.is_eligible_id(&token_id);
        if !accepting {
            return PromiseOrValue::Value(true);
        }
        let vault = self.internal_vault_mut(msg.vault_id);
        vault.pending_nfts.insert(token_id, previous_owner_id);
        PromiseOrValue::Value(false)
    }
}

#[near]
impl FungibleTokenReceiver for Contract {
    /// NEP-141 receiver for D2 vaults: pushed units accumulate in the
    /// sender's pending balance until `mint_d2` converts them.
    fn ft_on_transfer(
        &mut self,
        sender_id: AccountId,
        amount: U128,
        msg: String,
    ) -> PromiseOrValue<U128> {
        let msg: TransferMsg = serde_json::from_str(&msg)
            .unwrap_or_else(|_| env::panic_str("invalid transfer message"));
        let vault = self.internal_vault(msg.vault_id);
        require!(vault.is_d2, "not a fungible-asset vault");
        require!(
            env::predecessor_account_id() == vault.asset,
            "unknown asset contract"
        );
        if self.is_paused || !vault.finalized || vault.migrated {
            return PromiseOrValue::Value(amount);
        }
        let vault = self.internal_vault_mut(msg.vault_id);
        let pending = vault.pending_d2.get(&sender_id).copied().unwrap_or(0);
        let pending = pending
            .checked_add(amount.0)
            .unwrap_or_else(|| env::panic_str("pending balance overflow"));
        vault.pending_d2.insert(sender_id, pending);
        PromiseOrValue::Value(U128(0))
    }
}

#[near]
impl Contract {
    /// Converts pending-custody tokens into vault holdings, minting [`BASE`]
    /// share units per token to the caller.
    ///
    /// Settlement: the mint fee is payable in attached NEAR, offset by any
    /// supplier bounty owed from the vault's reserve; excess is refunded.
    ///
    /// # Panics
    ///
    /// Panics on an empty batch, a batch above one item in safe mode, ids
    /// outside the caller's pending custody or outside the eligibility
    /// predicate, underpayment, or an under-funded bounty reserve.
    #[payable]
    pub fn mint(&mut self, vault_id: u64, token_ids: Vec<TokenId>) {
        self.require_not_paused();
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        let fee_exempt = self.integrators.contains(&caller);
        let n = token_ids.len() as u64;

        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(n > 0, "empty batch");
        require!(
            !vault.is_safe_mode || n == 1,
            "safe mode: batch limited to one item"
        );
        for token_id in &token_ids {
            require!(vault.is_eligible_id(token_id), "token not eligible");
            require!(
                vault.pending_nfts.get(token_id) == Some(&caller),
                "token not in pending custody"
            );
        }

        let holdings = vault.num_holdings();
        let fee = if fee_exempt { 0 } else { vault.mint_fees.cost(n) };
        let payout = vault.supplier_bounty.payout_for_mint(holdings, n);
        require!(vault.eth_reserve >= payout, "insufficient bounty reserve");
        let attached = env::attached_deposit().as_yoctonear();
        require!(attached >= fee.saturating_sub(payout), "insufficient payment");
        let shares = BASE
            .checked_mul(n as u128)
            .unwrap_or_else(|| env::panic_str("share overflow"));

        let vault = self.internal_vault_mut(vault_id);
        for token_id in &token_ids {
            vault.pending_nfts.remove(token_id);
            vault.insert_holding(token_id.clone());
        }
        vault.eth_reserve = (vault.eth_reserve - payout)
            .checked_add(fee)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
        Contract::internal_mint_shares(vault, &caller, shares, "Mint");

        VaultMint {
            vault_id,
            owner_id: &caller,
            token_ids: Some(&token_ids),
            shares: U128(shares),
        }
        .emit();

        // attached >= fee - payout, so this never underflows
        let refund = attached
            .checked_add(payout)
            .unwrap_or_else(|| env::panic_str("refund overflow"))
            - fee;
        Self::refund_excess(&caller, refund);
    }

    /// Converts a pending D2 balance into shares, one to one.
    #[payable]
    pub fn mint_d2(&mut self, vault_id: u64, amount: U128) {
        self.require_not_paused();
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        let fee_exempt = self.integrators.contains(&caller);

        let vault = self.internal_vault(vault_id);
        require!(vault.is_d2, "not a fungible-asset vault");
        require!(amount.0 > 0, "zero amount");
        let pending = vault.pending_d2.get(&caller).copied().unwrap_or(0);
        require!(pending >= amount.0, "insufficient pending balance");
        let fee = if fee_exempt { 0 } else { vault.mint_fees.cost(1) };
        let attached = env::attached_deposit().as_yoctonear();
        require!(attached >= fee, "insufficient payment");

        let vault = self.internal_vault_mut(vault_id);
        vault.pending_d2.insert(caller.clone(), pending - amount.0);
        vault.d2_balance = vault
            .d2_balance
            .checked_add(amount.0)
            .unwrap_or_else(|| env::panic_str("balance overflow"));
        vault.eth_reserve = vault
            .eth_reserve
            .checked_add(fee)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
        Contract::internal_mint_shares(vault, &caller, amount.0, "Mint");

        VaultMint {
            vault_id,
            owner_id: &caller,
            token_ids: None,
            shares: amount,
        }
        .emit();
        Self::refund_excess(&caller, attached - fee);
    }

    /// Burns `amount * BASE` shares and transfers `amount` pseudo-randomly
    /// selected tokens to the caller.
    ///
    /// While the contract is paused this degrades to the fee-less
    /// single-unit path so holders always keep an exit.
    #[payable]
    pub fn redeem(&mut self, vault_id: u64, amount: u64) {
        if self.is_paused {
            require!(amount == 1, "paused: single redemption only");
            // the degraded path charges nothing; hand any attached fee back
            Self::refund_excess(
                &env::predecessor_account_id(),
                env::attached_deposit().as_yoctonear(),
            );
            let _ = self.internal_simple_redeem(vault_id);
            return;
        }
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        let fee_exempt = self.integrators.contains(&caller);

        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(amount > 0, "empty batch");
        require!(
            !vault.is_safe_mode || amount == 1,
            "safe mode: batch limited to one item"
        );
        require!(vault.num_holdings() >= amount, "insufficient holdings");
        let fee = if fee_exempt { 0 } else { vault.burn_fees.cost(amount) };
        let bounty = vault
            .supplier_bounty
            .charge_for_redeem(vault.num_holdings(), amount);
        let total = fee
            .checked_add(bounty)
            .unwrap_or_else(|| env::panic_str("fee overflow"));
        let attached = env::attached_deposit().as_yoctonear();
        require!(attached >= total, "insufficient payment");
        let shares = BASE
            .checked_mul(amount as u128)
            .unwrap_or_else(|| env::panic_str("share overflow"));

        let Contract {
            vaults,
            entropy_nonce,
            ..
        } = self;
        let vault = vaults
            .get_mut(&vault_id)
            .unwrap_or_else(|| env::panic_str("vault not found"));
        Contract::internal_burn_shares(vault, &caller, shares, "Redeem");
        vault.eth_reserve = vault
            .eth_reserve
            .checked_add(total)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
        let mut selected = Vec::with_capacity(amount as usize);
        for _ in 0..amount {
            let index = random_index(entropy_nonce, vault.num_holdings());
            let token_id = vault.remove_holding_at(index);
            vault.reserves.insert(token_id.clone());
            selected.push(token_id);
        }
        let asset = vault.asset.clone();

        VaultRedeem {
            vault_id,
            owner_id: &caller,
            token_ids: Some(&selected),
            shares: U128(shares),
        }
        .emit();
        Self::refund_excess(&caller, attached - total);
        for token_id in selected {
            let _ = Self::transfer_nft_with_resolve(
                &asset,
                vault_id,
                caller.clone(),
                caller.clone(),
                token_id,
            );
        }
    }

    /// Burns D2 shares and transfers the underlying units back out.
    #[payable]
    pub fn redeem_d2(&mut self, vault_id: u64, amount: U128) -> Promise {
        self.require_not_paused();
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        let fee_exempt = self.integrators.contains(&caller);

        let vault = self.internal_vault(vault_id);
        require!(vault.is_d2, "not a fungible-asset vault");
        require!(amount.0 > 0, "zero amount");
        require!(vault.d2_balance >= amount.0, "insufficient holdings");
        let fee = if fee_exempt { 0 } else { vault.burn_fees.cost(1) };
        let attached = env::attached_deposit().as_yoctonear();
        require!(attached >= fee, "insufficient payment");

        let vault = self.internal_vault_mut(vault_id);
        Contract::internal_burn_shares(vault, &caller, amount.0, "Redeem");
        vault.d2_balance -= amount.0;
        vault.d2_in_flight = vault
            .d2_in_flight
            .checked_add(amount.0)
            .unwrap_or_else(|| env::panic_str("balance overflow"));
        vault.eth_reserve = vault
            .eth_reserve
            .checked_add(fee)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
        let asset = vault.asset.clone();

        VaultRedeem {
            vault_id,
            owner_id: &caller,
            token_ids: None,
            shares: amount,
        }
        .emit();
        Self::refund_excess(&caller, attached - fee);
        ext_ft_core::ext(asset)
            .with_attached_deposit(NearToken::from_yoctonear(1))
            .with_static_gas(GAS_FOR_FT_TRANSFER)
            .ft_transfer(caller.clone(), amount, None)
            .then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_RESOLVE)
                    .resolve_d2_redeem(vault_id, caller, amount),
            )
    }

    /// Atomic swap: deposits the given pending-custody tokens and withdraws
    /// an equal number of pseudo-randomly selected ones, charging the dual
    /// fee. Share supply is untouched.
    #[payable]
    pub fn mint_and_redeem(&mut self, vault_id: u64, token_ids: Vec<TokenId>) {
        self.require_not_paused();
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        let fee_exempt = self.integrators.contains(&caller);
        let n = token_ids.len() as u64;

        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(n > 0, "empty batch");
        require!(
            !vault.is_safe_mode || n == 1,
            "safe mode: batch limited to one item"
        );
        for token_id in &token_ids {
            require!(vault.is_eligible_id(token_id), "token not eligible");
            require!(
                vault.pending_nfts.get(token_id) == Some(&caller),
                "token not in pending custody"
            );
        }
        let fee = if fee_exempt { 0 } else { vault.dual_fees.cost(n) };
        let attached = env::attached_deposit().as_yoctonear();
        require!(attached >= fee, "insufficient payment");

        let Contract {
            vaults,
            entropy_nonce,
            ..
        } = self;
        let vault = vaults
            .get_mut(&vault_id)
            .unwrap_or_else(|| env::panic_str("vault not found"));
        for token_id in &token_ids {
            vault.pending_nfts.remove(token_id);
            vault.insert_holding(token_id.clone());
        }
        vault.eth_reserve = vault
            .eth_reserve
            .checked_add(fee)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
        let mut withdrawn = Vec::with_capacity(token_ids.len());
        for _ in 0..n {
            let index = random_index(entropy_nonce, vault.num_holdings());
            let token_id = vault.remove_holding_at(index);
            vault.reserves.insert(token_id.clone());
            withdrawn.push(token_id);
        }
        let asset = vault.asset.clone();

        VaultSwap {
            vault_id,
            owner_id: &caller,
            deposited: &token_ids,
            withdrawn: &withdrawn,
        }
        .emit();
        Self::refund_excess(&caller, attached - fee);
        for token_id in withdrawn {
            let _ = Self::transfer_nft_with_resolve(
                &asset,
                vault_id,
                caller.clone(),
                caller.clone(),
                token_id,
            );
        }
    }

    /// Redeems exact token ids. Integrator-only; fee-exempt, but the
    /// supplier-bounty charge still applies so the reserve cannot be drained
    /// through the side door.
    #[payable]
    pub fn direct_redeem(&mut self, vault_id: u64, token_ids: Vec<TokenId>) {
        self.require_not_paused();
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        require!(
            self.integrators.contains(&caller),
            "caller is not an integrator"
        );
        let n = token_ids.len() as u64;

        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(n > 0, "empty batch");
        require!(vault.num_holdings() >= n, "insufficient holdings");
        let bounty = vault
            .supplier_bounty
            .charge_for_redeem(vault.num_holdings(), n);
        let attached = env::attached_deposit().as_yoctonear();
        require!(attached >= bounty, "insufficient payment");
        let shares = BASE
            .checked_mul(n as u128)
            .unwrap_or_else(|| env::panic_str("share overflow"));

        let vault = self.internal_vault_mut(vault_id);
        Contract::internal_burn_shares(vault, &caller, shares, "Redeem");
        vault.eth_reserve = vault
            .eth_reserve
            .checked_add(bounty)
            .unwrap_or_else(|| env::panic_str("reserve overflow"));
        for token_id in &token_ids {
            vault.remove_holding_by_id(token_id);
            vault.reserves.insert(token_id.clone());
        }
        let asset = vault.asset.clone();

        VaultRedeem {
            vault_id,
            owner_id: &caller,
            token_ids: Some(&token_ids),
            shares: U128(shares),
        }
        .emit();
        Self::refund_excess(&caller, attached - bounty);
        for token_id in token_ids {
            let _ = Self::transfer_nft_with_resolve(
                &asset,
                vault_id,
                caller.clone(),
                caller.clone(),
                token_id,
            );
        }
    }

    /// Fee-less, bounty-less single-unit redemption. Only available while
    /// the contract is paused, so holders keep an exit but nobody can use it
    /// to dodge the burn-fee schedule.
    pub fn simple_redeem(&mut self, vault_id: u64) -> Promise {
        require!(self.is_paused, "only available while paused");
        self.internal_simple_redeem(vault_id)
    }

    /// Credits a token the vault already owns on the underlying contract but
    /// never accounted for (for example one sent with a plain
    /// `nft_transfer`). Ownership is verified on-chain before any state is
    /// touched. Short tier.
    pub fn mint_retroactively(&mut self, vault_id: u64, token_id: TokenId, to: AccountId) -> Promise {
        self.require_governed(crate::timelock::GovernedOp::MintRetroactively);
        self.require_active(vault_id);
        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(
            !vault.contains_holding(&token_id)
                && !vault.pending_nfts.contains_key(&token_id)
                && !vault.reserves.contains(&token_id),
            "token already accounted"
        );
        let asset = vault.asset.clone();
        // park the id so a second retroactive mint cannot race this one
        let vault = self.internal_vault_mut(vault_id);
        vault.reserves.insert(token_id.clone());
        ext_nft::ext(asset)
            .with_static_gas(GAS_FOR_NFT_TOKEN)
            .nft_token(token_id.clone())
            .then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_RESOLVE)
                    .on_mint_retroactively(vault_id, token_id, to),
            )
    }

    /// Releases one random token against shares that were transferred
    /// straight to the contract account instead of being redeemed. Short
    /// tier.
    pub fn redeem_retroactively(&mut self, vault_id: u64, to: AccountId) {
        self.require_governed(crate::timelock::GovernedOp::RedeemRetroactively);
        self.require_active(vault_id);
        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(vault.num_holdings() >= 1, "insufficient holdings");

        let contract_account = env::current_account_id();
        let Contract {
            vaults,
            entropy_nonce,
            ..
        } = self;
        let vault = vaults
            .get_mut(&vault_id)
            .unwrap_or_else(|| env::panic_str("vault not found"));
        Contract::internal_burn_shares(vault, &contract_account, BASE, "Redeem");
        let index = random_index(entropy_nonce, vault.num_holdings());
        let token_id = vault.remove_holding_at(index);
        vault.reserves.insert(token_id.clone());
        let asset = vault.asset.clone();

        VaultRedeem {
            vault_id,
            owner_id: &to,
            token_ids: Some(std::slice::from_ref(&token_id)),
            shares: U128(BASE),
        }
        .emit();
        let _ = Self::transfer_nft_with_resolve(&asset, vault_id, to, contract_account, token_id);
    }

    // ==================== Resolve Callbacks ====================

    #[private]
    pub fn resolve_nft_redeem(
        &mut self,
        vault_id: u64,
        refund_to: AccountId,
        token_id: TokenId,
    ) -> bool {
        match env::promise_result(0) {
            PromiseResult::Successful(_) => {
                let vault = self.internal_vault_mut(vault_id);
                vault.reserves.remove(&token_id);
                Contract::internal_flip_on_redeem(vault, &token_id);
                true
            }
            _ => {
                self.internal_redeem_rollback(vault_id, &refund_to, token_id);
                false
            }
        }
    }

    #[private]
    pub fn resolve_d2_redeem(&mut self, vault_id: u64, refund_to: AccountId, amount: U128) -> bool {
        let vault = self.internal_vault_mut(vault_id);
        vault.d2_in_flight = vault.d2_in_flight.saturating_sub(amount.0);
        match env::promise_result(0) {
            PromiseResult::Successful(_) => true,
            _ => {
                vault.d2_balance = vault
                    .d2_balance
                    .checked_add(amount.0)
                    .unwrap_or_else(|| env::panic_str("balance overflow"));
                Contract::internal_mint_shares(vault, &refund_to, amount.0, "Redemption rollback");
                false
            }
        }
    }

    /// Never panics: a panic here would roll back the reserve un-parking and
    /// strand the id.
    #[private]
    pub fn on_mint_retroactively(&mut self, vault_id: u64, token_id: TokenId, to: AccountId) -> bool {
        let vault = self.internal_vault_mut(vault_id);
        vault.reserves.remove(&token_id);
        let owned = match env::promise_result(0) {
            PromiseResult::Successful(bytes) => serde_json::from_slice::<Option<Token>>(&bytes)
                .ok()
                .flatten()
                .map(|token| token.owner_id == env::current_account_id())
                .unwrap_or(false),
            _ => false,
        };
        if !owned {
            env::log_str(&format!(
                "retroactive_mint_rejected token_id={} reason=not_owned",
                token_id
            ));
            return false;
        }

        let vault = self.internal_vault_mut(vault_id);
        vault.insert_holding(token_id.clone());
        Contract::internal_mint_shares(vault, &to, BASE, "Mint");
        VaultMint {
            vault_id,
            owner_id: &to,
            token_ids: Some(std::slice::from_ref(&token_id)),
            shares: U128(BASE),
        }
        .emit();
        true
    }
}

impl Contract {
    /// Returns a token from the transient reserve to the holdings arena and
    /// mints [`BASE`] shares to `refund_to`. After a failed swap leg the
    /// re-mint covers the deposited token left behind in the vault, so share
    /// supply still matches holdings.
    pub(crate) fn internal_redeem_rollback(
        &mut self,
        vault_id: u64,
        refund_to: &AccountId,
        token_id: TokenId,
    ) {
        let vault = self.internal_vault_mut(vault_id);
        vault.reserves.remove(&token_id);
        vault.insert_holding(token_id.clone());
        Contract::internal_mint_shares(vault, refund_to, BASE, "Redemption rollback");
        env::log_str(&format!("redeem_rollback token_id={}", token_id));
    }

    fn internal_simple_redeem(&mut self, vault_id: u64) -> Promise {
        self.require_active(vault_id);
        let caller = env::predecessor_account_id();
        let vault = self.internal_vault(vault_id);
        require!(!vault.is_d2, "not an item vault");
        require!(vault.num_holdings() >= 1, "insufficient holdings");

        let Contract {
            vaults,
            entropy_nonce,
            ..
        } = self;
        let vault = vaults
            .get_mut(&vault_id)
            .unwrap_or_else(|| env::panic_str("vault not found"));
        Contract::internal_burn_shares(vault, &caller, BASE, "Redeem");
        let index = random_index(entropy_nonce, vault.num_holdings());
        let token_id = vault.remove_holding_at(index);
        vault.reserves.insert(token_id.clone());
        let asset = vault.asset.clone();

        VaultRedeem {
            vault_id,
            owner_id: &caller,
            token_ids: Some(std::slice::from_ref(&token_id)),
            shares: U128(BASE),
        }
        .emit();
        Self::transfer_nft_with_resolve(&asset, vault_id, caller.clone(), caller, token_id)
    }

    fn transfer_nft_with_resolve(
        asset: &AccountId,
        vault_id: u64,
        receiver_id: AccountId,
        refund_to: AccountId,
        token_id: TokenId,
    ) -> Promise {
        ext_nft::ext(asset.clone())
            .with_attached_deposit(NearToken::from_yoctonear(1))
            .with_static_gas(GAS_FOR_NFT_TRANSFER)
            .nft_transfer(receiver_id, token_id.clone(), None, None)
            .then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_RESOLVE)
                    .resolve_nft_redeem(vault_id, refund_to, token_id),
            )
    }

    fn refund_excess(account_id: &AccountId, refund: u128) {
        if refund > 0 {
            Promise::new(account_id.clone()).transfer(NearToken::from_yoctonear(refund));
        }
    }
}
