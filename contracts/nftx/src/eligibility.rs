//! # Eligibility Store
//!
//! Per-vault membership predicate over token ids, with an optional negation
//! flag (deny-list semantics) and an optional one-shot flip-on-redeem
//! modifier for generational collections.
//!
//! The query is pure: mint/redeem history never affects it, except that with
//! `flip_elig_on_redeem` set an id's membership flips exactly once, as an
//! explicit state transition on the redemption success path (never inside
//! the query itself).

use near_sdk::{env, near, require};

use crate::timelock::GovernedOp;
use crate::vault::Vault;
use crate::{Contract, ContractExt, TokenId};

/// Bound on ids per `set_is_eligible` call, keeping each mutation within a
/// predictable gas envelope.
pub const MAX_ELIGIBILITY_BATCH: usize = 150;

#[near]
impl Contract {
    /// Adds or removes ids from a vault's eligibility set.
    ///
    /// Freely settable by the owner (or vault controller) before the vault
    /// is finalized; afterwards it requires the medium timelock tier.
    ///
    /// # Panics
    ///
    /// Panics on batches larger than [`MAX_ELIGIBILITY_BATCH`], or when the
    /// caller lacks the required authority.
    pub fn set_is_eligible(&mut self, vault_id: u64, token_ids: Vec<TokenId>, value: bool) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetIsEligible);
        require!(
            token_ids.len() <= MAX_ELIGIBILITY_BATCH,
            "batch exceeds eligibility bound"
        );
        let vault = self.internal_vault_mut(vault_id);
        for token_id in token_ids {
            if value {
                vault.eligible.insert(token_id);
            } else {
                vault.eligible.remove(&token_id);
            }
        }
    }

    /// Flips the interpretation of the id-set between allow-list and
    /// deny-list. Vault-configuration-time only: once finalized the
    /// interpretation is fixed.
    pub fn set_negate_eligibility(&mut self, vault_id: u64, negate: bool) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetIsEligible);
        let vault = self.internal_vault_mut(vault_id);
        require!(!vault.finalized, "vault is finalized");
        vault.negate_eligibility = negate;
    }

    /// Enables the one-shot flip-on-redeem modifier. Pre-finalize only.
    pub fn set_flip_elig_on_redeem(&mut self, vault_id: u64, flip: bool) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetIsEligible);
        let vault = self.internal_vault_mut(vault_id);
        require!(!vault.finalized, "vault is finalized");
        vault.flip_elig_on_redeem = flip;
    }

    // ==================== View Methods ====================

    /// Membership test: `negate ? !(id ∈ set) : (id ∈ set)`.
    pub fn is_eligible(&self, vault_id: u64, token_id: TokenId) -> bool {
        self.internal_vault(vault_id).is_eligible_id(&token_id)
    }
}

impl Contract {
    /// Applies the flip-on-redeem transition for an id that just left the
    /// vault. Each id flips at most once over the vault's lifetime.
    pub fn internal_flip_on_redeem(vault: &mut Vault, token_id: &TokenId) {
        if !vault.flip_elig_on_redeem || vault.flipped.contains(token_id) {
            return;
        }
        vault.flipped.insert(token_id.clone());
        if vault.eligible.contains(token_id) {
            vault.eligible.remove(token_id);
        } else {
            vault.eligible.insert(token_id.clone());
        }
        env::log_str(&format!("flip_eligibility token_id={}", token_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::{init_contract, init_ctx, init_ctx_at, new_nft_vault};
    use crate::timelock::{Tier, MEDIUM_DELAY_NS};

    fn ids(range: std::ops::Range<u64>) -> Vec<TokenId> {
        range.map(|i| i.to_string()).collect()
    }

    #[test]
    fn allow_list_admits_only_members() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_negate_eligibility(vault_id, false);
        contract.set_is_eligible(vault_id, ids(0..4), true);
        assert!(contract.is_eligible(vault_id, "2".to_string()));
        assert!(!contract.is_eligible(vault_id, "9".to_string()));
    }

    #[test]
    fn deny_list_rejects_only_members() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_is_eligible(vault_id, ids(0..2), true);
        assert!(!contract.is_eligible(vault_id, "1".to_string()));
        assert!(contract.is_eligible(vault_id, "5".to_string()));
    }

    #[test]
    fn empty_allow_list_accepts_nothing() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_negate_eligibility(vault_id, false);
        assert!(!contract.is_eligible(vault_id, "0".to_string()));
    }

    #[test]
    #[should_panic(expected = "batch exceeds eligibility bound")]
    fn oversized_batch_is_rejected() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_is_eligible(vault_id, ids(0..151), true);
    }

    #[test]
    #[should_panic(expected = "vault is finalized")]
    fn negate_is_fixed_after_finalize() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.finalize_vault(vault_id);
        // even a fully unlocked timelock cannot reach this setter
        contract.initiate_unlock(Tier::Medium);
        init_ctx_at("owner.test", 0, MEDIUM_DELAY_NS + 1);
        contract.set_negate_eligibility(vault_id, false);
    }

    #[test]
    #[should_panic(expected = "tier is locked")]
    fn post_finalize_mutation_requires_medium_tier() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.finalize_vault(vault_id);
        contract.set_is_eligible(vault_id, ids(0..1), true);
    }

    #[test]
    fn post_finalize_mutation_succeeds_once_unlocked() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.finalize_vault(vault_id);
        contract.initiate_unlock(Tier::Medium);
        init_ctx_at("owner.test", 0, MEDIUM_DELAY_NS + 1);
        contract.set_is_eligible(vault_id, ids(0..1), true);
        assert!(!contract.is_eligible(vault_id, "0".to_string()));
    }

    #[test]
    fn controller_may_configure_before_finalize() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_controller(vault_id, Some("curator.test".parse().unwrap()));
        init_ctx("curator.test", 0);
        contract.set_is_eligible(vault_id, ids(0..3), true);
        assert!(!contract.is_eligible(vault_id, "1".to_string()));
    }

    #[test]
    fn flip_applies_once_per_id() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_flip_elig_on_redeem(vault_id, true);
        let vault = contract.internal_vault_mut(vault_id);
        let id = "7".to_string();
        // deny-list default: flipping inserts the id, making it ineligible
        Contract::internal_flip_on_redeem(vault, &id);
        assert!(vault.eligible.contains(&id));
        // a second redemption of the same id must not flip back
        Contract::internal_flip_on_redeem(vault, &id);
        assert!(vault.eligible.contains(&id));
    }

    #[test]
    fn flip_disabled_is_a_no_op() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        let vault = contract.internal_vault_mut(vault_id);
        Contract::internal_flip_on_redeem(vault, &"7".to_string());
        assert!(!vault.eligible.contains(&"7".to_string()));
    }
}
