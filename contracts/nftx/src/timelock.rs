//! # Governance Timelock
//!
//! Three independent delay tiers gate the privileged entry points. A tier is
//! never stored as "unlocked": the predicate is derived from the initiation
//! timestamp, so locking is always instantaneous and unlocking always waits
//! out the full delay.
//!
//! ## Tier State Machine
//!
//! ```text
//! Locked --initiate_unlock--> Unlocking --(delay elapses)--> Unlocked
//!    ^                            |
//!    +----------- lock ----------+
//! ```
//!
//! Every governed operation maps to its minimum tier in one policy table
//! ([`GovernedOp::required_tier`]); the generic guard
//! [`Contract::require_governed`] is the single place the predicate is
//! checked.

use near_sdk::borsh::{self, BorshDeserialize, BorshSerialize};
use near_sdk::{env, near, require};

use crate::{Contract, ContractExt};

const NS_PER_DAY: u64 = 24 * 60 * 60 * 1_000_000_000;

/// Unlock delay for the short tier (retroactive reconciliation).
pub const SHORT_DELAY_NS: u64 = NS_PER_DAY;
/// Unlock delay for the medium tier (naming, mint/dual fees, eligibility).
pub const MEDIUM_DELAY_NS: u64 = 3 * NS_PER_DAY;
/// Unlock delay for the long tier (exit fees, bounty, migration).
pub const LONG_DELAY_NS: u64 = 7 * NS_PER_DAY;

/// One of the three independent delay classes.
#[near(serializers = [json, borsh])]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tier {
    Short,
    Medium,
    Long,
}

impl Tier {
    pub fn delay_ns(self) -> u64 {
        match self {
            Tier::Short => SHORT_DELAY_NS,
            Tier::Medium => MEDIUM_DELAY_NS,
            Tier::Long => LONG_DELAY_NS,
        }
    }

    fn index(self) -> usize {
        match self {
            Tier::Short => 0,
            Tier::Medium => 1,
            Tier::Long => 2,
        }
    }
}

/// Every operation gated by the timelock. Adding an entry point means adding
/// a variant here and a row in [`GovernedOp::required_tier`]; the entry point
/// body only ever calls the generic guard.
#[derive(Clone, Copy, Debug)]
pub enum GovernedOp {
    MintRetroactively,
    RedeemRetroactively,
    ChangeTokenName,
    ChangeTokenSymbol,
    SetMintFees,
    SetDualFees,
    SetIsEligible,
    SetIsIntegrator,
    SetController,
    SetBurnFees,
    SetSupplierBounty,
    Migrate,
    TransferTokenOwnership,
    MigrateVaultToV2,
    ForceMigrationComplete,
}

impl GovernedOp {
    /// The policy table: minimum tier that must be unlocked.
    pub fn required_tier(self) -> Tier {
        match self {
            GovernedOp::MintRetroactively | GovernedOp::RedeemRetroactively => Tier::Short,
            GovernedOp::ChangeTokenName
            | GovernedOp::ChangeTokenSymbol
            | GovernedOp::SetMintFees
            | GovernedOp::SetDualFees
            | GovernedOp::SetIsEligible
            | GovernedOp::SetIsIntegrator
            | GovernedOp::SetController => Tier::Medium,
            GovernedOp::SetBurnFees
            | GovernedOp::SetSupplierBounty
            | GovernedOp::Migrate
            | GovernedOp::TransferTokenOwnership
            | GovernedOp::MigrateVaultToV2
            | GovernedOp::ForceMigrationComplete => Tier::Long,
        }
    }
}

/// Stored timelock state: the unlock-initiation timestamp per tier, or
/// `None` while locked.
#[derive(BorshSerialize, BorshDeserialize, Default)]
pub struct Timelock {
    initiated_at: [Option<u64>; 3],
}

impl Timelock {
    /// Derived predicate: initiated and the tier's delay has elapsed.
    pub fn is_unlocked(&self, tier: Tier) -> bool {
        match self.initiated_at[tier.index()] {
            Some(at) => env::block_timestamp() >= at.saturating_add(tier.delay_ns()),
            None => false,
        }
    }

    /// Starts the countdown. A no-op if already counting: re-arming requires
    /// an explicit `lock` first.
    pub fn initiate(&mut self, tier: Tier) {
        let slot = &mut self.initiated_at[tier.index()];
        if slot.is_none() {
            *slot = Some(env::block_timestamp());
        }
    }

    /// Returns the tier to `Locked` immediately, discarding any countdown.
    pub fn lock(&mut self, tier: Tier) {
        self.initiated_at[tier.index()] = None;
    }
}

#[near]
impl Contract {
    /// Begins the unlock countdown for a tier.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not the contract owner.
    pub fn initiate_unlock(&mut self, tier: Tier) {
        self.require_owner();
        self.timelock.initiate(tier);
        env::log_str(&format!("initiate_unlock tier={:?}", tier));
    }

    /// Relocks a tier immediately, discarding any in-progress countdown.
    pub fn lock(&mut self, tier: Tier) {
        self.require_owner();
        self.timelock.lock(tier);
        env::log_str(&format!("lock tier={:?}", tier));
    }

    /// Whether a tier's delay has fully elapsed.
    pub fn is_unlocked(&self, tier: Tier) -> bool {
        self.timelock.is_unlocked(tier)
    }
}

impl Contract {
    /// Generic guard for governed entry points: owner plus the operation's
    /// required tier per the policy table.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not the owner or the tier is locked.
    pub fn require_governed(&self, op: GovernedOp) {
        self.require_owner();
        require!(self.timelock.is_unlocked(op.required_tier()), "tier is locked");
    }

    /// Guard for vault configuration that is freely settable before
    /// finalization (by the owner or the vault's controller) and
    /// timelock-gated after.
    pub fn require_config_auth(&self, vault_id: u64, op: GovernedOp) {
        let vault = self.internal_vault(vault_id);
        if vault.finalized {
            self.require_governed(op);
        } else {
            let caller = env::predecessor_account_id();
            let is_controller = vault.controller.as_ref() == Some(&caller);
            require!(
                caller == self.owner_id || is_controller,
                "caller is not the owner"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::{init_contract, init_ctx_at};

    #[test]
    fn tier_is_locked_until_delay_elapses() {
        let mut contract = init_contract("owner.test");
        init_ctx_at("owner.test", 0, 1_000);
        contract.initiate_unlock(Tier::Medium);
        assert!(!contract.is_unlocked(Tier::Medium));

        // one nanosecond short of the deadline
        init_ctx_at("owner.test", 0, 1_000 + MEDIUM_DELAY_NS - 1);
        assert!(!contract.is_unlocked(Tier::Medium));

        init_ctx_at("owner.test", 0, 1_000 + MEDIUM_DELAY_NS);
        assert!(contract.is_unlocked(Tier::Medium));
    }

    #[test]
    fn tiers_are_independent() {
        let mut contract = init_contract("owner.test");
        init_ctx_at("owner.test", 0, 0);
        contract.initiate_unlock(Tier::Short);
        init_ctx_at("owner.test", 0, LONG_DELAY_NS);
        assert!(contract.is_unlocked(Tier::Short));
        assert!(!contract.is_unlocked(Tier::Medium));
        assert!(!contract.is_unlocked(Tier::Long));
    }

    #[test]
    fn lock_discards_the_countdown() {
        let mut contract = init_contract("owner.test");
        init_ctx_at("owner.test", 0, 0);
        contract.initiate_unlock(Tier::Long);
        init_ctx_at("owner.test", 0, LONG_DELAY_NS);
        assert!(contract.is_unlocked(Tier::Long));
        contract.lock(Tier::Long);
        assert!(!contract.is_unlocked(Tier::Long));
    }

    #[test]
    fn reinitiating_does_not_restart_the_countdown() {
        let mut contract = init_contract("owner.test");
        init_ctx_at("owner.test", 0, 0);
        contract.initiate_unlock(Tier::Short);
        // a second initiate halfway through must not push the deadline back
        init_ctx_at("owner.test", 0, SHORT_DELAY_NS / 2);
        contract.initiate_unlock(Tier::Short);
        init_ctx_at("owner.test", 0, SHORT_DELAY_NS);
        assert!(contract.is_unlocked(Tier::Short));
    }

    #[test]
    #[should_panic(expected = "caller is not the owner")]
    fn initiate_unlock_is_owner_gated() {
        let mut contract = init_contract("owner.test");
        init_ctx_at("mallory.test", 0, 0);
        contract.initiate_unlock(Tier::Short);
    }

    #[test]
    fn policy_table_orders_severity() {
        assert_eq!(GovernedOp::MintRetroactively.required_tier(), Tier::Short);
        assert_eq!(GovernedOp::ChangeTokenName.required_tier(), Tier::Medium);
        assert_eq!(GovernedOp::SetMintFees.required_tier(), Tier::Medium);
        assert_eq!(GovernedOp::SetBurnFees.required_tier(), Tier::Long);
        assert_eq!(GovernedOp::Migrate.required_tier(), Tier::Long);
    }
}
