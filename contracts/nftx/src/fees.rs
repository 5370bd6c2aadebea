//! # Fee and Bounty Engine
//!
//! Pure computations over per-vault fee parameters. No state lives here
//! beyond the parameter structs stored on each [`crate::vault::Vault`];
//! settlement against attached deposits happens in the operations module.
//!
//! ## Fee Shape
//!
//! Each of the three fee schedules (mint, burn, dual) is a fixed base charge
//! plus a marginal charge for every unit in a batch beyond the first:
//! `cost(n) = base + per_item * (n - 1)`.
//!
//! ## Bounty Shape
//!
//! The supplier bounty is a decreasing arithmetic sequence over holdings
//! levels below `length`: the unit bounty at level `h` is
//! `amount - amount * h / length`, floored at zero at and beyond `length`.
//! Minting while the vault is under-supplied pays the sequence out of the
//! vault's native-token reserve; redeeming below `length` charges the same
//! sequence back into the reserve.

use near_sdk::borsh::{self, BorshDeserialize, BorshSerialize};
use near_sdk::json_types::U128;
use near_sdk::serde::Serialize;
use near_sdk::{env, near};
use schemars::JsonSchema;

use crate::mul_div::{mul_div, Rounding};
use crate::timelock::GovernedOp;
use crate::{Contract, ContractExt};

/// A `(base, per_item)` fee curve, in yoctoNEAR.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Default)]
pub struct FeeSchedule {
    /// Fixed charge applied to any non-empty batch.
    pub base: u128,
    /// Marginal charge per unit beyond the first.
    pub per_item: u128,
}

impl FeeSchedule {
    /// Total fee for a batch of `n` units. Zero for an empty batch; a batch
    /// of one is never charged the marginal component.
    pub fn cost(&self, n: u64) -> u128 {
        if n == 0 {
            return 0;
        }
        let marginal = self
            .per_item
            .checked_mul(n as u128 - 1)
            .unwrap_or_else(|| env::panic_str("fee overflow"));
        self.base
            .checked_add(marginal)
            .unwrap_or_else(|| env::panic_str("fee overflow"))
    }
}

/// Supplier bounty parameters: a reserve-funded incentive active while the
/// vault holds fewer than `length` items.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Default)]
pub struct SupplierBounty {
    /// Bounty for supplying into an empty vault, in yoctoNEAR.
    pub amount: u128,
    /// Holdings level at and beyond which the bounty is zero.
    pub length: u64,
}

impl SupplierBounty {
    /// Unit bounty at holdings level `level`.
    pub fn unit_at(&self, level: u64) -> u128 {
        if self.length == 0 || level >= self.length {
            return 0;
        }
        // amount - amount * level / length, never underflows since level < length
        self.amount - mul_div(self.amount, level as u128, self.length as u128, Rounding::Down)
    }

    /// Reserve payout owed to a supplier minting `n` units into a vault
    /// currently holding `holdings` items.
    pub fn payout_for_mint(&self, holdings: u64, n: u64) -> u128 {
        (0..n).map(|i| self.unit_at(holdings + i)).sum()
    }

    /// Reserve refill charged to a redeemer taking `n` units out of a vault
    /// currently holding `holdings` items.
    ///
    /// # Panics
    ///
    /// Panics if `n > holdings`; callers bound the batch first.
    pub fn charge_for_redeem(&self, holdings: u64, n: u64) -> u128 {
        (1..=n)
            .map(|i| {
                let level = holdings
                    .checked_sub(i)
                    .unwrap_or_else(|| env::panic_str("insufficient holdings"));
                self.unit_at(level)
            })
            .sum()
    }
}

#[near]
impl Contract {
    /// Sets the vault's mint fee curve. Medium tier once finalized.
    pub fn set_mint_fees(&mut self, vault_id: u64, base: U128, per_item: U128) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetMintFees);
        let vault = self.internal_vault_mut(vault_id);
        vault.mint_fees = FeeSchedule {
            base: base.0,
            per_item: per_item.0,
        };
    }

    /// Sets the vault's redeem fee curve. Long tier once finalized: exit
    /// pricing is the schedule holders most need protection on.
    pub fn set_burn_fees(&mut self, vault_id: u64, base: U128, per_item: U128) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetBurnFees);
        let vault = self.internal_vault_mut(vault_id);
        vault.burn_fees = FeeSchedule {
            base: base.0,
            per_item: per_item.0,
        };
    }

    /// Sets the fee curve for atomic swap (mint-and-redeem) operations.
    pub fn set_dual_fees(&mut self, vault_id: u64, base: U128, per_item: U128) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetDualFees);
        let vault = self.internal_vault_mut(vault_id);
        vault.dual_fees = FeeSchedule {
            base: base.0,
            per_item: per_item.0,
        };
    }

    /// Sets the supplier bounty parameters. Long tier once finalized.
    pub fn set_supplier_bounty(&mut self, vault_id: u64, amount: U128, length: u64) {
        self.require_not_paused();
        self.require_config_auth(vault_id, GovernedOp::SetSupplierBounty);
        let vault = self.internal_vault_mut(vault_id);
        vault.supplier_bounty = SupplierBounty {
            amount: amount.0,
            length,
        };
    }

    // ==================== View Methods ====================

    /// Reserve payout a mint of `n` items would earn at the vault's current
    /// holdings level.
    pub fn bounty_payout_for(&self, vault_id: u64, n: u64) -> U128 {
        let vault = self.internal_vault(vault_id);
        U128(vault.supplier_bounty.payout_for_mint(vault.num_holdings(), n))
    }

    /// Reserve refill a redemption of `n` items would cost at the vault's
    /// current holdings level.
    pub fn bounty_charge_for(&self, vault_id: u64, n: u64) -> U128 {
        let vault = self.internal_vault(vault_id);
        U128(vault.supplier_bounty.charge_for_redeem(vault.num_holdings(), n))
    }
}

/// JSON view of a fee schedule. Amounts are stringified yoctoNEAR.
#[derive(Serialize, JsonSchema, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct FeeScheduleView {
    pub base: String,
    pub per_item: String,
}

impl From<FeeSchedule> for FeeScheduleView {
    fn from(value: FeeSchedule) -> Self {
        FeeScheduleView {
            base: value.base.to_string(),
            per_item: value.per_item.to_string(),
        }
    }
}

/// JSON view of the supplier bounty parameters.
#[derive(Serialize, JsonSchema, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct SupplierBountyView {
    pub amount: String,
    pub length: u64,
}

impl From<SupplierBounty> for SupplierBountyView {
    fn from(value: SupplierBounty) -> Self {
        SupplierBountyView {
            amount: value.amount.to_string(),
            length: value.length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::{init_contract, init_ctx_at, new_nft_vault};
    use crate::timelock::{Tier, MEDIUM_DELAY_NS};

    const UNIT: u128 = crate::BASE / 100;

    #[test]
    fn single_item_pays_base_only() {
        let fees = FeeSchedule {
            base: UNIT * 5,
            per_item: UNIT,
        };
        assert_eq!(fees.cost(1), UNIT * 5);
    }

    #[test]
    fn batch_adds_marginal_per_extra_item() {
        let fees = FeeSchedule {
            base: UNIT * 5,
            per_item: UNIT,
        };
        assert_eq!(fees.cost(3), UNIT * 5 + UNIT * 2);
    }

    #[test]
    fn empty_batch_costs_nothing() {
        let fees = FeeSchedule {
            base: UNIT * 5,
            per_item: UNIT,
        };
        assert_eq!(fees.cost(0), 0);
    }

    #[test]
    fn bounty_sequence_decreases_linearly() {
        let bounty = SupplierBounty {
            amount: UNIT * 10,
            length: 5,
        };
        // 10, 8, 6, 4, 2 then zero
        assert_eq!(bounty.unit_at(0), UNIT * 10);
        assert_eq!(bounty.unit_at(1), UNIT * 8);
        assert_eq!(bounty.unit_at(4), UNIT * 2);
        assert_eq!(bounty.unit_at(5), 0);
        assert_eq!(bounty.unit_at(100), 0);
    }

    #[test]
    fn mint_payout_sums_the_sequence() {
        let bounty = SupplierBounty {
            amount: UNIT * 10,
            length: 5,
        };
        assert_eq!(
            bounty.payout_for_mint(0, 5),
            UNIT * (10 + 8 + 6 + 4 + 2)
        );
        // partially filled vault only earns the tail of the sequence
        assert_eq!(bounty.payout_for_mint(3, 2), UNIT * (4 + 2));
        // fully supplied vault earns nothing
        assert_eq!(bounty.payout_for_mint(5, 3), 0);
    }

    #[test]
    fn redeem_charge_mirrors_mint_payout() {
        let bounty = SupplierBounty {
            amount: UNIT * 10,
            length: 5,
        };
        assert_eq!(
            bounty.charge_for_redeem(5, 5),
            bounty.payout_for_mint(0, 5)
        );
        // draining 5 -> 4 charges the level-4 unit
        assert_eq!(bounty.charge_for_redeem(5, 1), UNIT * 2);
    }

    #[test]
    fn zero_length_bounty_is_inert() {
        let bounty = SupplierBounty::default();
        assert_eq!(bounty.payout_for_mint(0, 10), 0);
        assert_eq!(bounty.charge_for_redeem(10, 10), 0);
    }

    #[test]
    fn fees_are_freely_settable_before_finalize() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.set_mint_fees(vault_id, U128(UNIT * 5), U128(UNIT));
        contract.set_burn_fees(vault_id, U128(UNIT * 5), U128(UNIT));
        assert_eq!(contract.mint_cost(vault_id, 2).0, UNIT * 6);
        assert_eq!(contract.burn_cost(vault_id, 2).0, UNIT * 6);
    }

    #[test]
    #[should_panic(expected = "tier is locked")]
    fn burn_fees_need_long_tier_after_finalize() {
        let mut contract = init_contract("owner.test");
        let vault_id = new_nft_vault(&mut contract, "punks.test");
        contract.finalize_vault(vault_id);
        contract.initiate_unlock(Tier::Medium);
        init_ctx_at("owner.test", 0, MEDIUM_DELAY_NS + 1);
        // the medium tier is open, but exit pricing needs the long tier
        contract.set_burn_fees(vault_id, U128(UNIT), U128(0));
    }
}
