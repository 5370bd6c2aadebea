//! # Test Utilities
//!
//! Context and contract initialization helpers shared by the per-module
//! unit tests. The contract account is always `nftx.test`, so callbacks and
//! share-ledger ownership checks behave consistently across tests.

/// Helper functions for test context and contract initialization.
#[cfg(test)]
pub mod helpers {
    use crate::Contract;
    use near_contract_standards::non_fungible_token::core::NonFungibleTokenReceiver;
    use near_sdk::test_utils::VMContextBuilder;
    use near_sdk::{testing_env, NearToken, PromiseOrValue};

    const CONTRACT_ACCOUNT: &str = "nftx.test";

    fn base_builder(predecessor: &str, deposit_yocto: u128) -> VMContextBuilder {
        let mut builder = VMContextBuilder::new();
        builder
            .current_account_id(CONTRACT_ACCOUNT.parse().unwrap())
            .predecessor_account_id(predecessor.parse().unwrap())
            .attached_deposit(NearToken::from_yoctonear(deposit_yocto));
        builder
    }

    /// Initializes the NEAR VM context for testing.
    ///
    /// # Arguments
    ///
    /// * `predecessor` - The account ID that will be the caller
    /// * `deposit_yocto` - Amount of yoctoNEAR attached to calls
    pub fn init_ctx(predecessor: &str, deposit_yocto: u128) {
        testing_env!(base_builder(predecessor, deposit_yocto).build());
    }

    /// Like [`init_ctx`] but with an explicit block timestamp, for timelock
    /// tests.
    pub fn init_ctx_at(predecessor: &str, deposit_yocto: u128, timestamp_ns: u64) {
        let mut builder = base_builder(predecessor, deposit_yocto);
        builder.block_timestamp(timestamp_ns);
        testing_env!(builder.build());
    }

    /// Initializes the contract with the given owner as the caller.
    pub fn init_contract(owner: &str) -> Contract {
        init_ctx(owner, 0);
        Contract::new(owner.parse().unwrap())
    }

    /// Creates an NFT vault bound to `asset`, left unfinalized so tests can
    /// configure it first. The context is switched to the contract owner for
    /// the call and left there.
    pub fn new_nft_vault(contract: &mut Contract, asset: &str) -> u64 {
        init_ctx(contract.owner_id().as_str(), 0);
        contract.create_vault(
            asset.parse().unwrap(),
            false,
            "Vault Shares".to_string(),
            "SHARE".to_string(),
        )
    }

    /// Clears a vault's transient reserve, standing in for the resolve
    /// callbacks confirming every outbound transfer.
    pub fn settle_transfers(contract: &mut Contract, vault_id: u64) {
        let vault = contract.internal_vault_mut(vault_id);
        let in_flight: Vec<_> = vault.reserves.iter().cloned().collect();
        for token_id in in_flight {
            vault.reserves.remove(&token_id);
        }
    }

    /// Pushes a token into a vault's pending custody via the NEP-171
    /// receiver, asserting it was accepted.
    pub fn deposit_nft(
        contract: &mut Contract,
        vault_id: u64,
        asset: &str,
        depositor: &str,
        token_id: &str,
    ) {
        init_ctx(asset, 0);
        let result = contract.nft_on_transfer(
            depositor.parse().unwrap(),
            depositor.parse().unwrap(),
            token_id.to_string(),
            format!(r#"{{"vault_id":{}}}"#, vault_id),
        );
        assert!(
            matches!(result, PromiseOrValue::Value(false)),
            "deposit of token {} was bounced",
            token_id
        );
    }
}
