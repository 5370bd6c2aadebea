//! # Protocol Events
//!
//! NEP-297 compliant event logging for vault operations. Events are emitted
//! as JSON logs prefixed with `EVENT_JSON:` under the `nftx` standard.
//!
//! Share-ledger mints and burns additionally emit the standard `FtMint` /
//! `FtBurn` events from `near-contract-standards` at the call sites.

use near_sdk::json_types::U128;
use near_sdk::serde::Serialize;
use near_sdk::{env, AccountIdRef};

use crate::TokenId;

// ============================================================================
// Event Wrapper
// ============================================================================

/// Top-level event wrapper for NEP-297 compliance.
#[derive(Serialize, Debug)]
#[serde(crate = "near_sdk::serde")]
#[serde(tag = "standard")]
#[must_use = "don't forget to `.emit()` this event"]
#[serde(rename_all = "snake_case")]
pub(crate) enum NearEvent<'a> {
    /// `nftx` standard event container.
    Nftx(NftxEvent<'a>),
}

impl<'a> NearEvent<'a> {
    fn to_json_string(&self) -> String {
        #[allow(clippy::redundant_closure)]
        serde_json::to_string(self)
            .ok()
            .unwrap_or_else(|| env::abort())
    }

    fn to_json_event_string(&self) -> String {
        format!("EVENT_JSON:{}", self.to_json_string())
    }

    /// Logs the event to the NEAR runtime.
    pub(crate) fn emit(self) {
        near_sdk::env::log_str(&self.to_json_event_string());
    }
}

// ============================================================================
// Event Payloads
// ============================================================================

/// Emitted once per `create_vault`, carrying the assigned ordinal id.
#[must_use]
#[derive(Serialize, Debug, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct VaultCreated<'a> {
    pub vault_id: u64,
    /// The underlying asset contract bound to the vault.
    pub asset: &'a AccountIdRef,
    pub is_d2: bool,
}

impl VaultCreated<'_> {
    pub fn emit(self) {
        NearEvent::Nftx(NftxEvent::new(NftxEventKind::VaultCreated(&[self.clone()]))).emit()
    }
}

/// Emitted when NFTs (or D2 units) enter a vault and shares are minted.
#[must_use]
#[derive(Serialize, Debug, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct VaultMint<'a> {
    pub vault_id: u64,
    /// The account that received the freshly minted shares.
    pub owner_id: &'a AccountIdRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ids: Option<&'a [TokenId]>,
    /// The amount of shares minted.
    pub shares: U128,
}

impl VaultMint<'_> {
    pub fn emit(self) {
        NearEvent::Nftx(NftxEvent::new(NftxEventKind::VaultMint(&[self.clone()]))).emit()
    }
}

/// Emitted when shares are burned and NFTs (or D2 units) leave a vault.
#[must_use]
#[derive(Serialize, Debug, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct VaultRedeem<'a> {
    pub vault_id: u64,
    /// The account whose shares were burned.
    pub owner_id: &'a AccountIdRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ids: Option<&'a [TokenId]>,
    /// The amount of shares burned.
    pub shares: U128,
}

impl VaultRedeem<'_> {
    pub fn emit(self) {
        NearEvent::Nftx(NftxEvent::new(NftxEventKind::VaultRedeem(&[self.clone()]))).emit()
    }
}

/// Emitted for a combined deposit-and-withdraw (`mint_and_redeem`) call.
#[must_use]
#[derive(Serialize, Debug, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct VaultSwap<'a> {
    pub vault_id: u64,
    pub owner_id: &'a AccountIdRef,
    /// Ids deposited into the vault.
    pub deposited: &'a [TokenId],
    /// Ids withdrawn from the vault.
    pub withdrawn: &'a [TokenId],
}

impl VaultSwap<'_> {
    pub fn emit(self) {
        NearEvent::Nftx(NftxEvent::new(NftxEventKind::VaultSwap(&[self.clone()]))).emit()
    }
}

/// Emitted for each migration step and for the final completion step.
#[must_use]
#[derive(Serialize, Debug, Clone)]
#[serde(crate = "near_sdk::serde")]
pub struct VaultMigration<'a> {
    pub vault_id: u64,
    /// Destination receiving the holdings or the share-mint authority.
    pub destination: &'a AccountIdRef,
    /// Number of ids moved by this step (zero for the completion step).
    pub count: u64,
    pub complete: bool,
}

impl VaultMigration<'_> {
    pub fn emit(self) {
        NearEvent::Nftx(NftxEvent::new(NftxEventKind::VaultMigration(&[self.clone()]))).emit()
    }
}

// ============================================================================
// Internal Event Structures
// ============================================================================

#[derive(Serialize, Debug)]
#[serde(crate = "near_sdk::serde")]
pub(crate) struct NftxEvent<'a> {
    /// Event format version.
    version: &'static str,
    /// The actual event data.
    #[serde(flatten)]
    event_kind: NftxEventKind<'a>,
}

impl<'a> NftxEvent<'a> {
    fn new(event_kind: NftxEventKind<'a>) -> Self {
        Self {
            version: "1.0.0",
            event_kind,
        }
    }
}

/// Enum of supported protocol event types.
#[derive(Serialize, Debug)]
#[serde(crate = "near_sdk::serde")]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
enum NftxEventKind<'a> {
    VaultCreated(&'a [VaultCreated<'a>]),
    VaultMint(&'a [VaultMint<'a>]),
    VaultRedeem(&'a [VaultRedeem<'a>]),
    VaultSwap(&'a [VaultSwap<'a>]),
    VaultMigration(&'a [VaultMigration<'a>]),
}
