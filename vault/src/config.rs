//! # Vault Configuration & Constants
//!
//! Every magic number the vault depends on lives here, next to the
//! construction-time [`VaultConfig`]. There is no global owner or
//! coordinator lookup anywhere in the crate: the configuration is handed to
//! the vault when it is built and the coordinator context is threaded through
//! every call.

use serde::{Deserialize, Serialize};

use crate::types::AccountId;

// ---------------------------------------------------------------------------
// Conversion Parameters
// ---------------------------------------------------------------------------

/// Virtual offset added to both total supply and total assets before every
/// conversion.
///
/// Bootstraps the exchange rate at 1:1 for an empty vault and makes donation
/// attacks on the first depositor unprofitable.
pub const VIRTUAL_OFFSET: u128 = 1;

/// Allowance sentinel meaning "unlimited". Never decremented on spend.
pub const UNLIMITED_ALLOWANCE: u64 = u64::MAX;

/// Supply cap value meaning "no cap".
pub const UNBOUNDED_SUPPLY_CAP: u64 = 0;

// ---------------------------------------------------------------------------
// Receiver Hooks
// ---------------------------------------------------------------------------

/// Code a receiver must return from a single-item inbound hook to accept
/// the transfer. Matches the selector of
/// `onERC1155Received(address,address,uint256,uint256,bytes)`.
pub const ON_RECEIVED_ACCEPTED: [u8; 4] = [0xf2, 0x3a, 0x6e, 0x61];

/// Code a receiver must return from a batch inbound hook. Matches the
/// selector of
/// `onERC1155BatchReceived(address,address,uint256[],uint256[],bytes)`.
pub const ON_BATCH_RECEIVED_ACCEPTED: [u8; 4] = [0xbc, 0x19, 0x7c, 0x81];

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Version tag written into every persisted vault record. Bump whenever the
/// layout of [`crate::storage::VaultRecord`] changes.
pub const STATE_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Which custody accounting policy a deployment runs.
///
/// The two policies expose identical entry points with different economics,
/// so the choice is made once, explicitly, and checked at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyKind {
    /// One running total. Any holder may withdraw any class the vault holds.
    Aggregate,
    /// Per-class totals plus a per-(account, class) deposit ledger. Holders
    /// may only withdraw a class up to what they deposited of it.
    PerClass,
}

impl std::fmt::Display for CustodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustodyKind::Aggregate => write!(f, "aggregate"),
            CustodyKind::PerClass => write!(f, "per_class"),
        }
    }
}

/// Construction-time configuration of a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Human-readable share name (e.g., "NOVA Certificate Vault").
    pub name: String,
    /// Share ticker symbol.
    pub symbol: String,
    /// The vault's own account. Custody balances are held here and the
    /// coordinator knows the vault by this identifier.
    pub address: AccountId,
    /// The only account allowed to change the supply cap.
    pub owner: AccountId,
    /// Initial supply cap. `0` means unbounded.
    #[serde(default)]
    pub supply_cap: u64,
    /// Custody accounting policy.
    pub policy: CustodyKind,
}

impl VaultConfig {
    /// Builds a configuration with an unbounded supply cap.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        address: impl Into<AccountId>,
        owner: impl Into<AccountId>,
        policy: CustodyKind,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            address: address.into(),
            owner: owner.into(),
            supply_cap: UNBOUNDED_SUPPLY_CAP,
            policy,
        }
    }

    /// Sets the initial supply cap.
    pub fn with_supply_cap(mut self, supply_cap: u64) -> Self {
        self.supply_cap = supply_cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptance_codes_are_distinct() {
        assert_ne!(ON_RECEIVED_ACCEPTED, ON_BATCH_RECEIVED_ACCEPTED);
    }

    #[test]
    fn config_defaults_to_unbounded_cap() {
        let config = VaultConfig::new("V", "VLT", "vault", "admin", CustodyKind::Aggregate);
        assert_eq!(config.supply_cap, UNBOUNDED_SUPPLY_CAP);
        assert_eq!(config.with_supply_cap(500).supply_cap, 500);
    }

    #[test]
    fn config_deserializes_without_cap() {
        let json = r#"{
            "name": "V",
            "symbol": "VLT",
            "address": "vault",
            "owner": "admin",
            "policy": "per_class"
        }"#;
        let config: VaultConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.policy, CustodyKind::PerClass);
        assert_eq!(config.supply_cap, 0);
        assert_eq!(config.owner.as_str(), "admin");
    }
}
