//! The persisted layout of one vault.

use serde::{Deserialize, Serialize};

use crate::accounting::{CustodyRecord, ShareLedger};
use crate::types::AccountId;

/// Everything needed to rebuild a vault, minus the asset handle.
///
/// Produced by `Vault::to_record` and consumed by `Vault::from_record`,
/// which validates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Format version. See [`crate::config::STATE_FORMAT_VERSION`].
    pub version: u16,
    pub name: String,
    pub symbol: String,
    /// Reference of the underlying asset the vault was built over.
    pub asset: String,
    pub address: AccountId,
    pub owner: AccountId,
    /// `0` means unbounded.
    pub supply_cap: u64,
    /// Total supply, balances, and allowances.
    pub ledger: ShareLedger,
    /// Custody totals and, per-class, the deposit ledger.
    pub custody: CustodyRecord,
}

impl VaultRecord {
    /// Total shares outstanding according to the record.
    pub fn total_supply(&self) -> u64 {
        self.ledger.total_supply()
    }
}
