//! # Snapshots & Status Checks
//!
//! A vault captures a snapshot of its exchange rate the first time it is
//! touched in a transaction, then validates the final state against it once,
//! when the coordinator flushes deferred checks.
//!
//! ```text
//! ABSENT --capture--> CAPTURED --take--> CONSUMED --reset--> ABSENT
//!    ^                    |
//!    +------ reset -------+
//! ```
//!
//! Capturing is idempotent while `CAPTURED`: nested operations see the value
//! taken at the start of the outer call chain. Taking from anything but
//! `CAPTURED` is [`VaultError::SnapshotMissing`]. The coordinator resets the
//! slot when the transaction commits or rolls back, so a snapshot never
//! outlives its transaction.
//!
//! ## Supply cap ratchet
//!
//! The check fails only if the cap is set, the final supply-equivalent value
//! is above it, *and* the value grew during the transaction. A vault that is
//! already over its cap can always shrink, so exits are never blocked.

use serde::{Deserialize, Serialize};

use crate::accounting::ExchangeRate;
use crate::config::UNBOUNDED_SUPPLY_CAP;
use crate::error::VaultError;
use crate::types::AccountId;

/// Capability interface a vault exposes to the coordinator.
pub trait StatusCheck: Send + Sync {
    /// The vault's address, used as its coordinator key.
    fn vault_id(&self) -> &AccountId;

    /// Captures a snapshot unless one is already captured in this
    /// transaction.
    fn create_snapshot(&self) -> Result<(), VaultError>;

    /// Consumes the snapshot and validates the vault's final state against
    /// it.
    fn check_vault_status(&self) -> Result<(), VaultError>;

    /// Validates an account's obligations to this vault.
    fn check_account_status(&self, account: &AccountId) -> Result<(), VaultError>;
}

/// Opaque, single-use capture of a vault's totals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot(Vec<u8>);

#[derive(Serialize, Deserialize)]
struct SnapshotData {
    total_supply: u64,
    total_assets: u64,
}

impl Snapshot {
    /// Encodes the totals of `rate`.
    pub fn capture(rate: ExchangeRate) -> Result<Self, VaultError> {
        let data = SnapshotData {
            total_supply: rate.total_supply,
            total_assets: rate.total_assets,
        };
        bincode::serialize(&data)
            .map(Snapshot)
            .map_err(|e| VaultError::InvalidSnapshot(e.to_string()))
    }

    /// Wraps raw bytes, e.g. a snapshot handed over by another component.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Snapshot(bytes)
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decodes the captured exchange rate.
    pub fn rate(&self) -> Result<ExchangeRate, VaultError> {
        let data: SnapshotData = bincode::deserialize(&self.0)
            .map_err(|e| VaultError::InvalidSnapshot(e.to_string()))?;
        Ok(ExchangeRate::new(data.total_supply, data.total_assets))
    }
}

/// Lifecycle of a vault's snapshot within one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SnapshotState {
    /// Nothing captured yet.
    #[default]
    Absent,
    /// Captured and waiting for the vault check.
    Captured(Snapshot),
    /// Taken by the vault check.
    Consumed,
}

/// Holds a vault's [`SnapshotState`].
#[derive(Debug, Default)]
pub(crate) struct SnapshotSlot {
    state: SnapshotState,
}

impl SnapshotSlot {
    /// Captures with `capture` unless a snapshot is already held. Returns
    /// `true` if this call captured.
    pub(crate) fn capture_with<F>(&mut self, capture: F) -> Result<bool, VaultError>
    where
        F: FnOnce() -> Result<Snapshot, VaultError>,
    {
        if matches!(self.state, SnapshotState::Captured(_)) {
            return Ok(false);
        }
        self.state = SnapshotState::Captured(capture()?);
        Ok(true)
    }

    /// Takes the snapshot, leaving the slot `Consumed`.
    pub(crate) fn take(&mut self) -> Option<Snapshot> {
        match std::mem::replace(&mut self.state, SnapshotState::Consumed) {
            SnapshotState::Captured(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Returns the slot to `Absent`.
    pub(crate) fn reset(&mut self) {
        self.state = SnapshotState::Absent;
    }

    pub(crate) fn state(&self) -> &SnapshotState {
        &self.state
    }
}

/// Validates a vault's final state against its snapshot.
///
/// # Errors
///
/// Returns [`VaultError::SnapshotMissing`] if `snapshot` is `None`, and
/// [`VaultError::SupplyCapExceeded`] if the supply-equivalent value grew past
/// a non-zero `supply_cap`.
pub fn check_vault_status(
    snapshot: Option<Snapshot>,
    current: ExchangeRate,
    supply_cap: u64,
) -> Result<(), VaultError> {
    let snapshot = snapshot.ok_or(VaultError::SnapshotMissing)?;
    let initial = snapshot.rate()?.supply_equivalent()?;
    let current = current.supply_equivalent()?;

    if supply_cap != UNBOUNDED_SUPPLY_CAP && current > supply_cap && current > initial {
        return Err(VaultError::SupplyCapExceeded {
            cap: supply_cap,
            initial,
            current,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(supply: u64, assets: u64) -> Option<Snapshot> {
        Some(Snapshot::capture(ExchangeRate::new(supply, assets)).unwrap())
    }

    #[test]
    fn growth_past_cap_is_rejected() {
        let err = check_vault_status(snap(900, 900), ExchangeRate::new(1200, 1200), 1000)
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::SupplyCapExceeded {
                cap: 1000,
                initial: 900,
                current: 1200,
            }
        ));
    }

    #[test]
    fn shrinking_while_over_cap_is_allowed() {
        check_vault_status(snap(1200, 1200), ExchangeRate::new(1100, 1100), 1000).unwrap();
    }

    #[test]
    fn zero_cap_is_unbounded() {
        check_vault_status(snap(0, 0), ExchangeRate::new(u64::MAX / 2, u64::MAX / 2), 0)
            .unwrap();
    }

    #[test]
    fn growth_up_to_cap_is_allowed() {
        check_vault_status(snap(0, 0), ExchangeRate::new(1000, 1000), 1000).unwrap();
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        assert!(matches!(
            check_vault_status(None, ExchangeRate::new(0, 0), 0),
            Err(VaultError::SnapshotMissing)
        ));
    }

    #[test]
    fn garbage_snapshot_is_rejected() {
        let bogus = Some(Snapshot::from_bytes(vec![1, 2, 3]));
        assert!(matches!(
            check_vault_status(bogus, ExchangeRate::new(0, 0), 0),
            Err(VaultError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn slot_captures_once_and_consumes_once() {
        let mut slot = SnapshotSlot::default();
        assert!(slot
            .capture_with(|| Snapshot::capture(ExchangeRate::new(1, 1)))
            .unwrap());
        assert!(!slot
            .capture_with(|| Snapshot::capture(ExchangeRate::new(2, 2)))
            .unwrap());

        let taken = slot.take().unwrap();
        assert_eq!(taken.rate().unwrap(), ExchangeRate::new(1, 1));
        assert_eq!(slot.state(), &SnapshotState::Consumed);
        assert!(slot.take().is_none());

        slot.reset();
        assert_eq!(slot.state(), &SnapshotState::Absent);
    }
}
