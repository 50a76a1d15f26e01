//! # Vault: Entry Points, Snapshots, Reentrancy
//!
//! A [`Vault`] composes the share ledger, a custody policy, and the
//! underlying asset into ERC-4626-style entry points:
//!
//! ```text
//! operations.rs — deposit / mint / withdraw / redeem / transfer / admin
//! views.rs      — read-only conversions, previews, balances, limits
//! snapshot.rs   — snapshot state machine and the supply-cap check
//! guard.rs      — per-vault reentrancy lock
//! ```
//!
//! ## Ordering
//!
//! Every mutating entry point follows the same sequence:
//!
//! 1. Take the reentrancy lock.
//! 2. Checkpoint the durable state and capture a snapshot (first touch in
//!    the transaction only).
//! 3. Move assets and shares: pay in before minting, burn before paying out.
//!    A failure from here on aborts the whole transaction.
//! 4. Schedule status checks with the coordinator.
//!
//! The vault is generic over its [`CustodyPolicy`]. Use [`AggregateVault`]
//! or [`PerClassVault`]; the policy is part of the type so the two can never
//! be confused at runtime.

mod guard;
mod operations;
mod snapshot;
mod views;

pub use snapshot::{check_vault_status, Snapshot, SnapshotState, StatusCheck};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::accounting::{
    AggregateCustody, CustodyPolicy, ExchangeRate, PerClassCustody, ShareLedger,
};
use crate::asset::{Asset, TokenReceiver};
use crate::config::{
    VaultConfig, ON_BATCH_RECEIVED_ACCEPTED, ON_RECEIVED_ACCEPTED, STATE_FORMAT_VERSION,
};
use crate::coordinator::{CallContext, Transactional};
use crate::error::VaultError;
use crate::storage::{StorageError, VaultRecord};
use crate::types::{AccountId, ClassId};

use snapshot::SnapshotSlot;

/// A vault under the aggregate custody policy.
pub type AggregateVault = Vault<AggregateCustody>;

/// A vault under the per-class custody policy.
pub type PerClassVault = Vault<PerClassCustody>;

/// Durable vault state. Everything a transaction can change.
#[derive(Clone, Debug)]
struct VaultState<P> {
    supply_cap: u64,
    ledger: ShareLedger,
    custody: P,
}

/// Transaction-scoped state. Never persisted.
#[derive(Debug, Default)]
struct Transient<P> {
    snapshot: SnapshotSlot,
    /// Taken on first touch, so untouched vaults cost nothing per
    /// transaction.
    checkpoint: Option<VaultState<P>>,
}

/// A pooled custody vault.
pub struct Vault<P: CustodyPolicy> {
    address: AccountId,
    owner: AccountId,
    name: String,
    symbol: String,
    asset: Arc<dyn Asset>,
    state: Mutex<VaultState<P>>,
    transient: Mutex<Transient<P>>,
    locked: AtomicBool,
}

impl<P: CustodyPolicy> Vault<P> {
    /// Builds an empty vault over `asset`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::PolicyMismatch`] if `config.policy` is not the
    /// policy `P` implements.
    pub fn new(config: VaultConfig, asset: Arc<dyn Asset>) -> Result<Self, VaultError> {
        if config.policy != P::KIND {
            return Err(VaultError::PolicyMismatch {
                configured: config.policy,
                implemented: P::KIND,
            });
        }
        info!(
            vault = %config.address,
            asset = asset.reference(),
            policy = %P::KIND,
            supply_cap = config.supply_cap,
            "vault created"
        );
        Ok(Self::assemble(
            config.address,
            config.owner,
            config.name,
            config.symbol,
            asset,
            VaultState {
                supply_cap: config.supply_cap,
                ledger: ShareLedger::new(),
                custody: P::default(),
            },
        ))
    }

    /// Restores a vault from its persisted record.
    ///
    /// # Errors
    ///
    /// Fails if the record's format version is unsupported, if it was written
    /// for another asset or policy, or if its ledger is inconsistent.
    pub fn from_record(record: VaultRecord, asset: Arc<dyn Asset>) -> Result<Self, VaultError> {
        if record.version != STATE_FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: record.version,
                expected: STATE_FORMAT_VERSION,
            }
            .into());
        }
        if record.asset != asset.reference() {
            return Err(StorageError::InvariantViolation(format!(
                "record is for asset {}, got {}",
                record.asset,
                asset.reference()
            ))
            .into());
        }
        if !record.ledger.is_consistent() {
            return Err(StorageError::InvariantViolation(format!(
                "total supply {} does not match the sum of balances",
                record.ledger.total_supply()
            ))
            .into());
        }
        let custody = P::from_record(record.custody)?;

        Ok(Self::assemble(
            record.address,
            record.owner,
            record.name,
            record.symbol,
            asset,
            VaultState {
                supply_cap: record.supply_cap,
                ledger: record.ledger,
                custody,
            },
        ))
    }

    /// Exports the persisted layout of this vault.
    pub fn to_record(&self) -> VaultRecord {
        let state = self.state.lock();
        VaultRecord {
            version: STATE_FORMAT_VERSION,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            asset: self.asset.reference().to_string(),
            address: self.address.clone(),
            owner: self.owner.clone(),
            supply_cap: state.supply_cap,
            ledger: state.ledger.clone(),
            custody: state.custody.to_record(),
        }
    }

    /// The vault's own account.
    pub fn id(&self) -> &AccountId {
        &self.address
    }

    /// The account allowed to change the supply cap.
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Share name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Share symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Reference of the underlying asset.
    pub fn asset_reference(&self) -> &str {
        self.asset.reference()
    }

    /// Where the snapshot of the current transaction stands.
    pub fn snapshot_state(&self) -> SnapshotState {
        self.transient.lock().snapshot.state().clone()
    }

    fn assemble(
        address: AccountId,
        owner: AccountId,
        name: String,
        symbol: String,
        asset: Arc<dyn Asset>,
        state: VaultState<P>,
    ) -> Self {
        Self {
            address,
            owner,
            name,
            symbol,
            asset,
            state: Mutex::new(state),
            transient: Mutex::new(Transient::default()),
            locked: AtomicBool::new(false),
        }
    }

    /// Saves the durable state the first time the current transaction
    /// touches this vault.
    fn touch(&self) {
        let mut transient = self.transient.lock();
        if transient.checkpoint.is_none() {
            transient.checkpoint = Some(self.state.lock().clone());
        }
    }

    fn rate(&self) -> ExchangeRate {
        let state = self.state.lock();
        ExchangeRate::new(state.ledger.total_supply(), state.custody.total_assets())
    }
}

impl<P: CustodyPolicy> StatusCheck for Vault<P> {
    fn vault_id(&self) -> &AccountId {
        &self.address
    }

    fn create_snapshot(&self) -> Result<(), VaultError> {
        self.touch();
        let rate = self.rate();
        self.transient
            .lock()
            .snapshot
            .capture_with(|| Snapshot::capture(rate))?;
        Ok(())
    }

    fn check_vault_status(&self) -> Result<(), VaultError> {
        let snapshot = self.transient.lock().snapshot.take();
        let (rate, supply_cap) = {
            let state = self.state.lock();
            (
                ExchangeRate::new(state.ledger.total_supply(), state.custody.total_assets()),
                state.supply_cap,
            )
        };
        check_vault_status(snapshot, rate, supply_cap).map_err(|err| {
            warn!(vault = %self.address, error = %err, "vault status check failed");
            err
        })
    }

    fn check_account_status(&self, _account: &AccountId) -> Result<(), VaultError> {
        // No debt, so no account obligations.
        Ok(())
    }
}

impl<P: CustodyPolicy> Transactional for Vault<P> {
    fn begin(&self) {
        let mut transient = self.transient.lock();
        transient.checkpoint = None;
        transient.snapshot.reset();
    }

    fn commit(&self) {
        let mut transient = self.transient.lock();
        transient.checkpoint = None;
        transient.snapshot.reset();
    }

    fn rollback(&self) {
        let checkpoint = {
            let mut transient = self.transient.lock();
            transient.snapshot.reset();
            transient.checkpoint.take()
        };
        if let Some(state) = checkpoint {
            *self.state.lock() = state;
        }
    }
}

impl<P: CustodyPolicy> TokenReceiver for Vault<P> {
    fn on_received(
        &self,
        _ctx: &CallContext<'_>,
        _operator: &AccountId,
        _from: &AccountId,
        _class: ClassId,
        _amount: u64,
    ) -> Result<[u8; 4], VaultError> {
        Ok(ON_RECEIVED_ACCEPTED)
    }

    fn on_batch_received(
        &self,
        _ctx: &CallContext<'_>,
        _operator: &AccountId,
        _from: &AccountId,
        _items: &[(ClassId, u64)],
    ) -> Result<[u8; 4], VaultError> {
        Ok(ON_BATCH_RECEIVED_ACCEPTED)
    }
}

impl<P: CustodyPolicy> std::fmt::Debug for Vault<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Vault")
            .field("address", &self.address)
            .field("symbol", &self.symbol)
            .field("policy", &P::KIND)
            .field("supply_cap", &state.supply_cap)
            .field("total_supply", &state.ledger.total_supply())
            .field("total_assets", &state.custody.total_assets())
            .finish()
    }
}
