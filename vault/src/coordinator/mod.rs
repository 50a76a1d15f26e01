//! # Coordinator: Transactions, Deferred Checks, Operators
//!
//! The coordinator is the only way into a vault's mutating entry points.
//! Every entry point takes a [`CallContext`], and a context only exists
//! inside [`Coordinator::call`]. That makes the coordinator the
//! transaction boundary:
//!
//! 1. Every registered participant (vaults, assets) is checkpointed.
//! 2. The closure runs. Vault entry points mutate state and *schedule*
//!    status checks on the context instead of running them.
//! 3. When the outermost call unwinds, scheduled account checks run, then
//!    scheduled vault checks, each exactly once.
//! 4. If the closure or any check failed, or an entry point aborted the
//!    transaction through [`CallContext::abort`], every participant is
//!    rolled back to its checkpoint. Otherwise every participant commits.
//!
//! Outer transactions are serialised. Nested frames go through
//! [`CallContext::nested`] and [`CallContext::call_as`] and share the outer
//! frame's deferred-check queue. Calling [`Coordinator::call`] again from
//! inside a transaction on the same thread is reentrancy and is rejected.
//!
//! The coordinator also keeps the two pieces of authorization state vaults
//! rely on: operator approvals (who may act as whom) and controller
//! enablement (which vaults an account has accepted as controllers).

mod context;

pub use context::{batch_item, BatchItem, CallContext};

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::VaultError;
use crate::types::AccountId;
use crate::vault::StatusCheck;

use context::PendingChecks;

/// State that must follow the outcome of the transaction it was touched in.
///
/// The coordinator calls `begin` on every participant before an outer
/// transaction, then exactly one of `commit` or `rollback`.
pub trait Transactional: Send + Sync {
    /// Starts a transaction. The checkpoint may be recorded here or lazily,
    /// before the first mutation.
    fn begin(&self);
    /// Discards the checkpoint and any transaction-scoped state.
    fn commit(&self);
    /// Restores the checkpoint and discards transaction-scoped state.
    fn rollback(&self);
}

/// Operator approvals and controller enablement.
#[derive(Clone, Debug, Default)]
struct AuthorizationBook {
    /// `account -> operators allowed to act as account`.
    operators: BTreeMap<AccountId, BTreeSet<AccountId>>,
    /// `account -> enabled controller vaults`.
    controllers: BTreeMap<AccountId, BTreeSet<AccountId>>,
}

/// Resets the in-flight flag when the outer transaction ends, including on
/// unwind.
struct InFlight<'a>(&'a Cell<bool>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Drives vault operations as all-or-nothing transactions.
pub struct Coordinator {
    /// Vaults whose status checks can be scheduled, keyed by vault address.
    vaults: RwLock<BTreeMap<AccountId, Arc<dyn StatusCheck>>>,
    /// Everything that is checkpointed and rolled back with a transaction.
    participants: RwLock<Vec<Arc<dyn Transactional>>>,
    /// Operators and controllers.
    book: Mutex<AuthorizationBook>,
    /// Checkpoint of `book` for the transaction in flight.
    checkpoint: Mutex<Option<AuthorizationBook>>,
    /// Serialises outer transactions and detects same-thread reentry.
    gate: ReentrantMutex<Cell<bool>>,
}

impl Coordinator {
    /// Creates a coordinator with nothing registered.
    pub fn new() -> Self {
        Self {
            vaults: RwLock::new(BTreeMap::new()),
            participants: RwLock::new(Vec::new()),
            book: Mutex::new(AuthorizationBook::default()),
            checkpoint: Mutex::new(None),
            gate: ReentrantMutex::new(Cell::new(false)),
        }
    }

    /// Registers a vault: its status checks become schedulable and its state
    /// follows transaction outcomes.
    pub fn register_vault<V>(&self, vault: Arc<V>)
    where
        V: StatusCheck + Transactional + 'static,
    {
        let id = vault.vault_id().clone();
        info!(vault = %id, "vault registered");
        self.participants.write().push(vault.clone());
        self.vaults.write().insert(id, vault);
    }

    /// Registers a non-vault participant, typically the underlying asset, so
    /// that it rolls back together with the vaults.
    pub fn register_resource<R>(&self, resource: Arc<R>)
    where
        R: Transactional + 'static,
    {
        self.participants.write().push(resource);
    }

    /// Returns `true` if a vault is registered under `id`.
    pub fn is_registered(&self, id: &AccountId) -> bool {
        self.vaults.read().contains_key(id)
    }

    /// Runs `f` as one outer transaction on behalf of `caller`.
    ///
    /// Deferred checks run once after `f` returns. Any error from `f` or from
    /// a check rolls back every participant.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` or a scheduled check returned,
    /// [`VaultError::Aborted`] if `f` returned `Ok` after an entry point
    /// aborted the transaction, or [`VaultError::ReentrancyDetected`] if a
    /// transaction is already in flight on this thread.
    pub fn call<T, F>(&self, caller: impl Into<AccountId>, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&CallContext<'_>) -> Result<T, VaultError>,
    {
        let gate = self.gate.lock();
        if gate.get() {
            return Err(VaultError::ReentrancyDetected);
        }
        gate.set(true);
        let _in_flight = InFlight(&gate);

        let tx_id = Uuid::new_v4();
        let caller = caller.into();
        let participants: Vec<Arc<dyn Transactional>> = self.participants.read().clone();
        debug!(%tx_id, caller = %caller, "transaction started");

        self.begin(&participants);
        let pending = PendingChecks::default();
        let ctx = CallContext::outermost(self, caller, &pending, tx_id);

        let result = f(&ctx).and_then(|value| match pending.abort_cause() {
            Some(cause) => Err(VaultError::Aborted { cause }),
            None => {
                self.run_checks(&pending)?;
                Ok(value)
            }
        });

        match &result {
            Ok(_) => {
                self.commit(&participants);
                debug!(%tx_id, "transaction committed");
            }
            Err(err) => {
                self.rollback(&participants);
                warn!(%tx_id, error = %err, "transaction rolled back");
            }
        }
        result
    }

    /// Runs `f` as `account`, with `operator` as the original caller.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] if `operator` is neither
    /// `account` nor one of its approved operators.
    pub fn call_on_behalf_of<T, F>(
        &self,
        operator: impl Into<AccountId>,
        account: impl Into<AccountId>,
        f: F,
    ) -> Result<T, VaultError>
    where
        F: FnOnce(&CallContext<'_>) -> Result<T, VaultError>,
    {
        let account = account.into();
        self.call(operator, move |ctx| ctx.call_as(account, f))
    }

    /// Runs every item, in order, inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns the first error from an item or a deferred check. Nothing from
    /// any item is applied in that case.
    pub fn batch(
        &self,
        caller: impl Into<AccountId>,
        items: Vec<BatchItem<'_>>,
    ) -> Result<(), VaultError> {
        self.call(caller, |ctx| {
            for item in items {
                ctx.nested(item)?;
            }
            Ok(())
        })
    }

    /// Returns `true` if `operator` may act as `account`.
    pub fn is_operator(&self, account: &AccountId, operator: &AccountId) -> bool {
        self.book
            .lock()
            .operators
            .get(account)
            .is_some_and(|ops| ops.contains(operator))
    }

    /// Returns the vaults `account` has enabled as controllers.
    pub fn controllers_of(&self, account: &AccountId) -> Vec<AccountId> {
        self.book
            .lock()
            .controllers
            .get(account)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Authorization book (reached through CallContext)
    // -----------------------------------------------------------------------

    fn set_operator(&self, account: &AccountId, operator: &AccountId, approved: bool) {
        let mut book = self.book.lock();
        if approved {
            book.operators
                .entry(account.clone())
                .or_default()
                .insert(operator.clone());
        } else if let Some(ops) = book.operators.get_mut(account) {
            ops.remove(operator);
            if ops.is_empty() {
                book.operators.remove(account);
            }
        }
    }

    fn set_controller(&self, account: &AccountId, vault: &AccountId, enabled: bool) {
        let mut book = self.book.lock();
        if enabled {
            book.controllers
                .entry(account.clone())
                .or_default()
                .insert(vault.clone());
        } else if let Some(vaults) = book.controllers.get_mut(account) {
            vaults.remove(vault);
            if vaults.is_empty() {
                book.controllers.remove(account);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transaction lifecycle
    // -----------------------------------------------------------------------

    fn begin(&self, participants: &[Arc<dyn Transactional>]) {
        let snapshot = self.book.lock().clone();
        *self.checkpoint.lock() = Some(snapshot);
        for participant in participants {
            participant.begin();
        }
    }

    fn commit(&self, participants: &[Arc<dyn Transactional>]) {
        self.checkpoint.lock().take();
        for participant in participants {
            participant.commit();
        }
    }

    fn rollback(&self, participants: &[Arc<dyn Transactional>]) {
        let checkpoint = self.checkpoint.lock().take();
        if let Some(book) = checkpoint {
            *self.book.lock() = book;
        }
        for participant in participants {
            participant.rollback();
        }
    }

    /// Runs every scheduled check exactly once: accounts first, then vaults.
    fn run_checks(&self, pending: &PendingChecks) -> Result<(), VaultError> {
        let (accounts, vaults) = pending.drain();

        for (vault_id, account) in &accounts {
            let vault = self.lookup(vault_id)?;
            vault.check_account_status(account)?;
        }
        for vault_id in &vaults {
            let vault = self.lookup(vault_id)?;
            vault.check_vault_status()?;
        }

        debug!(
            account_checks = accounts.len(),
            vault_checks = vaults.len(),
            "deferred checks passed"
        );
        Ok(())
    }

    fn lookup(&self, vault_id: &AccountId) -> Result<Arc<dyn StatusCheck>, VaultError> {
        self.vaults
            .read()
            .get(vault_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownVault(vault_id.clone()))
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("vaults", &self.vaults.read().keys().collect::<Vec<_>>())
            .field("participants", &self.participants.read().len())
            .finish()
    }
}
