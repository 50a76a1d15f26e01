//! Call contexts and the deferred-check queue of a transaction.

use std::cell::RefCell;
use std::collections::BTreeSet;

use tracing::{trace, warn};
use uuid::Uuid;

use super::Coordinator;
use crate::error::VaultError;
use crate::types::AccountId;

/// One step of a [`Coordinator::batch`].
pub type BatchItem<'a> = Box<dyn FnOnce(&CallContext<'_>) -> Result<(), VaultError> + 'a>;

/// Boxes a closure as a [`BatchItem`].
pub fn batch_item<'a, F>(f: F) -> BatchItem<'a>
where
    F: FnOnce(&CallContext<'_>) -> Result<(), VaultError> + 'a,
{
    Box::new(f)
}

/// Status checks scheduled during a transaction, deduplicated so each runs
/// once no matter how many operations asked for it, plus the first failure
/// reported by an entry point.
#[derive(Debug, Default)]
pub(crate) struct PendingChecks {
    /// `(vault, account)` pairs.
    accounts: RefCell<BTreeSet<(AccountId, AccountId)>>,
    /// Vault addresses.
    vaults: RefCell<BTreeSet<AccountId>>,
    /// Set once an entry point fails after it started mutating state.
    aborted: RefCell<Option<String>>,
}

impl PendingChecks {
    /// The first recorded failure, if any. Once set, the transaction must
    /// roll back.
    pub(crate) fn abort_cause(&self) -> Option<String> {
        self.aborted.borrow().clone()
    }

    /// Empties the queue and returns what was scheduled.
    pub(crate) fn drain(&self) -> (Vec<(AccountId, AccountId)>, Vec<AccountId>) {
        let accounts = std::mem::take(&mut *self.accounts.borrow_mut());
        let vaults = std::mem::take(&mut *self.vaults.borrow_mut());
        (accounts.into_iter().collect(), vaults.into_iter().collect())
    }
}

/// The view an entry point has of the transaction it runs in.
///
/// Carries the effective caller and gives access to the transaction's
/// deferred-check queue. Only the coordinator can create one.
pub struct CallContext<'c> {
    coordinator: &'c Coordinator,
    caller: AccountId,
    pending: &'c PendingChecks,
    tx_id: Uuid,
    depth: usize,
}

impl<'c> CallContext<'c> {
    pub(crate) fn outermost(
        coordinator: &'c Coordinator,
        caller: AccountId,
        pending: &'c PendingChecks,
        tx_id: Uuid,
    ) -> Self {
        Self {
            coordinator,
            caller,
            pending,
            tx_id,
            depth: 0,
        }
    }

    /// The effective caller of this frame.
    pub fn caller(&self) -> &AccountId {
        &self.caller
    }

    /// Identifier of the enclosing transaction, for log correlation.
    pub fn tx_id(&self) -> Uuid {
        self.tx_id
    }

    /// Nesting depth. The outermost frame is 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The coordinator driving this transaction.
    pub fn coordinator(&self) -> &'c Coordinator {
        self.coordinator
    }

    /// Schedules a status check of `vault` for the end of the transaction.
    pub fn require_vault_status_check(&self, vault: &AccountId) {
        trace!(tx_id = %self.tx_id, vault = %vault, "vault status check scheduled");
        self.pending.vaults.borrow_mut().insert(vault.clone());
    }

    /// Schedules a status check of `account` by `vault` for the end of the
    /// transaction.
    pub fn require_account_status_check(&self, vault: &AccountId, account: &AccountId) {
        trace!(tx_id = %self.tx_id, vault = %vault, account = %account, "account status check scheduled");
        self.pending
            .accounts
            .borrow_mut()
            .insert((vault.clone(), account.clone()));
    }

    /// Marks the transaction as failed. It will roll back even if `err` is
    /// handled by an outer frame. Only the first failure is kept.
    pub fn abort(&self, err: &VaultError) {
        let mut aborted = self.pending.aborted.borrow_mut();
        if aborted.is_none() {
            warn!(tx_id = %self.tx_id, depth = self.depth, error = %err, "transaction aborted");
            *aborted = Some(err.to_string());
        }
    }

    /// Returns `true` once [`abort`](Self::abort) has been called in this
    /// transaction.
    pub fn is_aborted(&self) -> bool {
        self.pending.aborted.borrow().is_some()
    }

    /// Runs `f` in a nested frame with the same caller. Checks scheduled by
    /// `f` join this transaction's queue.
    pub fn nested<T, F>(&self, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&CallContext<'_>) -> Result<T, VaultError>,
    {
        f(&self.child(self.caller.clone()))
    }

    /// Runs `f` in a nested frame whose effective caller is `account`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] unless the current caller is
    /// `account` itself or an approved operator of `account`.
    pub fn call_as<T, F>(&self, account: impl Into<AccountId>, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&CallContext<'_>) -> Result<T, VaultError>,
    {
        let account = account.into();
        if account != self.caller && !self.coordinator.is_operator(&account, &self.caller) {
            return Err(VaultError::Unauthorized {
                caller: self.caller.clone(),
                account,
            });
        }
        f(&self.child(account))
    }

    /// Approves or revokes `operator` to act as the current caller.
    pub fn set_operator(&self, operator: &AccountId, approved: bool) {
        self.coordinator
            .set_operator(&self.caller, operator, approved);
    }

    /// Enables `vault` as a controller of the current caller.
    pub fn enable_controller(&self, vault: &AccountId) {
        self.coordinator.set_controller(&self.caller, vault, true);
    }

    /// Disables `vault` as a controller of the current caller. A no-op if it
    /// was never enabled.
    pub fn disable_controller(&self, vault: &AccountId) {
        self.coordinator.set_controller(&self.caller, vault, false);
    }

    fn child(&self, caller: AccountId) -> CallContext<'c> {
        CallContext {
            coordinator: self.coordinator,
            caller,
            pending: self.pending,
            tx_id: self.tx_id,
            depth: self.depth + 1,
        }
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("caller", &self.caller)
            .field("tx_id", &self.tx_id)
            .field("depth", &self.depth)
            .finish()
    }
}
