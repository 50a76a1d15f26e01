//! In-memory multi-class asset.
//!
//! Balances per (account, class), operator approvals, and a registry of
//! receiver hooks. Receivers are held weakly: a vault owns its asset, so a
//! strong reference back would leak both.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Asset, TokenReceiver};
use crate::config::{ON_BATCH_RECEIVED_ACCEPTED, ON_RECEIVED_ACCEPTED};
use crate::coordinator::{CallContext, Transactional};
use crate::error::VaultError;
use crate::types::{AccountId, ClassId};

/// Balances and approvals of a [`MultiClassLedger`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBook {
    /// `account -> (class -> amount)`. Non-zero entries only.
    balances: BTreeMap<AccountId, BTreeMap<ClassId, u64>>,
    /// `owner -> operators approved for all classes`.
    approvals: BTreeMap<AccountId, BTreeSet<AccountId>>,
}

impl AssetBook {
    fn balance_of(&self, account: &AccountId, class: ClassId) -> u64 {
        self.balances
            .get(account)
            .and_then(|classes| classes.get(&class))
            .copied()
            .unwrap_or(0)
    }

    fn set_balance(&mut self, account: &AccountId, class: ClassId, amount: u64) {
        if amount == 0 {
            if let Some(classes) = self.balances.get_mut(account) {
                classes.remove(&class);
                if classes.is_empty() {
                    self.balances.remove(account);
                }
            }
        } else {
            self.balances
                .entry(account.clone())
                .or_default()
                .insert(class, amount);
        }
    }

    fn is_approved(&self, owner: &AccountId, operator: &AccountId) -> bool {
        owner == operator
            || self
                .approvals
                .get(owner)
                .is_some_and(|ops| ops.contains(operator))
    }

    fn credit(&mut self, to: &AccountId, class: ClassId, amount: u64) -> Result<(), VaultError> {
        let balance = self
            .balance_of(to, class)
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        self.set_balance(to, class, balance);
        Ok(())
    }

    fn move_class(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let available = self.balance_of(from, class);
        if available < amount {
            return Err(VaultError::InsufficientAssets {
                class,
                available,
                requested: amount,
            });
        }
        self.set_balance(from, class, available - amount);
        self.credit(to, class, amount)
    }
}

/// A multi-class fungible asset kept in memory.
pub struct MultiClassLedger {
    reference: String,
    book: Mutex<AssetBook>,
    checkpoint: Mutex<Option<AssetBook>>,
    receivers: RwLock<BTreeMap<AccountId, Weak<dyn TokenReceiver>>>,
}

impl MultiClassLedger {
    /// Creates an empty asset named `reference`.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            book: Mutex::new(AssetBook::default()),
            checkpoint: Mutex::new(None),
            receivers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Issues `amount` of `class` to `to`. No hook runs: issuance is not a
    /// transfer.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Overflow`] if the balance would exceed `u64::MAX`.
    pub fn issue(&self, to: &AccountId, class: ClassId, amount: u64) -> Result<(), VaultError> {
        self.book.lock().credit(to, class, amount)?;
        debug!(asset = %self.reference, to = %to, class, amount, "issued");
        Ok(())
    }

    /// Lets `operator` move any of the caller's classes.
    pub fn set_approval_for_all(&self, ctx: &CallContext<'_>, operator: &AccountId, approved: bool) {
        let mut book = self.book.lock();
        let owner = ctx.caller();
        if approved {
            book.approvals
                .entry(owner.clone())
                .or_default()
                .insert(operator.clone());
        } else if let Some(ops) = book.approvals.get_mut(owner) {
            ops.remove(operator);
            if ops.is_empty() {
                book.approvals.remove(owner);
            }
        }
    }

    /// Returns `true` if `operator` may move `owner`'s balances.
    pub fn is_approved_for_all(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.book.lock().is_approved(owner, operator)
    }

    /// Registers `receiver` as the hook for transfers into `account`.
    pub fn register_receiver<R>(&self, account: &AccountId, receiver: &Arc<R>)
    where
        R: TokenReceiver + 'static,
    {
        let receiver: Arc<dyn TokenReceiver> = receiver.clone();
        self.receivers
            .write()
            .insert(account.clone(), Arc::downgrade(&receiver));
    }

    /// A copy of the current balances and approvals.
    pub fn book(&self) -> AssetBook {
        self.book.lock().clone()
    }

    fn authorize(&self, operator: &AccountId, from: &AccountId) -> Result<(), VaultError> {
        if self.book.lock().is_approved(from, operator) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized {
                caller: operator.clone(),
                account: from.clone(),
            })
        }
    }

    /// Applies `f` to the book as one step. On error the book is left as it
    /// was; on success the pre-move book is returned so the transfer can
    /// still be reverted if the receiver refuses it.
    fn apply<F>(&self, f: F) -> Result<AssetBook, VaultError>
    where
        F: FnOnce(&mut AssetBook) -> Result<(), VaultError>,
    {
        let mut book = self.book.lock();
        let before = book.clone();
        if let Err(err) = f(&mut book) {
            *book = before;
            return Err(err);
        }
        Ok(before)
    }

    /// Runs `to`'s hook, if any, and expects `accepted` back. Anything else
    /// reverts the book to `before`, including what the hook itself did.
    fn notify<F>(
        &self,
        to: &AccountId,
        before: AssetBook,
        accepted: [u8; 4],
        hook: F,
    ) -> Result<(), VaultError>
    where
        F: FnOnce(&dyn TokenReceiver) -> Result<[u8; 4], VaultError>,
    {
        // The book lock is released: the hook may call back into anything.
        let outcome = match self.receiver(to) {
            Ok(None) => Ok(()),
            Ok(Some(receiver)) => hook(&*receiver).and_then(|code| {
                if code == accepted {
                    Ok(())
                } else {
                    Err(VaultError::ReceiverRejected {
                        receiver: to.clone(),
                    })
                }
            }),
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            *self.book.lock() = before;
            debug!(asset = %self.reference, to = %to, error = %err, "inbound transfer reverted");
        }
        outcome
    }

    /// Looks up `to`'s hook. `Ok(None)` for plain accounts.
    fn receiver(&self, to: &AccountId) -> Result<Option<Arc<dyn TokenReceiver>>, VaultError> {
        match self.receivers.read().get(to) {
            None => Ok(None),
            Some(weak) => weak
                .upgrade()
                .map(Some)
                .ok_or_else(|| VaultError::ReceiverRejected {
                    receiver: to.clone(),
                }),
        }
    }
}

impl Asset for MultiClassLedger {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn balance_of(&self, account: &AccountId, class: ClassId) -> u64 {
        self.book.lock().balance_of(account, class)
    }

    fn safe_transfer_from(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.authorize(operator, from)?;
        let before = self.apply(|book| book.move_class(from, to, class, amount))?;
        debug!(asset = %self.reference, from = %from, to = %to, class, amount, "transfer");

        self.notify(to, before, ON_RECEIVED_ACCEPTED, |receiver| {
            receiver.on_received(ctx, operator, from, class, amount)
        })
    }

    fn safe_batch_transfer_from(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        items: &[(ClassId, u64)],
    ) -> Result<(), VaultError> {
        self.authorize(operator, from)?;
        let before = self.apply(|book| {
            items
                .iter()
                .try_for_each(|(class, amount)| book.move_class(from, to, *class, *amount))
        })?;
        debug!(asset = %self.reference, from = %from, to = %to, items = items.len(), "batch transfer");

        self.notify(to, before, ON_BATCH_RECEIVED_ACCEPTED, |receiver| {
            receiver.on_batch_received(ctx, operator, from, items)
        })
    }
}

impl Transactional for MultiClassLedger {
    fn begin(&self) {
        let book = self.book.lock().clone();
        *self.checkpoint.lock() = Some(book);
    }

    fn commit(&self) {
        self.checkpoint.lock().take();
    }

    fn rollback(&self) {
        let checkpoint = self.checkpoint.lock().take();
        if let Some(book) = checkpoint {
            *self.book.lock() = book;
        }
    }
}

impl std::fmt::Debug for MultiClassLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiClassLedger")
            .field("reference", &self.reference)
            .field("book", &*self.book.lock())
            .finish()
    }
}
