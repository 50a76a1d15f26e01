//! # Custody Accounting Policies
//!
//! How a vault books the underlying asset it holds. Two policies exist and a
//! deployment picks exactly one:
//!
//! - [`AggregateCustody`] keeps one running total. Shares are fungible
//!   against every class the vault holds, so any holder may withdraw any
//!   class as long as the pool has it.
//! - [`PerClassCustody`] keeps per-class totals plus a per-(account, class)
//!   deposit ledger. A holder may only withdraw a class up to what they
//!   personally deposited of it, even when their share balance would allow
//!   more.
//!
//! Both expose the same operations with different economics, so they are
//! separate types behind one trait rather than a flag on a shared struct.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CustodyKind;
use crate::error::VaultError;
use crate::storage::StorageError;
use crate::types::{AccountId, ClassId};

/// Persisted form of a custody policy's books.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyRecord {
    /// Books of an [`AggregateCustody`].
    Aggregate(AggregateCustody),
    /// Books of a [`PerClassCustody`].
    PerClass(PerClassCustody),
}

impl CustodyRecord {
    /// Which policy these books belong to.
    pub fn kind(&self) -> CustodyKind {
        match self {
            CustodyRecord::Aggregate(_) => CustodyKind::Aggregate,
            CustodyRecord::PerClass(_) => CustodyKind::PerClass,
        }
    }

    /// Total assets recorded in these books.
    pub fn total_assets(&self) -> u64 {
        match self {
            CustodyRecord::Aggregate(books) => books.total_assets(),
            CustodyRecord::PerClass(books) => books.total_assets(),
        }
    }
}

/// Bookkeeping for the assets a vault holds in custody.
pub trait CustodyPolicy: Clone + Default + std::fmt::Debug + Send + Sync + 'static {
    /// The policy this type implements.
    const KIND: CustodyKind;

    /// Total assets held, across every class.
    fn total_assets(&self) -> u64;

    /// Assets held in one class, when the policy tracks classes.
    fn class_total(&self, class: ClassId) -> Option<u64>;

    /// How much of `class` the account may withdraw under this policy's own
    /// rules, ignoring share balances. `None` means the policy imposes no
    /// per-account limit.
    fn withdraw_limit(&self, account: &AccountId, class: ClassId) -> Option<u64>;

    /// Books `amount` of `class` arriving on behalf of `account`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Overflow`] if any total would exceed `u64::MAX`.
    fn record_inbound(
        &mut self,
        account: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError>;

    /// Books `amount` of `class` leaving on behalf of `account`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientAssets`] if the pool does not hold
    /// enough, and (per-class only) [`VaultError::InsufficientDeposits`] if
    /// the account did not deposit enough of `class`.
    fn record_outbound(
        &mut self,
        account: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError>;

    /// Exports the books for persistence.
    fn to_record(&self) -> CustodyRecord;

    /// Restores the books from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::PolicyMismatch`] if the record belongs to the
    /// other policy, or a storage error if the record is inconsistent.
    fn from_record(record: CustodyRecord) -> Result<Self, VaultError>;
}

// ---------------------------------------------------------------------------
// AggregateCustody
// ---------------------------------------------------------------------------

/// One running total of assets, regardless of class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCustody {
    /// Assets held, all classes combined.
    total_assets: u64,
}

impl CustodyPolicy for AggregateCustody {
    const KIND: CustodyKind = CustodyKind::Aggregate;

    fn total_assets(&self) -> u64 {
        self.total_assets
    }

    fn class_total(&self, _class: ClassId) -> Option<u64> {
        None
    }

    fn withdraw_limit(&self, _account: &AccountId, _class: ClassId) -> Option<u64> {
        None
    }

    fn record_inbound(
        &mut self,
        _account: &AccountId,
        _class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.total_assets = self
            .total_assets
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }

    fn record_outbound(
        &mut self,
        _account: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError> {
        // Whether the pool holds enough of this particular class is for the
        // asset transfer to decide.
        self.total_assets =
            self.total_assets
                .checked_sub(amount)
                .ok_or(VaultError::InsufficientAssets {
                    class,
                    available: self.total_assets,
                    requested: amount,
                })?;
        Ok(())
    }

    fn to_record(&self) -> CustodyRecord {
        CustodyRecord::Aggregate(self.clone())
    }

    fn from_record(record: CustodyRecord) -> Result<Self, VaultError> {
        match record {
            CustodyRecord::Aggregate(books) => Ok(books),
            other => Err(VaultError::PolicyMismatch {
                configured: other.kind(),
                implemented: Self::KIND,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PerClassCustody
// ---------------------------------------------------------------------------

/// Per-class pool totals plus what each account deposited of each class.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerClassCustody {
    /// Sum of `totals`, maintained with checked adds so it always fits.
    total_assets: u64,
    /// Assets held per class. Non-zero entries only.
    totals: BTreeMap<ClassId, u64>,
    /// `account -> (class -> amount deposited)`. Non-zero entries only.
    deposits: BTreeMap<AccountId, BTreeMap<ClassId, u64>>,
}

impl PerClassCustody {
    /// Amount `account` has on deposit in `class`.
    pub fn deposited(&self, account: &AccountId, class: ClassId) -> u64 {
        self.deposits
            .get(account)
            .and_then(|classes| classes.get(&class))
            .copied()
            .unwrap_or(0)
    }

    fn set_deposit(&mut self, account: &AccountId, class: ClassId, amount: u64) {
        if amount == 0 {
            if let Some(classes) = self.deposits.get_mut(account) {
                classes.remove(&class);
                if classes.is_empty() {
                    self.deposits.remove(account);
                }
            }
        } else {
            self.deposits
                .entry(account.clone())
                .or_default()
                .insert(class, amount);
        }
    }

    fn set_total(&mut self, class: ClassId, amount: u64) {
        if amount == 0 {
            self.totals.remove(&class);
        } else {
            self.totals.insert(class, amount);
        }
    }

    fn validate(&self) -> Result<(), StorageError> {
        let sum = self
            .totals
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v));
        if sum != Some(self.total_assets) {
            return Err(StorageError::InvariantViolation(format!(
                "per-class totals sum to {sum:?}, recorded total is {}",
                self.total_assets
            )));
        }

        let mut deposited: BTreeMap<ClassId, u64> = BTreeMap::new();
        for classes in self.deposits.values() {
            for (class, amount) in classes {
                let entry = deposited.entry(*class).or_insert(0);
                *entry = entry.checked_add(*amount).ok_or_else(|| {
                    StorageError::InvariantViolation(format!(
                        "deposits of class {class} overflow"
                    ))
                })?;
            }
        }
        if deposited != self.totals {
            return Err(StorageError::InvariantViolation(format!(
                "per-account deposits {deposited:?} do not match per-class totals {:?}",
                self.totals
            )));
        }
        Ok(())
    }
}

impl CustodyPolicy for PerClassCustody {
    const KIND: CustodyKind = CustodyKind::PerClass;

    fn total_assets(&self) -> u64 {
        self.total_assets
    }

    fn class_total(&self, class: ClassId) -> Option<u64> {
        Some(self.totals.get(&class).copied().unwrap_or(0))
    }

    fn withdraw_limit(&self, account: &AccountId, class: ClassId) -> Option<u64> {
        Some(self.deposited(account, class))
    }

    fn record_inbound(
        &mut self,
        account: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let total_assets = self
            .total_assets
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        // Each component is bounded by `total_assets`, so these cannot fail
        // once the line above succeeded.
        let class_total = self
            .class_total(class)
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        let deposited = self
            .deposited(account, class)
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;

        self.total_assets = total_assets;
        self.set_total(class, class_total);
        self.set_deposit(account, class, deposited);
        Ok(())
    }

    fn record_outbound(
        &mut self,
        account: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let available = self.class_total(class).unwrap_or(0);
        if available < amount {
            return Err(VaultError::InsufficientAssets {
                class,
                available,
                requested: amount,
            });
        }
        let deposited = self.deposited(account, class);
        if deposited < amount {
            return Err(VaultError::InsufficientDeposits {
                account: account.clone(),
                class,
                deposited,
                requested: amount,
            });
        }

        self.total_assets -= amount;
        self.set_total(class, available - amount);
        self.set_deposit(account, class, deposited - amount);
        Ok(())
    }

    fn to_record(&self) -> CustodyRecord {
        CustodyRecord::PerClass(self.clone())
    }

    fn from_record(record: CustodyRecord) -> Result<Self, VaultError> {
        match record {
            CustodyRecord::PerClass(books) => {
                books.validate()?;
                Ok(books)
            }
            other => Err(VaultError::PolicyMismatch {
                configured: other.kind(),
                implemented: Self::KIND,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(id: &str) -> AccountId {
        AccountId::new(id)
    }

    #[test]
    fn aggregate_lets_anyone_withdraw_any_class() {
        let mut books = AggregateCustody::default();
        books.record_inbound(&acct("alice"), 1, 100).unwrap();
        books.record_inbound(&acct("bob"), 2, 100).unwrap();
        books.record_outbound(&acct("alice"), 2, 150).unwrap();
        assert_eq!(books.total_assets(), 50);
        assert_eq!(books.withdraw_limit(&acct("alice"), 2), None);
    }

    #[test]
    fn aggregate_rejects_withdrawing_more_than_pool() {
        let mut books = AggregateCustody::default();
        books.record_inbound(&acct("alice"), 1, 10).unwrap();
        assert!(matches!(
            books.record_outbound(&acct("alice"), 1, 11),
            Err(VaultError::InsufficientAssets {
                available: 10,
                requested: 11,
                ..
            })
        ));
    }

    #[test]
    fn per_class_caps_withdrawal_at_own_deposits() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 1, 100).unwrap();
        books.record_inbound(&acct("bob"), 2, 100).unwrap();

        let err = books.record_outbound(&acct("alice"), 2, 50).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientDeposits {
                class: 2,
                deposited: 0,
                requested: 50,
                ..
            }
        ));

        books.record_outbound(&acct("alice"), 1, 60).unwrap();
        assert_eq!(books.deposited(&acct("alice"), 1), 40);
        assert_eq!(books.class_total(1), Some(40));
        assert_eq!(books.total_assets(), 140);
    }

    #[test]
    fn per_class_checks_pool_before_deposits() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 1, 10).unwrap();
        assert!(matches!(
            books.record_outbound(&acct("alice"), 1, 20),
            Err(VaultError::InsufficientAssets { .. })
        ));
    }

    #[test]
    fn per_class_drained_books_are_empty() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 7, 10).unwrap();
        books.record_outbound(&acct("alice"), 7, 10).unwrap();
        assert_eq!(books, PerClassCustody::default());
    }

    #[test]
    fn record_of_other_policy_is_rejected() {
        let record = AggregateCustody::default().to_record();
        assert!(matches!(
            PerClassCustody::from_record(record),
            Err(VaultError::PolicyMismatch {
                configured: CustodyKind::Aggregate,
                implemented: CustodyKind::PerClass,
            })
        ));
    }

    #[test]
    fn per_class_record_with_unbacked_class_total_is_rejected() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 1, 10).unwrap();
        books.record_inbound(&acct("bob"), 2, 10).unwrap();
        // Move 5 of class 1's total to class 2 without touching deposits:
        // the grand total still adds up.
        books.totals.insert(1, 5);
        books.totals.insert(2, 15);
        assert!(matches!(
            PerClassCustody::from_record(books.to_record()),
            Err(VaultError::Storage(StorageError::InvariantViolation(_)))
        ));
    }

    #[test]
    fn per_class_record_with_stray_deposit_is_rejected() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 1, 10).unwrap();
        books
            .deposits
            .entry(acct("mallory"))
            .or_default()
            .insert(1, 10);
        assert!(matches!(
            PerClassCustody::from_record(books.to_record()),
            Err(VaultError::Storage(StorageError::InvariantViolation(_)))
        ));
    }

    #[test]
    fn per_class_record_round_trips_after_real_operations() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 1, 10).unwrap();
        books.record_inbound(&acct("bob"), 1, 5).unwrap();
        books.record_inbound(&acct("bob"), 2, 7).unwrap();
        books.record_outbound(&acct("bob"), 1, 5).unwrap();
        assert_eq!(PerClassCustody::from_record(books.to_record()).unwrap(), books);
    }

    #[test]
    fn inconsistent_per_class_record_is_rejected() {
        let mut books = PerClassCustody::default();
        books.record_inbound(&acct("alice"), 1, 10).unwrap();
        books.total_assets = 11;
        assert!(matches!(
            PerClassCustody::from_record(books.to_record()),
            Err(VaultError::Storage(StorageError::InvariantViolation(_)))
        ));
    }
}
