//! # Share Ledger
//!
//! Balances, total supply, and allowances for vault shares.
//!
//! The ledger maintains `total_supply == sum(balances)` on every path.
//! `mint` is the only operation that grows the supply and it does so with a
//! checked add first, so any single balance is bounded by `total_supply` and
//! crediting a receiver can never overflow. The credit paths still use
//! checked arithmetic and surface [`VaultError::Overflow`] rather than
//! assuming it.
//!
//! Zero balances and zero allowances are removed from the maps, so an account
//! with nothing is indistinguishable from one that never existed and the
//! serialized form stays canonical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::UNLIMITED_ALLOWANCE;
use crate::error::VaultError;
use crate::types::AccountId;

/// Share balances and allowances for one vault.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    /// Shares outstanding.
    total_supply: u64,
    /// Non-zero share balances.
    balances: BTreeMap<AccountId, u64>,
    /// `owner -> (spender -> amount)`. Non-zero entries only.
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, u64>>,
}

impl ShareLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of shares outstanding.
    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Returns the share balance of `account`, or 0.
    pub fn balance_of(&self, account: &AccountId) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Returns how many of `owner`'s shares `spender` may move.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Iterates over every non-zero balance.
    pub fn balances(&self) -> impl Iterator<Item = (&AccountId, u64)> {
        self.balances.iter().map(|(account, amount)| (account, *amount))
    }

    /// Sums every balance. Returns `None` on overflow, which would itself
    /// mean the ledger is corrupt.
    pub fn sum_of_balances(&self) -> Option<u64> {
        self.balances
            .values()
            .try_fold(0u64, |acc, amount| acc.checked_add(*amount))
    }

    /// Returns `true` if `total_supply` equals the sum of balances.
    pub fn is_consistent(&self) -> bool {
        self.sum_of_balances() == Some(self.total_supply)
    }

    /// Creates `amount` new shares for `to`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Overflow`] if total supply would exceed `u64::MAX`.
    pub fn mint(&mut self, to: &AccountId, amount: u64) -> Result<(), VaultError> {
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        self.credit(to, amount)?;
        self.total_supply = new_supply;
        Ok(())
    }

    /// Destroys `amount` of `from`'s shares.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientBalance`] if `from` holds fewer
    /// than `amount` shares.
    pub fn burn(&mut self, from: &AccountId, amount: u64) -> Result<(), VaultError> {
        self.debit(from, amount)?;
        // The debit succeeded, so `amount <= balance <= total_supply`.
        self.total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }

    /// Moves `amount` shares from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientBalance`] if `from` holds fewer
    /// than `amount` shares.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), VaultError> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Sets `spender`'s allowance over `owner`'s shares. Zero removes it.
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, amount: u64) {
        if amount == 0 {
            if let Some(spenders) = self.allowances.get_mut(owner) {
                spenders.remove(spender);
                if spenders.is_empty() {
                    self.allowances.remove(owner);
                }
            }
            return;
        }
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
    }

    /// Consumes `amount` of `spender`'s allowance over `owner`'s shares.
    ///
    /// Unlimited allowances are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientAllowance`] if the allowance does
    /// not cover `amount`.
    pub fn spend_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let available = self.allowance(owner, spender);
        if available == UNLIMITED_ALLOWANCE {
            return Ok(());
        }
        if available < amount {
            return Err(VaultError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                available,
                requested: amount,
            });
        }
        self.approve(owner, spender, available - amount);
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, amount: u64) -> Result<(), VaultError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                account: account.clone(),
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), remaining);
        }
        Ok(())
    }

    fn credit(&mut self, account: &AccountId, amount: u64) -> Result<(), VaultError> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(VaultError::Overflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(id: &str) -> AccountId {
        AccountId::new(id)
    }

    #[test]
    fn mint_increases_supply_and_balance() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&acct("alice"), 1_000).unwrap();
        assert_eq!(ledger.total_supply(), 1_000);
        assert_eq!(ledger.balance_of(&acct("alice")), 1_000);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn burn_more_than_balance_rejected() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&acct("alice"), 100).unwrap();
        let err = ledger.burn(&acct("alice"), 200).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            }
        ));
        assert_eq!(ledger.total_supply(), 100);
    }

    #[test]
    fn burning_everything_removes_the_record() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&acct("alice"), 100).unwrap();
        ledger.burn(&acct("alice"), 100).unwrap();
        assert_eq!(ledger, ShareLedger::new());
    }

    #[test]
    fn mint_overflow_leaves_ledger_untouched() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&acct("alice"), u64::MAX).unwrap();
        assert!(matches!(
            ledger.mint(&acct("bob"), 1),
            Err(VaultError::Overflow)
        ));
        assert_eq!(ledger.balance_of(&acct("bob")), 0);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn transfer_moves_shares_and_conserves_supply() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&acct("alice"), 500).unwrap();
        ledger.transfer(&acct("alice"), &acct("bob"), 200).unwrap();
        assert_eq!(ledger.balance_of(&acct("alice")), 300);
        assert_eq!(ledger.balance_of(&acct("bob")), 200);
        assert_eq!(ledger.total_supply(), 500);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let mut ledger = ShareLedger::new();
        ledger.mint(&acct("alice"), 500).unwrap();
        ledger.transfer(&acct("alice"), &acct("alice"), 500).unwrap();
        assert_eq!(ledger.balance_of(&acct("alice")), 500);
    }

    #[test]
    fn spend_allowance_decrements() {
        let mut ledger = ShareLedger::new();
        ledger.approve(&acct("alice"), &acct("bob"), 100);
        ledger.spend_allowance(&acct("alice"), &acct("bob"), 40).unwrap();
        assert_eq!(ledger.allowance(&acct("alice"), &acct("bob")), 60);

        let err = ledger
            .spend_allowance(&acct("alice"), &acct("bob"), 61)
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientAllowance { available: 60, .. }));
    }

    #[test]
    fn unlimited_allowance_is_never_decremented() {
        let mut ledger = ShareLedger::new();
        ledger.approve(&acct("alice"), &acct("bob"), UNLIMITED_ALLOWANCE);
        ledger
            .spend_allowance(&acct("alice"), &acct("bob"), 1_000_000)
            .unwrap();
        assert_eq!(
            ledger.allowance(&acct("alice"), &acct("bob")),
            UNLIMITED_ALLOWANCE
        );
    }

    #[test]
    fn zero_approval_clears_the_entry() {
        let mut ledger = ShareLedger::new();
        ledger.approve(&acct("alice"), &acct("bob"), 5);
        ledger.approve(&acct("alice"), &acct("bob"), 0);
        assert_eq!(ledger, ShareLedger::new());
    }
}
