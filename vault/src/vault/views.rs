//! Read-only entry points.
//!
//! Each view fails with [`VaultError::ReentrancyDetected`] while a mutation
//! of the same vault is in flight. Conversions and previews use the same
//! rounding as the entry point they mirror.

use super::guard::ensure_unlocked;
use super::Vault;
use crate::accounting::{CustodyPolicy, ExchangeRate, Rounding};
use crate::config::UNBOUNDED_SUPPLY_CAP;
use crate::error::VaultError;
use crate::types::{AccountId, ClassId};

impl<P: CustodyPolicy> Vault<P> {
    /// Assets held in custody, across every class.
    pub fn total_assets(&self) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().custody.total_assets())
    }

    /// Shares outstanding.
    pub fn total_supply(&self) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().ledger.total_supply())
    }

    /// The current supply cap. `0` means unbounded.
    pub fn supply_cap(&self) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().supply_cap)
    }

    /// Shares `assets` is worth, rounded down.
    pub fn convert_to_shares(&self, assets: u64) -> Result<u64, VaultError> {
        self.checked_rate()?.to_shares(assets, Rounding::Down)
    }

    /// Assets `shares` are worth, rounded down.
    pub fn convert_to_assets(&self, shares: u64) -> Result<u64, VaultError> {
        self.checked_rate()?.to_assets(shares, Rounding::Down)
    }

    /// Shares [`deposit`](Self::deposit) would mint for `assets`.
    pub fn preview_deposit(&self, assets: u64) -> Result<u64, VaultError> {
        self.checked_rate()?.to_shares(assets, Rounding::Down)
    }

    /// Assets [`mint`](Self::mint) would charge for `shares`.
    pub fn preview_mint(&self, shares: u64) -> Result<u64, VaultError> {
        self.checked_rate()?.to_assets(shares, Rounding::Up)
    }

    /// Shares [`withdraw`](Self::withdraw) would burn for `assets`.
    pub fn preview_withdraw(&self, assets: u64) -> Result<u64, VaultError> {
        self.checked_rate()?.to_shares(assets, Rounding::Up)
    }

    /// Assets [`redeem`](Self::redeem) would pay for `shares`.
    pub fn preview_redeem(&self, shares: u64) -> Result<u64, VaultError> {
        self.checked_rate()?.to_assets(shares, Rounding::Down)
    }

    /// Shares held by `account`.
    pub fn balance_of(&self, account: &AccountId) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().ledger.balance_of(account))
    }

    /// Shares `spender` may still move on `owner`'s behalf.
    /// [`crate::config::UNLIMITED_ALLOWANCE`] means no limit.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().ledger.allowance(owner, spender))
    }

    /// Assets held in `class`, or `None` under a policy that does not track
    /// classes.
    pub fn class_total(&self, class: ClassId) -> Result<Option<u64>, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().custody.class_total(class))
    }

    /// What `account` deposited of `class` and has not withdrawn, or `None`
    /// under a policy that does not track depositors.
    pub fn deposited(&self, account: &AccountId, class: ClassId) -> Result<Option<u64>, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.state.lock().custody.withdraw_limit(account, class))
    }

    /// Most shares that can still be minted before the cap binds.
    pub fn max_mint(&self) -> Result<u64, VaultError> {
        let (rate, supply_cap) = self.checked_rate_and_cap()?;
        if supply_cap == UNBOUNDED_SUPPLY_CAP {
            return Ok(u64::MAX - rate.total_supply);
        }
        Ok(supply_cap.saturating_sub(rate.supply_equivalent()?))
    }

    /// Most assets that can still be deposited before the cap binds.
    pub fn max_deposit(&self) -> Result<u64, VaultError> {
        let (rate, supply_cap) = self.checked_rate_and_cap()?;
        let headroom = u64::MAX - rate.total_assets;
        if supply_cap == UNBOUNDED_SUPPLY_CAP {
            return Ok(headroom);
        }
        let shares = supply_cap.saturating_sub(rate.supply_equivalent()?);
        Ok(rate.to_assets(shares, Rounding::Down)?.min(headroom))
    }

    /// Most assets of `class` that `owner` can withdraw.
    pub fn max_withdraw(&self, owner: &AccountId, class: ClassId) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        let state = self.state.lock();
        let rate = ExchangeRate::new(state.ledger.total_supply(), state.custody.total_assets());
        let by_shares = rate.to_assets(state.ledger.balance_of(owner), Rounding::Down)?;
        Ok(custody_bound(&state.custody, owner, class, by_shares))
    }

    /// Most shares `owner` can redeem against `class`.
    pub fn max_redeem(&self, owner: &AccountId, class: ClassId) -> Result<u64, VaultError> {
        ensure_unlocked(&self.locked)?;
        let state = self.state.lock();
        let balance = state.ledger.balance_of(owner);
        let rate = ExchangeRate::new(state.ledger.total_supply(), state.custody.total_assets());
        let by_shares = rate.to_assets(balance, Rounding::Down)?;
        let assets = custody_bound(&state.custody, owner, class, by_shares);
        if assets == by_shares {
            return Ok(balance);
        }
        Ok(rate.to_shares(assets, Rounding::Down)?.min(balance))
    }

    fn checked_rate(&self) -> Result<ExchangeRate, VaultError> {
        ensure_unlocked(&self.locked)?;
        Ok(self.rate())
    }

    fn checked_rate_and_cap(&self) -> Result<(ExchangeRate, u64), VaultError> {
        ensure_unlocked(&self.locked)?;
        let state = self.state.lock();
        Ok((
            ExchangeRate::new(state.ledger.total_supply(), state.custody.total_assets()),
            state.supply_cap,
        ))
    }
}

/// Caps `assets` by what the pool holds of `class` and by the policy's own
/// per-account limit.
fn custody_bound<P: CustodyPolicy>(custody: &P, owner: &AccountId, class: ClassId, assets: u64) -> u64 {
    let pooled = custody
        .class_total(class)
        .unwrap_or_else(|| custody.total_assets());
    let limit = custody.withdraw_limit(owner, class).unwrap_or(u64::MAX);
    assets.min(pooled).min(limit)
}
