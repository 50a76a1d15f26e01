//! Mutating entry points.

use tracing::{debug, info};

use super::guard::ReentrancyGuard;
use super::{StatusCheck, Vault};
use crate::accounting::{CustodyPolicy, Rounding};
use crate::coordinator::CallContext;
use crate::error::VaultError;
use crate::types::{AccountId, ClassId};

impl<P: CustodyPolicy> Vault<P> {
    /// Deposits `assets` of `class` from the caller and mints shares to
    /// `receiver`. Returns the shares minted.
    ///
    /// Shares are rounded down.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ZeroShares`] if `assets` is worth less than one
    /// share, or any error from the asset transfer.
    pub fn deposit(
        &self,
        ctx: &CallContext<'_>,
        class: ClassId,
        assets: u64,
        receiver: &AccountId,
    ) -> Result<u64, VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.create_snapshot()?;

        let shares = self.rate().to_shares(assets, Rounding::Down)?;
        if shares == 0 {
            return Err(VaultError::ZeroShares);
        }

        let applied = self
            .pull(ctx, class, assets, receiver)
            .and_then(|()| self.state.lock().ledger.mint(receiver, shares));
        abort_on_error(ctx, applied)?;
        ctx.require_vault_status_check(&self.address);

        debug!(
            vault = %self.address,
            caller = %ctx.caller(),
            receiver = %receiver,
            class,
            assets,
            shares,
            "deposit"
        );
        Ok(shares)
    }

    /// Mints exactly `shares` to `receiver`, pulling whatever `class` assets
    /// they cost from the caller. Returns the assets paid.
    ///
    /// Assets are rounded up.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ZeroShares`] if `shares` is zero, or any error
    /// from the asset transfer.
    pub fn mint(
        &self,
        ctx: &CallContext<'_>,
        class: ClassId,
        shares: u64,
        receiver: &AccountId,
    ) -> Result<u64, VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.create_snapshot()?;

        if shares == 0 {
            return Err(VaultError::ZeroShares);
        }
        let assets = self.rate().to_assets(shares, Rounding::Up)?;

        let applied = self
            .pull(ctx, class, assets, receiver)
            .and_then(|()| self.state.lock().ledger.mint(receiver, shares));
        abort_on_error(ctx, applied)?;
        ctx.require_vault_status_check(&self.address);

        debug!(
            vault = %self.address,
            caller = %ctx.caller(),
            receiver = %receiver,
            class,
            assets,
            shares,
            "mint"
        );
        Ok(assets)
    }

    /// Burns `owner`'s shares and sends exactly `assets` of `class` to
    /// `receiver`. Returns the shares burned.
    ///
    /// Shares are rounded up.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] if the caller is not `owner`,
    /// [`VaultError::ZeroAssets`] if `assets` is zero,
    /// [`VaultError::InsufficientBalance`] if `owner` lacks the shares, and
    /// custody errors if the pool (or, per-class, the owner's deposits)
    /// cannot cover `assets`.
    pub fn withdraw(
        &self,
        ctx: &CallContext<'_>,
        class: ClassId,
        assets: u64,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> Result<u64, VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.create_snapshot()?;
        authorize_owner(ctx, owner)?;

        if assets == 0 {
            return Err(VaultError::ZeroAssets);
        }
        let shares = self.rate().to_shares(assets, Rounding::Up)?;

        let burned = self.state.lock().ledger.burn(owner, shares);
        let applied = burned.and_then(|()| self.release(ctx, class, assets, owner, receiver));
        abort_on_error(ctx, applied)?;
        ctx.require_account_status_check(&self.address, owner);
        ctx.require_vault_status_check(&self.address);

        debug!(
            vault = %self.address,
            owner = %owner,
            receiver = %receiver,
            class,
            assets,
            shares,
            "withdraw"
        );
        Ok(shares)
    }

    /// Burns exactly `shares` of `owner`'s and sends what they are worth in
    /// `class` to `receiver`. Returns the assets sent.
    ///
    /// Assets are rounded down.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] if the caller is not `owner`,
    /// [`VaultError::ZeroAssets`] if the shares are worth nothing, plus the
    /// same balance and custody errors as [`withdraw`](Self::withdraw).
    pub fn redeem(
        &self,
        ctx: &CallContext<'_>,
        class: ClassId,
        shares: u64,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> Result<u64, VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.create_snapshot()?;
        authorize_owner(ctx, owner)?;

        let assets = self.rate().to_assets(shares, Rounding::Down)?;
        if assets == 0 {
            return Err(VaultError::ZeroAssets);
        }

        let burned = self.state.lock().ledger.burn(owner, shares);
        let applied = burned.and_then(|()| self.release(ctx, class, assets, owner, receiver));
        abort_on_error(ctx, applied)?;
        ctx.require_account_status_check(&self.address, owner);
        ctx.require_vault_status_check(&self.address);

        debug!(
            vault = %self.address,
            owner = %owner,
            receiver = %receiver,
            class,
            assets,
            shares,
            "redeem"
        );
        Ok(assets)
    }

    /// Moves `amount` of the caller's shares to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientBalance`] if the caller lacks the
    /// shares.
    pub fn transfer(
        &self,
        ctx: &CallContext<'_>,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.create_snapshot()?;

        let from = ctx.caller();
        let applied = self.state.lock().ledger.transfer(from, to, amount);
        abort_on_error(ctx, applied)?;
        ctx.require_account_status_check(&self.address, from);

        debug!(vault = %self.address, from = %from, to = %to, amount, "transfer");
        Ok(())
    }

    /// Moves `amount` of `from`'s shares to `to`, spending the caller's
    /// allowance unless the caller is `from`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientAllowance`] or
    /// [`VaultError::InsufficientBalance`].
    pub fn transfer_from(
        &self,
        ctx: &CallContext<'_>,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.create_snapshot()?;

        let applied = {
            let mut state = self.state.lock();
            let spent = if ctx.caller() != from {
                state.ledger.spend_allowance(from, ctx.caller(), amount)
            } else {
                Ok(())
            };
            spent.and_then(|()| state.ledger.transfer(from, to, amount))
        };
        abort_on_error(ctx, applied)?;
        ctx.require_account_status_check(&self.address, from);

        debug!(
            vault = %self.address,
            spender = %ctx.caller(),
            from = %from,
            to = %to,
            amount,
            "transfer_from"
        );
        Ok(())
    }

    /// Sets `spender`'s allowance over the caller's shares.
    /// [`crate::config::UNLIMITED_ALLOWANCE`] never decreases.
    pub fn approve(
        &self,
        ctx: &CallContext<'_>,
        spender: &AccountId,
        amount: u64,
    ) -> Result<(), VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        self.touch();
        self.state
            .lock()
            .ledger
            .approve(ctx.caller(), spender, amount);
        debug!(vault = %self.address, owner = %ctx.caller(), spender = %spender, amount, "approve");
        Ok(())
    }

    /// Changes the supply cap. Owner only, effective immediately. `0` removes
    /// the cap.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Unauthorized`] if the caller is not the owner.
    pub fn set_supply_cap(&self, ctx: &CallContext<'_>, supply_cap: u64) -> Result<(), VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        if ctx.caller() != &self.owner {
            return Err(VaultError::Unauthorized {
                caller: ctx.caller().clone(),
                account: self.owner.clone(),
            });
        }
        self.touch();
        let previous = std::mem::replace(&mut self.state.lock().supply_cap, supply_cap);
        info!(vault = %self.address, previous, supply_cap, "supply cap changed");
        Ok(())
    }

    /// Releases this vault as a controller of the caller.
    ///
    /// The vault carries no debt, so there is never an obligation to settle
    /// first; the call only clears the coordinator's record.
    pub fn disable_controller(&self, ctx: &CallContext<'_>) -> Result<(), VaultError> {
        let _guard = ReentrancyGuard::acquire(&self.locked)?;
        ctx.disable_controller(&self.address);
        debug!(vault = %self.address, account = %ctx.caller(), "controller disabled");
        Ok(())
    }

    /// Pulls `assets` of `class` from the caller into custody, booked on
    /// behalf of `beneficiary`.
    fn pull(
        &self,
        ctx: &CallContext<'_>,
        class: ClassId,
        assets: u64,
        beneficiary: &AccountId,
    ) -> Result<(), VaultError> {
        self.asset
            .safe_transfer_from(ctx, &self.address, ctx.caller(), &self.address, class, assets)?;
        self.state
            .lock()
            .custody
            .record_inbound(beneficiary, class, assets)
    }

    /// Books `assets` of `class` out of custody against `owner` and sends
    /// them to `receiver`.
    fn release(
        &self,
        ctx: &CallContext<'_>,
        class: ClassId,
        assets: u64,
        owner: &AccountId,
        receiver: &AccountId,
    ) -> Result<(), VaultError> {
        self.state
            .lock()
            .custody
            .record_outbound(owner, class, assets)?;
        self.asset
            .safe_transfer_from(ctx, &self.address, &self.address, receiver, class, assets)
    }
}

/// Passes `result` through, aborting the transaction on failure. Used once
/// an entry point has started moving assets or shares: a failure past that
/// point may leave partial state, which must never commit.
fn abort_on_error<T>(
    ctx: &CallContext<'_>,
    result: Result<T, VaultError>,
) -> Result<T, VaultError> {
    if let Err(err) = &result {
        ctx.abort(err);
    }
    result
}

fn authorize_owner(ctx: &CallContext<'_>, owner: &AccountId) -> Result<(), VaultError> {
    if ctx.caller() != owner {
        return Err(VaultError::Unauthorized {
            caller: ctx.caller().clone(),
            account: owner.clone(),
        });
    }
    Ok(())
}
