//! # Underlying Asset Interface
//!
//! The vault never moves value itself. It asks the underlying multi-class
//! asset to transfer, and the asset asks the recipient to acknowledge every
//! inbound transfer through a [`TokenReceiver`] hook. A recipient that
//! answers with anything other than the fixed acceptance code aborts the
//! transfer.
//!
//! Both calls are external from the vault's point of view: they are where
//! control can come back into the vault before the current entry point has
//! finished, which is why every asset call carries the [`CallContext`].

mod ledger;

pub use ledger::{AssetBook, MultiClassLedger};

use crate::coordinator::CallContext;
use crate::error::VaultError;
use crate::types::{AccountId, ClassId};

/// A multi-class fungible asset.
pub trait Asset: Send + Sync {
    /// Stable reference naming this asset, stored in every vault built on it.
    fn reference(&self) -> &str;

    /// Balance of `account` in `class`.
    fn balance_of(&self, account: &AccountId, class: ClassId) -> u64;

    /// Moves `amount` of `class` from `from` to `to` on the authority of
    /// `operator`, then runs `to`'s receiver hook if it has one.
    fn safe_transfer_from(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<(), VaultError>;

    /// Moves several classes at once, then runs `to`'s batch hook.
    fn safe_batch_transfer_from(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        items: &[(ClassId, u64)],
    ) -> Result<(), VaultError>;
}

/// Acknowledges inbound transfers.
///
/// Implementations return [`crate::config::ON_RECEIVED_ACCEPTED`] and
/// [`crate::config::ON_BATCH_RECEIVED_ACCEPTED`] respectively to accept.
pub trait TokenReceiver: Send + Sync {
    /// Called after a single-class transfer to the receiver.
    fn on_received(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        class: ClassId,
        amount: u64,
    ) -> Result<[u8; 4], VaultError>;

    /// Called after a batch transfer to the receiver.
    fn on_batch_received(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        items: &[(ClassId, u64)],
    ) -> Result<[u8; 4], VaultError>;
}
