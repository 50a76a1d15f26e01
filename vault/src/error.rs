//! Error types for vault operations.
//!
//! Every fallible vault, coordinator, and asset operation returns a
//! [`VaultError`]. Errors are detected at the point of violation and abort
//! the whole transaction; nothing is retried and nothing is partially
//! applied.

use thiserror::Error;

use crate::config::CustodyKind;
use crate::storage::StorageError;
use crate::types::{AccountId, ClassId};

/// Errors that can occur while driving a vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The conversion rounded down to zero shares.
    #[error("operation would mint or burn zero shares")]
    ZeroShares,

    /// The conversion rounded down to zero assets.
    #[error("operation would move zero assets")]
    ZeroAssets,

    /// The account does not hold enough shares.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: AccountId,
        /// Its current share balance.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// The spender's allowance does not cover the transfer.
    #[error(
        "insufficient allowance: {spender} may spend {available} of {owner}'s shares, requested {requested}"
    )]
    InsufficientAllowance {
        /// Owner of the shares.
        owner: AccountId,
        /// Account attempting to spend them.
        spender: AccountId,
        /// Remaining allowance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Per-class custody only: the owner never deposited enough of this
    /// class to withdraw the requested amount.
    #[error(
        "insufficient deposits: {account} deposited {deposited} of class {class}, requested {requested}"
    )]
    InsufficientDeposits {
        /// The withdrawing account.
        account: AccountId,
        /// The asset class being withdrawn.
        class: ClassId,
        /// Amount the account has on deposit in that class.
        deposited: u64,
        /// Amount requested.
        requested: u64,
    },

    /// Not enough of the underlying asset is available.
    #[error("insufficient assets in class {class}: available {available}, requested {requested}")]
    InsufficientAssets {
        /// The asset class.
        class: ClassId,
        /// Amount available.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The caller is not allowed to act for the target account.
    #[error("unauthorized: {caller} cannot act for {account}")]
    Unauthorized {
        /// The effective caller.
        caller: AccountId,
        /// The account the caller tried to act for.
        account: AccountId,
    },

    /// A vault status check ran without a snapshot having been captured.
    #[error("vault status check ran without a snapshot")]
    SnapshotMissing,

    /// The snapshot bytes could not be decoded.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The supply-equivalent value grew past the supply cap.
    #[error("supply cap exceeded: cap {cap}, value grew from {initial} to {current}")]
    SupplyCapExceeded {
        /// Configured cap.
        cap: u64,
        /// Supply-equivalent value at the snapshot.
        initial: u64,
        /// Supply-equivalent value after the transaction.
        current: u64,
    },

    /// A mutating entry point was re-entered, or a view was called while a
    /// mutation was in flight.
    #[error("reentrancy detected")]
    ReentrancyDetected,

    /// Checked arithmetic overflowed. Unreachable for well-formed state.
    #[error("arithmetic overflow")]
    Overflow,

    /// A receiver hook answered with something other than the acceptance
    /// code.
    #[error("receiver {receiver} rejected the inbound transfer")]
    ReceiverRejected {
        /// The rejecting receiver.
        receiver: AccountId,
    },

    /// The coordinator has no vault registered under this identifier.
    #[error("unknown vault: {0}")]
    UnknownVault(AccountId),

    /// An entry point failed part-way and the caller handled the error
    /// instead of propagating it. The transaction can no longer commit.
    #[error("transaction aborted after a failed operation: {cause}")]
    Aborted {
        /// Rendering of the first error that aborted the transaction.
        cause: String,
    },

    /// The vault type does not implement the configured custody policy.
    #[error("custody policy mismatch: configured {configured}, vault implements {implemented}")]
    PolicyMismatch {
        /// Policy named by the configuration or persisted record.
        configured: CustodyKind,
        /// Policy implemented by the vault type.
        implemented: CustodyKind,
    },

    /// Persisted state could not be read, written, or validated.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
