// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Vault: Pooled Custody Ledger
//!
//! A vault accepts deposits of a multi-class fungible asset into a shared
//! pool and issues fungible shares that track each holder's proportional
//! claim on that pool. Shares convert back into the underlying asset on
//! withdrawal or redemption.
//!
//! Vaults never run on their own. Every state-mutating call is driven through
//! a [`Coordinator`], which can batch several operations into one logical
//! transaction and defers invariant checks until the outermost call unwinds.
//! If any deferred check fails, every mutation in the transaction is rolled
//! back.
//!
//! ## Architecture
//!
//! - **accounting** — Conversion math, the share ledger, custody policies.
//! - **vault** — Entry points, snapshots, reentrancy guard.
//! - **coordinator** — Call contexts, deferred checks, operators, controllers.
//! - **asset** — The underlying multi-class asset and its receiver hooks.
//! - **storage** — Persisted vault layout, JSON/bincode encoding, digests.
//! - **config** — Constants and the construction-time vault configuration.
//!
//! ## Design Philosophy
//!
//! 1. Rounding always favors the pool, never the caller.
//! 2. Pay in before minting; burn before paying out.
//! 3. Check once, at the end, and revert everything on failure.
//! 4. If it touches money, it has tests. Plural.

pub mod accounting;
pub mod asset;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod storage;
pub mod types;
pub mod vault;

pub use accounting::{AggregateCustody, CustodyPolicy, ExchangeRate, PerClassCustody, Rounding};
pub use asset::{Asset, MultiClassLedger, TokenReceiver};
pub use config::{CustodyKind, VaultConfig};
pub use coordinator::{CallContext, Coordinator, Transactional};
pub use error::VaultError;
pub use storage::{StorageError, VaultRecord};
pub use types::{AccountId, ClassId};
pub use vault::{AggregateVault, PerClassVault, StatusCheck, Vault};
