//! # Certificate Registry Contract
//!
//! Issues certificates as classes of a multi-class fungible asset. Each
//! certificate gets the next numeric class id and carries a free-text
//! reference (an ISIN, a deed number, a contract hash) that the registry
//! stores but never interprets.
//!
//! Balances, approvals, transfers, and receiver hooks are delegated to an
//! inner [`MultiClassLedger`], so a registry can be handed to a vault as its
//! underlying [`Asset`] directly.
//!
//! ## Rollback
//!
//! The registry is a [`Transactional`] participant. Certificates created
//! inside a transaction that later fails disappear together with their
//! balances, and their ids are handed out again.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use nova_vault::asset::AssetBook;
use nova_vault::{
    AccountId, Asset, CallContext, ClassId, MultiClassLedger, TokenReceiver, Transactional,
    VaultError,
};

/// Longest reference the registry accepts, in bytes.
pub const MAX_REFERENCE_LEN: usize = 256;

/// Id given to the first certificate.
pub const FIRST_CLASS_ID: ClassId = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during certificate registry operations.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The reference was empty or only whitespace.
    #[error("certificate reference must not be empty")]
    EmptyReference,

    /// The reference exceeds [`MAX_REFERENCE_LEN`].
    #[error("certificate reference is {len} bytes, limit is {max}")]
    ReferenceTooLong {
        /// Length of the rejected reference.
        len: usize,
        /// The limit.
        max: usize,
    },

    /// Every class id has been used.
    #[error("class id space exhausted")]
    IdsExhausted,

    /// The underlying ledger rejected the issuance.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata recorded when a certificate is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Class id of the certificate in the underlying ledger.
    pub class: ClassId,
    /// Free-text reference supplied at creation.
    pub reference: String,
    /// Account that created the certificate.
    pub issuer: AccountId,
    /// Units issued at creation.
    pub issued: u64,
    /// Timestamp when the certificate was created.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Catalog {
    next_id: ClassId,
    certificates: BTreeMap<ClassId, CertificateInfo>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            next_id: FIRST_CLASS_ID,
            certificates: BTreeMap::new(),
        }
    }
}

/// Certificate-minting registry over a multi-class ledger.
pub struct CertificateRegistry {
    ledger: MultiClassLedger,
    catalog: Mutex<Catalog>,
    checkpoint: Mutex<Option<Catalog>>,
}

impl CertificateRegistry {
    /// Creates an empty registry whose asset is named `reference`.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            ledger: MultiClassLedger::new(reference),
            catalog: Mutex::new(Catalog::default()),
            checkpoint: Mutex::new(None),
        }
    }

    /// Creates a certificate and issues `amount` units of it to `holder`.
    /// Returns the new class id.
    ///
    /// Issuance is not a transfer, so no receiver hook runs.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::EmptyReference`] for a blank reference,
    /// [`CertificateError::ReferenceTooLong`] for an oversized one.
    pub fn create(
        &self,
        issuer: &AccountId,
        reference: &str,
        amount: u64,
        holder: &AccountId,
    ) -> Result<ClassId, CertificateError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CertificateError::EmptyReference);
        }
        if reference.len() > MAX_REFERENCE_LEN {
            return Err(CertificateError::ReferenceTooLong {
                len: reference.len(),
                max: MAX_REFERENCE_LEN,
            });
        }

        let mut catalog = self.catalog.lock();
        let class = catalog.next_id;
        let next_id = class.checked_add(1).ok_or(CertificateError::IdsExhausted)?;

        self.ledger.issue(holder, class, amount)?;
        catalog.certificates.insert(
            class,
            CertificateInfo {
                class,
                reference: reference.to_string(),
                issuer: issuer.clone(),
                issued: amount,
                created_at: Utc::now(),
            },
        );
        catalog.next_id = next_id;

        info!(
            registry = self.ledger.reference(),
            class,
            reference,
            issuer = %issuer,
            holder = %holder,
            amount,
            "certificate created"
        );
        Ok(class)
    }

    /// The reference stored for `class`, if it exists.
    pub fn reference_of(&self, class: ClassId) -> Option<String> {
        self.catalog
            .lock()
            .certificates
            .get(&class)
            .map(|info| info.reference.clone())
    }

    /// Everything recorded about `class`, if it exists.
    pub fn certificate(&self, class: ClassId) -> Option<CertificateInfo> {
        self.catalog.lock().certificates.get(&class).cloned()
    }

    /// Number of certificates created so far.
    pub fn certificate_count(&self) -> usize {
        self.catalog.lock().certificates.len()
    }

    /// See [`MultiClassLedger::set_approval_for_all`].
    pub fn set_approval_for_all(&self, ctx: &CallContext<'_>, operator: &AccountId, approved: bool) {
        self.ledger.set_approval_for_all(ctx, operator, approved);
    }

    /// See [`MultiClassLedger::register_receiver`].
    pub fn register_receiver<R>(&self, account: &AccountId, receiver: &Arc<R>)
    where
        R: TokenReceiver + 'static,
    {
        self.ledger.register_receiver(account, receiver);
    }

    /// A copy of the current balances and approvals.
    pub fn book(&self) -> AssetBook {
        self.ledger.book()
    }
}

impl Asset for CertificateRegistry {
    fn reference(&self) -> &str {
        self.ledger.reference()
    }

    fn balance_of(&self, account: &AccountId, class: ClassId) -> u64 {
        self.ledger.balance_of(account, class)
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
        self.ledger
            .safe_transfer_from(ctx, operator, from, to, class, amount)
    }

    fn safe_batch_transfer_from(
        &self,
        ctx: &CallContext<'_>,
        operator: &AccountId,
        from: &AccountId,
        to: &AccountId,
        items: &[(ClassId, u64)],
    ) -> Result<(), VaultError> {
        self.ledger
            .safe_batch_transfer_from(ctx, operator, from, to, items)
    }
}

impl Transactional for CertificateRegistry {
    fn begin(&self) {
        self.ledger.begin();
        let catalog = self.catalog.lock().clone();
        *self.checkpoint.lock() = Some(catalog);
    }

    fn commit(&self) {
        self.ledger.commit();
        self.checkpoint.lock().take();
    }

    fn rollback(&self) {
        self.ledger.rollback();
        let checkpoint = self.checkpoint.lock().take();
        if let Some(catalog) = checkpoint {
            *self.catalog.lock() = catalog;
        }
    }
}

impl std::fmt::Debug for CertificateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateRegistry")
            .field("reference", &self.ledger.reference())
            .field("certificates", &self.certificate_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
