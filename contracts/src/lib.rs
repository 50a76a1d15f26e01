//! # NOVA Vault Contracts
//!
//! The external collaborators a NOVA vault is deployed next to:
//!
//! - **Certificate Registry** — issues each certificate as a new class of a
//!   multi-class asset and records its free-text reference. Vaults take the
//!   registry as their underlying asset.
//! - **Price Oracle** — a fixed 1:1 quote adapter for assets denominated in
//!   their unit of account.
//!
//! Both are deliberately small. The vault only relies on their interfaces
//! ([`nova_vault::Asset`] and [`price_oracle::PriceOracle`]).

pub mod certificate_registry;
pub mod price_oracle;

pub use certificate_registry::{CertificateError, CertificateInfo, CertificateRegistry};
pub use price_oracle::{FixedRateOracle, OracleError, PriceOracle};
