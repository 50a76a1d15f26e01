//! # Accounting: Conversion, Shares, Custody
//!
//! The three pieces of bookkeeping a vault composes:
//!
//! ```text
//! conversion.rs — share <-> asset math with directional rounding
//! ledger.rs     — share balances, total supply, allowances
//! custody.rs    — pooled asset totals under the aggregate or per-class policy
//! ```
//!
//! None of these types know about snapshots, locks, or coordinators. They
//! are plain data with checked arithmetic; the vault decides when and in
//! which order they are touched.

pub mod conversion;
pub mod custody;
pub mod ledger;

pub use conversion::{mul_div, ExchangeRate, Rounding};
pub use custody::{AggregateCustody, CustodyPolicy, CustodyRecord, PerClassCustody};
pub use ledger::ShareLedger;
