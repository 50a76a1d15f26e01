//! # Price Oracle
//!
//! Quotes an amount of one asset in units of another. The only
//! implementation is [`FixedRateOracle`], a stateless 1:1 pass-through for
//! assets that are denominated in their unit of account by construction
//! (certificates issued against a face value, for example).

use std::collections::BTreeSet;

use thiserror::Error;

/// Errors that can occur while quoting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle does not price this pair.
    #[error("unsupported pair: {base}/{quote}")]
    UnsupportedPair {
        /// Asset being priced.
        base: String,
        /// Unit of the answer.
        quote: String,
    },
}

/// Quotes amounts of `base` in units of `quote`.
pub trait PriceOracle: Send + Sync {
    /// Value of `amount` of `base`, in `quote`.
    fn quote(&self, amount: u64, base: &str, quote: &str) -> Result<u64, OracleError>;

    /// Bid and ask value of `amount` of `base`, in `quote`.
    fn bid_ask(&self, amount: u64, base: &str, quote: &str) -> Result<(u64, u64), OracleError>;
}

/// Prices every supported pair at exactly 1:1 with no spread.
///
/// An asset is always supported against itself. Other pairs must be listed
/// with [`with_pair`](Self::with_pair) and are supported in both directions.
#[derive(Debug, Clone, Default)]
pub struct FixedRateOracle {
    pairs: BTreeSet<(String, String)>,
}

impl FixedRateOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `base`/`quote` (and its inverse) to the supported pairs.
    pub fn with_pair(mut self, base: impl Into<String>, quote: impl Into<String>) -> Self {
        let (base, quote) = (base.into(), quote.into());
        self.pairs.insert((quote.clone(), base.clone()));
        self.pairs.insert((base, quote));
        self
    }

    pub fn supports(&self, base: &str, quote: &str) -> bool {
        base == quote
            || self
                .pairs
                .contains(&(base.to_string(), quote.to_string()))
    }

    fn ensure_supported(&self, base: &str, quote: &str) -> Result<(), OracleError> {
        if self.supports(base, quote) {
            Ok(())
        } else {
            Err(OracleError::UnsupportedPair {
                base: base.to_string(),
                quote: quote.to_string(),
            })
        }
    }
}

impl PriceOracle for FixedRateOracle {
    fn quote(&self, amount: u64, base: &str, quote: &str) -> Result<u64, OracleError> {
        self.ensure_supported(base, quote)?;
        Ok(amount)
    }

    fn bid_ask(&self, amount: u64, base: &str, quote: &str) -> Result<(u64, u64), OracleError> {
        self.ensure_supported(base, quote)?;
        Ok((amount, amount))
    }
}
