//! # Share/Asset Conversion
//!
//! ```text
//! to_shares(a) = a * (S + 1) / (A + 1)
//! to_assets(s) = s * (A + 1) / (S + 1)
//! ```
//!
//! where `S` is total supply and `A` is total assets. The `+1` virtual offset
//! pins the rate at 1:1 for an empty vault and blunts first-depositor
//! donation attacks.
//!
//! Multiplication happens in `u128` before the single division, so there is
//! no intermediate overflow and no precision lost before rounding. The
//! product of a `u64` and `u64::MAX + 1` still fits in 128 bits.
//!
//! Rounding direction is fixed per operation and always favors the pool:
//!
//! | Operation | Converts  | Rounds |
//! |-----------|-----------|--------|
//! | deposit   | -> shares | down   |
//! | mint      | -> assets | up     |
//! | withdraw  | -> shares | up     |
//! | redeem    | -> assets | down   |

use crate::config::VIRTUAL_OFFSET;
use crate::error::VaultError;

/// Rounding direction for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    /// Away from zero whenever the division leaves a remainder.
    Up,
}

/// Computes `x * numerator / denominator` at full precision.
///
/// # Errors
///
/// Returns [`VaultError::Overflow`] if the product exceeds 128 bits, if the
/// denominator is zero, or if the quotient does not fit in a `u64`.
pub fn mul_div(
    x: u64,
    numerator: u128,
    denominator: u128,
    rounding: Rounding,
) -> Result<u64, VaultError> {
    if denominator == 0 {
        return Err(VaultError::Overflow);
    }
    let product = u128::from(x)
        .checked_mul(numerator)
        .ok_or(VaultError::Overflow)?;
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && product % denominator != 0 {
        quotient += 1;
    }
    u64::try_from(quotient).map_err(|_| VaultError::Overflow)
}

/// The vault's exchange rate at a point in time.
///
/// A copy of the two totals, taken while holding the state lock, so the
/// conversion itself runs without any lock held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRate {
    /// Shares outstanding.
    pub total_supply: u64,
    /// Assets held by the pool.
    pub total_assets: u64,
}

impl ExchangeRate {
    /// Builds a rate from the two totals.
    pub fn new(total_supply: u64, total_assets: u64) -> Self {
        Self {
            total_supply,
            total_assets,
        }
    }

    /// Converts an asset amount into shares.
    pub fn to_shares(&self, assets: u64, rounding: Rounding) -> Result<u64, VaultError> {
        mul_div(
            assets,
            u128::from(self.total_supply) + VIRTUAL_OFFSET,
            u128::from(self.total_assets) + VIRTUAL_OFFSET,
            rounding,
        )
    }

    /// Converts a share amount into assets.
    pub fn to_assets(&self, shares: u64, rounding: Rounding) -> Result<u64, VaultError> {
        mul_div(
            shares,
            u128::from(self.total_assets) + VIRTUAL_OFFSET,
            u128::from(self.total_supply) + VIRTUAL_OFFSET,
            rounding,
        )
    }

    /// The supply-equivalent value of the pool: total assets expressed in
    /// shares, rounded down. This is what the supply cap is measured against.
    pub fn supply_equivalent(&self) -> Result<u64, VaultError> {
        self.to_shares(self.total_assets, Rounding::Down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vault_converts_one_to_one() {
        let rate = ExchangeRate::new(0, 0);
        assert_eq!(rate.to_shares(1000, Rounding::Down).unwrap(), 1000);
        assert_eq!(rate.to_assets(1000, Rounding::Down).unwrap(), 1000);
    }

    #[test]
    fn proportional_after_first_deposit() {
        let rate = ExchangeRate::new(1000, 1000);
        assert_eq!(rate.to_shares(500, Rounding::Down).unwrap(), 500);
        assert_eq!(rate.to_shares(500, Rounding::Up).unwrap(), 500);
    }

    #[test]
    fn small_deposit_rounds_to_zero() {
        // floor(1 * 4 / 11) = 0
        let rate = ExchangeRate::new(3, 10);
        assert_eq!(rate.to_shares(1, Rounding::Down).unwrap(), 0);
        assert_eq!(rate.to_shares(1, Rounding::Up).unwrap(), 1);
    }

    #[test]
    fn rounding_direction_only_matters_with_remainder() {
        let rate = ExchangeRate::new(3, 10);
        // 11 * 4 / 11 = 4 exactly.
        assert_eq!(rate.to_shares(11, Rounding::Down).unwrap(), 4);
        assert_eq!(rate.to_shares(11, Rounding::Up).unwrap(), 4);
        // 5 * 11 / 4 = 13.75
        assert_eq!(rate.to_assets(5, Rounding::Down).unwrap(), 13);
        assert_eq!(rate.to_assets(5, Rounding::Up).unwrap(), 14);
    }

    #[test]
    fn extreme_totals_do_not_overflow_intermediate() {
        let rate = ExchangeRate::new(u64::MAX, u64::MAX);
        assert_eq!(rate.to_shares(u64::MAX, Rounding::Down).unwrap(), u64::MAX);
        assert_eq!(rate.to_assets(u64::MAX, Rounding::Up).unwrap(), u64::MAX);
    }

    #[test]
    fn quotient_beyond_u64_is_rejected() {
        // Tiny pool, huge supply: converting many assets yields > u64::MAX shares.
        let rate = ExchangeRate::new(u64::MAX, 0);
        assert!(matches!(
            rate.to_shares(2, Rounding::Down),
            Err(VaultError::Overflow)
        ));
    }

    #[test]
    fn zero_denominator_is_rejected() {
        assert!(matches!(
            mul_div(1, 1, 0, Rounding::Down),
            Err(VaultError::Overflow)
        ));
    }

    #[test]
    fn deposit_then_redeem_never_gains() {
        // Rates that leave remainders on both legs.
        for (supply, assets) in [(0, 0), (3, 10), (7, 5), (1000, 1333), (999_999, 1)] {
            let before = ExchangeRate::new(supply, assets);
            for deposit in [1u64, 2, 9, 100, 12_345] {
                let shares = before.to_shares(deposit, Rounding::Down).unwrap();
                let after = ExchangeRate::new(supply + shares, assets + deposit);
                let back = after.to_assets(shares, Rounding::Down).unwrap();
                assert!(
                    back <= deposit,
                    "gained {back} > {deposit} at S={supply} A={assets}"
                );
            }
        }
    }

    #[test]
    fn supply_equivalent_tracks_assets_at_par() {
        assert_eq!(ExchangeRate::new(900, 900).supply_equivalent().unwrap(), 900);
        assert_eq!(ExchangeRate::new(0, 0).supply_equivalent().unwrap(), 0);
    }
}
