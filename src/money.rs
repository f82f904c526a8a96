//! Money Conversion Module
//!
//! Unified conversion between on-chain integer units and the decimal figures
//! used by pricing, guards and the query surface.
//!
//! ## Internal Representation
//! - Native currency moves as `u64` lamports (10^9 per SOL)
//! - Token payouts are decided in whole tokens, then scaled by `10^decimals`
//!   right before they hit the wire
//! - Every figure shown to a client is a `Decimal` rendered as a string

use rust_decimal::prelude::*;
use thiserror::Error;

/// Decimal places of the native currency
pub const SOL_DECIMALS: u32 = 9;

/// Lamports per whole SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Money conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Unsupported decimals: {0}")]
    UnsupportedDecimals(u32),
}

/// Lamports to SOL, exact (scale 9)
pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(lamports as i128, SOL_DECIMALS)
}

/// Integer base units to a decimal amount with the given precision
pub fn base_units_to_decimal(value: u64, decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(value as i128, decimals)
}

/// Scale a whole-token amount to base units
///
/// # Errors
/// * `UnsupportedDecimals` - if `10^decimals` does not fit in u64
/// * `Overflow` - if the scaled amount does not fit in u64
///
/// # Example
/// ```rust
/// use presale_sentinel::money::whole_to_base_units;
///
/// assert_eq!(whole_to_base_units(5, 6).unwrap(), 5_000_000);
/// ```
pub fn whole_to_base_units(tokens: u64, decimals: u32) -> Result<u64, MoneyError> {
    let multiplier = 10u64
        .checked_pow(decimals)
        .ok_or(MoneyError::UnsupportedDecimals(decimals))?;
    tokens.checked_mul(multiplier).ok_or(MoneyError::Overflow)
}

/// Basis-point share of an integer amount, rounded down
pub fn bps_of(amount: u64, bps: u32) -> u64 {
    // u128 keeps amount * 10_000 from overflowing
    ((amount as u128 * bps as u128) / 10_000) as u64
}

/// Basis-point share of a decimal amount
pub fn bps_of_decimal(amount: Decimal, bps: u32) -> Decimal {
    amount * Decimal::from(bps) / Decimal::from(10_000u32)
}
