//! Decimal-string to minimal-unit conversion
//!
//! Amounts cross the API boundary as decimal strings ("1.5") and travel to
//! the ledger as integer minimal units (wei). Parsing is strict: anything a
//! user could mistype is rejected instead of truncated.

use crate::error::{Error, Result};

/// Decimal places of the native currency (1 ether = 10^18 wei)
pub const ETHER_DECIMALS: u32 = 18;

/// Parse a decimal string into minimal units with the given number of
/// decimal places. Rejects signs, exponents, garbage, excess fractional
/// digits, and values that overflow u128.
pub fn parse_units(amount: &str, decimals: u32) -> Result<u128> {
    let s = amount.trim();
    if s.is_empty() {
        return Err(Error::InvalidAmount("amount is empty".into()));
    }
    if s.starts_with('+') || s.starts_with('-') {
        return Err(Error::InvalidAmount(format!(
            "amount must be an unsigned decimal, got '{s}'"
        )));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(Error::InvalidAmount(format!("'{s}' is not a number")));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(Error::InvalidAmount(format!("'{s}' is not a number")));
    }
    if frac_part.len() as u32 > decimals {
        return Err(Error::InvalidAmount(format!(
            "more than {decimals} decimal places in '{s}'"
        )));
    }

    let scale = 10u128
        .checked_pow(decimals)
        .ok_or_else(|| Error::InvalidAmount(format!("unsupported precision: {decimals}")))?;

    let int: u128 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| Error::InvalidAmount(format!("amount '{s}' is too large")))?
    };

    // Right-pad the fraction to full precision: "5" at 18 decimals is 5*10^17
    let frac: u128 = if frac_part.is_empty() {
        0
    } else {
        let padding = decimals - frac_part.len() as u32;
        let digits: u128 = frac_part
            .parse()
            .map_err(|_| Error::InvalidAmount(format!("amount '{s}' is too large")))?;
        digits
            .checked_mul(10u128.pow(padding))
            .ok_or_else(|| Error::InvalidAmount(format!("amount '{s}' is too large")))?
    };

    int.checked_mul(scale)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| Error::InvalidAmount(format!("amount '{s}' is too large")))
}

/// Format minimal units as a decimal string, trimming trailing zeros
pub fn format_units(value: u128, decimals: u32) -> String {
    let scale = match 10u128.checked_pow(decimals) {
        Some(s) => s,
        None => return value.to_string(),
    };
    let int = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return int.to_string();
    }
    let frac = format!("{frac:0>width$}", width = decimals as usize);
    format!("{int}.{}", frac.trim_end_matches('0'))
}

/// Parse a decimal ether string into wei
pub fn parse_ether(amount: &str) -> Result<u128> {
    parse_units(amount, ETHER_DECIMALS)
}

/// Format wei as a decimal ether string
pub fn format_ether(wei: u128) -> String {
    format_units(wei, ETHER_DECIMALS)
}
