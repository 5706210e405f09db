//! Amount formatting and parsing
//!
//! Raw on-chain amounts are integers in the token's (or feed's) smallest unit.
//! Everything that ends up in a transaction goes through [`parse_units`], which is
//! exact; the display helpers round and are never fed back into a submission.

use alloy_primitives::{Address, U256};

use crate::errors::AmountError;

/// SATSTD decimals on-chain
pub const TOKEN_DECIMALS: u8 = 18;

/// Reserve feed decimals (BTC with 18 decimals)
pub const FEED_DECIMALS: u8 = 18;

pub const TOKEN_SYMBOL: &str = "SATSTD";

/// Fraction digits shown for token and BTC amounts
pub const DISPLAY_FRACTION_DIGITS: u8 = 8;

/// `10^exp` as a `U256`.
pub fn pow10(exp: u8) -> U256 {
    (0..exp).fold(U256::from(1u8), |acc, _| acc * U256::from(10u8))
}

/// Parses a decimal string such as `"0.0002"` into raw units.
///
/// # Errors
/// Rejects empty input, signs, exponents, more fractional digits than `decimals`
/// (instead of silently truncating) and values that do not fit in 256 bits.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return Err(AmountError::NotANumber(trimmed.to_string()));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise(decimals));
    }

    let whole_value = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| AmountError::Overflow)?
    };
    let fraction_value = if fraction.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{fraction:0<width$}", width = decimals as usize);
        U256::from_str_radix(&padded, 10).map_err(|_| AmountError::Overflow)?
    };

    whole_value
        .checked_mul(pow10(decimals))
        .and_then(|scaled| scaled.checked_add(fraction_value))
        .ok_or(AmountError::Overflow)
}

/// Exact decimal rendering of a raw amount, trailing zeros trimmed.
///
/// `parse_units(&format_units(x, d), d) == Ok(x)` for every `x`.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let scale = pow10(decimals);
    let whole = raw / scale;
    let fraction = raw % scale;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Splits `raw` into whole and fractional parts rounded half-up to `digits` places.
fn round_parts(raw: U256, decimals: u8, digits: u8) -> (U256, U256) {
    if digits >= decimals {
        let scale = pow10(decimals);
        let fraction = (raw % scale).saturating_mul(pow10(digits - decimals));
        return (raw / scale, fraction);
    }
    let step = pow10(decimals - digits);
    let rounded = raw.saturating_add(step / U256::from(2u8)) / step;
    let unit = pow10(digits);
    (rounded / unit, rounded % unit)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Human display: thousands separators, at most `max_fraction` digits, no
/// trailing zeros. Display only.
pub fn format_display(raw: U256, decimals: u8, max_fraction: u8) -> String {
    let (whole, fraction) = round_parts(raw, decimals, max_fraction);
    let whole = group_thousands(&whole.to_string());
    if fraction.is_zero() {
        return whole;
    }
    let digits = format!(
        "{:0>width$}",
        fraction.to_string(),
        width = max_fraction as usize
    );
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Fixed number of fraction digits, e.g. `"1.0000"`.
pub fn format_fixed(raw: U256, decimals: u8, digits: u8) -> String {
    let (whole, fraction) = round_parts(raw, decimals, digits);
    if digits == 0 {
        return whole.to_string();
    }
    format!(
        "{whole}.{:0>width$}",
        fraction.to_string(),
        width = digits as usize
    )
}

/// `"20,000 SATSTD"`
pub fn format_token(raw: U256, decimals: u8, symbol: &str) -> String {
    format!(
        "{} {symbol}",
        format_display(raw, decimals, DISPLAY_FRACTION_DIGITS)
    )
}

/// `"0.0002 BTC"`
pub fn format_btc_reserve(raw: U256, feed_decimals: u8) -> String {
    format!(
        "{} BTC",
        format_display(raw, feed_decimals, DISPLAY_FRACTION_DIGITS)
    )
}

/// `0x1234...abcd` from the checksummed form.
pub fn shorten_address(address: &Address) -> String {
    shorten_hex(&address.to_checksum(None))
}

/// Keeps the `0x` prefix, four leading and four trailing characters.
pub fn shorten_hex(full: &str) -> String {
    if full.len() <= 10 {
        return full.to_string();
    }
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
