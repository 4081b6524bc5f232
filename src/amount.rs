//! Conversions between integer base units and human decimal strings
//!
//! All arithmetic is done on `U256`; nothing goes through floating point.

use crate::constants::{DISPLAY_FRACTION_DIGITS, MIN_RECIPIENT_AMOUNT, NATIVE_DECIMALS};
use crate::error::DisperseError;
use alloy::primitives::U256;

/// `10^exp`, or `None` past 10^77
fn pow10(exp: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

/// Render a base-unit amount for display.
///
/// Rounds half-up to at most 6 fraction digits, trims trailing zeros and
/// groups the integer part with `,` (en-US style).
///
/// ```rust,ignore
/// assert_eq!(format_units(U256::from(1_234_567_891u64), 6), "1,234.567891");
/// ```
pub fn format_units(value: U256, decimals: u8) -> String {
    let shown = DISPLAY_FRACTION_DIGITS;

    // `scaled` counts units of 10^-6
    let scaled = if decimals > shown {
        match pow10(decimals - shown) {
            Some(divisor) => {
                let quotient = value / divisor;
                let remainder = value % divisor;
                if remainder >= divisor - remainder {
                    quotient.saturating_add(U256::from(1u8))
                } else {
                    quotient
                }
            }
            // any U256 is below half of a divisor this large
            None => U256::ZERO,
        }
    } else {
        value.saturating_mul(U256::from(10u64).pow(U256::from(shown - decimals)))
    };

    let unit = U256::from(10u64).pow(U256::from(shown));
    let integer = scaled / unit;
    let fraction = scaled % unit;

    let mut out = group_thousands(&integer.to_string());
    if !fraction.is_zero() {
        let digits = format!("{:0>width$}", fraction.to_string(), width = shown as usize);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

/// Format a wei amount as ETH
pub fn format_ether(value: U256) -> String {
    format_units(value, NATIVE_DECIMALS)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Strip en-US grouping from an integer part, rejecting malformed groups
fn ungroup(integer: &str) -> Option<String> {
    if !integer.contains(',') {
        return Some(integer.to_string());
    }
    let mut groups = integer.split(',');
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 {
        return None;
    }
    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

/// Split a decimal string into its ungrouped integer digits and fraction digits
fn split_decimal(text: &str) -> Result<(String, &str), &'static str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty amount");
    }

    let (integer, fraction) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    let integer = ungroup(integer).ok_or("malformed digit grouping")?;

    if integer.is_empty() && fraction.is_empty() {
        return Err("no digits");
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(&integer) || !all_digits(fraction) {
        return Err("not a non-negative decimal number");
    }
    Ok((integer, fraction))
}

/// Whether `text` is a well-formed amount, whatever the token's decimals
pub fn is_decimal(text: &str) -> bool {
    split_decimal(text).is_ok()
}

/// Parse a user-entered decimal string into base units.
///
/// Accepts `"1"`, `"1.5"`, `".5"`, `"1."` and en-US grouped integers such as
/// `"1,000.25"`. Rejects signs, exponents, empty input, more fraction digits
/// than `decimals` and values that do not fit in 256 bits.
pub fn parse_units(text: &str, decimals: u8) -> Result<U256, DisperseError> {
    let invalid = |reason| DisperseError::InvalidAmount {
        input: text.to_string(),
        reason,
    };

    let (integer, fraction) = split_decimal(text).map_err(invalid)?;
    if fraction.len() > decimals as usize {
        return Err(invalid("more fraction digits than the token supports"));
    }

    let mut combined = integer;
    combined.push_str(fraction);
    combined.extend(std::iter::repeat('0').take(decimals as usize - fraction.len()));

    let combined = combined.trim_start_matches('0');
    if combined.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(combined, 10).map_err(|_| invalid("exceeds representable range"))
}

/// Smallest accepted recipient amount in base units (never below 1)
pub fn minimum_amount(decimals: u8) -> U256 {
    parse_units(MIN_RECIPIENT_AMOUNT, decimals)
        .ok()
        .filter(|min| !min.is_zero())
        .unwrap_or(U256::from(1u8))
}
