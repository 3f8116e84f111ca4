//! Flow-rate unit conversion.
//!
//! On chain a flow rate is an integer amount of the token's smallest unit
//! (18 decimals) per second. The dashboard shows whole tokens per 30-day
//! month. The two directions are deliberately asymmetric:
//!
//! - [`to_monthly_rate`] is display-only: exact scaling, rounded to 9
//!   decimals, trailing zeros stripped. Non-numeric input yields `"0"`.
//! - [`to_native_rate_per_second`] produces the value submitted on chain and
//!   floor-divides by [`SECONDS_PER_MONTH`]. The remainder is dropped, so the
//!   round trip drifts by up to `SECONDS_PER_MONTH - 1` units of the scaled
//!   monthly amount. Other clients truncate the same way.

use alloy_primitives::U256;

use crate::error::ConversionError;

/// Seconds in the 30-day display month.
pub const SECONDS_PER_MONTH: u64 = 2_592_000;

/// Decimals of every streamable token handled by the dashboard.
pub const TOKEN_DECIMALS: usize = 18;

/// Fractional digits kept by [`to_monthly_rate`].
pub const DISPLAY_DECIMALS: usize = 9;

const WEI_PER_TOKEN: u64 = 1_000_000_000_000_000_000;
const DISPLAY_SCALE: u64 = 1_000_000_000;

/// Convert a native per-second rate (integer string, optional sign) into a
/// per-month decimal string for display.
///
/// Returns `"0"` when `native_per_second` is not an integer.
pub fn to_monthly_rate(native_per_second: &str) -> String {
    let Some((negative, magnitude)) = parse_integer(native_per_second) else {
        return "0".to_string();
    };
    let Some(monthly) = magnitude.checked_mul(U256::from(SECONDS_PER_MONTH)) else {
        return "0".to_string();
    };

    // `monthly` is in 10^-18 tokens; bring it to 10^-9 with half-up rounding.
    let divisor = U256::from(WEI_PER_TOKEN / DISPLAY_SCALE);
    let mut scaled = monthly / divisor;
    let remainder = monthly % divisor;
    if remainder * U256::from(2u64) >= divisor {
        scaled += U256::from(1u64);
    }

    let whole = scaled / U256::from(DISPLAY_SCALE);
    let frac = scaled % U256::from(DISPLAY_SCALE);
    let frac = format!("{:0>width$}", frac.to_string(), width = DISPLAY_DECIMALS);
    let frac = frac.trim_end_matches('0');

    let sign = if negative && !scaled.is_zero() { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{whole}")
    } else {
        format!("{sign}{whole}.{frac}")
    }
}

/// Convert a per-month decimal amount of whole tokens into the native
/// per-second rate (integer string) ready to be submitted on chain.
///
/// Accepts at most 18 fractional digits. The division by
/// [`SECONDS_PER_MONTH`] truncates toward zero.
pub fn to_native_rate_per_second(monthly_amount: &str) -> Result<String, ConversionError> {
    let (negative, wei) = parse_decimal_units(monthly_amount)?;
    let rate = wei / U256::from(SECONDS_PER_MONTH);
    if negative && !rate.is_zero() {
        Ok(format!("-{rate}"))
    } else {
        Ok(rate.to_string())
    }
}

/// Render an 18-decimal token amount as whole tokens, keeping at least one
/// fractional digit (`1000000000000000000` → `"1.0"`).
pub fn format_token_amount(amount: U256) -> String {
    let unit = U256::from(WEI_PER_TOKEN);
    let whole = amount / unit;
    let frac = amount % unit;
    let frac = format!("{:0>width$}", frac.to_string(), width = TOKEN_DECIMALS);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{frac}")
    }
}

/// Parse a decimal token amount into its 18-decimal integer representation.
///
/// Returns `(negative, magnitude)`.
pub fn parse_decimal_units(amount: &str) -> Result<(bool, U256), ConversionError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(ConversionError::Empty);
    }
    let (negative, body) = split_sign(trimmed);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(ConversionError::NotANumber(amount.to_string()));
    }
    if frac_part.len() > TOKEN_DECIMALS {
        return Err(ConversionError::TooPrecise(amount.to_string()));
    }

    let overflow = || ConversionError::Overflow(amount.to_string());
    let whole = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10).map_err(|_| overflow())?
    };
    let padded = format!("{frac_part:0<width$}", width = TOKEN_DECIMALS);
    let frac = U256::from_str_radix(&padded, 10).map_err(|_| overflow())?;

    let wei = whole
        .checked_mul(U256::from(WEI_PER_TOKEN))
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(overflow)?;
    Ok((negative, wei))
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else {
        (false, s.strip_prefix('+').unwrap_or(s))
    }
}

fn parse_integer(s: &str) -> Option<(bool, U256)> {
    let (negative, digits) = split_sign(s.trim());
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(digits, 10).ok().map(|v| (negative, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_zero() {
        assert_eq!(to_monthly_rate("0"), "0");
    }

    #[test]
    fn monthly_strips_trailing_zeros() {
        // 578703703703 * 2592000 = 1499999999998176000 → 1.500000000
        assert_eq!(to_monthly_rate("578703703703"), "1.5");
    }

    #[test]
    fn monthly_strips_trailing_point() {
        // 771604938271 * 2592000 = 1999999999998432000 → 2.000000000
        assert_eq!(to_monthly_rate("771604938271"), "2");
        assert_eq!(to_monthly_rate("1000000000000"), "2.592");
    }

    #[test]
    fn monthly_keeps_sign() {
        assert_eq!(to_monthly_rate("-1000000000000"), "-2.592");
        assert_eq!(to_monthly_rate("-1"), "0");
    }

    #[test]
    fn monthly_invalid_is_zero() {
        assert_eq!(to_monthly_rate("abc"), "0");
        assert_eq!(to_monthly_rate(""), "0");
        assert_eq!(to_monthly_rate("1.5"), "0");
    }

    #[test]
    fn native_floor_division() {
        assert_eq!(to_native_rate_per_second("1").unwrap(), "385802469135");
        assert_eq!(to_native_rate_per_second("2592000").unwrap(), "1000000000000000000");
        assert_eq!(to_native_rate_per_second("0").unwrap(), "0");
        assert_eq!(to_native_rate_per_second(".5").unwrap(), "192901234567");
    }

    #[test]
    fn native_rejects_bad_input() {
        assert_eq!(to_native_rate_per_second(""), Err(ConversionError::Empty));
        assert!(matches!(
            to_native_rate_per_second("1e5"),
            Err(ConversionError::NotANumber(_))
        ));
        assert!(matches!(
            to_native_rate_per_second("0.0000000000000000001"),
            Err(ConversionError::TooPrecise(_))
        ));
    }

    #[test]
    fn native_negative_truncates_toward_zero() {
        assert_eq!(to_native_rate_per_second("-1").unwrap(), "-385802469135");
    }

    #[test]
    fn format_whole_and_fractional() {
        let one = U256::from(WEI_PER_TOKEN);
        assert_eq!(format_token_amount(one), "1.0");
        assert_eq!(format_token_amount(one * U256::from(1000u64)), "1000.0");
        assert_eq!(format_token_amount(U256::from(1_500_000_000_000_000_000u64)), "1.5");
        assert_eq!(format_token_amount(U256::ZERO), "0.0");
    }
}
