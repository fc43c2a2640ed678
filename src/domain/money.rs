use std::fmt;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// 1 unit = 100 cents, so 50.00 = 5000 cents.
pub type Cents = i64;

/// Percentages are integer hundredths of a percent. 100% = 10_000, 12.5% = 1_250.
pub type BasisPoints = i64;

/// The basis-point value of a whole (100%).
pub const FULL_PERCENT: BasisPoints = 10_000;

/// Largest expense total accepted: 99,999,999.99.
pub const MAX_TOTAL_CENTS: Cents = 9_999_999_999;

/// Format cents as a human-readable currency string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    format_fixed2(cents)
}

/// Format basis points as a percentage string without the sign.
/// Example: 3333 -> "33.33", 10000 -> "100.00"
pub fn format_percent(bps: BasisPoints) -> String {
    format_fixed2(bps)
}

fn format_fixed2(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two fraction digits is rejected rather than truncated, since a
/// truncated amount would silently change split sums.
pub fn parse_cents(input: &str) -> Result<Cents, ParseAmountError> {
    parse_fixed2(input)
}

/// Parse a percentage string ("33.33", "50", "12.5%") into basis points.
pub fn parse_percent(input: &str) -> Result<BasisPoints, ParseAmountError> {
    let input = input.trim();
    parse_fixed2(input.strip_suffix('%').unwrap_or(input))
}

fn parse_fixed2(input: &str) -> Result<i64, ParseAmountError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseAmountError::InvalidFormat);
    }
    if fraction.len() > 2 {
        return Err(ParseAmountError::TooManyDecimals);
    }

    let units: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| ParseAmountError::Overflow)?
    };

    // "5" -> 50, "05" -> 5, "" -> 0
    let hundredths: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| ParseAmountError::InvalidFormat)? * 10,
        _ => fraction.parse().map_err(|_| ParseAmountError::InvalidFormat)?,
    };

    let value = units
        .checked_mul(100)
        .and_then(|v| v.checked_add(hundredths))
        .ok_or(ParseAmountError::Overflow)?;
    Ok(if negative { -value } else { value })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
            ParseAmountError::TooManyDecimals => {
                write!(f, "amounts carry at most two decimal places")
            }
            ParseAmountError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseAmountError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-5000), "-50.00");
        assert_eq!(format_cents(-1), "-0.01");
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("50.00"), Ok(5000));
        assert_eq!(parse_cents("50"), Ok(5000));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents("0.01"), Ok(1));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("-50.00"), Ok(-5000));
        assert_eq!(parse_cents(" 7. "), Ok(700));
    }

    #[test]
    fn test_parse_cents_rejects_sub_cent_precision() {
        assert_eq!(
            parse_cents("100.999"),
            Err(ParseAmountError::TooManyDecimals)
        );
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert_eq!(parse_cents("abc"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_cents("12.34.56"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_cents("."), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_cents("+5"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(
            parse_cents("99999999999999999999"),
            Err(ParseAmountError::Overflow)
        );
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("100"), Ok(FULL_PERCENT));
        assert_eq!(parse_percent("33.33"), Ok(3333));
        assert_eq!(parse_percent("12.5%"), Ok(1250));
        assert_eq!(format_percent(3333), "33.33");
    }
}
