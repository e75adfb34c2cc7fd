// Safe-parse utilities
// Every lenient conversion in the engine goes through here so the fallback
// value and the reason for it stay in one place instead of scattered per
// field.

/// Outcome of a lenient parse: the value that will be used, plus whether the
/// raw input actually produced it or the default was substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub used_default: bool,
}

impl<T> Parsed<T> {
    fn ok(value: T) -> Self {
        Parsed {
            value,
            used_default: false,
        }
    }

    fn fallback(value: T) -> Self {
        Parsed {
            value,
            used_default: true,
        }
    }
}

/// Parse a monetary amount. Strips thousands-separator commas; `absolute`
/// folds the sign away (expense feeds report costs as negatives).
/// Falls back to 0.0 on anything unparseable.
pub fn parse_amount(raw: &str, absolute: bool) -> Parsed<f64> {
    let cleaned = raw.trim().replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(num) if num.is_finite() => Parsed::ok(if absolute { num.abs() } else { num }),
        _ => Parsed::fallback(0.0),
    }
}

/// Parse a seat count. Strips commas, falls back to 0 (which downstream
/// treats as "exclude this location").
pub fn parse_seats(raw: &str) -> Parsed<u32> {
    let cleaned = raw.trim().replace(',', "");
    match cleaned.parse::<u32>() {
        Ok(num) => Parsed::ok(num),
        _ => Parsed::fallback(0),
    }
}

/// Parse a percentage into the [0,100] range.
///
/// Accepts "75%", "75.0", and fractional "0.75" (values below 1.0 are
/// promoted, matching how the analytics exports mix both encodings).
/// Falls back to 0.0.
pub fn parse_pct(raw: &str) -> Parsed<f64> {
    let trimmed = raw.trim();
    let (body, had_suffix) = match trimmed.strip_suffix('%') {
        Some(stripped) => (stripped.trim(), true),
        None => (trimmed, false),
    };

    match body.parse::<f64>() {
        Ok(num) if num.is_finite() => {
            if !had_suffix && num < 1.0 && num > 0.0 {
                Parsed::ok(num * 100.0)
            } else {
                Parsed::ok(num)
            }
        }
        _ => Parsed::fallback(0.0),
    }
}

/// Format a price as an integer with thousands separators: 18000000 -> "18,000,000".
pub fn format_price_int(val: f64) -> String {
    let negative = val < 0.0;
    let rounded = val.abs().round() as u64;
    let digits = rounded.to_string();

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    if negative {
        format!("-{}", out)
    } else {
        out
    }
}

/// Round to the nearest multiple of `nearest` (half-up), for display values
/// like the sold price per seat.
pub fn round_to_nearest(val: f64, nearest: f64) -> f64 {
    (val / nearest).round() * nearest
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_strips_commas() {
        let parsed = parse_amount("900,000,000", false);
        assert_eq!(parsed.value, 900_000_000.0);
        assert!(!parsed.used_default);
    }

    #[test]
    fn test_parse_amount_absolute() {
        assert_eq!(parse_amount("-1,250,000", true).value, 1_250_000.0);
        assert_eq!(parse_amount("-1,250,000", false).value, -1_250_000.0);
    }

    #[test]
    fn test_parse_amount_fallback() {
        let parsed = parse_amount("n/a", false);
        assert_eq!(parsed.value, 0.0);
        assert!(parsed.used_default);
    }

    #[test]
    fn test_parse_seats() {
        assert_eq!(parse_seats("120").value, 120);
        assert_eq!(parse_seats("1,200").value, 1200);

        let bad = parse_seats("");
        assert_eq!(bad.value, 0);
        assert!(bad.used_default);
    }

    #[test]
    fn test_parse_pct_suffix_and_fraction() {
        assert_eq!(parse_pct("75%").value, 75.0);
        assert_eq!(parse_pct("75.5").value, 75.5);
        // Fractions promote to percentages
        assert_eq!(parse_pct("0.75").value, 75.0);
        // But an explicit suffix never promotes
        assert_eq!(parse_pct("0.75%").value, 0.75);
    }

    #[test]
    fn test_parse_pct_fallback() {
        let parsed = parse_pct("unknown");
        assert_eq!(parsed.value, 0.0);
        assert!(parsed.used_default);
    }

    #[test]
    fn test_format_price_int() {
        assert_eq!(format_price_int(18_000_000.0), "18,000,000");
        assert_eq!(format_price_int(950.0), "950");
        assert_eq!(format_price_int(1_000.0), "1,000");
        assert_eq!(format_price_int(0.0), "0");
        assert_eq!(format_price_int(-2_500_000.0), "-2,500,000");
    }

    #[test]
    fn test_round_to_nearest() {
        assert_eq!(round_to_nearest(14_900.0, 10_000.0), 10_000.0);
        assert_eq!(round_to_nearest(15_000.0, 10_000.0), 20_000.0);
        assert_eq!(round_to_nearest(300_000.0, 10_000.0), 300_000.0);
    }
}
