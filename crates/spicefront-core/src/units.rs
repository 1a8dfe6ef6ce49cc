//! Engineering units and SI prefix handling.

/// Multiplier for a SPICE scale suffix, or `None` if the text does not start
/// with a known suffix.
///
/// Matching is case-insensitive and only looks at the leading letters, so
/// `"kOhm"` scales by 1e3 and `"MEG"` by 1e6. Anything after the suffix is a
/// unit annotation and is ignored.
pub fn suffix_multiplier(suffix: &str) -> Option<f64> {
    let upper = suffix.to_ascii_uppercase();
    if upper.is_empty() {
        return Some(1.0);
    }
    if upper.starts_with("MEG") {
        return Some(1e6);
    }
    if upper.starts_with("MIL") {
        return Some(25.4e-6);
    }

    let multiplier = match upper.as_bytes()[0] {
        b'T' => 1e12,
        b'G' => 1e9,
        b'K' => 1e3,
        b'M' => 1e-3,
        b'U' => 1e-6,
        b'N' => 1e-9,
        b'P' => 1e-12,
        b'F' => 1e-15,
        c if c.is_ascii_alphabetic() => 1.0,
        _ => return None,
    };
    Some(multiplier)
}

/// Parse a SPICE-style value with optional SI suffix.
///
/// Supported suffixes:
/// - T (tera, 1e12)
/// - G (giga, 1e9)
/// - MEG (mega, 1e6)
/// - K (kilo, 1e3)
/// - M (milli, 1e-3)
/// - MIL (25.4e-6)
/// - U (micro, 1e-6)
/// - N (nano, 1e-9)
/// - P (pico, 1e-12)
/// - F (femto, 1e-15)
///
/// A comma may be used as the decimal separator (`3,14`) and a trailing `%`
/// divides the value by 100.
pub fn parse_value(s: &str) -> Option<f64> {
    let s = s.trim();
    let (s, scale) = match s.strip_suffix('%') {
        Some(rest) => (rest, 0.01),
        None => (s, 1.0),
    };
    let s = s.replace(',', ".");

    if let Ok(v) = s.parse::<f64>() {
        return Some(v * scale);
    }

    let num_end = numeric_prefix_len(&s);
    if num_end == 0 {
        return None;
    }

    let (num_str, suffix) = s.split_at(num_end);
    let value: f64 = num_str.parse().ok()?;
    let multiplier = suffix_multiplier(suffix)?;

    Some(value * multiplier * scale)
}

/// Length of the leading `[+-]digits[.digits][e[+-]digits]` part of `s`.
fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;

    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i == digits_start {
        return 0;
    }

    // Exponent only when followed by digits; a bare `e` is left to the suffix.
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|v| (v - b).abs() < b.abs() * 1e-10 + 1e-20)
    }

    #[test]
    fn test_parse_plain_number() {
        assert_eq!(parse_value("1.5"), Some(1.5));
        assert_eq!(parse_value("-2.5"), Some(-2.5));
        assert_eq!(parse_value("1e-3"), Some(1e-3));
        assert_eq!(parse_value(".5"), Some(0.5));
    }

    #[test]
    fn test_parse_with_suffix() {
        assert!(approx_eq(parse_value("1k"), 1e3));
        assert!(approx_eq(parse_value("4.7K"), 4.7e3));
        assert!(approx_eq(parse_value("10M"), 10e-3));
        assert!(approx_eq(parse_value("10MEG"), 10e6));
        assert!(approx_eq(parse_value("100n"), 100e-9));
        assert!(approx_eq(parse_value("1u"), 1e-6));
        assert!(approx_eq(parse_value("10p"), 10e-12));
    }

    #[test]
    fn test_parse_unit_annotations() {
        assert!(approx_eq(parse_value("3MH"), 3e-3));
        assert!(approx_eq(parse_value("10V"), 10.0));
        assert!(approx_eq(parse_value("1kOhm"), 1e3));
        assert!(approx_eq(parse_value("2e3Hz"), 2e3));
    }

    #[test]
    fn test_parse_comma_decimal_and_percent() {
        assert!(approx_eq(parse_value("3,14"), 3.14));
        assert!(approx_eq(parse_value("10%"), 0.1));
        assert!(approx_eq(parse_value("2,5k"), 2500.0));
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse_value("abc"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("1.2.3"), None);
    }
}
