//! C-style integer literals.
//!
//! Addresses on the command line and in device descriptions are written the
//! way a C programmer would: `0x1000`, `010` (octal) or `4096`, optionally
//! negated, in which case the value wraps to its two's complement.

/// Parses `text` as a C-style integer literal.
///
/// Returns `None` for an empty string, a bare sign, stray characters or a
/// magnitude that does not fit in 64 bits.
///
/// # Examples
///
/// ```
/// use retrovm_core::common::literal::parse_int_literal;
///
/// assert_eq!(parse_int_literal("0x1000"), Some(0x1000));
/// assert_eq!(parse_int_literal("010"), Some(8));
/// assert_eq!(parse_int_literal("-1"), Some(u64::MAX));
/// ```
pub fn parse_int_literal(text: &str) -> Option<u64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (digits, radix) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        (hex, 16)
    } else if body.len() > 1 && body.starts_with('0') {
        (&body[1..], 8)
    } else {
        (body, 10)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    Some(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}
