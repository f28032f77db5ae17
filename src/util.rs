//! Small utilities shared across the control plane
//!
//! Size-string parsing and timestamp formatting. Volume sizes arrive as
//! human-readable strings ("10Gi", "512m") and are stored as byte counts.

use crate::error::{Error, Result};
use chrono::Utc;

/// Parse a human-readable size string into a byte count.
///
/// Suffixes are 1024-based: `k`, `m`, `g`, `t` (case-insensitive), with an
/// optional trailing `i` and/or `b` ("10Gi", "10g", "10GiB" are equivalent).
/// A bare integer is a byte count. Malformed input is a `CapacityParse`
/// error; zero is accepted here and rejected by volume validation.
pub fn parse_size(size: &str) -> Result<u64> {
    let s = size.trim();
    if s.is_empty() {
        return Err(Error::CapacityParse("empty size string".into()));
    }

    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(digits_end);
    if number.is_empty() {
        return Err(Error::CapacityParse(format!("no numeric part in {size:?}")));
    }

    let value: u64 = number
        .parse()
        .map_err(|_| Error::CapacityParse(format!("invalid number in {size:?}")))?;

    let mut suffix = suffix.trim().to_ascii_lowercase();
    // "10Gi" and "10GiB" both denote binary units
    if let Some(stripped) = suffix.strip_suffix('b') {
        suffix = stripped.to_string();
    }
    if let Some(stripped) = suffix.strip_suffix('i') {
        suffix = stripped.to_string();
    }

    let multiplier: u64 = match suffix.as_str() {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        "t" => 1 << 40,
        _ => {
            return Err(Error::CapacityParse(format!(
                "unknown size suffix {suffix:?} in {size:?}"
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::CapacityParse(format!("size overflows u64: {size:?}")))
}

/// Current UTC time as an RFC 3339 timestamp string.
///
/// Used for `created` and `failed_at` fields on durable records.
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_size_binary_suffixes() {
        assert_eq!(parse_size("1k").unwrap(), 1024);
        assert_eq!(parse_size("10Gi").unwrap(), 10 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_size("2TiB").unwrap(), 2 * (1u64 << 40));
        assert_eq!(parse_size("4GB").unwrap(), 4 * (1u64 << 30));
    }

    #[test]
    fn test_parse_size_plain_bytes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1048576").unwrap(), 1048576);
        assert_eq!(parse_size(" 42 ").unwrap(), 42);
    }

    #[test]
    fn test_parse_size_malformed() {
        assert_matches!(parse_size(""), Err(Error::CapacityParse(_)));
        assert_matches!(parse_size("Gi"), Err(Error::CapacityParse(_)));
        assert_matches!(parse_size("10Xi"), Err(Error::CapacityParse(_)));
        assert_matches!(parse_size("ten"), Err(Error::CapacityParse(_)));
        assert_matches!(parse_size("-5Gi"), Err(Error::CapacityParse(_)));
    }

    #[test]
    fn test_parse_size_overflow() {
        assert_matches!(
            parse_size("99999999999999999t"),
            Err(Error::CapacityParse(_))
        );
    }

    #[test]
    fn test_now_is_rfc3339() {
        let ts = now();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
