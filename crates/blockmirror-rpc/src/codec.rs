//! Hex quantity decoders.
//!
//! Nodes encode every integer as a `0x`-prefixed hex string. Small quantities
//! decode into `u64`; 256-bit quantities (difficulty, value, gas price) decode
//! into their exact decimal string.

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer};

use crate::error::TransportError;

fn digits(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a hex-encoded string (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, TransportError> {
    let d = digits(s);
    if d.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(d, 16).map_err(|e| TransportError::Decode(format!("bad hex u64 {s:?}: {e}")))
}

/// Parse a hex-encoded 256-bit quantity into its decimal string form.
pub fn parse_hex_decimal(s: &str) -> Result<String, TransportError> {
    let d = digits(s);
    if d.is_empty() {
        return Ok("0".into());
    }
    U256::from_str_radix(d, 16)
        .map(|v| v.to_string())
        .map_err(|e| TransportError::Decode(format!("bad hex quantity {s:?}: {e}")))
}

/// `deserialize_with` for a required hex `u64`.
pub fn de_hex_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let s = String::deserialize(d)?;
    parse_hex_u64(&s).map_err(de::Error::custom)
}

/// `deserialize_with` for a nullable hex `u64`.
pub fn de_hex_u64_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(s) => parse_hex_u64(&s).map(Some).map_err(de::Error::custom),
        None => Ok(None),
    }
}

/// `deserialize_with` for a 256-bit hex quantity, yielding a decimal string.
/// `null` decodes as `"0"`.
pub fn de_hex_decimal<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(s) => parse_hex_decimal(&s).map_err(de::Error::custom),
        None => Ok("0".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("1234").unwrap(), 0x1234);
        assert_eq!(parse_hex_u64("0x").unwrap(), 0);
    }

    #[test]
    fn parse_hex_u64_rejects_garbage() {
        assert!(parse_hex_u64("0xzz").is_err());
        assert!(parse_hex_u64("0x1ffffffffffffffff").is_err());
    }

    #[test]
    fn decimal_exceeds_u64() {
        // 2^128
        assert_eq!(
            parse_hex_decimal("0x100000000000000000000000000000000").unwrap(),
            "340282366920938463463374607431768211456"
        );
        assert_eq!(parse_hex_decimal("0x0").unwrap(), "0");
        assert_eq!(parse_hex_decimal("0xde0b6b3a7640000").unwrap(), "1000000000000000000");
    }

    #[test]
    fn decimal_rejects_overflow() {
        let too_big = format!("0x1{}", "0".repeat(64));
        assert!(parse_hex_decimal(&too_big).is_err());
    }
}
