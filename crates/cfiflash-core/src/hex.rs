//! Hex-or-decimal numbers in configuration files
//!
//! Address and size fields accept either an integer or a string with an
//! optional `0x` prefix.

use alloc::string::String;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u32),
    Str(String),
}

/// Deserialize a u32 that can be hex (0x...) or decimal
pub fn deserialize_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

/// Like [`deserialize_u32`], for optional fields
pub fn deserialize_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_u32(deserializer).map(Some)
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u32, &'static str> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| "invalid hex number")
    } else {
        s.parse().map_err(|_| "invalid number")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x20000000"), Ok(0x2000_0000));
        assert_eq!(parse_number(" 4096 "), Ok(4096));
        assert_eq!(parse_number("0X1f"), Ok(0x1F));
        assert!(parse_number("0xZZ").is_err());
        assert!(parse_number("").is_err());
    }
}
