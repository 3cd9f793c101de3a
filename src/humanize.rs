//! Human-readable byte sizes for buffer settings ("64KB", "2MB", or plain integers)

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Byte count that parses from and prints to the short human form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn kib(n: u64) -> Self {
        Self(n * KIB)
    }

    pub const fn mib(n: u64) -> Self {
        Self(n * MIB)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Saturates on targets where `usize` is narrower than the stored value.
    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    /// Largest unit that divides the value evenly, so round-trips are exact.
    pub fn to_human_readable(&self) -> String {
        match self.0 {
            0 => "0B".to_string(),
            n if n % GIB == 0 => format!("{}GB", n / GIB),
            n if n % MIB == 0 => format!("{}MB", n / MIB),
            n if n % KIB == 0 => format!("{}KB", n / KIB),
            n => format!("{}B", n),
        }
    }
}

impl From<usize> for ByteSize {
    fn from(value: usize) -> Self {
        ByteSize(value as u64)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl<'de> serde::de::Visitor<'de> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"64KB\", \"2MB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("negative byte size: {}", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if let Ok(num) = s.parse::<u64>() {
            return Ok(ByteSize(num));
        }

        let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) else {
            return Err(ParseError::InvalidFormat(s));
        };
        if pos == 0 {
            return Err(ParseError::InvalidFormat(s));
        }
        let (num_str, unit) = s.split_at(pos);
        let num: u64 = num_str.parse()?;

        let multiplier = match unit.trim() {
            "B" => 1,
            "K" | "KB" | "KIB" => KIB,
            "M" | "MB" | "MIB" => MIB,
            "G" | "GB" | "GIB" => GIB,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ParseError::InvalidFormat(s.clone()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_kilobytes() {
        assert_eq!("4096".parse::<ByteSize>().unwrap().as_u64(), 4096);
        assert_eq!("64KB".parse::<ByteSize>().unwrap(), ByteSize::kib(64));
        assert_eq!("128k".parse::<ByteSize>().unwrap(), ByteSize::kib(128));
    }

    #[test]
    fn test_parse_megabytes() {
        assert_eq!("2MB".parse::<ByteSize>().unwrap(), ByteSize::mib(2));
        assert_eq!("2MiB".parse::<ByteSize>().unwrap(), ByteSize::mib(2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("KB".parse::<ByteSize>(), Err(ParseError::InvalidFormat(_))));
        assert!(matches!("12XB".parse::<ByteSize>(), Err(ParseError::InvalidUnit(_))));
    }

    #[test]
    fn test_parse_overflowing_size_is_error() {
        assert!(matches!(
            "99999999999GB".parse::<ByteSize>(),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!("99999999999999999999999KB".parse::<ByteSize>().is_err());
        assert_eq!(
            "16777216GB".parse::<ByteSize>().unwrap().as_u64(),
            16_777_216 * 1024 * 1024 * 1024
        );
    }

    #[test]
    fn test_deserialize_overflowing_size_fails() {
        #[derive(Debug, Deserialize)]
        struct Sizes {
            #[allow(dead_code)]
            max: ByteSize,
        }
        let parsed = serde_json::from_str::<Sizes>(r#"{"max": "99999999999GB"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_human_readable_is_exact() {
        assert_eq!(ByteSize::kib(128).to_human_readable(), "128KB");
        assert_eq!(ByteSize::mib(2).to_human_readable(), "2MB");
        assert_eq!(ByteSize(5000).to_human_readable(), "5000B");
        assert_eq!(ByteSize(1536).to_human_readable(), "1536B");
    }

    #[test]
    fn test_deserialize_string_and_number() {
        #[derive(Deserialize)]
        struct Sizes {
            a: ByteSize,
            b: ByteSize,
        }
        let parsed: Sizes = serde_json::from_str(r#"{"a": "64KB", "b": 4096}"#).unwrap();
        assert_eq!(parsed.a, ByteSize::kib(64));
        assert_eq!(parsed.b, ByteSize(4096));
    }

    #[test]
    fn test_serialize_round_trips_through_display() {
        let json = serde_json::to_string(&ByteSize::kib(128)).unwrap();
        assert_eq!(json, "\"128KB\"");
    }
}
