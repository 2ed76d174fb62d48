use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::MAX_PERIOD_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodIdError {
    #[error("period must not be empty")]
    Empty,
    #[error("period too long (len={len}, max={max})")]
    TooLong { len: usize, max: usize },
    #[error("period contains invalid character {ch:?}")]
    InvalidChar { ch: char },
}

/// The canonical period identifier.
///
/// One representation everywhere: a trimmed, non-empty ASCII string of
/// digits, letters, and `-`, stored as TEXT in every table and parsed through
/// [`PeriodId::new`] at every boundary. Numeric period values must be
/// formatted into this form before they enter the system.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodId(String);

impl PeriodId {
    pub fn new(raw: &str) -> Result<Self, PeriodIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PeriodIdError::Empty);
        }
        if trimmed.len() > MAX_PERIOD_LEN {
            return Err(PeriodIdError::TooLong {
                len: trimmed.len(),
                max: MAX_PERIOD_LEN,
            });
        }
        for ch in trimmed.chars() {
            if !(ch.is_ascii_alphanumeric() || ch == '-') {
                return Err(PeriodIdError::InvalidChar { ch });
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeriodId {
    type Err = PeriodIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::new(raw)
    }
}

impl Serialize for PeriodId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PeriodId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_forms() {
        assert_eq!(PeriodId::new("20240801-123").unwrap().as_str(), "20240801-123");
        assert_eq!(PeriodId::new("  1088  ").unwrap().as_str(), "1088");
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert_eq!(PeriodId::new("   "), Err(PeriodIdError::Empty));
        let long = "9".repeat(MAX_PERIOD_LEN + 1);
        assert!(matches!(PeriodId::new(&long), Err(PeriodIdError::TooLong { .. })));
    }

    #[test]
    fn test_rejects_non_ascii() {
        assert!(matches!(
            PeriodId::new("期20240801"),
            Err(PeriodIdError::InvalidChar { .. })
        ));
        assert!(matches!(
            PeriodId::new("2024 08"),
            Err(PeriodIdError::InvalidChar { ch: ' ' })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PeriodId = serde_json::from_str("\"20240801-5\"").unwrap();
        assert_eq!(ok.as_str(), "20240801-5");
        assert!(serde_json::from_str::<PeriodId>("\"\"").is_err());
    }
}
