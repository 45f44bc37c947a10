//! Match Identifiers
//!
//! Human-shareable, fixed-width 6-digit decimal ids. The space holds 900,000
//! values: enough for casual play, but not collision-free on its own, so the
//! registry redraws any id it already holds.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Smallest allocatable id.
pub const MATCH_ID_MIN: u32 = 100_000;

/// Largest allocatable id.
pub const MATCH_ID_MAX: u32 = 999_999;

/// Number of digits in the rendered id.
pub const MATCH_ID_DIGITS: usize = 6;

/// A match identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchId(u32);

impl MatchId {
    /// Create from a numeric value, if it lies in the id range.
    pub fn new(value: u32) -> Option<Self> {
        (MATCH_ID_MIN..=MATCH_ID_MAX).contains(&value).then_some(Self(value))
    }

    /// Draw a random id.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(MATCH_ID_MIN..=MATCH_ID_MAX))
    }

    /// Numeric value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Match id parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchIdError {
    /// Not exactly six ASCII digits in range.
    #[error("match id must be 6 digits between 100000 and 999999")]
    Malformed,
}

impl FromStr for MatchId {
    type Err = MatchIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != MATCH_ID_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MatchIdError::Malformed);
        }
        let value: u32 = s.parse().map_err(|_| MatchIdError::Malformed)?;
        Self::new(value).ok_or(MatchIdError::Malformed)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl fmt::Debug for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchId({})", self)
    }
}

impl Serialize for MatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_ids_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let id = MatchId::random(&mut rng);
            assert_eq!(id.to_string().len(), MATCH_ID_DIGITS);
            assert!(id.value() >= MATCH_ID_MIN && id.value() <= MATCH_ID_MAX);
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        let id: MatchId = "482913".parse().unwrap();
        assert_eq!(id.value(), 482_913);
        assert_eq!(id.to_string(), "482913");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("12345".parse::<MatchId>().is_err());
        assert!("1234567".parse::<MatchId>().is_err());
        assert!("012345".parse::<MatchId>().is_err());
        assert!("12a456".parse::<MatchId>().is_err());
        assert!("+12345".parse::<MatchId>().is_err());
    }

    #[test]
    fn test_new_checks_range() {
        assert!(MatchId::new(99_999).is_none());
        assert!(MatchId::new(1_000_000).is_none());
        assert!(MatchId::new(MATCH_ID_MIN).is_some());
    }
}
