use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the smallest currency unit
pub type Amount = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// One word of oracle randomness
pub type RandomWord = u128;

/// Participant identifier (wallet address or account name)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Participant(String);

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Participant {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Participant {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identifier handed out by the randomness oracle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phase of the current round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RafflePhase {
    /// Accepting entries
    #[default]
    Open,
    /// Entries closed, waiting for randomness
    Calculating,
}

impl fmt::Display for RafflePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RafflePhase::Open => write!(f, "open"),
            RafflePhase::Calculating => write!(f, "calculating"),
        }
    }
}

/// Current unix time in seconds
pub fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_serializes_as_plain_string() {
        let participant = Participant::new("0xabc");
        let json = serde_json::to_string(&participant).unwrap();
        assert_eq!(json, "\"0xabc\"");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RafflePhase::Open.to_string(), "open");
        assert_eq!(RafflePhase::Calculating.to_string(), "calculating");
        assert_eq!(RafflePhase::default(), RafflePhase::Open);
    }
}
