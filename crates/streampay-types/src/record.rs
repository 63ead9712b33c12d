use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Stored stream status. "ended" covers both completion and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistedStatus {
    Paused,
    Running,
    Ended,
}

impl PersistedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Running => "running",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for PersistedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PersistedStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "paused" => Ok(Self::Paused),
            "running" => Ok(Self::Running),
            "ended" => Ok(Self::Ended),
            other => Err(anyhow!("unknown stream status: {other}")),
        }
    }
}

/// Persisted stream row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: String,
    pub counterparty_id: String,
    pub price: u64,
    pub delay: u64,
    pub total_parts: u32,
    pub parts_paid: u32,
    pub fee: u64,
    pub memo: String,
    pub name: String,
    pub created_at: i64,
    pub status: PersistedStatus,
}

/// Audit record of one settled part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPart {
    pub payment_hash: String,
    pub stream_id: String,
}

impl StreamPart {
    pub fn new(payment_hash: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            payment_hash: payment_hash.into(),
            stream_id: stream_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_statuses() {
        for status in [
            PersistedStatus::Paused,
            PersistedStatus::Running,
            PersistedStatus::Ended,
        ] {
            assert_eq!(status.as_str().parse::<PersistedStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_parse_unknown_status_fails() {
        assert!("streaming".parse::<PersistedStatus>().is_err());
        assert!("".parse::<PersistedStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&PersistedStatus::Ended).unwrap();
        assert_eq!(json, "\"ended\"");
    }
}
