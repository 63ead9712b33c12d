use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::{PersistedStatus, StreamRecord};

/// In-memory status of a stream payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Draft returned by `prepare`, not yet persisted.
    Prepared,
    Paused,
    Streaming,
    /// Terminal.
    Finished,
}

impl StreamStatus {
    /// Persisted form of this status. A draft is stored as paused on commit.
    pub fn persisted(self) -> PersistedStatus {
        match self {
            Self::Prepared | Self::Paused => PersistedStatus::Paused,
            Self::Streaming => PersistedStatus::Running,
            Self::Finished => PersistedStatus::Ended,
        }
    }

    /// In-memory status for a loaded record.
    ///
    /// Timers never survive a restart, so "running" comes back as `Paused`.
    pub fn from_persisted(status: PersistedStatus) -> Self {
        match status {
            PersistedStatus::Paused | PersistedStatus::Running => Self::Paused,
            PersistedStatus::Ended => Self::Finished,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Finished
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Paused => "paused",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A payment split into `total_parts` equal parts of `price`, one every
/// `delay` milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPayment {
    pub id: String,
    pub counterparty_id: String,
    /// Amount per part, in satoshis.
    pub price: u64,
    /// Milliseconds between parts.
    pub delay: u64,
    pub total_parts: u32,
    pub parts_paid: u32,
    /// Parts reserved by a tick and not yet settled.
    pub parts_requested: u32,
    /// Quoted fee for one part.
    pub fee: u64,
    pub memo: String,
    pub name: String,
    /// Unix milliseconds.
    pub created_at: i64,
    pub status: StreamStatus,
}

impl StreamPayment {
    /// Build a fresh draft with a new id and the current time.
    pub fn draft(
        counterparty_id: impl Into<String>,
        price: u64,
        delay: u64,
        total_parts: u32,
        name: impl Into<String>,
        fee: u64,
        memo_prefix: &str,
    ) -> Self {
        let name = name.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            counterparty_id: counterparty_id.into(),
            price,
            delay,
            total_parts,
            parts_paid: 0,
            parts_requested: 0,
            fee,
            memo: format!("{memo_prefix}{name}"),
            name,
            created_at: chrono::Utc::now().timestamp_millis(),
            status: StreamStatus::Prepared,
        }
    }

    pub fn delay_duration(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    pub fn remaining_parts(&self) -> u32 {
        self.total_parts.saturating_sub(self.parts_paid)
    }

    /// True once paid plus in-flight parts cover the target count.
    pub fn is_fully_requested(&self) -> bool {
        self.parts_paid.saturating_add(self.parts_requested) >= self.total_parts
    }

    /// Count one settled part. Returns false if the target was already met.
    pub fn record_paid_part(&mut self) -> bool {
        if self.parts_paid >= self.total_parts {
            return false;
        }
        self.parts_paid += 1;
        true
    }

    /// Invoice memo for part `n` (1-based).
    pub fn part_memo(&self, n: u32) -> String {
        format!("{} ({}/{})", self.memo, n, self.total_parts)
    }

    /// Total amount the stream disburses, fees excluded.
    pub fn total_amount(&self) -> u64 {
        self.price.saturating_mul(u64::from(self.total_parts))
    }

    pub fn to_record(&self) -> StreamRecord {
        StreamRecord {
            id: self.id.clone(),
            counterparty_id: self.counterparty_id.clone(),
            price: self.price,
            delay: self.delay,
            total_parts: self.total_parts,
            parts_paid: self.parts_paid,
            fee: self.fee,
            memo: self.memo.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            status: self.status.persisted(),
        }
    }

    pub fn from_record(record: StreamRecord) -> Self {
        Self {
            status: StreamStatus::from_persisted(record.status),
            // Stored progress is clamped so a corrupted row cannot break the bound.
            parts_paid: record.parts_paid.min(record.total_parts),
            parts_requested: 0,
            id: record.id,
            counterparty_id: record.counterparty_id,
            price: record.price,
            delay: record.delay,
            total_parts: record.total_parts,
            fee: record.fee,
            memo: record.memo,
            name: record.name,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> StreamPayment {
        StreamPayment::draft("abc", 100, 1000, 3, "coffee", 1, "")
    }

    #[test]
    fn test_draft_defaults() {
        let stream = sample();
        assert_eq!(stream.status, StreamStatus::Prepared);
        assert_eq!(stream.parts_paid, 0);
        assert_eq!(stream.parts_requested, 0);
        assert_eq!(stream.memo, "coffee");
        assert_eq!(stream.total_amount(), 300);
        assert!(!stream.id.is_empty());
    }

    #[test]
    fn test_drafts_get_distinct_ids() {
        assert_ne!(sample().id, sample().id);
    }

    #[test]
    fn test_memo_prefix_is_applied() {
        let stream = StreamPayment::draft("abc", 1, 1, 1, "tip", 0, "stream: ");
        assert_eq!(stream.memo, "stream: tip");
        assert_eq!(stream.part_memo(1), "stream: tip (1/1)");
    }

    #[test]
    fn test_fully_requested_counts_in_flight() {
        let mut stream = sample();
        stream.parts_paid = 2;
        assert!(!stream.is_fully_requested());
        stream.parts_requested = 1;
        assert!(stream.is_fully_requested());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(StreamStatus::Prepared.persisted(), PersistedStatus::Paused);
        assert_eq!(StreamStatus::Streaming.persisted(), PersistedStatus::Running);
        assert_eq!(StreamStatus::Finished.persisted(), PersistedStatus::Ended);
        assert_eq!(
            StreamStatus::from_persisted(PersistedStatus::Running),
            StreamStatus::Paused
        );
        assert_eq!(
            StreamStatus::from_persisted(PersistedStatus::Ended),
            StreamStatus::Finished
        );
    }

    #[test]
    fn test_record_round_trip_drops_in_flight() {
        let mut stream = sample();
        stream.status = StreamStatus::Streaming;
        stream.parts_paid = 1;
        stream.parts_requested = 1;

        let loaded = StreamPayment::from_record(stream.to_record());
        assert_eq!(loaded.status, StreamStatus::Paused);
        assert_eq!(loaded.parts_paid, 1);
        assert_eq!(loaded.parts_requested, 0);
        assert_eq!(loaded.id, stream.id);
    }

    #[test]
    fn test_from_record_clamps_progress() {
        let mut record = sample().to_record();
        record.parts_paid = 10;
        assert_eq!(StreamPayment::from_record(record).parts_paid, 3);
    }

    proptest! {
        #[test]
        fn test_parts_paid_never_exceeds_total(total in 0u32..50, attempts in 0usize..120) {
            let mut stream = StreamPayment::draft("abc", 1, 1, total, "p", 0, "");
            for _ in 0..attempts {
                stream.record_paid_part();
                prop_assert!(stream.parts_paid <= stream.total_parts);
            }
            prop_assert_eq!(stream.parts_paid, total.min(attempts as u32));
        }
    }
}
