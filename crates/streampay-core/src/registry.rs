use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use streampay_types::{StreamPayment, StreamStatus, StreamStore};

use crate::timers::StreamTimers;

/// Live state of one registered stream.
pub(crate) struct RegistryEntry {
    pub(crate) stream: StreamPayment,
    /// Present iff the stream is streaming.
    pub(crate) timers: Option<StreamTimers>,
    /// Bumped on every start; results from an older run are discarded.
    pub(crate) epoch: u64,
}

impl RegistryEntry {
    fn new(stream: StreamPayment) -> Self {
        Self {
            stream,
            timers: None,
            epoch: 0,
        }
    }
}

pub(crate) type StreamTable = HashMap<String, RegistryEntry>;

/// Progress update applied by [`StreamRegistry::upsert`]. Status changes
/// go through the controller, which owns timers, persistence and events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPatch {
    pub parts_paid: Option<u32>,
    pub parts_requested: Option<u32>,
}

/// In-memory table of registered streams.
#[derive(Default)]
pub struct StreamRegistry {
    entries: Mutex<StreamTable>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StreamTable> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the table with the stored streams that have not ended.
    /// Returns the number of streams loaded.
    pub fn load<S: StreamStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let records = store.list_streams()?;
        let mut table = self.lock();
        table.clear();
        for record in records {
            let stream = StreamPayment::from_record(record);
            if stream.status.is_terminal() {
                continue;
            }
            table.insert(stream.id.clone(), RegistryEntry::new(stream));
        }
        log::info!("loaded {} active stream(s)", table.len());
        Ok(table.len())
    }

    pub fn get(&self, id: &str) -> Option<StreamPayment> {
        self.lock().get(id).map(|entry| entry.stream.clone())
    }

    /// All streams, newest first.
    pub fn list(&self) -> Vec<StreamPayment> {
        let mut streams: Vec<_> = self
            .lock()
            .values()
            .map(|entry| entry.stream.clone())
            .collect();
        streams.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        streams
    }

    pub fn insert(&self, stream: StreamPayment) {
        self.lock()
            .insert(stream.id.clone(), RegistryEntry::new(stream));
    }

    /// Apply `patch` to a registered stream and return the result.
    ///
    /// `parts_paid` is clamped to `total_parts` and `parts_requested` to the
    /// parts still unpaid. Only a streaming stream has parts in flight.
    pub fn upsert(&self, id: &str, patch: StreamPatch) -> Option<StreamPayment> {
        let mut table = self.lock();
        let stream = &mut table.get_mut(id)?.stream;

        if let Some(parts_paid) = patch.parts_paid {
            stream.parts_paid = parts_paid.min(stream.total_parts);
        }
        if let Some(parts_requested) = patch.parts_requested {
            stream.parts_requested = parts_requested;
        }
        if stream.status != StreamStatus::Streaming {
            stream.parts_requested = 0;
        }
        stream.parts_requested = stream.parts_requested.min(stream.remaining_parts());
        Some(stream.clone())
    }

    pub fn remove(&self, id: &str) -> Option<StreamPayment> {
        self.lock().remove(id).map(|entry| entry.stream)
    }

    pub fn streaming_ids(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter(|entry| entry.stream.status == StreamStatus::Streaming)
            .map(|entry| entry.stream.id.clone())
            .collect()
    }

    /// Whether the stream currently holds live timers.
    pub fn has_timers(&self, id: &str) -> bool {
        self.lock()
            .get(id)
            .and_then(|entry| entry.timers.as_ref())
            .is_some_and(|timers| !timers.is_finished())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
