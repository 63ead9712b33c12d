use anyhow::Result;

use crate::record::{PersistedStatus, StreamPart, StreamRecord};

/// Durable storage for streams and their settled parts.
pub trait StreamStore: Send + Sync + 'static {
    fn insert_stream(&self, record: &StreamRecord) -> Result<()>;

    fn update_stream_progress(
        &self,
        id: &str,
        parts_paid: u32,
        status: PersistedStatus,
    ) -> Result<()>;

    /// Append to the parts log.
    fn insert_part(&self, part: &StreamPart) -> Result<()>;

    /// All streams, newest first.
    fn list_streams(&self) -> Result<Vec<StreamRecord>>;

    fn get_stream(&self, id: &str) -> Result<Option<StreamRecord>>;

    /// Parts of one stream in settlement order.
    fn list_parts(&self, stream_id: &str) -> Result<Vec<StreamPart>>;

    /// Force every "running" stream back to "paused". Returns the number of
    /// rows changed.
    fn reset_running_to_paused(&self) -> Result<usize>;
}
