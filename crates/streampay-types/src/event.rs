use serde::Serialize;

use crate::stream::StreamStatus;

/// Category attached to every error notification from the engine.
pub const STREAM_ERROR_CATEGORY: &str = "stream_payment";

/// Notifications published by the engine for whatever presents them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Progress {
        stream_id: String,
        parts_paid: u32,
        total_parts: u32,
    },
    StatusChanged {
        stream_id: String,
        status: StreamStatus,
    },
    Error {
        stream_id: String,
        category: &'static str,
        code: &'static str,
        message: String,
    },
    /// Balances and channels should be reloaded after a settled part.
    RefreshRequested { stream_id: String },
}

impl StreamEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            Self::Progress { stream_id, .. }
            | Self::StatusChanged { stream_id, .. }
            | Self::Error { stream_id, .. }
            | Self::RefreshRequested { stream_id } => stream_id,
        }
    }
}
