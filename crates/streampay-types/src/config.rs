use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long a tick may wait on the payment backend before the stream is
/// paused as not responding.
pub const DEFAULT_STREAM_ERROR_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub stream_error_timeout_ms: u64,
    /// Prepended to the stream name to build its memo.
    pub memo_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_error_timeout_ms: DEFAULT_STREAM_ERROR_TIMEOUT_MS,
            memo_prefix: String::new(),
        }
    }
}

impl EngineConfig {
    pub fn stream_error_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_error_timeout_ms)
    }
}
