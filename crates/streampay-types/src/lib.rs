// Shared types: stream model, persisted records, errors, events, store contract

pub mod config;
pub mod error;
pub mod event;
pub mod record;
pub mod store;
pub mod stream;

pub use config::{DEFAULT_STREAM_ERROR_TIMEOUT_MS, EngineConfig};
pub use error::StreamError;
pub use event::{STREAM_ERROR_CATEGORY, StreamEvent};
pub use record::{PersistedStatus, StreamPart, StreamRecord};
pub use store::StreamStore;
pub use stream::{StreamPayment, StreamStatus};
