use thiserror::Error;

/// Failures surfaced by the stream engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("No connection to the payment backend")]
    NoBackendConnection,

    #[error("Failed to get a fee quote: {0}")]
    FeeQuote(String),

    #[error("Invalid stream parameters: {0}")]
    InvalidDraft(String),

    #[error("No prepared stream to commit")]
    MissingDraft,

    #[error("Stream not found: {0}")]
    NotInStore(String),

    #[error("The remote node is offline")]
    RemoteOffline,

    #[error("The remote node is not responding")]
    RemoteNotResponding,

    #[error("{0}")]
    Remote(String),
}

impl StreamError {
    /// Stable identifier for logs and events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoBackendConnection => "no_backend_connection",
            Self::FeeQuote(_) => "fee_quote",
            Self::InvalidDraft(_) => "invalid_draft",
            Self::MissingDraft => "missing_draft",
            Self::NotInStore(_) => "not_in_store",
            Self::RemoteOffline => "remote_offline",
            Self::RemoteNotResponding => "remote_not_responding",
            Self::Remote(_) => "remote",
        }
    }
}
