use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Error texts that mean the backend or node could not be reached or
    /// answered with something unparsable.
    static ref UNREACHABLE: Regex = Regex::new(
        r"(?i)(invalid response|host unreachable|network unreachable|connection refused|error sending request|failed to connect|dns error)"
    )
    .expect("unreachable pattern is valid");
}

/// True if a remote error indicates the node is offline rather than a
/// payment-level failure.
pub fn is_unreachable(err: &anyhow::Error) -> bool {
    UNREACHABLE.is_match(&format!("{err:#}"))
}
