//! Error types for stickycache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the router, the shard adapters and the storage node
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Core taxonomy
    // =========================================================================
    /// Key is absent from the router index or from a node's map
    #[error("key {key:?} not found")]
    NotFound { key: String },

    /// Target shard is not alive
    #[error("storage {addr:?} is not alive")]
    Unavailable { addr: String },

    /// No shard accepted a write during the failover scan
    #[error("no storage accepted key {key:?}")]
    Exhausted { key: String },

    /// Malformed caller input
    #[error("invalid request: {0}")]
    Invalid(String),

    // =========================================================================
    // Shard call failures
    // =========================================================================
    /// Shard call did not complete in time
    #[error("call to storage {addr:?} timed out")]
    Timeout { addr: String },

    /// Shard could not be reached
    #[error("transport error talking to storage {addr:?}: {source}")]
    Transport {
        addr: String,
        #[source]
        source: reqwest::Error,
    },

    /// Shard answered with an unexpected status
    #[error("storage {addr:?} answered with status {status}")]
    ShardResponse { addr: String, status: u16 },

    // =========================================================================
    // Process plumbing
    // =========================================================================
    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`]
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Shorthand for [`Error::Unavailable`]
    pub fn unavailable(addr: impl Into<String>) -> Self {
        Error::Unavailable { addr: addr.into() }
    }

    /// True for the absence signal, which callers must keep apart from failures
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinguishable() {
        assert!(Error::not_found("k").is_not_found());
        assert!(!Error::unavailable("http://a/").is_not_found());
        assert!(!Error::Exhausted { key: "k".into() }.is_not_found());
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::not_found("k").to_string(), "key \"k\" not found");
        assert_eq!(
            Error::unavailable("http://a/").to_string(),
            "storage \"http://a/\" is not alive"
        );
        assert_eq!(
            Error::ShardResponse {
                addr: "http://a/".into(),
                status: 500
            }
            .to_string(),
            "storage \"http://a/\" answered with status 500"
        );
    }
}
