//! Error types for pulse-link.

use thiserror::Error;

/// Errors surfaced by the pulse-link client.
///
/// Decode failures have their own taxonomy ([`crate::decode::DecodeError`])
/// because they are sample-local and never propagate as stream faults.
#[derive(Error, Debug)]
pub enum PulseLinkError {
    /// Invalid client or query configuration (bad endpoint, empty topic, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure: connect refused, socket closed, handshake
    /// rejected by the broker.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded operation did not complete in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Wire envelope could not be serialized or parsed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for pulse-link operations.
pub type Result<T> = std::result::Result<T, PulseLinkError>;
