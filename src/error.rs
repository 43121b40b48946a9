//! # Error Types
//!
//! Custom error types for Directolor using `thiserror`.

use thiserror::Error;

/// Main error type for Directolor
#[derive(Debug, Error)]
pub enum DirectolorError {
    /// Remote index outside the configured table (remotes are 1-based)
    #[error("remote {0} is not configured (valid remotes are 1..={1})")]
    InvalidRemote(usize, usize),

    /// Channel mask is empty or targets channels beyond the sixth
    #[error("invalid channel mask {0:#010b}")]
    InvalidChannelMask(u8),

    /// Single channel number outside 1..=6
    #[error("invalid channel {0} (valid channels are 1..=6)")]
    InvalidChannel(u8),

    /// Duplicate frames are only ever sent as a join/remove precursor
    #[error("duplicate action cannot be submitted directly")]
    DirectDuplicate,

    /// Radio transceiver has not been started
    #[error("radio is not available")]
    RadioUnavailable,

    /// Operator console input that does not parse
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Wire protocol errors
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Traffic log serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker has shut down
    #[error("scheduler has shut down")]
    Shutdown,
}

/// Result type alias for Directolor
pub type Result<T> = std::result::Result<T, DirectolorError>;
