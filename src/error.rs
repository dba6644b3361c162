//! Error types for sib-client.

use thiserror::Error;

/// Main error type for all SIB operations.
#[derive(Debug, Error)]
pub enum SibError {
    /// Payload longer than 8 bytes, or an arbitration value wider than 29 bits.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Physical or topic address constructed with out-of-range fields.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// PA-mode command does not fit in 3 bits.
    #[error("Invalid command: {0:#04x} does not fit in 3 bits")]
    InvalidCommand(u8),

    /// Short identifier is not exactly 5 bytes.
    #[error("Invalid short identifier: expected 5 bytes, got {0}")]
    InvalidIdentifier(usize),

    /// Numeric device type outside the known table.
    #[error("Unknown device type: {0}")]
    UnknownDeviceType(u8),

    /// Transport could not be acquired (missing parameters, connect failure).
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// A transmit attempt failed at the transport boundary.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation not allowed in the current session state.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the session was in.
        state: crate::session::SessionState,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error during socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using SibError.
pub type Result<T> = std::result::Result<T, SibError>;
