//! Error types for the driver

use korad_detect::DetectError;
use korad_protocol::{FormatError, ProtocolError};
use thiserror::Error;

/// Errors that can occur while discovering or driving a power supply
#[derive(Debug, Error)]
pub enum DriverError {
    /// No port answered the identification handshake
    #[error("no supported power supply found")]
    NotFound,

    /// Port enumeration or opening failed
    #[error("communication error: {0}")]
    Communication(#[from] DetectError),

    /// Mnemonic is not in the command catalog
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Arguments did not fit the command template
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Reading a reply failed
    #[error("read error: {0}")]
    ReadError(String),

    /// Writing a command failed or timed out
    ///
    /// The command stays unsent at the head of the queue, even if part of
    /// it reached the port, and the next `drive` writes it again in full.
    #[error("write error: {0}")]
    WriteError(String),

    /// The device was stopped or closed; nothing will be sent
    #[error("device stopped")]
    Stopped,

    /// Reply did not fit the receive buffer; the device needs a reset
    #[error("receive buffer overflow ({capacity} bytes)")]
    BufferOverflow {
        /// Receive buffer capacity
        capacity: usize,
    },
}

impl From<ProtocolError> for DriverError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::UnknownCommand(mnemonic) => DriverError::UnknownCommand(mnemonic),
            ProtocolError::Format(e) => DriverError::Format(e),
        }
    }
}

/// Errors loading or saving a [`DriverConfig`](crate::DriverConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
