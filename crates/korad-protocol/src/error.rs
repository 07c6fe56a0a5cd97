//! Error types for command construction

use thiserror::Error;

/// Errors that can occur while rendering a command template
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Rendered command does not fit the wire buffer
    #[error("rendered command is {length} bytes, limit is {limit}")]
    TooLong { length: usize, limit: usize },

    /// Template has more directives than arguments were supplied
    #[error("missing argument for directive {index}")]
    MissingArgument { index: usize },

    /// Argument type does not fit the directive
    #[error("argument {index} does not fit directive %{directive}")]
    ArgumentMismatch { index: usize, directive: char },

    /// More arguments were supplied than the template consumes
    #[error("{0} argument(s) left unused")]
    UnusedArguments(usize),

    /// Unsupported or truncated `%` directive
    #[error("bad format directive: {0}")]
    BadDirective(String),
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Mnemonic is not in the command catalog
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Command could not be rendered
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}
