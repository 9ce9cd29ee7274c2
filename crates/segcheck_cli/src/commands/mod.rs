//! CLI command implementations.

pub mod inspect;
pub mod livedocs;

use thiserror::Error;

/// Errors raised by command argument handling.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No codec is registered under the name.
    #[error("unknown codec {0:?} (expected adaptive or dense)")]
    UnknownCodec(String),

    /// The output format is not supported.
    #[error("unknown output format {0:?} (expected text or json)")]
    UnknownFormat(String),
}

/// How a command prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses `text` or `json`.
    pub fn parse(value: &str) -> Result<Self, CommandError> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CommandError::UnknownFormat(other.to_string())),
        }
    }
}
