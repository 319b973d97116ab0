use std::io;

use thiserror::Error;

/// Failure to turn bytes into a [`Record`](crate::Record).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error while reading input: {0}")]
    Io(#[from] io::Error),
    #[error("invalid UTF-8 on line {line_number}")]
    InvalidUtf8 { line_number: usize },
    #[error(
        "line too long (line_number={line_number}, observed_bytes={observed_bytes}, \
         max_line_bytes={max_line_bytes})"
    )]
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    #[error("invalid JSON on line {line_number}: {source}")]
    Json {
        line_number: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line_number} is not a JSON object")]
    NotAnObject { line_number: usize },
    #[error("invalid binary record: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("invalid frame header: {0}")]
    Header(#[source] prost::DecodeError),
    #[error("invalid byte at start of {context}: {found:#04x}")]
    InvalidMarker { context: &'static str, found: u8 },
    #[error("frame declares {declared} payload bytes, limit is {limit}")]
    FrameTooLarge { declared: usize, limit: usize },
    #[error("internal framing error: {0}")]
    Internal(String),
}

impl DecodeError {
    /// Whether the stream cannot continue: the reader failed or the decoder
    /// lost byte alignment.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::Io(_)
                | DecodeError::Header(_)
                | DecodeError::InvalidMarker { .. }
                | DecodeError::FrameTooLarge { .. }
                | DecodeError::Internal(_)
        )
    }
}

/// Errors raised by an input front-end.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported input format `{0}`")]
    UnsupportedFormat(String),
    #[error("failed to bind `{address}`: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("input source used before init")]
    NotInitialized,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
