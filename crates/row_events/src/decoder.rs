use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::config::IngestLimits;
use crate::error::{DecodeError, IngestError};
use crate::heka::{FramedDecoder, SingleFrameDecoder};
use crate::json::LineDecoder;
use crate::record::Record;

/// Turns a byte source into a sequence of records.
///
/// `Ok(None)` means the source is exhausted. An `Err` describes one failed
/// record; the caller decides whether to keep reading unless
/// [`DecodeError::is_fatal`] says the stream cannot be resynchronised.
#[async_trait]
pub trait Decoder: Send {
    async fn read_next(&mut self) -> Result<Option<Record>, DecodeError>;
}

/// Wire format of an input stream.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum InputFormat {
    /// Newline-delimited JSON objects carrying a `type` key.
    #[default]
    Json,
    /// One protobuf record per physical read.
    Heka,
    /// Self-framed protobuf records on a continuous stream.
    HekaStream,
}

impl InputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Json => "json",
            InputFormat::Heka => "heka",
            InputFormat::HekaStream => "heka-stream",
        }
    }

    /// Builds a fresh decoder for `reader`.
    pub fn decoder<R>(self, reader: R, limits: IngestLimits) -> Box<dyn Decoder>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        match self {
            InputFormat::Json => Box::new(LineDecoder::new(reader, limits.max_line_bytes)),
            InputFormat::Heka => {
                Box::new(SingleFrameDecoder::new(reader, limits.max_message_bytes))
            }
            InputFormat::HekaStream => Box::new(FramedDecoder::new(reader, limits)),
        }
    }
}

impl FromStr for InputFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(InputFormat::Json),
            "heka" => Ok(InputFormat::Heka),
            "heka-stream" => Ok(InputFormat::HekaStream),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_round_trip() {
        for format in [InputFormat::Json, InputFormat::Heka, InputFormat::HekaStream] {
            assert_eq!(format.as_str().parse::<InputFormat>().unwrap(), format);
        }
        assert!(matches!(
            "xml".parse::<InputFormat>(),
            Err(IngestError::UnsupportedFormat(name)) if name == "xml"
        ));
    }
}
