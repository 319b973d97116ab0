use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::reader::{BoundedLine, BoundedLineReader};
use crate::record::{MappedRecord, Record};

/// Decodes one JSON object per line.
///
/// A malformed line yields an error for that line only; the next call
/// continues with the following line.
pub struct LineDecoder<R> {
    reader: BoundedLineReader<R>,
}

impl<R: AsyncRead + Unpin> LineDecoder<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader: BoundedLineReader::new(reader, max_line_bytes),
        }
    }

    /// Number of lines consumed so far, including blank ones.
    pub fn line_number(&self) -> usize {
        self.reader.line_number()
    }

    fn normalize_line(line: &str) -> &str {
        line.strip_suffix('\r').unwrap_or(line)
    }

    fn line_is_blank(line: &str) -> bool {
        line.chars().all(|ch| ch.is_whitespace())
    }

    fn parse_line(line_number: usize, line: &str) -> Result<Record, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|source| DecodeError::Json {
                line_number,
                source,
            })?;
        match value {
            serde_json::Value::Object(fields) => Ok(Record::Mapped(MappedRecord::new(fields))),
            _ => Err(DecodeError::NotAnObject { line_number }),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Decoder for LineDecoder<R> {
    async fn read_next(&mut self) -> Result<Option<Record>, DecodeError> {
        loop {
            let Some(next) = self.reader.next_line().await else {
                return Ok(None);
            };
            match next {
                BoundedLine::IoError { source, .. } => return Err(DecodeError::Io(source)),
                BoundedLine::LineTooLong {
                    line_number,
                    observed_bytes,
                    max_line_bytes,
                } => {
                    return Err(DecodeError::LineTooLong {
                        line_number,
                        observed_bytes,
                        max_line_bytes,
                    });
                }
                BoundedLine::Line { line_number, bytes } => {
                    let Ok(raw_line) = String::from_utf8(bytes) else {
                        return Err(DecodeError::InvalidUtf8 { line_number });
                    };
                    let line = Self::normalize_line(&raw_line);
                    if Self::line_is_blank(line) {
                        continue;
                    }
                    return Self::parse_line(line_number, line).map(Some);
                }
            }
        }
    }
}
