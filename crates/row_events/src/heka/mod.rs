//! Binary record decoders.
//!
//! Records are Heka protobuf messages, either one per physical read
//! ([`SingleFrameDecoder`]) or self-framed on a continuous stream
//! ([`FramedDecoder`]).

mod frame;
mod message;

use async_trait::async_trait;
use prost::Message as _;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::config::IngestLimits;
use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::record::Record;

pub use frame::{encode_frame, RECORD_MARKER, START_MARKER};
pub use message::{Field, Header, Message, ValueType, TIMESTAMP_COLUMN};

use frame::{FrameParser, Step};

const RECORD_COUNT_LOG_INTERVAL: u64 = 100;

/// Treats each physical read as exactly one encoded record.
///
/// Only meaningful for datagram-like sources where reads preserve message
/// boundaries.
pub struct SingleFrameDecoder<R> {
    reader: R,
    buf: Box<[u8]>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> SingleFrameDecoder<R> {
    pub fn new(reader: R, max_message_bytes: usize) -> Self {
        Self {
            reader,
            buf: vec![0u8; max_message_bytes].into_boxed_slice(),
            finished: false,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Decoder for SingleFrameDecoder<R> {
    async fn read_next(&mut self) -> Result<Option<Record>, DecodeError> {
        if self.finished {
            return Ok(None);
        }
        let n = match self.reader.read(&mut self.buf).await {
            Ok(0) => {
                self.finished = true;
                return Ok(None);
            }
            Ok(n) => n,
            Err(err) => {
                self.finished = true;
                return Err(err.into());
            }
        };
        let message = Message::decode(&self.buf[..n])?;
        Ok(Some(message.into_record()))
    }
}

/// Decodes the self-framed record stream.
///
/// Each call yields one record. Read errors and framing errors finish the
/// decoder: the error is returned once and every later call reports end of
/// input.
pub struct FramedDecoder<R> {
    reader: R,
    parser: FrameParser,
    records: u64,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FramedDecoder<R> {
    pub fn new(reader: R, limits: IngestLimits) -> Self {
        Self::with_capacity(reader, limits.max_message_bytes, limits.max_frame_bytes())
    }

    fn with_capacity(reader: R, max_message_bytes: usize, capacity: usize) -> Self {
        Self {
            reader,
            parser: FrameParser::new(max_message_bytes, capacity),
            records: 0,
            finished: false,
        }
    }

    /// Records successfully framed so far.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    fn fail(&mut self, err: DecodeError) -> DecodeError {
        if err.is_fatal() {
            self.finished = true;
        }
        err
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Decoder for FramedDecoder<R> {
    async fn read_next(&mut self) -> Result<Option<Record>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let step = match self.parser.advance() {
                Ok(step) => step,
                Err(err) => return Err(self.fail(err)),
            };

            match step {
                Step::Frame(range) => {
                    self.records += 1;
                    if self.records % RECORD_COUNT_LOG_INTERVAL == 0 {
                        debug!(records = self.records, "framed record count");
                    }
                    let message = Message::decode(self.parser.payload(range))?;
                    return Ok(Some(message.into_record()));
                }
                Step::NeedMore => {
                    if let Err(err) = self.parser.prepare_read() {
                        return Err(self.fail(err));
                    }
                    let n = match self.reader.read(self.parser.spare_mut()).await {
                        Ok(n) => n,
                        Err(err) => return Err(self.fail(err.into())),
                    };
                    if n == 0 {
                        self.finished = true;
                        if self.parser.is_mid_frame() {
                            warn!(
                                records = self.records,
                                "end of stream inside a frame; discarding partial frame"
                            );
                        }
                        return Ok(None);
                    }
                    self.parser.commit(n);
                }
            }
        }
    }
}
