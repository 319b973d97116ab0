//! Buffered state machine for the self-framed record stream.
//!
//! A frame is laid out as
//!
//! ```text
//! 0x1E | header_len: u8 | header (header_len bytes) | 0x1F | payload
//! ```
//!
//! where the protobuf header declares the payload length. The parser owns one
//! buffer sized for the largest legal frame and never performs I/O itself:
//! callers feed it through [`FrameParser::spare_mut`] / [`FrameParser::commit`]
//! and pull payloads with [`FrameParser::advance`]. This keeps all cursor
//! arithmetic testable without a reader.

use std::ops::Range;

use prost::Message as _;

use crate::error::DecodeError;
use crate::heka::message::Header;

pub const START_MARKER: u8 = 0x1e;
pub const RECORD_MARKER: u8 = 0x1f;

/// Marker byte plus header length byte.
const HEADER_OFFSET: usize = 2;

/// Byte arena with a consumed-start and a valid-end cursor.
///
/// Bytes in `start..end` are buffered but not yet consumed; `end..capacity`
/// is free space for the next read.
#[derive(Debug)]
pub(crate) struct FrameBuffer {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl FrameBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    pub(crate) fn pending(&self) -> usize {
        self.end - self.start
    }

    fn byte(&self, pos: usize) -> u8 {
        self.buf[pos]
    }

    fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.end..]
    }

    pub(crate) fn commit(&mut self, n: usize) {
        debug_assert!(self.end + n <= self.buf.len(), "commit past capacity");
        self.end = (self.end + n).min(self.buf.len());
    }

    fn consume_to(&mut self, pos: usize) {
        debug_assert!(self.start <= pos && pos <= self.end);
        self.start = pos;
    }

    /// Moves the unconsumed tail to the front of the buffer and returns the
    /// distance every in-flight offset has to be shifted down by.
    pub(crate) fn compact(&mut self) -> usize {
        let shift = self.start;
        if shift == 0 {
            return 0;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= shift;
        self.start = 0;
        shift
    }
}

/// Parse progress for the frame starting at `FrameBuffer::start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameState {
    AwaitingHeaderMarker,
    AwaitingHeaderBody { header: Range<usize> },
    AwaitingPayload { payload: Range<usize> },
}

impl FrameState {
    fn rebase(&mut self, shift: usize) {
        match self {
            FrameState::AwaitingHeaderMarker => {}
            FrameState::AwaitingHeaderBody { header: range }
            | FrameState::AwaitingPayload { payload: range } => {
                range.start -= shift;
                range.end -= shift;
            }
        }
    }

    /// Buffer position up to which bytes must be present before this state
    /// can make progress.
    fn required_end(&self, start: usize) -> usize {
        match self {
            FrameState::AwaitingHeaderMarker => start + HEADER_OFFSET,
            FrameState::AwaitingHeaderBody { header } => header.end,
            FrameState::AwaitingPayload { payload } => payload.end,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// More bytes are needed before the current state can progress.
    NeedMore,
    /// A complete payload is buffered at this range. It stays valid until
    /// the next call to [`FrameParser::prepare_read`].
    Frame(Range<usize>),
}

#[derive(Debug)]
pub(crate) struct FrameParser {
    buffer: FrameBuffer,
    state: FrameState,
    max_message_bytes: usize,
}

impl FrameParser {
    pub(crate) fn new(max_message_bytes: usize, capacity: usize) -> Self {
        Self {
            buffer: FrameBuffer::with_capacity(capacity),
            state: FrameState::AwaitingHeaderMarker,
            max_message_bytes,
        }
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &FrameState {
        &self.state
    }

    pub(crate) fn payload(&self, range: Range<usize>) -> &[u8] {
        self.buffer.slice(range)
    }

    /// True while a partially buffered frame is pending.
    pub(crate) fn is_mid_frame(&self) -> bool {
        self.state != FrameState::AwaitingHeaderMarker || self.buffer.pending() > 0
    }

    /// Runs the state machine as far as the buffered bytes allow.
    pub(crate) fn advance(&mut self) -> Result<Step, DecodeError> {
        loop {
            match &self.state {
                FrameState::AwaitingHeaderMarker => {
                    let start = self.buffer.start();
                    if self.buffer.end() < start + HEADER_OFFSET {
                        return Ok(Step::NeedMore);
                    }
                    let marker = self.buffer.byte(start);
                    if marker != START_MARKER {
                        return Err(DecodeError::InvalidMarker {
                            context: "frame",
                            found: marker,
                        });
                    }
                    let header_start = start + HEADER_OFFSET;
                    let header_len = self.buffer.byte(start + 1) as usize;
                    self.state = FrameState::AwaitingHeaderBody {
                        header: header_start..header_start + header_len,
                    };
                }
                FrameState::AwaitingHeaderBody { header } => {
                    if self.buffer.end() < header.end {
                        return Ok(Step::NeedMore);
                    }
                    let decoded = Header::decode(self.buffer.slice(header.clone()))
                        .map_err(DecodeError::Header)?;
                    let declared = decoded.message_length as usize;
                    if declared > self.max_message_bytes {
                        return Err(DecodeError::FrameTooLarge {
                            declared,
                            limit: self.max_message_bytes,
                        });
                    }
                    // One byte for the record marker sits between header and payload.
                    let payload_start = header.end + 1;
                    self.state = FrameState::AwaitingPayload {
                        payload: payload_start..payload_start + declared,
                    };
                }
                FrameState::AwaitingPayload { payload } => {
                    if self.buffer.end() < payload.start {
                        return Ok(Step::NeedMore);
                    }
                    let marker = self.buffer.byte(payload.start - 1);
                    if marker != RECORD_MARKER {
                        return Err(DecodeError::InvalidMarker {
                            context: "record",
                            found: marker,
                        });
                    }
                    if self.buffer.end() < payload.end {
                        return Ok(Step::NeedMore);
                    }
                    let frame = payload.clone();
                    self.buffer.consume_to(frame.end);
                    self.state = FrameState::AwaitingHeaderMarker;
                    return Ok(Step::Frame(frame));
                }
            }
        }
    }

    /// Ensures the bytes required by the current state fit behind the valid
    /// end, compacting the buffer when they do not.
    pub(crate) fn prepare_read(&mut self) -> Result<(), DecodeError> {
        if self.buffer.pending() == 0 && self.state == FrameState::AwaitingHeaderMarker {
            self.buffer.start = 0;
            self.buffer.end = 0;
            return Ok(());
        }

        let capacity = self.buffer.capacity();
        let required = self.state.required_end(self.buffer.start());
        if required <= capacity && self.buffer.end() < capacity {
            return Ok(());
        }
        if self.buffer.start() == 0 {
            return Err(DecodeError::Internal(format!(
                "buffer full and insufficient (required_end={required}, capacity={capacity})"
            )));
        }
        let shift = self.buffer.compact();
        self.state.rebase(shift);
        Ok(())
    }

    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        self.buffer.spare_mut()
    }

    pub(crate) fn commit(&mut self, n: usize) {
        self.buffer.commit(n);
    }
}

/// Frames an encoded record for the stream format.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let header = Header {
        message_length: payload.len() as u32,
        ..Default::default()
    }
    .encode_to_vec();
    debug_assert!(header.len() <= u8::MAX as usize);

    let mut frame = Vec::with_capacity(HEADER_OFFSET + header.len() + 1 + payload.len());
    frame.push(START_MARKER);
    frame.push(header.len() as u8);
    frame.extend_from_slice(&header);
    frame.push(RECORD_MARKER);
    frame.extend_from_slice(payload);
    frame
}
