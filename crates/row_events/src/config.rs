use std::time::Duration;

/// Largest binary record accepted, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IngestLimits {
    pub max_line_bytes: usize,
    pub max_message_bytes: usize,
}

impl IngestLimits {
    /// Worst-case size of one stream frame: markers, header length byte,
    /// a header of up to 255 bytes and the payload.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_message_bytes + 3 + u8::MAX as usize
    }
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IngestConfig {
    pub limits: IngestLimits,
    /// Deadline for one record read on a server connection.
    pub read_timeout: Duration,
    /// A connection is dropped once more than this many errors occur in a row.
    pub max_consecutive_errors: usize,
    /// Capacity of the queue shared by all server connections.
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            limits: IngestLimits::default(),
            read_timeout: Duration::from_secs(60),
            max_consecutive_errors: 30,
            queue_capacity: 1000,
        }
    }
}
