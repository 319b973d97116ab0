use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const READ_BUFFER_BYTES: usize = 8192;

#[derive(Debug)]
pub(crate) enum BoundedLine {
    Line {
        line_number: usize,
        bytes: Vec<u8>,
    },
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
    },
    IoError {
        line_number: usize,
        source: io::Error,
    },
}

/// Splits an async byte stream into `\n`-terminated lines, keeping at most
/// `max_line_bytes` of any one line in memory.
///
/// An over-long line is drained up to its newline and reported once as
/// [`BoundedLine::LineTooLong`]; the following line is read normally.
pub(crate) struct BoundedLineReader<R> {
    reader: BufReader<R>,
    max_line_bytes: usize,
    line: Vec<u8>,
    line_number: usize,
    done: bool,
}

impl<R: AsyncRead + Unpin> BoundedLineReader<R> {
    pub(crate) fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_BYTES, reader),
            max_line_bytes,
            line: Vec::new(),
            line_number: 0,
            done: false,
        }
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    /// Returns the next line, or `None` once the stream is exhausted.
    ///
    /// A read error is reported once and ends the stream.
    pub(crate) async fn next_line(&mut self) -> Option<BoundedLine> {
        if self.done {
            return None;
        }
        self.line.clear();
        let mut observed = 0usize;

        loop {
            let chunk = match self.reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(source) => {
                    self.done = true;
                    self.line_number += 1;
                    return Some(BoundedLine::IoError {
                        line_number: self.line_number,
                        source,
                    });
                }
            };
            if chunk.is_empty() {
                self.done = true;
                return (observed > 0).then(|| self.take_line(observed));
            }

            let newline = chunk.iter().position(|b| *b == b'\n');
            let segment = &chunk[..newline.unwrap_or(chunk.len())];
            observed = observed.saturating_add(segment.len());
            if observed > self.max_line_bytes {
                self.line.clear();
            } else {
                self.line.extend_from_slice(segment);
            }

            match newline {
                Some(idx) => {
                    self.reader.consume(idx + 1);
                    return Some(self.take_line(observed));
                }
                None => {
                    let len = chunk.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    fn take_line(&mut self, observed: usize) -> BoundedLine {
        self.line_number += 1;
        if observed > self.max_line_bytes {
            return BoundedLine::LineTooLong {
                line_number: self.line_number,
                observed_bytes: observed,
                max_line_bytes: self.max_line_bytes,
            };
        }
        BoundedLine::Line {
            line_number: self.line_number,
            bytes: std::mem::take(&mut self.line),
        }
    }
}
