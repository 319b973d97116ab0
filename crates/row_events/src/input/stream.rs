use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::config::IngestLimits;
use crate::decoder::{Decoder, InputFormat};
use crate::error::IngestError;
use crate::input::RecordSource;
use crate::record::Record;

/// Reads records from a single byte stream such as standard input.
pub struct StreamSource {
    decoder: Option<Box<dyn Decoder>>,
}

impl StreamSource {
    pub fn new<R>(reader: R, format: InputFormat, limits: IngestLimits) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::from_decoder(format.decoder(reader, limits))
    }

    pub fn from_decoder(decoder: Box<dyn Decoder>) -> Self {
        Self {
            decoder: Some(decoder),
        }
    }

    pub fn stdin(format: InputFormat, limits: IngestLimits) -> Self {
        Self::new(tokio::io::stdin(), format, limits)
    }
}

#[async_trait]
impl RecordSource for StreamSource {
    async fn init(&mut self) -> Result<(), IngestError> {
        Ok(())
    }

    async fn read_next(&mut self) -> Result<Option<Record>, IngestError> {
        match self.decoder.as_mut() {
            Some(decoder) => Ok(decoder.read_next().await?),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        self.decoder = None;
        Ok(())
    }
}
