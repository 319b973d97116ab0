//! Ingestion front-ends.
//!
//! Both sources expose one consumption point: [`RecordSource::read_next`]
//! yields decoded records until it returns `Ok(None)`.

mod stream;
mod tcp;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::record::Record;

pub use stream::StreamSource;
pub use tcp::TcpSource;

#[async_trait]
pub trait RecordSource: Send {
    /// Acquires the underlying resources (for example binds the listener).
    async fn init(&mut self) -> Result<(), IngestError>;

    /// Next decoded record, or `Ok(None)` at end of input.
    async fn read_next(&mut self) -> Result<Option<Record>, IngestError>;

    /// Releases the source. Safe to call more than once.
    async fn close(&mut self) -> Result<(), IngestError>;
}
