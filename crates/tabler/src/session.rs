use std::path::Path;

use row_events::{
    IngestConfig, IngestError, InputFormat, Record, RecordSource, StreamSource, TcpSource,
};
use tracing::{debug, info, warn};

use crate::error::TablerError;
use crate::shaper::TableShaper;
use crate::sink;
use crate::store::{self, Store};
use crate::tabledef::TableDefinitions;

/// Rows written and rows rejected by one write run.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct WriteSummary {
    pub inserted: u64,
    pub skipped: u64,
}

/// Owns the input source and the store handle for one run.
///
/// Both are acquired by `init`/`write_rows` and released by [`Session::close`],
/// which may be called any number of times.
pub struct Session {
    config: IngestConfig,
    source: Option<Box<dyn RecordSource>>,
    store: Option<Box<dyn Store>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

impl Session {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            source: None,
            store: None,
        }
    }

    /// Reads from a TCP listener on `listen` when given, otherwise from
    /// standard input.
    pub async fn init(
        &mut self,
        listen: Option<&str>,
        format: InputFormat,
    ) -> Result<(), TablerError> {
        let source: Box<dyn RecordSource> = match listen {
            Some(address) => Box::new(TcpSource::new(address, format, self.config)),
            None => Box::new(StreamSource::stdin(format, self.config.limits)),
        };
        self.init_with(source).await
    }

    pub async fn init_with(
        &mut self,
        mut source: Box<dyn RecordSource>,
    ) -> Result<(), TablerError> {
        source.init().await?;
        if let Some(mut previous) = self.source.replace(source) {
            previous.close().await?;
        }
        Ok(())
    }

    /// Feeds every record into `shaper` until the input ends. Returns the
    /// number of records read.
    pub async fn generate_tables(&mut self, shaper: &mut TableShaper) -> Result<u64, TablerError> {
        let source = self.source.as_mut().ok_or(TablerError::NotInitialized)?;
        let mut count = 0u64;
        while let Some(record) = next_record(source.as_mut()).await? {
            count += 1;
            if let Err(err) = shaper.add(&record) {
                warn!(error = %err, "skipping record");
            }
        }
        debug!(records = count, tables = shaper.tables().len(), "input finished");
        Ok(count)
    }

    /// Loads table definitions from `tables_path`, connects to `dsn` and
    /// inserts every record read.
    pub async fn write_rows(
        &mut self,
        tables_path: &Path,
        dsn: &str,
    ) -> Result<WriteSummary, TablerError> {
        let tables = TableDefinitions::read_file(tables_path)?;
        let store = store::connect(dsn).await?;
        self.write_with(tables, store).await
    }

    pub async fn write_with(
        &mut self,
        mut tables: TableDefinitions,
        store: Box<dyn Store>,
    ) -> Result<WriteSummary, TablerError> {
        if let Some(mut previous) = self.store.replace(store) {
            previous.close().await?;
        }
        let Self { source, store, .. } = self;
        let source = source.as_mut().ok_or(TablerError::NotInitialized)?;
        let store = store.as_mut().ok_or(TablerError::NotInitialized)?;

        tables.prepare(store.dialect());
        sink::create_all(store.as_mut(), &tables).await?;

        let mut summary = WriteSummary::default();
        while let Some(record) = next_record(source.as_mut()).await? {
            match sink::insert(store.as_mut(), &tables, &record).await {
                Ok(()) => summary.inserted += 1,
                Err(err) => {
                    summary.skipped += 1;
                    warn!(error = %err, "skipping record");
                }
            }
        }
        info!(inserted = summary.inserted, skipped = summary.skipped, "input finished");
        Ok(summary)
    }

    /// Releases the source and the store. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<(), TablerError> {
        let source = match self.source.take() {
            Some(mut source) => source.close().await.map_err(TablerError::from),
            None => Ok(()),
        };
        let store = match self.store.take() {
            Some(mut store) => store.close().await.map_err(TablerError::from),
            None => Ok(()),
        };
        source.and(store)
    }
}

/// Next record, skipping decode errors the input can recover from.
async fn next_record(source: &mut dyn RecordSource) -> Result<Option<Record>, IngestError> {
    loop {
        match source.read_next().await {
            Ok(record) => return Ok(record),
            Err(IngestError::Decode(err)) if !err.is_fatal() => {
                warn!(error = %err, "skipping undecodable input");
            }
            Err(err) => return Err(err),
        }
    }
}
