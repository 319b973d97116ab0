use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::decoder::{Decoder, InputFormat};
use crate::error::IngestError;
use crate::input::RecordSource;
use crate::record::Record;

/// Why a connection worker stopped.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum ConnectionEnd {
    EndOfStream,
    IdleTimeout,
    TooManyErrors,
    Fatal,
    ConsumerGone,
}

/// Listens on a TCP address and fans records from every accepted connection
/// into one bounded queue.
///
/// Each connection gets its own decoder and task. Producers wait once
/// `queue_capacity` records are undelivered, so memory stays bounded no
/// matter how many peers connect. Records from one connection keep their
/// order; records from different connections interleave.
pub struct TcpSource {
    address: String,
    format: InputFormat,
    config: IngestConfig,
    local_addr: Option<SocketAddr>,
    receiver: Option<mpsc::Receiver<Record>>,
    acceptor: Option<JoinHandle<()>>,
}

impl TcpSource {
    pub fn new(address: impl Into<String>, format: InputFormat, config: IngestConfig) -> Self {
        Self {
            address: address.into(),
            format,
            config,
            local_addr: None,
            receiver: None,
            acceptor: None,
        }
    }

    /// Bound address, available after [`RecordSource::init`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl RecordSource for TcpSource {
    async fn init(&mut self) -> Result<(), IngestError> {
        let bind_err = |source: std::io::Error| {
            error!(address = %self.address, error = %source, "listen failed");
            IngestError::Bind {
                address: self.address.clone(),
                source,
            }
        };
        let listener = TcpListener::bind(&self.address).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(address = %local_addr, format = %self.format, "listening");

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity);
        self.acceptor = Some(tokio::spawn(accept_loop(
            listener,
            sender,
            self.format,
            self.config,
        )));
        self.receiver = Some(receiver);
        self.local_addr = Some(local_addr);
        Ok(())
    }

    async fn read_next(&mut self) -> Result<Option<Record>, IngestError> {
        let receiver = self.receiver.as_mut().ok_or(IngestError::NotInitialized)?;
        Ok(receiver.recv().await)
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            info!(address = ?self.local_addr, "listener closed");
        }
        Ok(())
    }
}

impl Drop for TcpSource {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    sender: mpsc::Sender<Record>,
    format: InputFormat,
    config: IngestConfig,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                error!(error = %err, "accept failed; no longer accepting connections");
                return;
            }
        };
        info!(%peer, "connection accepted");

        let mut decoder = format.decoder(stream, config.limits);
        let sender = sender.clone();
        tokio::spawn(async move {
            let (end, records) = receive_records(decoder.as_mut(), &sender, &config).await;
            info!(%peer, ?end, records, "connection closed");
        });
    }
}

/// Pumps one connection's decoder into the shared queue.
///
/// Returns why the loop stopped and how many records were forwarded.
pub(crate) async fn receive_records(
    decoder: &mut dyn Decoder,
    sender: &mpsc::Sender<Record>,
    config: &IngestConfig,
) -> (ConnectionEnd, u64) {
    let mut consecutive_errors = 0usize;
    let mut records = 0u64;

    loop {
        let outcome = match time::timeout(config.read_timeout, decoder.read_next()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(timeout = ?config.read_timeout, "read deadline expired");
                return (ConnectionEnd::IdleTimeout, records);
            }
        };

        match outcome {
            Ok(Some(record)) => {
                consecutive_errors = 0;
                if sender.send(record).await.is_err() {
                    return (ConnectionEnd::ConsumerGone, records);
                }
                records += 1;
            }
            Ok(None) => return (ConnectionEnd::EndOfStream, records),
            Err(err) if err.is_fatal() => {
                warn!(error = %err, "unrecoverable decode error");
                return (ConnectionEnd::Fatal, records);
            }
            Err(err) => {
                consecutive_errors += 1;
                warn!(error = %err, consecutive_errors, "decode error");
                if consecutive_errors > config.max_consecutive_errors {
                    warn!(
                        max = config.max_consecutive_errors,
                        "too many consecutive errors; dropping connection"
                    );
                    return (ConnectionEnd::TooManyErrors, records);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;
    use crate::error::DecodeError;

    enum Scripted {
        Record(&'static str),
        Error,
        Fatal,
        Stall,
    }

    struct ScriptedDecoder(VecDeque<Scripted>);

    #[async_trait]
    impl Decoder for ScriptedDecoder {
        async fn read_next(&mut self) -> Result<Option<Record>, DecodeError> {
            match self.0.pop_front() {
                None => Ok(None),
                Some(Scripted::Record(ty)) => {
                    let mut fields = serde_json::Map::new();
                    fields.insert("type".into(), ty.into());
                    Ok(Some(Record::Mapped(crate::MappedRecord::new(fields))))
                }
                Some(Scripted::Error) => Err(DecodeError::InvalidUtf8 { line_number: 0 }),
                Some(Scripted::Fatal) => Err(DecodeError::Internal("lost".into())),
                Some(Scripted::Stall) => std::future::pending().await,
            }
        }
    }

    fn config() -> IngestConfig {
        IngestConfig {
            max_consecutive_errors: 3,
            read_timeout: Duration::from_secs(60),
            ..IngestConfig::default()
        }
    }

    async fn run(script: Vec<Scripted>) -> (ConnectionEnd, u64, Vec<Record>) {
        let (sender, mut receiver) = mpsc::channel(16);
        let mut decoder = ScriptedDecoder(script.into());
        let (end, count) = receive_records(&mut decoder, &sender, &config()).await;
        drop(sender);
        let mut seen = Vec::new();
        while let Some(record) = receiver.recv().await {
            seen.push(record);
        }
        (end, count, seen)
    }

    #[tokio::test]
    async fn error_counter_resets_on_success() {
        use Scripted::*;
        let (end, count, seen) = run(vec![
            Error, Error, Error, Record("a"), Error, Error, Error, Record("b"),
        ])
        .await;
        assert_eq!(end, ConnectionEnd::EndOfStream);
        assert_eq!(count, 2);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn drops_connection_after_too_many_consecutive_errors() {
        use Scripted::*;
        let (end, count, _) = run(vec![Record("a"), Error, Error, Error, Error, Record("b")]).await;
        assert_eq!(end, ConnectionEnd::TooManyErrors);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn fatal_error_ends_connection() {
        use Scripted::*;
        let (end, count, _) = run(vec![Fatal, Record("a")]).await;
        assert_eq!(end, ConnectionEnd::Fatal);
        assert_eq!(count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        use Scripted::*;
        let (end, count, seen) = run(vec![Record("a"), Stall]).await;
        assert_eq!(end, ConnectionEnd::IdleTimeout);
        assert_eq!(count, 1);
        assert_eq!(seen[0].record_type(), Some("a"));
    }

    #[tokio::test]
    async fn full_queue_holds_back_the_worker() {
        let (sender, mut receiver) = mpsc::channel(2);
        let worker = tokio::spawn(async move {
            let mut decoder = ScriptedDecoder((0..5).map(|_| Scripted::Record("a")).collect());
            receive_records(&mut decoder, &sender, &config()).await
        });

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(!worker.is_finished());
        assert_eq!(receiver.len(), 2);

        let mut seen = 0;
        while receiver.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 5);
        assert_eq!(worker.await.unwrap(), (ConnectionEnd::EndOfStream, 5));
    }

    #[tokio::test]
    async fn consumer_gone_stops_worker() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let mut decoder = ScriptedDecoder(vec![Scripted::Record("a")].into());
        let (end, count) = receive_records(&mut decoder, &sender, &config()).await;
        assert_eq!(end, ConnectionEnd::ConsumerGone);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn read_before_init_is_an_error() {
        let mut source = TcpSource::new("127.0.0.1:0", InputFormat::Json, IngestConfig::default());
        assert!(matches!(
            source.read_next().await,
            Err(IngestError::NotInitialized)
        ));
    }
}
