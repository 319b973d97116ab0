#![forbid(unsafe_code)]
//! Decoding and ingestion of typed event records.
//!
//! This crate provides:
//! - A format-agnostic [`Record`] with keyed (binary) and mapped (JSON) views.
//! - [`Decoder`]s for JSON lines, single-frame protobuf and the framed
//!   protobuf stream.
//! - Ingestion front-ends: one byte stream ([`StreamSource`]) or a TCP server
//!   fanning many connections into one bounded queue ([`TcpSource`]).

mod config;
mod decoder;
mod error;
pub mod heka;
pub mod input;
mod json;
mod reader;
mod record;

pub use config::{IngestConfig, IngestLimits, MAX_MESSAGE_BYTES};
pub use decoder::{Decoder, InputFormat};
pub use error::{DecodeError, IngestError};
pub use input::{RecordSource, StreamSource, TcpSource};
pub use json::LineDecoder;
pub use record::{Column, KeyedRecord, MappedRecord, Record, Value, TYPE_KEY};
