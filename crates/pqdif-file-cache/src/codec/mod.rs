//! Boundary with the record codec
//!
//! The binary record grammar lives behind [`RecordCodec`]: a parser that
//! materializes one record at a time and a writer that appends records in
//! order, marking the final one. The cache only relies on record order,
//! the last-record marker and the compression settings carried by
//! container records.

use std::fmt;

pub mod framed;
pub mod stream;

pub use framed::{FramedCodec, FramedRecord, RecordKind};
pub use stream::{encode_records, RecordStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Zstd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionStyle {
    #[default]
    None,
    /// Each record body is compressed on its own
    RecordLevel,
}

/// Compression configured by a container record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionSettings {
    pub algorithm: CompressionAlgorithm,
    pub style: CompressionStyle,
}

impl CompressionSettings {
    pub fn zstd() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Zstd,
            style: CompressionStyle::RecordLevel,
        }
    }

    pub fn is_active(&self) -> bool {
        self.algorithm != CompressionAlgorithm::None && self.style != CompressionStyle::None
    }
}

#[derive(Debug)]
pub enum CodecError {
    /// The stream ended inside a record
    Truncated { offset: usize },
    InvalidRecord(String),
    Compression(std::io::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Truncated { offset } => write!(f, "Truncated record at offset {}", offset),
            CodecError::InvalidRecord(msg) => write!(f, "Invalid record: {}", msg),
            CodecError::Compression(err) => write!(f, "Compression error: {}", err),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Compression(err) => Some(err),
            _ => None,
        }
    }
}

/// Forward-only reader over an opened byte stream
pub trait RecordParser: Send {
    type Record;

    fn has_next_record(&self) -> bool;

    fn next_record(&mut self) -> Result<Self::Record, CodecError>;

    /// Applies to every record read after this call
    fn set_compression(&mut self, settings: CompressionSettings);
}

/// Appends records to an output buffer
pub trait RecordWriter: Send {
    type Record;

    /// `last` must be set on exactly the final record
    fn write_record(&mut self, record: &Self::Record, last: bool) -> Result<(), CodecError>;

    /// Applies to every record written after this call
    fn set_compression(&mut self, settings: CompressionSettings);

    fn finish(self) -> Result<Vec<u8>, CodecError>;
}

pub trait RecordCodec: Send + Sync + 'static {
    type Record: Clone + Send + Sync + 'static;
    type Parser: RecordParser<Record = Self::Record>;
    type Writer: RecordWriter<Record = Self::Record>;

    fn open(&self, data: Vec<u8>) -> Result<Self::Parser, CodecError>;

    fn writer(&self) -> Self::Writer;

    /// Compression settings if `record` is a container record
    fn container_compression(record: &Self::Record) -> Option<CompressionSettings>;
}
