//! Reference framed record codec
//!
//! Frame layout: `[kind u8][flags u8][len u32 LE][payload]`. Flag bit 0
//! marks the last record; nothing after it is read. A container record's
//! body is `[algorithm u8][style u8]` and, when active, every later payload
//! is zstd-compressed on its own.

use super::{
    CodecError, CompressionAlgorithm, CompressionSettings, CompressionStyle, RecordCodec,
    RecordParser, RecordWriter,
};

const HEADER_LEN: usize = 6;
const FLAG_LAST: u8 = 0x01;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Container,
    DataSource,
    MonitorSettings,
    Observation,
}

impl RecordKind {
    fn code(self) -> u8 {
        match self {
            RecordKind::Container => 0,
            RecordKind::DataSource => 1,
            RecordKind::MonitorSettings => 2,
            RecordKind::Observation => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            0 => Ok(RecordKind::Container),
            1 => Ok(RecordKind::DataSource),
            2 => Ok(RecordKind::MonitorSettings),
            3 => Ok(RecordKind::Observation),
            other => Err(CodecError::InvalidRecord(format!("unknown record kind {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedRecord {
    pub kind: RecordKind,
    pub body: Vec<u8>,
}

impl FramedRecord {
    pub fn new(kind: RecordKind, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn container(settings: CompressionSettings) -> Self {
        let algorithm = match settings.algorithm {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Zstd => 1,
        };
        let style = match settings.style {
            CompressionStyle::None => 0,
            CompressionStyle::RecordLevel => 1,
        };
        Self::new(RecordKind::Container, vec![algorithm, style])
    }

    /// Compression settings carried by a container record
    pub fn compression(&self) -> Option<CompressionSettings> {
        if self.kind != RecordKind::Container {
            return None;
        }

        let algorithm = match self.body.first() {
            Some(1) => CompressionAlgorithm::Zstd,
            _ => CompressionAlgorithm::None,
        };
        let style = match self.body.get(1) {
            Some(1) => CompressionStyle::RecordLevel,
            _ => CompressionStyle::None,
        };
        Some(CompressionSettings { algorithm, style })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec;

impl RecordCodec for FramedCodec {
    type Record = FramedRecord;
    type Parser = FramedParser;
    type Writer = FramedWriter;

    fn open(&self, data: Vec<u8>) -> Result<FramedParser, CodecError> {
        Ok(FramedParser {
            data,
            pos: 0,
            saw_last: false,
            compression: CompressionSettings::default(),
        })
    }

    fn writer(&self) -> FramedWriter {
        FramedWriter {
            out: Vec::new(),
            compression: CompressionSettings::default(),
            wrote_last: false,
        }
    }

    fn container_compression(record: &FramedRecord) -> Option<CompressionSettings> {
        record.compression()
    }
}

pub struct FramedParser {
    data: Vec<u8>,
    pos: usize,
    saw_last: bool,
    compression: CompressionSettings,
}

impl RecordParser for FramedParser {
    type Record = FramedRecord;

    fn has_next_record(&self) -> bool {
        !self.saw_last && self.pos < self.data.len()
    }

    fn next_record(&mut self) -> Result<FramedRecord, CodecError> {
        let start = self.pos;
        let header = self
            .data
            .get(start..start + HEADER_LEN)
            .ok_or(CodecError::Truncated { offset: start })?;

        let kind = RecordKind::from_code(header[0])?;
        let flags = header[1];
        let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;

        let body_start = start + HEADER_LEN;
        let payload = self
            .data
            .get(body_start..body_start + len)
            .ok_or(CodecError::Truncated { offset: body_start })?;

        let body = if self.compression.is_active() {
            zstd::decode_all(payload).map_err(CodecError::Compression)?
        } else {
            payload.to_vec()
        };

        self.pos = body_start + len;
        self.saw_last = flags & FLAG_LAST != 0;
        Ok(FramedRecord { kind, body })
    }

    fn set_compression(&mut self, settings: CompressionSettings) {
        self.compression = settings;
    }
}

pub struct FramedWriter {
    out: Vec<u8>,
    compression: CompressionSettings,
    wrote_last: bool,
}

impl RecordWriter for FramedWriter {
    type Record = FramedRecord;

    fn write_record(&mut self, record: &FramedRecord, last: bool) -> Result<(), CodecError> {
        if self.wrote_last {
            return Err(CodecError::InvalidRecord(
                "record written after the last record".to_string(),
            ));
        }

        let payload = if self.compression.is_active() {
            zstd::encode_all(record.body.as_slice(), ZSTD_LEVEL).map_err(CodecError::Compression)?
        } else {
            record.body.clone()
        };
        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::InvalidRecord("record body too large".to_string()))?;

        self.out.push(record.kind.code());
        self.out.push(if last { FLAG_LAST } else { 0 });
        self.out.extend_from_slice(&len.to_le_bytes());
        self.out.extend_from_slice(&payload);
        self.wrote_last = last;
        Ok(())
    }

    fn set_compression(&mut self, settings: CompressionSettings) {
        self.compression = settings;
    }

    fn finish(self) -> Result<Vec<u8>, CodecError> {
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_all(records: &[FramedRecord]) -> Vec<u8> {
        let mut writer = FramedCodec.writer();
        for (i, record) in records.iter().enumerate() {
            writer.write_record(record, i + 1 == records.len()).unwrap();
            if let Some(settings) = FramedCodec::container_compression(record) {
                writer.set_compression(settings);
            }
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_uncompressed_layout() {
        let bytes = write_all(&[FramedRecord::new(RecordKind::Observation, b"ab".to_vec())]);
        assert_eq!(bytes, vec![3, FLAG_LAST, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_parser_stops_at_last_record() {
        let mut bytes = write_all(&[
            FramedRecord::new(RecordKind::DataSource, b"ds".to_vec()),
            FramedRecord::new(RecordKind::Observation, b"obs".to_vec()),
        ]);
        bytes.extend_from_slice(b"trailing garbage");

        let mut parser = FramedCodec.open(bytes).unwrap();
        let mut records = Vec::new();
        while parser.has_next_record() {
            records.push(parser.next_record().unwrap());
        }
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].body, b"obs");
    }

    #[test]
    fn test_truncated_record() {
        let bytes = write_all(&[FramedRecord::new(RecordKind::Observation, b"abcdef".to_vec())]);
        let mut parser = FramedCodec.open(bytes[..bytes.len() - 2].to_vec()).unwrap();
        assert!(matches!(
            parser.next_record(),
            Err(CodecError::Truncated { offset: 6 })
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let mut parser = FramedCodec.open(vec![9, FLAG_LAST, 0, 0, 0, 0]).unwrap();
        assert!(matches!(parser.next_record(), Err(CodecError::InvalidRecord(_))));
    }

    #[test]
    fn test_container_compression_round_trip() {
        let settings = CompressionSettings::zstd();
        let container = FramedRecord::container(settings);
        assert_eq!(container.compression(), Some(settings));
        assert_eq!(
            FramedRecord::new(RecordKind::Observation, vec![1, 1]).compression(),
            None
        );
    }

    #[test]
    fn test_compressed_bodies_need_container_settings() {
        let body = vec![7u8; 4096];
        let bytes = write_all(&[
            FramedRecord::container(CompressionSettings::zstd()),
            FramedRecord::new(RecordKind::Observation, body.clone()),
        ]);
        // The repetitive body must have been compressed on the way out
        assert!(bytes.len() < 1024);

        // A parser that never learns the container's settings sees raw zstd
        let mut naive = FramedCodec.open(bytes).unwrap();
        naive.next_record().unwrap();
        assert_ne!(naive.next_record().unwrap().body, body);
    }

    #[test]
    fn test_write_after_last_rejected() {
        let mut writer = FramedCodec.writer();
        let record = FramedRecord::new(RecordKind::Observation, Vec::new());
        writer.write_record(&record, true).unwrap();
        assert!(writer.write_record(&record, true).is_err());
    }
}
