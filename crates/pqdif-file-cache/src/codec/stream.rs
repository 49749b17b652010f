//! Cooperative streaming decode and encode
//!
//! Both loops stop at a yield point after every record. The configured
//! [`YieldStrategy`] decides what yielding means; the cancellation token is
//! observed there, never in the middle of a record.

use super::{RecordCodec, RecordParser, RecordWriter};
use crate::config::YieldStrategy;
use crate::error::{FileCacheError, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lazy, forward-only sequence of decoded records
///
/// Single pass: once consumed, decoding again means reopening the bytes.
pub struct RecordStream<C: RecordCodec> {
    parser: C::Parser,
    yield_strategy: YieldStrategy,
    cancel: CancellationToken,
    decoded: usize,
}

impl<C: RecordCodec> RecordStream<C> {
    pub fn open(
        codec: &C,
        data: Vec<u8>,
        yield_strategy: YieldStrategy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            parser: codec.open(data)?,
            yield_strategy,
            cancel,
            decoded: 0,
        })
    }

    /// Number of records produced so far
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Materialize the next record, then yield
    ///
    /// A container record reconfigures decompression for the rest of the
    /// stream before it is handed out.
    pub async fn next(&mut self) -> Option<Result<C::Record>> {
        if self.cancel.is_cancelled() {
            return Some(Err(FileCacheError::Cancelled));
        }

        if !self.parser.has_next_record() {
            return None;
        }

        let record = match self.parser.next_record() {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };

        if let Some(settings) = C::container_compression(&record) {
            debug!(?settings, "Container record configured compression");
            self.parser.set_compression(settings);
        }

        self.decoded += 1;

        if let Err(e) = yield_point(self.yield_strategy, &self.cancel).await {
            return Some(Err(e));
        }

        Some(Ok(record))
    }

    /// Drain the stream into a vector
    pub async fn collect(mut self) -> Result<Vec<C::Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record?);
        }
        Ok(records)
    }
}

/// Encode records in order, marking exactly the final one as last
///
/// Returns [`FileCacheError::Cancelled`] as soon as cancellation is seen
/// between two records; nothing partial is returned.
pub async fn encode_records<C: RecordCodec>(
    codec: &C,
    records: &[C::Record],
    yield_strategy: YieldStrategy,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut writer = codec.writer();
    let last = records.len().checked_sub(1);

    for (i, record) in records.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(FileCacheError::Cancelled);
        }

        writer.write_record(record, Some(i) == last)?;

        if let Some(settings) = C::container_compression(record) {
            writer.set_compression(settings);
        }

        yield_point(yield_strategy, cancel).await?;
    }

    Ok(writer.finish()?)
}

async fn yield_point(strategy: YieldStrategy, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FileCacheError::Cancelled),
        _ = strategy.yield_now() => Ok(()),
    }
}
