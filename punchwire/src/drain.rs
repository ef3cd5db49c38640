//! Paginated drain of device-resident records
//!
//! The device keeps the cursor. Each fetch returns the next batch of raw
//! sub-records along with the record count the device reported; a count of
//! zero ends the walk. Sources that must delete what they read do so in
//! [`BatchSource::consumed`], sources that clear in bulk do so in
//! [`BatchSource::exhausted`].

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::Result;
use crate::session::Session;

/// One page of device records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Record count as reported by the device
    pub count: usize,

    /// Sub-records that were complete on the wire
    pub records: Vec<Bytes>,
}

impl Batch {
    /// The device reported no more records
    pub fn end() -> Self {
        Self::default()
    }

    pub fn is_end(&self) -> bool {
        self.count == 0
    }
}

/// A device command family that yields records batch by batch
#[async_trait]
pub trait BatchSource: Send {
    type Record: Send;

    /// Fetch the next batch; `first` is set on the opening request only
    async fn fetch(&mut self, session: &mut Session<'_>, first: bool) -> Result<Batch>;

    /// Decode one sub-record; `None` consumes it without yielding anything
    fn decode(&self, raw: &[u8]) -> Result<Option<Self::Record>>;

    /// Called after each sub-record has been handed to the sink
    async fn consumed(&mut self, _session: &mut Session<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once after the device reported a count of zero
    async fn exhausted(&mut self, _session: &mut Session<'_>) -> Result<()> {
        Ok(())
    }
}

/// Receiver of drained records
#[async_trait]
pub trait RecordSink<R: Send>: Send {
    async fn accept(&mut self, record: R) -> Result<()>;
}

#[async_trait]
impl<R: Send> RecordSink<R> for Vec<R> {
    async fn accept(&mut self, record: R) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Walk `source` until the device reports a record count of zero
///
/// A batch whose sub-records were all too short still counts as records
/// pending on the device, so the walk goes on. Returns the number of records
/// handed to `sink`. Any failure aborts the walk immediately, before the bulk
/// clear.
pub async fn drain<S, K>(source: &mut S, session: &mut Session<'_>, sink: &mut K) -> Result<usize>
where
    S: BatchSource + ?Sized,
    K: RecordSink<S::Record> + ?Sized,
{
    let mut yielded = 0;
    let mut first = true;

    loop {
        let batch = source.fetch(session, first).await?;
        first = false;

        if batch.is_end() {
            break;
        }
        debug!(
            "Drained batch of {} records ({} complete)",
            batch.count,
            batch.records.len()
        );

        for raw in batch.records {
            if let Some(record) = source.decode(&raw)? {
                sink.accept(record).await?;
                yielded += 1;
            }
            source.consumed(session).await?;
        }
    }

    source.exhausted(session).await?;
    Ok(yielded)
}

/// Cut a counted batch payload into fixed-stride sub-records
///
/// `payload[0]` holds the record count N and the records start at `offset`.
/// A count of zero yields nothing whatever follows it; a sub-record that
/// runs past the end of the payload is skipped.
pub fn split_batch(payload: &Bytes, offset: usize, stride: usize) -> Batch {
    let Some(&count) = payload.first() else {
        return Batch::end();
    };

    let records = (0..count as usize)
        .filter_map(|i| {
            let start = offset + i * stride;
            let end = start + stride;
            if end <= payload.len() {
                Some(payload.slice(start..end))
            } else {
                trace!("Skipping short sub-record {} of {}", i, count);
                None
            }
        })
        .collect();

    Batch {
        count: count as usize,
        records,
    }
}
