//! Bookkeeping for outstanding reads.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{trace, warn};

use super::buffer::AlignedBuf;
use crate::error::{Error, Result};
use crate::io::ReadAt;
use crate::vfs::Segment;

/// Identifies a submitted read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

/// How a read ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every expected byte was delivered.
    Complete,
    /// The sources ran out before the request was filled.
    Short { expected: usize, actual: usize },
    /// A physical read failed. Bytes before the failure are still valid.
    Failed(anyhow::Error),
    /// A physical read was cancelled before it finished.
    Cancelled,
    /// The request was discarded by a flush. No data was delivered.
    Flushed,
}

impl Outcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Complete)
    }
}

/// A finished read handed back to the consumer.
#[derive(Debug)]
pub struct Completion<T> {
    pub id: RequestId,
    pub token: T,
    /// The destination buffer. Only `buffer[..bytes]` holds read data.
    pub buffer: AlignedBuf,
    pub bytes: usize,
    pub outcome: Outcome,
}

impl<T> Completion<T> {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_complete()
    }

    pub fn is_flushed(&self) -> bool {
        matches!(self.outcome, Outcome::Flushed)
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.bytes]
    }
}

/// Bytes a single physical read produced, plus the error that stopped it
/// early, if any.
#[derive(Debug)]
pub(crate) struct SegmentRead {
    pub data: Vec<u8>,
    pub error: Option<anyhow::Error>,
}

/// Fills `buf` from `reader` starting at `offset`.
///
/// Short reads are retried for the missing tail until the buffer is full,
/// the reader reports end of data, or it fails. Returns the number of bytes
/// read and the failure, if one stopped the read.
pub(crate) async fn read_segment(
    reader: &dyn ReadAt,
    offset: u64,
    buf: &mut [u8],
) -> (usize, Option<anyhow::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read_at(offset + filled as u64, &mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

enum SubState {
    InFlight(JoinHandle<SegmentRead>),
    Done(std::result::Result<SegmentRead, JoinError>),
    Taken,
}

/// One physical read issued for one segment of a request.
///
/// Dropping a sub-request that is still in flight aborts its read.
pub(crate) struct SubRequest {
    segment: Segment,
    state: SubState,
}

impl SubRequest {
    /// Allocates the segment's scratch buffer and starts the read on
    /// `runtime`.
    pub fn issue(runtime: &Handle, reader: Arc<dyn ReadAt>, segment: Segment) -> Result<Self> {
        let mut chunk = Vec::new();
        chunk
            .try_reserve_exact(segment.length)
            .map_err(|_| Error::OutOfMemory(segment.length))?;
        chunk.resize(segment.length, 0);

        trace!(
            part = segment.part,
            offset = segment.physical_offset,
            length = segment.length,
            "issuing sub-read"
        );

        let handle = runtime.spawn(async move {
            let (n, error) = read_segment(reader.as_ref(), segment.physical_offset, &mut chunk).await;
            chunk.truncate(n);
            SegmentRead { data: chunk, error }
        });

        Ok(Self {
            segment,
            state: SubState::InFlight(handle),
        })
    }

    /// Waits for the read to finish and keeps its result. Safe to cancel
    /// and call again.
    pub async fn settle(&mut self) {
        if let SubState::InFlight(handle) = &mut self.state {
            let result = handle.await;
            self.state = SubState::Done(result);
        }
    }

    /// Takes the result of a settled read. `None` while still in flight.
    fn take_result(&mut self) -> Option<std::result::Result<SegmentRead, JoinError>> {
        match std::mem::replace(&mut self.state, SubState::Taken) {
            SubState::Done(result) => Some(result),
            state => {
                self.state = state;
                None
            }
        }
    }

    pub fn cancel(&mut self) {
        if let SubState::InFlight(handle) = &self.state {
            handle.abort();
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }
}

impl Drop for SubRequest {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One client read: the destination buffer and a sub-request per segment,
/// kept in virtual order.
pub(crate) struct ReadRequest<T> {
    pub id: RequestId,
    pub token: T,
    pub buffer: AlignedBuf,
    /// Bytes the segments cover. Less than the caller's length only when the
    /// range ran into the alignment padding past the end of the file.
    pub expected: usize,
    pub subs: Vec<SubRequest>,
}

impl<T> ReadRequest<T> {
    /// Copies every settled sub-read into place and reports the result.
    ///
    /// Stops at the first sub-read that failed or came back short; the byte
    /// count covers everything before that point.
    pub fn assemble(mut self) -> Completion<T> {
        let mut acc = 0usize;
        let mut outcome = Outcome::Complete;

        for mut sub in self.subs.drain(..) {
            let segment = *sub.segment();
            let read = match sub.take_result() {
                Some(Ok(read)) => read,
                Some(Err(e)) if e.is_cancelled() => {
                    outcome = Outcome::Cancelled;
                    break;
                }
                Some(Err(e)) => {
                    outcome = Outcome::Failed(anyhow!("sub-read task failed: {e}"));
                    break;
                }
                None => {
                    outcome = Outcome::Failed(anyhow!("sub-read assembled before it finished"));
                    break;
                }
            };

            let n = read.data.len();
            self.buffer[segment.buffer_offset..segment.buffer_offset + n].copy_from_slice(&read.data);
            acc += n;

            if let Some(error) = read.error {
                warn!(part = segment.part, error = %error, "sub-read failed");
                outcome = Outcome::Failed(error);
                break;
            }
            if n != segment.length {
                warn!(part = segment.part, got = n, expected = segment.length, "short sub-read");
                outcome = Outcome::Short {
                    expected: self.expected,
                    actual: acc,
                };
                break;
            }
        }

        Completion {
            id: self.id,
            token: self.token,
            buffer: self.buffer,
            bytes: acc,
            outcome,
        }
    }

    /// Aborts every outstanding read and hands the request back unfilled.
    pub fn cancel(mut self) -> Completion<T> {
        for sub in &mut self.subs {
            sub.cancel();
        }
        self.subs.clear();

        Completion {
            id: self.id,
            token: self.token,
            buffer: self.buffer,
            bytes: 0,
            outcome: Outcome::Flushed,
        }
    }
}
