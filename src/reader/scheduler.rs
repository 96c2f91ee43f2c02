use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace, warn};

use super::buffer::AlignedBuf;
use super::flush::{FlushController, FlushState};
use super::request::{Completion, ReadRequest, RequestId, SubRequest};
use super::sample::{Alignment, split_padded};
use crate::error::{Error, Result};
use crate::vfs::{PartLocator, RangeSplitter};

struct Pending<T> {
    queue: VecDeque<ReadRequest<T>>,
    flush: FlushController,
}

enum Waited {
    Settled,
    TimedOut,
    Flushed,
}

/// A request taken off the queue while its reads are awaited.
///
/// Unless released, it goes back to the head of the queue on drop, so a
/// consumer whose wait is cancelled or times out leaves it for the next
/// `wait_next`, a flush or `end_flush`.
struct Claimed<'a, T> {
    scheduler: &'a AsyncReadScheduler<T>,
    request: Option<ReadRequest<T>>,
}

impl<T> Claimed<'_, T> {
    fn release(mut self) -> Option<ReadRequest<T>> {
        self.request.take()
    }
}

impl<T> Drop for Claimed<'_, T> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            debug!(id = request.id.0, "wait abandoned, request requeued");
            self.scheduler.lock().queue.push_front(request);
            self.scheduler.wakeup.notify_one();
        }
    }
}

/// Issues overlapped reads for virtual ranges and hands them back as they
/// complete.
///
/// Requests are served first in, first out: [`wait_next`](Self::wait_next)
/// always returns the oldest submitted request that has not been handed out.
/// A request put back after a timeout keeps its place at the head.
///
/// Any number of tasks may call [`submit`](Self::submit); one consumer is
/// expected to drive `wait_next`.
pub struct AsyncReadScheduler<T> {
    locator: Arc<PartLocator>,
    alignment: Alignment,
    runtime: Handle,
    pending: Mutex<Pending<T>>,
    /// Signalled on every submission and when a flush begins. Holds at most
    /// one stored wake-up.
    wakeup: Notify,
    flushed: Notify,
    next_id: AtomicU64,
}

impl<T> AsyncReadScheduler<T> {
    fn lock(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> AsyncReadScheduler<T> {
    /// Must be called from inside a tokio runtime; sub-reads are spawned on it.
    pub fn new(locator: Arc<PartLocator>, alignment: Alignment) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self::with_runtime(locator, alignment, runtime))
    }

    pub fn with_runtime(locator: Arc<PartLocator>, alignment: Alignment, runtime: Handle) -> Self {
        Self {
            locator,
            alignment,
            runtime,
            pending: Mutex::new(Pending {
                queue: VecDeque::new(),
                flush: FlushController::default(),
            }),
            wakeup: Notify::new(),
            flushed: Notify::new(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub(crate) fn set_alignment(&mut self, alignment: Alignment) {
        self.alignment = alignment;
    }

    /// Number of requests waiting to be handed out.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn flush_state(&self) -> FlushState {
        self.lock().flush.state()
    }

    /// Starts reading `length` bytes at virtual offset `position` into
    /// `buffer`, which must start on the scheduler's alignment (see
    /// [`AlignedBuf::new`]).
    ///
    /// The reads run in the background; collect the result with
    /// [`wait_next`](Self::wait_next). On error nothing stays queued or in
    /// flight.
    pub fn submit(&self, position: u64, length: usize, buffer: AlignedBuf, token: T) -> Result<RequestId> {
        self.lock().flush.ensure_normal()?;
        self.alignment.check(position, length, &buffer)?;
        if buffer.len() < length {
            return Err(Error::InvalidArgument(format!(
                "buffer of {} bytes cannot hold {length}",
                buffer.len()
            )));
        }

        let file = self.locator.file();
        let splitter = RangeSplitter::new(&self.locator);
        let segments = split_padded(&splitter, file.size(), self.alignment, position, length)
            .map_err(|err| {
                debug!(position, length, error = %err.error, "request does not fit the file");
                Error::from(err)
            })?;

        let mut subs = Vec::new();
        subs.try_reserve_exact(segments.len())
            .map_err(|_| Error::OutOfMemory(segments.len() * size_of::<SubRequest>()))?;

        for segment in &segments {
            let part = file.parts().get(segment.part).ok_or_else(|| {
                Error::InvalidPartTable(format!("segment refers to missing part {}", segment.part))
            })?;
            // An early return drops `subs`, aborting whatever was issued.
            subs.push(SubRequest::issue(&self.runtime, Arc::clone(part.reader()), *segment)?);
        }

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = ReadRequest {
            id,
            token,
            buffer,
            expected: segments.iter().map(|s| s.length).sum(),
            subs,
        };

        {
            let mut pending = self.lock();
            pending.flush.ensure_normal()?;
            pending.queue.push_back(request);
        }
        self.wakeup.notify_one();

        trace!(id = id.0, position, length, segments = segments.len(), "request queued");
        Ok(id)
    }

    /// Takes the oldest request and waits for all of its reads.
    ///
    /// `timeout` bounds the whole call: `Some(Duration::ZERO)` only polls,
    /// `None` waits forever. A request whose reads are still running when
    /// the time is up goes back to the head of the queue and the call fails
    /// with [`Error::Timeout`].
    ///
    /// While flushing, each call hands back one request unread with
    /// [`Outcome::Flushed`](super::Outcome::Flushed), and fails with
    /// [`Error::Flushing`] once none are left.
    ///
    /// Cancel safe: if the returned future is dropped before it completes,
    /// the request it was waiting on stays at the head of the queue.
    pub async fn wait_next(&self, timeout: Option<Duration>) -> Result<Completion<T>> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let request = loop {
            let wakeup = self.wakeup.notified();
            {
                let mut pending = self.lock();
                if pending.flush.is_flushing() {
                    return Self::drain_one(&mut pending);
                }
                if let Some(request) = pending.queue.pop_front() {
                    break request;
                }
            }

            match deadline {
                Some(deadline) if Instant::now() >= deadline => return Err(Error::Timeout),
                Some(deadline) => timeout_at(deadline, wakeup)
                    .await
                    .map_err(|_| Error::Timeout)?,
                None => wakeup.await,
            }
        };

        let flushed = self.flushed.notified();
        tokio::pin!(flushed);
        flushed.as_mut().enable();
        if self.lock().flush.is_flushing() {
            debug!(id = request.id.0, "flushing request");
            return Ok(request.cancel());
        }

        let mut claimed = Claimed {
            scheduler: self,
            request: Some(request),
        };
        let Some(request) = claimed.request.as_mut() else {
            return Err(Error::Flushing);
        };

        let waited = {
            let settle = join_all(request.subs.iter_mut().map(SubRequest::settle));
            let bounded = async move {
                match deadline {
                    Some(deadline) => timeout_at(deadline, settle).await.is_ok(),
                    None => {
                        settle.await;
                        true
                    }
                }
            };

            tokio::select! {
                settled = bounded => {
                    if settled { Waited::Settled } else { Waited::TimedOut }
                }
                () = &mut flushed => Waited::Flushed,
            }
        };

        match waited {
            Waited::Settled => {
                let completion = claimed.release().map(ReadRequest::assemble).ok_or(Error::Flushing)?;
                trace!(id = completion.id.0, bytes = completion.bytes, "request complete");
                Ok(completion)
            }
            Waited::TimedOut => {
                debug!("timed out waiting for sub-reads");
                // Dropping the claim puts the request back at the head.
                drop(claimed);
                Err(Error::Timeout)
            }
            Waited::Flushed => {
                let request = claimed.release().ok_or(Error::Flushing)?;
                debug!(id = request.id.0, "flushing request");
                Ok(request.cancel())
            }
        }
    }

    fn drain_one(pending: &mut Pending<T>) -> Result<Completion<T>> {
        match pending.queue.pop_front() {
            Some(request) => {
                debug!(id = request.id.0, "flushing request");
                Ok(request.cancel())
            }
            None => Err(Error::Flushing),
        }
    }

    /// Enters the flushing state and wakes every waiting consumer.
    pub fn begin_flush(&self) {
        self.lock().flush.begin();
        self.wakeup.notify_waiters();
        self.wakeup.notify_one();
        self.flushed.notify_waiters();
    }

    /// Leaves the flushing state.
    ///
    /// Requests that were not drained through `wait_next` during the flush
    /// are cancelled and returned here, so the queue always starts empty.
    pub fn end_flush(&self) -> Vec<Completion<T>> {
        let mut pending = self.lock();
        pending.flush.end();

        let leftovers: Vec<_> = pending.queue.drain(..).map(ReadRequest::cancel).collect();
        if !leftovers.is_empty() {
            warn!(count = leftovers.len(), "requests left undrained at end of flush");
        }
        leftovers
    }
}
