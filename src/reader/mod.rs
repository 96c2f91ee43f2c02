//! The read path: asynchronous and synchronous reads over a virtual file.
//!
//! [`AsyncReadScheduler`] issues one background read per segment of a
//! request and hands requests back through a queue; [`SyncReader`] does the
//! same split but reads the segments one after the other.
//!
//! A read that delivers fewer bytes than asked for is not an error: it comes
//! back with an [`Outcome`] other than [`Outcome::Complete`] and the number
//! of bytes that did arrive.

mod buffer;
mod flush;
mod request;
mod sample;
mod scheduler;
mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use buffer::AlignedBuf;
pub use flush::FlushState;
pub use request::{Completion, Outcome, RequestId};
pub use sample::{Alignment, clip_request};
pub use scheduler::AsyncReadScheduler;
pub use sync::{SyncRead, SyncReader};
