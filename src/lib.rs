//! # volread
//!
//! Asynchronous random-access reads over a file that is split across
//! several physical parts, such as a stream stored in numbered archive
//! volumes.
//!
//! The parts are stitched into one [`VirtualFile`]. Reads against virtual
//! offsets are mapped onto the parts, issued as concurrent background reads,
//! and reassembled in order before they are handed back.
//!
//! ## Features
//!
//! - Parts on the local filesystem or behind HTTP servers that accept
//!   `Range` requests
//! - Queued asynchronous reads with timeouts and a global flush
//! - Blocking-style reads that go segment by segment
//! - Allocator alignment checks and end-of-file clipping
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use volread::{EngineConfig, LocalFileReader, MediaType, PartSpec, Session, VirtualFile};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let parts = ["movie.r00", "movie.r01"]
//!         .iter()
//!         .map(|p| Ok(PartSpec::new(Arc::new(LocalFileReader::new(Path::new(p))?))))
//!         .collect::<anyhow::Result<Vec<_>>>()?;
//!
//!     let mut session = Session::new(EngineConfig::default())?;
//!     session.load(VirtualFile::new(parts, MediaType::default())?)?;
//!
//!     let buffer = session.alloc_buffer(4096)?;
//!     session.request(0, 4096, buffer, "first block")?;
//!     let done = session.wait_for_next(Some(Duration::from_secs(5))).await?;
//!     println!("{}: {} bytes", done.token, done.bytes);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod reader;
pub mod session;
pub mod vfs;

pub use cli::{Cli, PartArg};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use reader::{
    AlignedBuf, Alignment, AsyncReadScheduler, Completion, FlushState, Outcome, RequestId, SyncRead,
    SyncReader,
};
pub use session::Session;
pub use vfs::{MediaType, Part, PartLocator, PartSpec, PartTable, RangeSplitter, Segment, VirtualFile};
