//! Physical part readers.
//!
//! Every part of a virtual file is backed by something implementing
//! [`ReadAt`]. Readers are shared behind an `Arc` and may serve several
//! outstanding reads at different offsets at the same time, so
//! implementations must not rely on a shared cursor.

mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// May return fewer bytes than requested; `Ok(0)` means the source has
    /// nothing past `offset`.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}
