//! Readers with controllable behaviour for exercising the read path.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::watch;

use super::{AlignedBuf, Alignment};
use crate::io::{MemoryReader, ReadAt};
use crate::vfs::{MediaType, PartLocator, PartSpec, VirtualFile};

/// Serves `data`, but every read waits until the gate is opened.
pub struct GatedReader {
    inner: MemoryReader,
    gate: watch::Receiver<bool>,
}

impl GatedReader {
    pub fn new(data: &[u8]) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let reader = Self {
            inner: MemoryReader::new(data.to_vec()),
            gate: rx,
        };
        (reader, tx)
    }
}

#[async_trait]
impl ReadAt for GatedReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open).await?;
        self.inner.read_at(offset, buf).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}

/// Claims `size` bytes and fails every read.
pub struct FailingReader {
    pub size: u64,
}

#[async_trait]
impl ReadAt for FailingReader {
    async fn read_at(&self, offset: u64, _buf: &mut [u8]) -> Result<usize> {
        bail!("device error at {offset}")
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Claims `size` bytes but only holds `data`, like a truncated volume.
pub struct TruncatedReader {
    pub data: MemoryReader,
    pub size: u64,
}

#[async_trait]
impl ReadAt for TruncatedReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.data.read_at(offset, buf).await
    }

    fn size(&self) -> u64 {
        self.size
    }
}

pub fn memory(data: &[u8]) -> Arc<dyn ReadAt> {
    Arc::new(MemoryReader::new(data.to_vec()))
}

pub fn locator(readers: Vec<Arc<dyn ReadAt>>) -> Arc<PartLocator> {
    let specs = readers.into_iter().map(PartSpec::new).collect();
    let file = VirtualFile::new(specs, MediaType::default()).unwrap();
    Arc::new(PartLocator::new(Arc::new(file)))
}

/// Bytes `0, 1, 2, ...` wrapping at 251, so any misplaced segment shows.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A zeroed destination buffer with no alignment requirement.
pub fn zeroed(len: usize) -> AlignedBuf {
    AlignedBuf::new(len, Alignment::BYTE).unwrap()
}
