//! Allocator alignment and request clipping.

use tracing::debug;

use crate::error::{Error, Result};
use crate::vfs::{RangeSplitter, Segment, SplitError};

/// Byte alignment required of positions, lengths and buffer addresses.
/// Always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alignment(usize);

impl Alignment {
    pub const BYTE: Alignment = Alignment(1);

    pub fn new(align: usize) -> Result<Self> {
        if !align.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "alignment {align} is not a power of two"
            )));
        }
        Ok(Self(align))
    }

    pub fn get(self) -> usize {
        self.0
    }

    fn mask(self) -> u64 {
        self.0 as u64 - 1
    }

    pub fn is_aligned(self, value: u64) -> bool {
        value & self.mask() == 0
    }

    pub fn round_up(self, value: u64) -> u64 {
        value.saturating_add(self.mask()) & !self.mask()
    }

    /// Settles the alignment with an allocator. A request of 0 means the
    /// allocator has no preference and the current alignment stays.
    pub fn negotiate(self, requested: usize) -> Result<Self> {
        match requested {
            0 => Ok(self),
            n => Self::new(n),
        }
    }

    pub fn check(self, position: u64, length: usize, buffer: &[u8]) -> Result<()> {
        let address = buffer.as_ptr() as usize;
        if self.is_aligned(position) && self.is_aligned(length as u64) && self.is_aligned(address as u64) {
            return Ok(());
        }

        debug!(
            align = self.0,
            position,
            length,
            buffer = address,
            "bad alignment"
        );
        Err(Error::BadAlignment {
            position,
            length,
            buffer: address,
            alignment: self.0,
        })
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::BYTE
    }
}

/// Clips a requested range against a file of `size` bytes.
///
/// A range may run up to `size` rounded up to the alignment, never further;
/// longer ranges are cut back to that boundary. Returns the clipped length.
pub fn clip_request(size: u64, alignment: Alignment, position: u64, length: usize) -> Result<usize> {
    if position > size {
        debug!(position, size, "request starts past end of file");
        return Err(Error::EndOfFile { transferred: 0 });
    }

    let end = position.saturating_add(length as u64);
    if end <= size {
        return Ok(length);
    }

    let limit = alignment.round_up(size);
    if end <= limit {
        return Ok(length);
    }

    let clipped = (limit - position) as usize;
    debug!(position, length, clipped, "clipped request to end of file");
    Ok(clipped)
}

/// Splits a range, tolerating an overrun that stays within the alignment
/// padding after the last byte of the file. The padding is simply not read.
pub(crate) fn split_padded(
    splitter: &RangeSplitter<'_>,
    size: u64,
    alignment: Alignment,
    position: u64,
    length: usize,
) -> std::result::Result<Vec<Segment>, SplitError> {
    match splitter.split(position, length) {
        Ok(segments) => Ok(segments),
        Err(err)
            if !err.segments.is_empty()
                && matches!(err.error, Error::EndOfFile { .. })
                && position.saturating_add(length as u64) <= alignment.round_up(size) =>
        {
            Ok(err.segments)
        }
        Err(err) => Err(err),
    }
}
