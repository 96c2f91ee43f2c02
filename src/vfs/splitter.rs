use crate::error::Error;

use super::PartLocator;

/// The part of a virtual range that falls inside one physical part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Index into the part table.
    pub part: usize,
    /// Absolute offset inside the part's physical source.
    pub physical_offset: u64,
    pub length: usize,
    /// Where the segment's bytes go in the destination buffer.
    pub buffer_offset: usize,
}

/// A split that could not cover the whole range.
///
/// `segments` holds whatever was covered before the failure; those segments
/// are valid and callers are expected to read them.
#[derive(Debug)]
pub struct SplitError {
    pub segments: Vec<Segment>,
    pub error: Error,
}

impl SplitError {
    /// Bytes covered by the segments that were produced.
    pub fn covered(&self) -> u64 {
        self.segments.iter().map(|s| s.length as u64).sum()
    }
}

impl From<SplitError> for Error {
    fn from(err: SplitError) -> Self {
        err.error
    }
}

/// Decomposes virtual ranges into per-part segments.
///
/// Does not clip: a range running past the last part is an error.
pub struct RangeSplitter<'a> {
    locator: &'a PartLocator,
}

impl<'a> RangeSplitter<'a> {
    pub fn new(locator: &'a PartLocator) -> Self {
        Self { locator }
    }

    pub fn split(&self, offset: u64, length: usize) -> Result<Vec<Segment>, SplitError> {
        let mut index = self.locator.locate(offset).map_err(|error| SplitError {
            segments: Vec::new(),
            error,
        })?;

        let parts = self.locator.file().parts();
        let mut segments = Vec::new();
        let mut remaining = length as u64;
        let mut acc = 0usize;
        let mut in_part = offset - parts.as_slice()[index].start();

        while remaining > 0 {
            let Some(part) = parts.get(index) else {
                let error = Error::EndOfFile {
                    transferred: acc as u64,
                };
                return Err(SplitError { segments, error });
            };

            let to_read = remaining.min(part.size() - in_part);
            segments.push(Segment {
                part: index,
                physical_offset: part.base() + in_part,
                length: to_read as usize,
                buffer_offset: acc,
            });

            remaining -= to_read;
            acc += to_read as usize;
            index += 1;
            in_part = 0;
        }

        Ok(segments)
    }
}
