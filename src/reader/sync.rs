use std::sync::Arc;

use tracing::{debug, warn};

use super::Outcome;
use super::request::read_segment;
use super::sample::{Alignment, split_padded};
use crate::error::{Error, Result};
use crate::vfs::{PartLocator, RangeSplitter, SplitError};

/// Result of a blocking read. `bytes` is valid whatever the outcome.
#[derive(Debug)]
pub struct SyncRead {
    pub bytes: usize,
    pub outcome: Outcome,
}

impl SyncRead {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_complete()
    }
}

/// Reads virtual ranges one segment at a time, each to completion before
/// the next is issued.
pub struct SyncReader {
    locator: Arc<PartLocator>,
    alignment: Alignment,
}

impl SyncReader {
    pub fn new(locator: Arc<PartLocator>, alignment: Alignment) -> Self {
        Self { locator, alignment }
    }

    pub(crate) fn set_alignment(&mut self, alignment: Alignment) {
        self.alignment = alignment;
    }

    /// Fills `buf` from virtual offset `position`.
    ///
    /// Fails only when nothing could be read at all. Once any byte was read,
    /// the byte count comes back with an [`Outcome`] describing whatever
    /// stopped the read.
    pub async fn read(&self, position: u64, buf: &mut [u8]) -> Result<SyncRead> {
        let file = self.locator.file();
        let splitter = RangeSplitter::new(&self.locator);

        let (segments, truncated) =
            match split_padded(&splitter, file.size(), self.alignment, position, buf.len()) {
                Ok(segments) => (segments, false),
                Err(SplitError { segments, error }) if segments.is_empty() => {
                    debug!(position, length = buf.len(), %error, "sync read found no part");
                    return Err(error);
                }
                Err(SplitError { segments, .. }) => (segments, true),
            };

        let expected = if truncated {
            buf.len()
        } else {
            segments.iter().map(|s| s.length).sum()
        };
        let mut acc = 0usize;

        for segment in &segments {
            let part = file.parts().get(segment.part).ok_or_else(|| {
                Error::InvalidPartTable(format!("segment refers to missing part {}", segment.part))
            })?;
            let dest = &mut buf[segment.buffer_offset..segment.buffer_offset + segment.length];

            let (n, error) = read_segment(part.reader().as_ref(), segment.physical_offset, dest).await;
            acc += n;

            if let Some(error) = error {
                warn!(part = segment.part, %error, "sync read failed");
                if acc == 0 {
                    return Err(Error::Io(error));
                }
                return Ok(SyncRead {
                    bytes: acc,
                    outcome: Outcome::Failed(error),
                });
            }
            if n != segment.length {
                warn!(part = segment.part, got = n, expected = segment.length, "short sync read");
                return Ok(SyncRead {
                    bytes: acc,
                    outcome: Outcome::Short { expected, actual: acc },
                });
            }
        }

        let outcome = if truncated {
            debug!(position, length = buf.len(), read = acc, "sync read ran past the last part");
            Outcome::Short { expected, actual: acc }
        } else {
            Outcome::Complete
        };
        Ok(SyncRead { bytes: acc, outcome })
    }
}
