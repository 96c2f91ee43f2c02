use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::VirtualFile;
use crate::error::{Error, Result};

const NO_PART: usize = usize::MAX;

/// Maps virtual offsets to part indices.
///
/// Remembers the last part it resolved so sequential readers skip the
/// binary search. The remembered index is only a hint and is checked
/// against the offset before it is trusted.
#[derive(Debug)]
pub struct PartLocator {
    file: Arc<VirtualFile>,
    last: AtomicUsize,
}

impl PartLocator {
    pub fn new(file: Arc<VirtualFile>) -> Self {
        Self {
            file,
            last: AtomicUsize::new(NO_PART),
        }
    }

    pub fn file(&self) -> &Arc<VirtualFile> {
        &self.file
    }

    /// Index of the part holding `offset`.
    ///
    /// Fails with [`Error::OutOfRange`] past the end of the file, and with
    /// [`Error::EndOfFile`] when `offset` is exactly the file size.
    pub fn locate(&self, offset: u64) -> Result<usize> {
        let size = self.file.size();
        if offset > size {
            return Err(Error::OutOfRange { offset, size });
        }

        let parts = self.file.parts().as_slice();

        let last = self.last.load(Ordering::Relaxed);
        if let Some(part) = parts.get(last)
            && part.contains(offset)
        {
            return Ok(last);
        }

        match parts.binary_search_by(|part| part.cmp_offset(offset)) {
            Ok(index) => {
                if index != last {
                    trace!(part = index, offset, "now reading part");
                }
                self.last.store(index, Ordering::Relaxed);
                Ok(index)
            }
            Err(_) => Err(Error::EndOfFile { transferred: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryReader, ReadAt};
    use crate::vfs::{MediaType, PartSpec};

    fn locator(sizes: &[usize]) -> PartLocator {
        let specs = sizes
            .iter()
            .map(|&n| PartSpec::new(Arc::new(MemoryReader::new(vec![0u8; n])) as Arc<dyn ReadAt>))
            .collect();
        PartLocator::new(Arc::new(VirtualFile::new(specs, MediaType::default()).unwrap()))
    }

    #[test]
    fn every_offset_maps_to_its_covering_part() {
        let locator = locator(&[7, 1, 13, 4]);
        let parts = locator.file().parts().clone();

        for offset in 0..parts.size() {
            let index = locator.locate(offset).unwrap();
            let part = parts.get(index).unwrap();
            assert!(part.contains(offset), "offset {offset} mapped to {part:?}");
        }
    }

    #[test]
    fn end_of_file_and_beyond() {
        let locator = locator(&[100, 50]);
        assert!(matches!(
            locator.locate(150),
            Err(Error::EndOfFile { transferred: 0 })
        ));
        assert!(matches!(
            locator.locate(151),
            Err(Error::OutOfRange { offset: 151, size: 150 })
        ));
    }

    #[test]
    fn cache_never_drifts() {
        let locator = locator(&[100, 50, 25]);

        assert_eq!(locator.locate(120).unwrap(), 1);
        assert_eq!(locator.locate(5).unwrap(), 0);
        assert_eq!(locator.locate(160).unwrap(), 2);
        assert_eq!(locator.locate(120).unwrap(), 1);
        assert_eq!(locator.locate(149).unwrap(), 1);
        assert_eq!(locator.locate(150).unwrap(), 2);
        assert_eq!(locator.locate(0).unwrap(), 0);
    }
}
