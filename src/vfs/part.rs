use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::io::ReadAt;

/// Describes one physical part before it is placed in a virtual file.
#[derive(Clone)]
pub struct PartSpec {
    pub reader: Arc<dyn ReadAt>,
    /// Where the part's data starts inside its physical source.
    pub base: u64,
    /// Bytes contributed to the virtual file. `None` takes everything from
    /// `base` to the end of the source.
    pub size: Option<u64>,
}

impl PartSpec {
    pub fn new(reader: Arc<dyn ReadAt>) -> Self {
        Self {
            reader,
            base: 0,
            size: None,
        }
    }

    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// One physical part placed at a virtual offset.
#[derive(Clone)]
pub struct Part {
    reader: Arc<dyn ReadAt>,
    start: u64,
    size: u64,
    base: u64,
}

impl Part {
    pub fn reader(&self) -> &Arc<dyn ReadAt> {
        &self.reader
    }

    /// First virtual offset covered by this part.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last virtual offset covered by this part.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of the part's first byte inside its physical source.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end()
    }

    /// Orders this part relative to a virtual offset, for binary search.
    pub(crate) fn cmp_offset(&self, offset: u64) -> Ordering {
        if offset < self.start {
            Ordering::Greater
        } else if offset >= self.end() {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("start", &self.start)
            .field("size", &self.size)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Parts in virtual order. `parts[i].end() == parts[i + 1].start()` always
/// holds, since virtual offsets are assigned while building the table.
#[derive(Debug, Clone)]
pub struct PartTable {
    parts: Vec<Part>,
    size: u64,
}

impl PartTable {
    pub fn new(specs: Vec<PartSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::InvalidPartTable("no parts".into()));
        }

        let mut parts = Vec::with_capacity(specs.len());
        let mut start = 0u64;

        for (index, spec) in specs.into_iter().enumerate() {
            let available = spec.reader.size();
            if spec.base > available {
                return Err(Error::InvalidPartTable(format!(
                    "part {index}: base {} is past the end of its source ({available} bytes)",
                    spec.base
                )));
            }

            let size = spec.size.unwrap_or(available - spec.base);
            if size == 0 {
                return Err(Error::InvalidPartTable(format!("part {index} is empty")));
            }
            if spec.base.checked_add(size).is_none_or(|end| end > available) {
                return Err(Error::InvalidPartTable(format!(
                    "part {index}: {size} bytes at {} overrun its source ({available} bytes)",
                    spec.base
                )));
            }

            parts.push(Part {
                reader: spec.reader,
                start,
                size,
                base: spec.base,
            });
            start = start
                .checked_add(size)
                .ok_or_else(|| Error::InvalidPartTable("virtual size overflows u64".into()))?;
        }

        Ok(Self { parts, size: start })
    }

    /// Sum of all part sizes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    pub(crate) fn as_slice(&self) -> &[Part] {
        &self.parts
    }
}

/// Media type of the virtual file. Opaque to the read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub major: String,
    /// `None` acts as a wildcard when matching.
    pub subtype: Option<String>,
}

impl MediaType {
    pub fn new(major: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            subtype: Some(subtype.into()),
        }
    }

    pub fn any_subtype(major: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            subtype: None,
        }
    }

    /// Whether a downstream consumer asking for `other` can be served.
    pub fn accepts(&self, other: &MediaType) -> bool {
        self.major == other.major
            && match &self.subtype {
                None => true,
                Some(sub) => other.subtype.as_ref() == Some(sub),
            }
    }
}

impl Default for MediaType {
    fn default() -> Self {
        Self::any_subtype("stream")
    }
}

/// A loaded virtual file. Immutable once built.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    parts: PartTable,
    media_type: MediaType,
}

impl VirtualFile {
    pub fn new(specs: Vec<PartSpec>, media_type: MediaType) -> Result<Self> {
        Ok(Self {
            parts: PartTable::new(specs)?,
            media_type,
        })
    }

    pub fn size(&self) -> u64 {
        self.parts.size()
    }

    pub fn parts(&self) -> &PartTable {
        &self.parts
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Enumerates the offered media types. Only one is ever offered.
    pub fn media_type_at(&self, index: usize) -> Option<&MediaType> {
        (index == 0).then_some(&self.media_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;

    fn mem(len: usize) -> Arc<dyn ReadAt> {
        Arc::new(MemoryReader::new(vec![0u8; len]))
    }

    #[test]
    fn parts_are_laid_out_back_to_back() {
        let table = PartTable::new(vec![
            PartSpec::new(mem(120)).with_base(20),
            PartSpec::new(mem(64)).with_base(4).with_size(50),
            PartSpec::new(mem(10)),
        ])
        .unwrap();

        let bounds: Vec<_> = table.iter().map(|p| (p.start(), p.end(), p.base())).collect();
        assert_eq!(bounds, vec![(0, 100, 20), (100, 150, 4), (150, 160, 0)]);
        assert_eq!(table.size(), 160);
        assert_eq!(table.size(), table.iter().map(Part::size).sum::<u64>());
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(matches!(PartTable::new(vec![]), Err(Error::InvalidPartTable(_))));
        assert!(matches!(
            PartTable::new(vec![PartSpec::new(mem(10)).with_base(4).with_size(7)]),
            Err(Error::InvalidPartTable(_))
        ));
        assert!(matches!(
            PartTable::new(vec![PartSpec::new(mem(10)).with_base(11)]),
            Err(Error::InvalidPartTable(_))
        ));
        assert!(matches!(
            PartTable::new(vec![PartSpec::new(mem(10)), PartSpec::new(mem(0))]),
            Err(Error::InvalidPartTable(_))
        ));
    }

    #[test]
    fn missing_subtype_is_a_wildcard() {
        let video = MediaType::any_subtype("video");
        assert!(video.accepts(&MediaType::new("video", "mpeg2")));
        assert!(!video.accepts(&MediaType::new("audio", "mpeg2")));

        let mpeg = MediaType::new("video", "mpeg2");
        assert!(mpeg.accepts(&MediaType::new("video", "mpeg2")));
        assert!(!mpeg.accepts(&MediaType::new("video", "avi")));
        assert!(!mpeg.accepts(&MediaType::any_subtype("video")));
    }

    #[test]
    fn offers_a_single_media_type() {
        let file = VirtualFile::new(vec![PartSpec::new(mem(8))], MediaType::default()).unwrap();
        assert_eq!(file.media_type_at(0), Some(&MediaType::default()));
        assert_eq!(file.media_type_at(1), None);
    }
}
