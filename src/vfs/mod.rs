//! The virtual file: an ordered table of physical parts and the lookups
//! that map virtual offsets onto them.
//!
//! - [`part`]: part descriptors, the part table and the loaded [`VirtualFile`]
//! - [`locator`]: virtual offset to part index, with a one-entry cache
//! - [`splitter`]: virtual range to an ordered list of per-part segments

mod locator;
mod part;
mod splitter;

pub use locator::PartLocator;
pub use part::{MediaType, Part, PartSpec, PartTable, VirtualFile};
pub use splitter::{RangeSplitter, Segment, SplitError};
