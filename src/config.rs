use std::time::Duration;

use crate::error::{Error, Result};
use crate::reader::Alignment;

/// Engine settings. The CLI fills these from its flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Required alignment of positions, lengths and buffers, before any
    /// allocator negotiation. Must be a power of two.
    pub alignment: usize,
    /// How long a consumer waits for the next completed read. `None` waits
    /// forever.
    pub wait_timeout: Option<Duration>,
    /// Size of each request when streaming a range.
    pub chunk_size: usize,
    /// Requests kept outstanding when streaming a range.
    pub max_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alignment: 1,
            wait_timeout: None,
            chunk_size: 64 * 1024,
            max_in_flight: 4,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<Alignment> {
        let alignment = Alignment::new(self.alignment)?;
        if self.chunk_size == 0 || !alignment.is_aligned(self.chunk_size as u64) {
            return Err(Error::InvalidArgument(format!(
                "chunk size {} must be a non-zero multiple of the alignment {}",
                self.chunk_size, self.alignment
            )));
        }
        if self.max_in_flight == 0 {
            return Err(Error::InvalidArgument("at least one request must be in flight".into()));
        }
        Ok(alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(EngineConfig::default().validate().unwrap(), Alignment::BYTE);
    }

    #[test]
    fn chunk_must_respect_alignment() {
        let config = EngineConfig {
            alignment: 512,
            chunk_size: 1000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));

        let config = EngineConfig {
            alignment: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
