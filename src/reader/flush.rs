use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushState {
    #[default]
    Normal,
    Flushing,
}

/// Tracks whether the scheduler is flushing.
///
/// Lives under the same lock as the pending queue, so a submission can never
/// slip into the queue after a flush has started.
#[derive(Debug, Default)]
pub(crate) struct FlushController {
    state: FlushState,
}

impl FlushController {
    pub fn state(&self) -> FlushState {
        self.state
    }

    pub fn is_flushing(&self) -> bool {
        self.state == FlushState::Flushing
    }

    /// Fails with [`Error::WrongState`] while flushing.
    pub fn ensure_normal(&self) -> Result<()> {
        if self.is_flushing() {
            debug!("request rejected during flush");
            return Err(Error::WrongState);
        }
        Ok(())
    }

    pub fn begin(&mut self) {
        debug!("begin flush");
        self.state = FlushState::Flushing;
    }

    pub fn end(&mut self) {
        debug!("end flush");
        self.state = FlushState::Normal;
    }
}
