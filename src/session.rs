//! A read session over one loaded virtual file.
//!
//! The session is what the rest of a pipeline talks to. It owns the loaded
//! file and everything derived from it (locator, scheduler, sync reader), so
//! independent sessions never share state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::reader::{
    AlignedBuf, Alignment, AsyncReadScheduler, Completion, FlushState, RequestId, SyncRead, SyncReader,
    clip_request,
};
use crate::vfs::{MediaType, Part, PartLocator, VirtualFile};

struct Loaded<T> {
    file: Arc<VirtualFile>,
    locator: Arc<PartLocator>,
    scheduler: AsyncReadScheduler<T>,
    sync: SyncReader,
}

pub struct Session<T> {
    config: EngineConfig,
    alignment: Alignment,
    loaded: Option<Loaded<T>>,
}

impl<T: Send> Session<T> {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let alignment = config.validate()?;
        Ok(Self {
            config,
            alignment,
            loaded: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Makes `file` the session's virtual file, replacing any loaded one.
    ///
    /// Must be called inside a tokio runtime.
    pub fn load(&mut self, file: VirtualFile) -> Result<()> {
        let file = Arc::new(file);
        let locator = Arc::new(PartLocator::new(Arc::clone(&file)));
        let scheduler = AsyncReadScheduler::new(Arc::clone(&locator), self.alignment)?;
        let sync = SyncReader::new(Arc::clone(&locator), self.alignment);

        info!(size = file.size(), parts = file.parts().len(), "loaded virtual file");
        if self.loaded.is_some() {
            debug!("replacing previously loaded file");
        }

        self.loaded = Some(Loaded {
            file,
            locator,
            scheduler,
            sync,
        });
        Ok(())
    }

    /// Drops the loaded file. Reads still in flight are aborted.
    pub fn unload(&mut self) -> Option<Arc<VirtualFile>> {
        self.loaded.take().map(|loaded| {
            debug!("unloaded virtual file");
            loaded.file
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn loaded(&self) -> Result<&Loaded<T>> {
        self.loaded.as_ref().ok_or(Error::NotLoaded)
    }

    pub fn file(&self) -> Result<&Arc<VirtualFile>> {
        Ok(&self.loaded()?.file)
    }

    /// Agrees on an alignment with a buffer allocator. A request of 0 keeps
    /// the current alignment. Returns the alignment now in force.
    pub fn negotiate_alignment(&mut self, requested: usize) -> Result<Alignment> {
        let alignment = self.alignment.negotiate(requested)?;
        debug!(requested, alignment = alignment.get(), "negotiated alignment");

        self.alignment = alignment;
        if let Some(loaded) = &mut self.loaded {
            loaded.scheduler.set_alignment(alignment);
            loaded.sync.set_alignment(alignment);
        }
        Ok(alignment)
    }

    /// Allocates a zeroed destination buffer of `length` bytes on the
    /// alignment currently in force.
    pub fn alloc_buffer(&self, length: usize) -> Result<AlignedBuf> {
        AlignedBuf::new(length, self.alignment)
    }

    /// Queues a read of up to `length` bytes at `position`.
    ///
    /// `length` is first clipped to the end of the file, rounded up to the
    /// alignment; the clipped length is what the completion will be measured
    /// against.
    pub fn request(&self, position: u64, length: usize, buffer: AlignedBuf, token: T) -> Result<RequestId> {
        let loaded = self.loaded()?;
        let length = clip_request(loaded.file.size(), self.alignment, position, length)?;
        loaded.scheduler.submit(position, length, buffer, token)
    }

    /// Waits for the next completed request. See
    /// [`AsyncReadScheduler::wait_next`].
    pub async fn wait_for_next(&self, timeout: Option<Duration>) -> Result<Completion<T>> {
        self.loaded()?.scheduler.wait_next(timeout).await
    }

    /// Reads into `buf` without any alignment requirement.
    pub async fn sync_read(&self, position: u64, buf: &mut [u8]) -> Result<SyncRead> {
        self.loaded()?.sync.read(position, buf).await
    }

    /// Reads up to `length` bytes into `buf`, applying the same clipping and
    /// alignment rules as [`request`](Self::request).
    pub async fn sync_read_aligned(&self, position: u64, length: usize, buf: &mut [u8]) -> Result<SyncRead> {
        let loaded = self.loaded()?;
        let length = clip_request(loaded.file.size(), self.alignment, position, length)?;
        self.alignment.check(position, length, buf)?;
        if buf.len() < length {
            return Err(Error::InvalidArgument(format!(
                "buffer of {} bytes cannot hold {length}",
                buf.len()
            )));
        }
        loaded.sync.read(position, &mut buf[..length]).await
    }

    /// Total and currently available length. Parts are all present up
    /// front, so the two are always equal.
    pub fn length(&self) -> Result<(u64, u64)> {
        let size = self.loaded()?.file.size();
        Ok((size, size))
    }

    /// Part holding virtual offset `offset`, with its index.
    pub fn locate(&self, offset: u64) -> Result<(usize, &Part)> {
        let loaded = self.loaded()?;
        let index = loaded.locator.locate(offset)?;
        let part = loaded.file.parts().get(index).ok_or(Error::EndOfFile { transferred: 0 })?;
        Ok((index, part))
    }

    pub fn begin_flush(&self) -> Result<()> {
        self.loaded()?.scheduler.begin_flush();
        Ok(())
    }

    /// Ends a flush, returning any requests that were not drained.
    pub fn end_flush(&self) -> Result<Vec<Completion<T>>> {
        Ok(self.loaded()?.scheduler.end_flush())
    }

    pub fn flush_state(&self) -> Result<FlushState> {
        Ok(self.loaded()?.scheduler.flush_state())
    }

    /// Media type offered at `index`; `None` once the list is exhausted.
    pub fn media_type(&self, index: usize) -> Result<Option<&MediaType>> {
        Ok(self.loaded()?.file.media_type_at(index))
    }

    /// Whether a consumer asking for `candidate` can be connected.
    pub fn check_media_type(&self, candidate: &MediaType) -> Result<bool> {
        Ok(self.loaded()?.file.media_type().accepts(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Outcome;
    use crate::reader::testutil::*;
    use crate::vfs::PartSpec;

    fn file(data: &[u8], split: usize) -> VirtualFile {
        VirtualFile::new(
            vec![
                PartSpec::new(memory(&data[..split])),
                PartSpec::new(memory(&data[split..])),
            ],
            MediaType::new("video", "mpeg2"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn unloaded_session_refuses_everything() {
        let mut session = Session::<()>::new(EngineConfig::default()).unwrap();
        let mut buf = [0u8; 4];

        assert!(matches!(session.length(), Err(Error::NotLoaded)));
        assert!(matches!(session.request(0, 4, zeroed(4), ()), Err(Error::NotLoaded)));
        assert!(matches!(session.sync_read(0, &mut buf).await, Err(Error::NotLoaded)));
        assert!(matches!(session.wait_for_next(None).await, Err(Error::NotLoaded)));
        assert!(matches!(session.begin_flush(), Err(Error::NotLoaded)));
        assert!(matches!(session.media_type(0), Err(Error::NotLoaded)));

        session.load(file(&pattern(10), 5)).unwrap();
        assert_eq!(session.length().unwrap(), (10, 10));
        assert!(session.unload().is_some());
        assert!(!session.is_loaded());
    }

    #[tokio::test]
    async fn request_is_clipped_to_the_file() {
        let data = pattern(150);
        let mut session = Session::new(EngineConfig::default()).unwrap();
        session.load(file(&data, 100)).unwrap();

        session.request(140, 64, zeroed(64), "tail").unwrap();
        let done = session.wait_for_next(Some(Duration::from_secs(5))).await.unwrap();

        assert!(done.is_complete());
        assert_eq!(done.token, "tail");
        assert_eq!(done.data(), &data[140..]);
    }

    #[tokio::test]
    async fn request_past_the_end_fails() {
        let data = pattern(150);
        let mut session = Session::new(EngineConfig::default()).unwrap();
        session.load(file(&data, 100)).unwrap();

        assert!(matches!(
            session.request(151, 8, zeroed(8), ()),
            Err(Error::EndOfFile { transferred: 0 })
        ));
        assert!(matches!(
            session.request(150, 8, zeroed(8), ()),
            Err(Error::EndOfFile { transferred: 0 })
        ));
    }

    #[tokio::test]
    async fn negotiated_alignment_applies_to_loaded_file() {
        let data = pattern(100);
        let mut session = Session::new(EngineConfig::default()).unwrap();
        session.load(file(&data, 60)).unwrap();

        assert_eq!(session.negotiate_alignment(0).unwrap(), Alignment::BYTE);
        assert_eq!(session.negotiate_alignment(16).unwrap().get(), 16);
        assert!(session.negotiate_alignment(12).is_err());

        assert!(matches!(
            session.request(8, 16, zeroed(16), ()),
            Err(Error::BadAlignment { .. })
        ));

        let mut buf = vec![0u8; 32];
        let read = session.sync_read_aligned(96, 32, &mut buf).await.unwrap();
        assert!(read.is_complete());
        assert_eq!(read.bytes, 4);
        assert_eq!(&buf[..4], &data[96..]);
    }

    #[tokio::test]
    async fn sync_read_reports_partial_progress() {
        let data = pattern(150);
        let mut session = Session::<()>::new(EngineConfig::default()).unwrap();
        session.load(file(&data, 100)).unwrap();

        let mut buf = vec![0u8; 60];
        let read = session.sync_read(120, &mut buf).await.unwrap();
        assert!(matches!(read.outcome, Outcome::Short { actual: 30, .. }));
        assert_eq!(&buf[..30], &data[120..]);
    }

    #[tokio::test]
    async fn locate_and_media_type_queries() {
        let data = pattern(150);
        let mut session = Session::<()>::new(EngineConfig::default()).unwrap();
        session.load(file(&data, 100)).unwrap();

        let (index, part) = session.locate(120).unwrap();
        assert_eq!(index, 1);
        assert_eq!((part.start(), part.end()), (100, 150));
        assert!(matches!(session.locate(150), Err(Error::EndOfFile { .. })));

        assert_eq!(session.media_type(0).unwrap(), Some(&MediaType::new("video", "mpeg2")));
        assert_eq!(session.media_type(1).unwrap(), None);
        assert!(session.check_media_type(&MediaType::new("video", "mpeg2")).unwrap());
        assert!(!session.check_media_type(&MediaType::new("audio", "mpeg2")).unwrap());
    }

    #[tokio::test]
    async fn flush_round_trip_through_the_session() {
        let data = pattern(150);
        let mut session = Session::new(EngineConfig::default()).unwrap();
        session.load(file(&data, 100)).unwrap();

        session.request(0, 50, zeroed(50), 1u8).unwrap();
        session.begin_flush().unwrap();
        assert_eq!(session.flush_state().unwrap(), FlushState::Flushing);
        assert!(matches!(
            session.request(50, 50, zeroed(50), 2),
            Err(Error::WrongState)
        ));

        let done = session.wait_for_next(Some(Duration::ZERO)).await.unwrap();
        assert!(done.is_flushed());
        assert_eq!(done.token, 1);

        assert!(session.end_flush().unwrap().is_empty());
        session.request(50, 50, zeroed(50), 3).unwrap();
        let done = session.wait_for_next(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(done.token, 3);
        assert_eq!(done.data(), &data[50..100]);
    }

    #[tokio::test]
    async fn page_alignment_works_with_session_buffers() {
        let data = pattern(8192);
        let config = EngineConfig {
            alignment: 4096,
            ..EngineConfig::default()
        };
        let mut session = Session::new(config).unwrap();
        session.load(file(&data, 4096)).unwrap();

        for token in 0..16u64 {
            let buffer = session.alloc_buffer(4096).unwrap();
            session.request((token % 2) * 4096, 4096, buffer, token).unwrap();
        }
        for token in 0..16u64 {
            let done = session.wait_for_next(Some(Duration::from_secs(5))).await.unwrap();
            let start = (token as usize % 2) * 4096;
            assert_eq!(done.token, token);
            assert!(done.is_complete());
            assert_eq!(done.data(), &data[start..start + 4096]);
        }

        let mut buf = session.alloc_buffer(4096).unwrap();
        let read = session.sync_read_aligned(4096, 4096, &mut buf).await.unwrap();
        assert!(read.is_complete());
        assert_eq!(&buf[..], &data[4096..]);
    }
}
