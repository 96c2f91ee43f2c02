use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Local file reader with random access support
///
/// Reads are positional, so one handle can serve any number of concurrent
/// reads without locking. Each read runs on tokio's blocking pool so the
/// calling task never waits on the disk.
pub struct LocalFileReader {
    file: Arc<File>,
    path: PathBuf,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open part {}", path.display()))?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Positional read that leaves the handle's cursor alone where the
/// platform allows it.
fn read_chunk(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let file = Arc::clone(&self.file);
        let len = buf.len();

        let chunk = tokio::task::spawn_blocking(move || {
            let mut chunk = vec![0u8; len];
            let n = read_chunk(&file, offset, &mut chunk)?;
            chunk.truncate(n);
            Ok::<_, std::io::Error>(chunk)
        })
        .await
        .with_context(|| format!("blocking read of {} failed", self.path.display()))??;

        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn positional_reads_do_not_share_a_cursor() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let reader = LocalFileReader::new(tmp.path()).unwrap();
        assert_eq!(reader.size(), 10);

        let mut a = [0u8; 3];
        let mut b = [0u8; 3];
        reader.read_at(7, &mut a).await.unwrap();
        reader.read_at(1, &mut b).await.unwrap();
        assert_eq!(&a, b"789");
        assert_eq!(&b, b"123");
    }

    #[test]
    fn missing_file_names_the_part() {
        let err = LocalFileReader::new(Path::new("/nonexistent/volume.r00"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("volume.r00"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reads_leave_the_runtime_thread_free() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let reader = Arc::new(LocalFileReader::new(tmp.path()).unwrap());
        let reads = (0..16u64).map(|i| {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = reader.read_at(i * 4096, &mut buf).await.unwrap();
                (i, n, buf)
            })
        });

        for read in futures::future::join_all(reads).await {
            let (i, n, buf) = read.unwrap();
            let start = i as usize * 4096;
            assert_eq!(n, 4096);
            assert_eq!(buf, &data[start..start + 4096]);
        }
    }
}
