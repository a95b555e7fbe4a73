use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Writer shared by every redirector of one log.
///
/// Each record goes out through a single `write_all` followed by a flush while
/// the lock is held, so records from concurrent streams never interleave within
/// a line and a failed write is reported for the record that caused it.
pub struct SharedSink<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> SharedSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one encoded record and flush it.
    ///
    /// Writers such as `tokio::fs::File` accept bytes before they reach the
    /// file and only report the failure on a later call.
    pub async fn write_record(&self, record: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(record).await?;
        writer.flush().await
    }

    pub async fn flush(&self) -> io::Result<()> {
        self.inner.lock().await.flush().await
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }

    /// Recover the writer once no other handle is alive
    pub fn into_inner(self) -> Option<W> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}
