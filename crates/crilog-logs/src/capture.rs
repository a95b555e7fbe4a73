use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::task::JoinHandle;
use tracing::debug;

use crilog_types::{EngineConfig, StreamType};

use crate::error::RedirectError;
use crate::redirect::{LogRedirector, RedirectSummary};
use crate::sink::SharedSink;

/// Live per-stream record counters, shareable across tasks
#[derive(Clone, Default)]
pub struct CaptureStats {
    counters: Arc<RwLock<HashMap<StreamType, Arc<AtomicU64>>>>,
}

impl CaptureStats {
    /// Counter for a stream, created on first use
    fn counter(&self, stream: StreamType) -> Arc<AtomicU64> {
        Arc::clone(self.counters.write().entry(stream).or_default())
    }

    /// Records written so far for a stream
    pub fn records_written(&self, stream: StreamType) -> u64 {
        self.counters
            .read()
            .get(&stream)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    pub fn total(&self) -> u64 {
        self.counters
            .read()
            .values()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }
}

type RedirectTask = JoinHandle<Result<RedirectSummary, RedirectError>>;

/// Runs one redirector task per stream against a shared sink
pub struct CaptureManager<W> {
    label: String,

    sink: SharedSink<W>,

    config: EngineConfig,

    /// Spawned tasks, in attach order
    tasks: Vec<(StreamType, RedirectTask)>,

    stats: CaptureStats,
}

impl<W> CaptureManager<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(label: impl Into<String>, sink: SharedSink<W>, config: EngineConfig) -> Self {
        Self {
            label: label.into(),
            sink,
            config,
            tasks: Vec::new(),
            stats: CaptureStats::default(),
        }
    }

    /// Start redirecting `source` as `stream`
    pub fn attach<R>(&mut self, stream: StreamType, source: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let redirector = LogRedirector::new(self.label.clone(), stream, &self.config)
            .with_counter(self.stats.counter(stream));
        let sink = self.sink.clone();

        debug!(label = %self.label, stream = %stream, "Starting log redirection");
        let task = tokio::spawn(async move { redirector.run(source, &sink).await });
        self.tasks.push((stream, task));
    }

    /// Attach an in-memory pipe and return its write end.
    ///
    /// Dropping or shutting down the returned writer ends the stream.
    pub fn pipe(&mut self, stream: StreamType) -> DuplexStream {
        let (writer, reader) = tokio::io::duplex(self.config.buf_size);
        self.attach(stream, reader);
        writer
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.clone()
    }

    pub fn records_written(&self, stream: StreamType) -> u64 {
        self.stats.records_written(stream)
    }

    /// Number of streams still being redirected
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|(_, t)| !t.is_finished()).count()
    }

    /// Wait for every stream to end, then shut the sink down.
    ///
    /// Returns one result per attached stream, in attach order. The outer
    /// error is a failure to shut the sink down.
    pub async fn wait(self) -> io::Result<Vec<Result<RedirectSummary, RedirectError>>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for (stream, task) in self.tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(source) => Err(RedirectError::Join { stream, source }),
            };
            results.push(result);
        }

        self.sink.shutdown().await?;
        debug!(label = %self.label, streams = results.len(), "Log capture finished");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncWriteExt, ReadBuf};

    use crate::reader::RecordReader;
    use crilog_types::{LogTag, RecordFormat};

    struct BrokenSource;

    impl AsyncRead for BrokenSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("source closed")))
        }
    }

    async fn read_back(output: &[u8]) -> Vec<crilog_types::LogRecord> {
        let mut reader = RecordReader::new(output, RecordFormat::default());
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_two_streams_share_a_sink() {
        let sink = SharedSink::new(Vec::new());
        let config = EngineConfig::default().with_buf_size(32);
        let mut manager = CaptureManager::new("test-path", sink.clone(), config);

        let stdout: Vec<u8> = (0..200).flat_map(|i| format!("out {i}\n").into_bytes()).collect();
        let stderr: Vec<u8> = (0..200).flat_map(|i| format!("err {i}\n").into_bytes()).collect();
        manager.attach(StreamType::Stdout, std::io::Cursor::new(stdout));
        manager.attach(StreamType::Stderr, std::io::Cursor::new(stderr));

        let stats = manager.stats();
        let results = manager.wait().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(stats.records_written(StreamType::Stdout), 200);
        assert_eq!(stats.total(), 400);

        let records = read_back(&sink.into_inner().unwrap()).await;
        assert_eq!(records.len(), 400);

        // Per-stream order is preserved whatever the interleaving
        for (stream, prefix) in [(StreamType::Stdout, "out"), (StreamType::Stderr, "err")] {
            let contents: Vec<String> = records
                .iter()
                .filter(|r| r.stream == stream)
                .map(|r| r.content_lossy().into_owned())
                .collect();
            let expected: Vec<String> = (0..200).map(|i| format!("{prefix} {i}")).collect();
            assert_eq!(contents, expected);
        }
    }

    #[tokio::test]
    async fn test_failing_stream_does_not_stop_others() {
        let sink = SharedSink::new(Vec::new());
        let mut manager = CaptureManager::new("test-path", sink.clone(), EngineConfig::default());

        manager.attach(StreamType::Stderr, BrokenSource);
        manager.attach(StreamType::Stdout, &b"still here\n"[..]);

        let results = manager.wait().await.unwrap();
        assert!(matches!(
            results[0],
            Err(RedirectError::SourceRead {
                stream: StreamType::Stderr,
                ..
            })
        ));
        assert_eq!(results[1].as_ref().unwrap().records, 1);

        let records = read_back(&sink.into_inner().unwrap()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, b"still here".to_vec());
    }

    #[tokio::test]
    async fn test_pipe_logger() {
        let sink = SharedSink::new(Vec::new());
        let config = EngineConfig::default().with_buf_size(4);
        let mut manager = CaptureManager::new("test-path", sink.clone(), config);

        let mut writer = manager.pipe(StreamType::Stdout);
        writer.write_all(b"abcdef\nxy").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let results = manager.wait().await.unwrap();
        let summary = results.into_iter().next().unwrap().unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.partial_records, 1);

        let records = read_back(&sink.into_inner().unwrap()).await;
        let tags: Vec<LogTag> = records.iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![LogTag::Partial, LogTag::Full, LogTag::Full]);
        assert_eq!(records[1].content, b"ef".to_vec());
    }

    #[tokio::test]
    async fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.log");
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .unwrap();

        let mut manager = CaptureManager::new(
            path.display().to_string(),
            SharedSink::new(file),
            EngineConfig::default(),
        );
        manager.attach(StreamType::Stdout, &b"to disk\n"[..]);
        assert!(manager.wait().await.unwrap()[0].is_ok());

        let written = tokio::fs::read(&path).await.unwrap();
        let records = read_back(&written).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, b"to disk".to_vec());
    }
}
