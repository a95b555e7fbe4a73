use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, trace};

use crilog_types::{EngineConfig, LogRecord, LogTag, StreamType};

use crate::encoder::RecordEncoder;
use crate::error::RedirectError;
use crate::sink::SharedSink;
use crate::splitter::LineSplitter;

/// Totals for one completed redirection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectSummary {
    pub stream: StreamType,

    pub records: u64,
    pub partial_records: u64,

    /// Content bytes, excluding record headers and consumed newlines
    pub bytes: u64,
}

impl RedirectSummary {
    fn new(stream: StreamType) -> Self {
        Self {
            stream,
            records: 0,
            partial_records: 0,
            bytes: 0,
        }
    }

    fn add(&mut self, record: &LogRecord) {
        self.records += 1;
        self.bytes += record.content.len() as u64;
        if record.tag == LogTag::Partial {
            self.partial_records += 1;
        }
    }
}

/// Transcodes one physical stream into CRI records on a shared sink
pub struct LogRedirector {
    /// Log identifier used in tracing and errors, usually the file path
    label: String,

    stream: StreamType,

    buf_size: usize,

    encoder: RecordEncoder,

    /// Incremented after every record that reached the sink
    counter: Option<Arc<AtomicU64>>,
}

impl LogRedirector {
    pub fn new(label: impl Into<String>, stream: StreamType, config: &EngineConfig) -> Self {
        Self {
            label: label.into(),
            stream,
            buf_size: config.buf_size,
            encoder: RecordEncoder::new(config.format.clone()),
            counter: None,
        }
    }

    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn stream(&self) -> StreamType {
        self.stream
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Drive `source` to end-of-stream, writing one record per chunk.
    ///
    /// Stops at the first read or write failure. Records written before the
    /// failure stay in the sink.
    pub async fn run<R, W>(
        &self,
        source: R,
        sink: &SharedSink<W>,
    ) -> Result<RedirectSummary, RedirectError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut splitter = LineSplitter::new(source, self.buf_size);
        let mut summary = RedirectSummary::new(self.stream);

        loop {
            let chunk = match splitter.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(source) => {
                    error!(
                        label = %self.label,
                        stream = %self.stream,
                        error = %source,
                        "An error occurred when redirecting log stream"
                    );
                    return Err(RedirectError::SourceRead {
                        label: self.label.clone(),
                        stream: self.stream,
                        records: summary.records,
                        source,
                    });
                }
            };

            let record = LogRecord::new(self.stream, chunk.tag, chunk.content);
            let data = self.encoder.encode(&record);

            if let Err(source) = sink.write_record(&data).await {
                return Err(self.write_failed(summary.records, source));
            }

            summary.add(&record);
            if let Some(counter) = &self.counter {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            trace!(
                stream = %self.stream,
                tag = %record.tag,
                len = record.content.len(),
                "record written"
            );
        }

        if let Err(source) = sink.flush().await {
            error!(
                label = %self.label,
                stream = %self.stream,
                error = %source,
                "Failed to flush log"
            );
            return Err(RedirectError::SinkFlush {
                label: self.label.clone(),
                stream: self.stream,
                records: summary.records,
                source,
            });
        }

        debug!(
            label = %self.label,
            stream = %self.stream,
            records = summary.records,
            "Finished redirecting log stream"
        );
        Ok(summary)
    }

    fn write_failed(&self, records: u64, source: std::io::Error) -> RedirectError {
        error!(
            label = %self.label,
            stream = %self.stream,
            error = %source,
            "Failed to write log record"
        );
        RedirectError::SinkWrite {
            label: self.label.clone(),
            stream: self.stream,
            records,
            source,
        }
    }
}

/// Redirect a single stream with a fresh [`LogRedirector`]
pub async fn redirect_logs<R, W>(
    label: &str,
    source: R,
    sink: &SharedSink<W>,
    stream: StreamType,
    config: &EngineConfig,
) -> Result<RedirectSummary, RedirectError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    LogRedirector::new(label, stream, config)
        .run(source, sink)
        .await
}
