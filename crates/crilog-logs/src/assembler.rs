use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crilog_types::{LogRecord, LogTag, StreamType};

/// A logical line rebuilt from a run of `Partial*, Full` records
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalLine {
    /// Timestamp of the first record of the run
    pub timestamp: DateTime<Utc>,

    pub stream: StreamType,

    pub content: Vec<u8>,

    /// False when the log ended before a `Full` record closed the run
    pub complete: bool,

    /// Number of records the line was assembled from
    pub records: usize,
}

impl LogicalLine {
    /// Treat a single record as a line of its own
    pub fn from_record(record: LogRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            stream: record.stream,
            complete: record.tag == LogTag::Full,
            content: record.content,
            records: 1,
        }
    }

    pub fn content_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

struct PendingLine {
    timestamp: DateTime<Utc>,
    content: Vec<u8>,
    records: usize,
}

/// Joins partial records back into logical lines, per stream
#[derive(Default)]
pub struct LineAssembler {
    pending: HashMap<StreamType, PendingLine>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; returns the line it completes, if any
    pub fn push(&mut self, record: LogRecord) -> Option<LogicalLine> {
        let stream = record.stream;
        let pending = self
            .pending
            .entry(stream)
            .or_insert_with(|| PendingLine {
                timestamp: record.timestamp,
                content: Vec::new(),
                records: 0,
            });
        pending.content.extend_from_slice(&record.content);
        pending.records += 1;

        if record.tag == LogTag::Partial {
            return None;
        }

        self.pending.remove(&stream).map(|line| LogicalLine {
            timestamp: line.timestamp,
            stream,
            content: line.content,
            complete: true,
            records: line.records,
        })
    }

    /// Bytes buffered for a stream's unfinished line
    pub fn pending_len(&self, stream: StreamType) -> usize {
        self.pending.get(&stream).map_or(0, |p| p.content.len())
    }

    /// Drain unfinished lines, stdout first
    pub fn finish(&mut self) -> Vec<LogicalLine> {
        StreamType::ALL
            .into_iter()
            .filter_map(|stream| {
                self.pending.remove(&stream).map(|line| LogicalLine {
                    timestamp: line.timestamp,
                    stream,
                    content: line.content,
                    complete: false,
                    records: line.records,
                })
            })
            .collect()
    }
}
