use std::io;

use thiserror::Error;

use crilog_types::StreamType;

/// Terminal failure of a single stream redirection
#[derive(Debug, Error)]
pub enum RedirectError {
    /// The source failed with something other than a clean end-of-stream
    #[error("failed to read {stream} for {label} after {records} records")]
    SourceRead {
        label: String,
        stream: StreamType,
        records: u64,
        #[source]
        source: io::Error,
    },

    /// The sink rejected a record; `records` earlier records are intact
    #[error("failed to write {stream} record #{} to {label}", .records + 1)]
    SinkWrite {
        label: String,
        stream: StreamType,
        records: u64,
        #[source]
        source: io::Error,
    },

    /// Records were accepted but the final flush at end-of-stream failed
    #[error("failed to flush {label} after {records} {stream} records")]
    SinkFlush {
        label: String,
        stream: StreamType,
        records: u64,
        #[source]
        source: io::Error,
    },

    /// The task driving the redirector panicked or was cancelled
    #[error("redirect task for {stream} did not complete")]
    Join {
        stream: StreamType,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl RedirectError {
    pub fn stream(&self) -> StreamType {
        match self {
            Self::SourceRead { stream, .. }
            | Self::SinkWrite { stream, .. }
            | Self::SinkFlush { stream, .. }
            | Self::Join { stream, .. } => *stream,
        }
    }

    /// Records written before the failure, when known
    pub fn records_written(&self) -> Option<u64> {
        match self {
            Self::SourceRead { records, .. }
            | Self::SinkWrite { records, .. }
            | Self::SinkFlush { records, .. } => Some(*records),
            Self::Join { .. } => None,
        }
    }
}

/// A line that does not decode as a record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("record has no {0} field")]
    MissingField(&'static str),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("unknown stream {0:?}")]
    UnknownStream(String),

    #[error("unknown tag {0:?}")]
    UnknownTag(String),
}

/// Failure while reading records back from an encoded log
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed record on line {line}")]
    Parse {
        line: u64,
        #[source]
        source: ParseError,
    },
}
