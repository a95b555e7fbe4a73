//! CRI log transcoding for crilog
//!
//! This crate turns raw container output streams into timestamped,
//! Full/Partial tagged records bounded by a fixed buffer size, and reads
//! such records back into the original lines.

mod assembler;
mod buffer;
mod capture;
mod encoder;
mod error;
mod filter;
mod parser;
mod reader;
mod redirect;
mod sink;
mod splitter;

pub use assembler::{LineAssembler, LogicalLine};
pub use buffer::TailBuffer;
pub use capture::{CaptureManager, CaptureStats};
pub use encoder::RecordEncoder;
pub use error::{ParseError, ReadError, RedirectError};
pub use filter::LineFilter;
pub use parser::RecordParser;
pub use reader::{LineReader, RecordReader};
pub use redirect::{LogRedirector, RedirectSummary, redirect_logs};
pub use sink::SharedSink;
pub use splitter::{Chunk, LineSplitter};

// Re-export types used in our public API
pub use crilog_types::{
    ConfigError, EngineConfig, LogRecord, LogTag, RecordFormat, StreamType, TimestampFormat,
};
