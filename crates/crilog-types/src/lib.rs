//! Shared types for crilog
//!
//! This crate contains the record model and the record format configuration
//! shared by the transcoding engine, its readers and the CLI.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

/// Default maximum content length of a single record (16 KiB)
pub const DEFAULT_BUF_SIZE: usize = 16 * 1024;

/// Largest accepted `buf_size`; readers and pipes allocate it up front
pub const MAX_BUF_SIZE: usize = 16 * 1024 * 1024;

/// Default field delimiter
pub const DEFAULT_DELIMITER: u8 = b' ';

/// Record terminator
pub const EOL: u8 = b'\n';

/// Bytes that may appear in a rendered RFC3339 timestamp
const TIMESTAMP_BYTES: &[u8] = b"0123456789-:T.Z+";

// ============================================================================
// Record Types
// ============================================================================

/// Physical stream a record was read from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl StreamType {
    /// Both streams, in the order readers drain them
    pub const ALL: [StreamType; 2] = [StreamType::Stdout, StreamType::Stderr];

    /// Default wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a record closes its logical line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogTag {
    /// Line ended by a newline or by end-of-stream
    Full,
    /// Line cut because the buffer filled up before a newline
    Partial,
}

impl LogTag {
    /// Default wire token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "F",
            Self::Partial => "P",
        }
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single transcoded record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// When the chunk was classified
    pub timestamp: DateTime<Utc>,

    /// Source stream
    pub stream: StreamType,

    /// Full/Partial classification
    pub tag: LogTag,

    /// Raw content, never containing a newline
    pub content: Vec<u8>,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(stream: StreamType, tag: LogTag, content: Vec<u8>) -> Self {
        Self::with_timestamp(Utc::now(), stream, tag, content)
    }

    pub fn with_timestamp(
        timestamp: DateTime<Utc>,
        stream: StreamType,
        tag: LogTag,
        content: Vec<u8>,
    ) -> Self {
        Self {
            timestamp,
            stream,
            tag,
            content,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.tag == LogTag::Partial
    }

    /// Content as text, replacing invalid UTF-8
    pub fn content_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

// ============================================================================
// Format Configuration
// ============================================================================

/// Timestamp rendering used in the first record field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampFormat {
    /// 2024-01-15T10:30:00.123456789Z
    #[default]
    Rfc3339Nano,
    /// 2024-01-15T10:30:00.123456Z
    Rfc3339Micro,
    /// 2024-01-15T10:30:00.123Z
    Rfc3339Millis,
}

impl TimestampFormat {
    pub fn render(&self, timestamp: &DateTime<Utc>) -> String {
        let precision = match self {
            Self::Rfc3339Nano => SecondsFormat::Nanos,
            Self::Rfc3339Micro => SecondsFormat::Micros,
            Self::Rfc3339Millis => SecondsFormat::Millis,
        };
        timestamp.to_rfc3339_opts(precision, true)
    }
}

/// On-wire layout of a record: delimiter, timestamp format and tokens
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecordFormat {
    /// Single byte separating the first four fields
    #[serde(deserialize_with = "deserialize_delimiter")]
    pub delimiter: u8,

    pub timestamp: TimestampFormat,

    pub stdout_token: String,
    pub stderr_token: String,
    pub full_tag: String,
    pub partial_tag: String,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            timestamp: TimestampFormat::default(),
            stdout_token: StreamType::Stdout.as_str().to_string(),
            stderr_token: StreamType::Stderr.as_str().to_string(),
            full_tag: LogTag::Full.as_str().to_string(),
            partial_tag: LogTag::Partial.as_str().to_string(),
        }
    }
}

impl RecordFormat {
    pub fn stream_token(&self, stream: StreamType) -> &str {
        match stream {
            StreamType::Stdout => &self.stdout_token,
            StreamType::Stderr => &self.stderr_token,
        }
    }

    pub fn tag_token(&self, tag: LogTag) -> &str {
        match tag {
            LogTag::Full => &self.full_tag,
            LogTag::Partial => &self.partial_tag,
        }
    }

    /// Map a wire token back to its stream
    pub fn stream_from_token(&self, token: &[u8]) -> Option<StreamType> {
        StreamType::ALL
            .into_iter()
            .find(|s| self.stream_token(*s).as_bytes() == token)
    }

    /// Map a wire token back to its tag
    pub fn tag_from_token(&self, token: &[u8]) -> Option<LogTag> {
        [LogTag::Full, LogTag::Partial]
            .into_iter()
            .find(|t| self.tag_token(*t).as_bytes() == token)
    }

    /// Check that every record this format produces splits back unambiguously
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delimiter == EOL || TIMESTAMP_BYTES.contains(&self.delimiter) {
            return Err(ConfigError::InvalidDelimiter(self.delimiter as char));
        }

        let tokens = [
            ("stdout_token", &self.stdout_token),
            ("stderr_token", &self.stderr_token),
            ("full_tag", &self.full_tag),
            ("partial_tag", &self.partial_tag),
        ];

        for (name, token) in tokens {
            if token.is_empty() {
                return Err(ConfigError::EmptyToken(name));
            }
            if token.bytes().any(|b| b == self.delimiter || b == EOL) {
                return Err(ConfigError::TokenContainsDelimiter {
                    name,
                    token: token.clone(),
                });
            }
        }

        if self.stdout_token == self.stderr_token {
            return Err(ConfigError::DuplicateToken(self.stdout_token.clone()));
        }
        if self.full_tag == self.partial_tag {
            return Err(ConfigError::DuplicateToken(self.full_tag.clone()));
        }

        Ok(())
    }
}

/// Engine settings passed to every redirector at construction
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum content length of a single record
    pub buf_size: usize,

    pub format: RecordFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buf_size: DEFAULT_BUF_SIZE,
            format: RecordFormat::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buf_size == 0 {
            return Err(ConfigError::ZeroBufSize);
        }
        if self.buf_size > MAX_BUF_SIZE {
            return Err(ConfigError::BufSizeTooLarge(self.buf_size));
        }
        self.format.validate()
    }
}

/// Invalid engine or format configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("buf_size must be greater than zero")]
    ZeroBufSize,

    #[error("buf_size {0} exceeds the maximum of {max} bytes", max = MAX_BUF_SIZE)]
    BufSizeTooLarge(usize),

    #[error("delimiter {0:?} collides with the timestamp or the line terminator")]
    InvalidDelimiter(char),

    #[error("{0} must not be empty")]
    EmptyToken(&'static str),

    #[error("{name} {token:?} contains the delimiter or a newline")]
    TokenContainsDelimiter { name: &'static str, token: String },

    #[error("token {0:?} is used twice")]
    DuplicateToken(String),
}

fn deserialize_delimiter<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(serde::de::Error::custom(format!(
            "delimiter must be a single ASCII character, got {s:?}"
        ))),
    }
}
