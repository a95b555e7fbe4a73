use regex::Regex;

use crilog_types::StreamType;

use crate::assembler::LogicalLine;

/// Compiled filter for reassembled log lines
#[derive(Clone)]
pub struct LineFilter {
    /// Regex pattern (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Only keep lines from this stream
    stream: Option<StreamType>,

    /// Whether to invert the text match
    invert: bool,

    case_insensitive: bool,
}

impl LineFilter {
    /// Create a new filter from a pattern string
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, false)
    }

    /// Create a case-insensitive filter
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = if pattern.is_empty() {
            None
        } else if case_insensitive {
            Some(Regex::new(&format!("(?i){}", pattern))?)
        } else {
            Some(Regex::new(pattern)?)
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            stream: None,
            invert: false,
            case_insensitive,
        })
    }

    /// Restrict to one stream
    pub fn with_stream(mut self, stream: Option<StreamType>) -> Self {
        self.stream = stream;
        self
    }

    /// Invert the text match
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Check if a line passes this filter
    pub fn matches(&self, line: &LogicalLine) -> bool {
        if self.stream.is_some_and(|s| s != line.stream) {
            return false;
        }

        let text_match = match &self.regex {
            Some(re) => re.is_match(&line.content_lossy()),
            None => true,
        };

        if self.invert { !text_match } else { text_match }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.regex.is_none() && self.stream.is_none()
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

impl std::fmt::Debug for LineFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFilter")
            .field("pattern", &self.pattern)
            .field("stream", &self.stream)
            .field("invert", &self.invert)
            .finish()
    }
}
