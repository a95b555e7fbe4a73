use crilog_types::{EOL, LogRecord, RecordFormat};

/// Renders records into their on-wire form:
/// `<timestamp> <stream> <tag> <content>\n`
#[derive(Clone, Debug, Default)]
pub struct RecordEncoder {
    format: RecordFormat,
}

impl RecordEncoder {
    pub fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &RecordFormat {
        &self.format
    }

    /// Encode a record into one owned buffer, ready for a single write
    pub fn encode(&self, record: &LogRecord) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(record, &mut buf);
        buf
    }

    /// Append the encoded record to `buf`
    pub fn encode_into(&self, record: &LogRecord, buf: &mut Vec<u8>) {
        debug_assert!(!record.content.contains(&EOL));

        let timestamp = self.format.timestamp.render(&record.timestamp);
        let stream = self.format.stream_token(record.stream);
        let tag = self.format.tag_token(record.tag);
        let delimiter = self.format.delimiter;

        buf.reserve(timestamp.len() + stream.len() + tag.len() + record.content.len() + 4);
        buf.extend_from_slice(timestamp.as_bytes());
        buf.push(delimiter);
        buf.extend_from_slice(stream.as_bytes());
        buf.push(delimiter);
        buf.extend_from_slice(tag.as_bytes());
        buf.push(delimiter);
        buf.extend_from_slice(&record.content);
        buf.push(EOL);
    }
}
