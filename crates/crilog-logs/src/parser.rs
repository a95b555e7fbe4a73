use chrono::{DateTime, Utc};

use crilog_types::{EOL, LogRecord, RecordFormat};

use crate::error::ParseError;

/// Decodes encoded record lines back into [`LogRecord`]s
#[derive(Clone, Debug, Default)]
pub struct RecordParser {
    format: RecordFormat,
}

impl RecordParser {
    pub fn new(format: RecordFormat) -> Self {
        Self { format }
    }

    /// Parse one record line, with or without its trailing newline.
    ///
    /// Only the first three delimiters separate fields; anything after the
    /// third belongs to the content, delimiters included.
    pub fn parse(&self, line: &[u8]) -> Result<LogRecord, ParseError> {
        let line = line.strip_suffix(&[EOL]).unwrap_or(line);
        let mut fields = line.splitn(4, |b| *b == self.format.delimiter);

        // splitn always yields a first field, possibly empty
        let timestamp = Self::parse_timestamp(fields.next().unwrap_or_default())?;

        let stream_field = fields.next().ok_or(ParseError::MissingField("stream"))?;
        let stream = self
            .format
            .stream_from_token(stream_field)
            .ok_or_else(|| ParseError::UnknownStream(lossy(stream_field)))?;

        let tag_field = fields.next().ok_or(ParseError::MissingField("tag"))?;
        let tag = self
            .format
            .tag_from_token(tag_field)
            .ok_or_else(|| ParseError::UnknownTag(lossy(tag_field)))?;

        let content = fields.next().ok_or(ParseError::MissingField("content"))?;

        Ok(LogRecord::with_timestamp(
            timestamp,
            stream,
            tag,
            content.to_vec(),
        ))
    }

    fn parse_timestamp(field: &[u8]) -> Result<DateTime<Utc>, ParseError> {
        std::str::from_utf8(field)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .ok_or_else(|| ParseError::InvalidTimestamp(lossy(field)))
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crilog_types::{LogTag, StreamType};

    use crate::encoder::RecordEncoder;

    #[test]
    fn test_parse_record() {
        let parser = RecordParser::default();
        let record = parser
            .parse(b"2024-01-15T10:30:00.123456789Z stderr P some log message\n")
            .unwrap();

        let expected_ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(record.timestamp, expected_ts);
        assert_eq!(record.stream, StreamType::Stderr);
        assert_eq!(record.tag, LogTag::Partial);
        assert_eq!(record.content, b"some log message".to_vec());
    }

    #[test]
    fn test_parse_offset_timestamp() {
        let parser = RecordParser::default();
        let record = parser
            .parse(b"2024-01-15T12:30:00.5+02:00 stdout F x")
            .unwrap();
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
                + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_encoded_record_decodes() {
        let format = RecordFormat {
            delimiter: b'\t',
            ..Default::default()
        };
        let encoder = RecordEncoder::new(format.clone());
        let parser = RecordParser::new(format);

        let original = LogRecord::new(StreamType::Stdout, LogTag::Full, b"a\tb\t\tc".to_vec());
        let decoded = parser.parse(&encoder.encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_empty_content() {
        let record = RecordParser::default()
            .parse(b"2024-01-15T10:30:00Z stdout F \n")
            .unwrap();
        assert!(record.content.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let parser = RecordParser::default();

        assert_eq!(
            parser.parse(b""),
            Err(ParseError::InvalidTimestamp(String::new()))
        );
        assert_eq!(
            parser.parse(b"yesterday stdout F x"),
            Err(ParseError::InvalidTimestamp("yesterday".to_string()))
        );
        assert_eq!(
            parser.parse(b"2024-01-15T10:30:00Z"),
            Err(ParseError::MissingField("stream"))
        );
        assert_eq!(
            parser.parse(b"2024-01-15T10:30:00Z stdin F x"),
            Err(ParseError::UnknownStream("stdin".to_string()))
        );
        assert_eq!(
            parser.parse(b"2024-01-15T10:30:00Z stdout X x"),
            Err(ParseError::UnknownTag("X".to_string()))
        );
        assert_eq!(
            parser.parse(b"2024-01-15T10:30:00Z stdout F"),
            Err(ParseError::MissingField("content"))
        );
    }
}
