use std::collections::VecDeque;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crilog_types::{EOL, LogRecord, RecordFormat};

use crate::assembler::{LineAssembler, LogicalLine};
use crate::error::ReadError;
use crate::parser::RecordParser;

/// Reads encoded records back from a log
pub struct RecordReader<R> {
    reader: BufReader<R>,
    parser: RecordParser,
    line: Vec<u8>,

    /// 1-based number of the last line read
    line_number: u64,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    pub fn new(source: R, format: RecordFormat) -> Self {
        Self {
            reader: BufReader::new(source),
            parser: RecordParser::new(format),
            line: Vec::new(),
            line_number: 0,
        }
    }

    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Next record, or `None` at end of input
    pub async fn next_record(&mut self) -> Result<Option<LogRecord>, ReadError> {
        self.line.clear();
        if self.reader.read_until(EOL, &mut self.line).await? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        self.parser
            .parse(&self.line)
            .map(Some)
            .map_err(|source| ReadError::Parse {
                line: self.line_number,
                source,
            })
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<LogRecord, ReadError>> {
        futures::stream::try_unfold(self, |mut reader| async move {
            let next = reader.next_record().await?;
            Ok::<_, ReadError>(next.map(|record| (record, reader)))
        })
    }

    /// Reassemble logical lines instead of yielding raw records
    pub fn lines(self) -> LineReader<R> {
        LineReader {
            records: self,
            assembler: LineAssembler::new(),
            drained: VecDeque::new(),
            finished: false,
        }
    }
}

/// Yields logical lines rebuilt from the records of a log
pub struct LineReader<R> {
    records: RecordReader<R>,
    assembler: LineAssembler,

    /// Incomplete lines left over at end of input
    drained: VecDeque<LogicalLine>,

    finished: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub async fn next_line(&mut self) -> Result<Option<LogicalLine>, ReadError> {
        while !self.finished {
            match self.records.next_record().await? {
                Some(record) => {
                    if let Some(line) = self.assembler.push(record) {
                        return Ok(Some(line));
                    }
                }
                None => {
                    self.finished = true;
                    self.drained.extend(self.assembler.finish());
                }
            }
        }
        Ok(self.drained.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crilog_types::{LogTag, StreamType};

    const LOG: &[u8] = b"\
2024-01-15T10:30:00.000000001Z stdout P hello \n\
2024-01-15T10:30:00.000000002Z stderr F oops\n\
2024-01-15T10:30:00.000000003Z stdout F world\n\
2024-01-15T10:30:00.000000004Z stdout P trailing";

    #[tokio::test]
    async fn test_read_records() {
        let mut reader = RecordReader::new(LOG, RecordFormat::default());
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            records.push(record);
        }

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].tag, LogTag::Partial);
        assert_eq!(records[0].content, b"hello ".to_vec());
        assert_eq!(records[1].stream, StreamType::Stderr);
        assert_eq!(records[3].content, b"trailing".to_vec());
        assert_eq!(reader.line_number(), 4);
    }

    #[tokio::test]
    async fn test_read_lines() {
        let mut lines = RecordReader::new(LOG, RecordFormat::default()).lines();

        let first = lines.next_line().await.unwrap().unwrap();
        assert_eq!(first.stream, StreamType::Stderr);
        assert_eq!(first.content, b"oops".to_vec());

        let second = lines.next_line().await.unwrap().unwrap();
        assert_eq!(second.content, b"hello world".to_vec());
        assert!(second.complete);

        let last = lines.next_line().await.unwrap().unwrap();
        assert_eq!(last.content, b"trailing".to_vec());
        assert!(!last.complete);

        assert!(lines.next_line().await.unwrap().is_none());
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_reports_number() {
        let log = b"2024-01-15T10:30:00Z stdout F ok\nnot a record\n";
        let mut reader = RecordReader::new(&log[..], RecordFormat::default());
        assert!(reader.next_record().await.unwrap().is_some());

        match reader.next_record().await {
            Err(ReadError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_of_records() {
        use futures::TryStreamExt;

        let records: Vec<LogRecord> = RecordReader::new(LOG, RecordFormat::default())
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(records.len(), 4);
    }
}
