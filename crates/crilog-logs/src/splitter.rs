use std::io;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crilog_types::{EOL, LogTag};

/// A bounded slice of a logical line, classified
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Line bytes without the terminating newline
    pub content: Vec<u8>,

    pub tag: LogTag,
}

impl Chunk {
    pub fn full(content: Vec<u8>) -> Self {
        Self {
            content,
            tag: LogTag::Full,
        }
    }

    pub fn partial(content: Vec<u8>) -> Self {
        Self {
            content,
            tag: LogTag::Partial,
        }
    }
}

/// Splits a byte source into chunks of at most `max_len` bytes.
///
/// A chunk ends at the first newline (which is consumed and dropped), at
/// `max_len` bytes, or at end-of-stream. Only the second case is tagged
/// [`LogTag::Partial`].
///
/// A line whose length is an exact multiple of `max_len` and that is directly
/// followed by end-of-stream ends with a `Partial` chunk: the splitter never
/// reads ahead to find out whether more bytes are coming, since on a live
/// pipe that read could block indefinitely.
pub struct LineSplitter<R> {
    reader: BufReader<R>,

    max_len: usize,

    /// Read error held back until the bytes read before it were emitted
    deferred: Option<io::Error>,
}

impl<R: AsyncRead + Unpin> LineSplitter<R> {
    /// Create a splitter; a `max_len` of zero is treated as one
    pub fn new(source: R, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            reader: BufReader::with_capacity(max_len, source),
            max_len,
            deferred: None,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Read the next chunk, or `None` once the source is exhausted
    pub async fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }

        let mut content = Vec::new();

        loop {
            let available = match self.reader.fill_buf().await {
                Ok(available) => available,
                Err(err) if content.is_empty() => return Err(err),
                Err(err) => {
                    // Emit what was read so far, fail on the next call
                    self.deferred = Some(err);
                    return Ok(Some(Chunk::full(content)));
                }
            };

            if available.is_empty() {
                // End-of-stream terminates the line implicitly
                return Ok((!content.is_empty()).then(|| Chunk::full(content)));
            }

            let room = self.max_len - content.len();
            let window = &available[..available.len().min(room)];

            if let Some(pos) = window.iter().position(|b| *b == EOL) {
                content.extend_from_slice(&window[..pos]);
                self.reader.consume(pos + 1);
                return Ok(Some(Chunk::full(content)));
            }

            let taken = window.len();
            content.extend_from_slice(window);
            self.reader.consume(taken);

            if content.len() == self.max_len {
                return Ok(Some(Chunk::partial(content)));
            }
        }
    }

    /// Turn the splitter into a lazy stream of chunks
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Chunk>> {
        futures::stream::try_unfold(self, |mut splitter| async move {
            let next = splitter.next_chunk().await?;
            Ok::<_, io::Error>(next.map(|chunk| (chunk, splitter)))
        })
    }
}
