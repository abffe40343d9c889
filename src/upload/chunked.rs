//! Chunked transfer framing decoder
//!
//! Decodes `<hex-length>[;ext]\r\n<payload>\r\n` frames up to the terminating
//! zero-length frame, then skips any trailer lines. A missing final CRLF after
//! the zero-length frame is accepted.

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use super::types::MAX_CHUNK_LINE;

/// Chunked framing errors
#[derive(Debug, thiserror::Error)]
pub enum ChunkedError {
    #[error("Malformed chunk length: {0:?}")]
    MalformedLength(String),

    #[error("Missing CRLF after chunk payload")]
    MissingDelimiter,

    #[error("Chunk length line too long")]
    LineTooLong,

    #[error("Stream ended inside a chunk")]
    UnexpectedEof,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a length line
    Size,
    /// Inside a payload with this many bytes left
    Data { remaining: u64 },
    /// Expecting the CRLF that closes a payload
    DataEnd,
    /// After the zero-length frame
    Trailers,
    Done,
}

/// Incremental decoder over any async byte source
pub struct ChunkedDecoder<R> {
    reader: BufReader<R>,
    state: State,
    frames: u64,
}

impl<R: AsyncRead + Unpin> ChunkedDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            state: State::Size,
            frames: 0,
        }
    }

    /// Read decoded payload bytes into `buf`.
    ///
    /// Returns 0 once the terminating frame has been consumed. `buf` must not
    /// be empty.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChunkedError> {
        loop {
            match self.state {
                State::Size => {
                    let line = self.read_line().await?.ok_or(ChunkedError::UnexpectedEof)?;
                    let size = parse_size(&line)?;
                    tracing::trace!(frame = self.frames, size, "Chunk frame");
                    self.frames += 1;
                    self.state = if size == 0 {
                        State::Trailers
                    } else {
                        State::Data { remaining: size }
                    };
                }
                State::Data { remaining } => {
                    let want = remaining.min(buf.len() as u64) as usize;
                    let n = self.reader.read(&mut buf[..want]).await?;
                    if n == 0 {
                        return Err(ChunkedError::UnexpectedEof);
                    }
                    let left = remaining - n as u64;
                    self.state = if left == 0 {
                        State::DataEnd
                    } else {
                        State::Data { remaining: left }
                    };
                    return Ok(n);
                }
                State::DataEnd => {
                    match self.read_line().await? {
                        Some(line) if line.is_empty() => self.state = State::Size,
                        Some(_) => return Err(ChunkedError::MissingDelimiter),
                        None => return Err(ChunkedError::UnexpectedEof),
                    }
                }
                State::Trailers => match self.read_line().await? {
                    Some(line) if !line.is_empty() => {}
                    _ => self.state = State::Done,
                },
                State::Done => return Ok(0),
            }
        }
    }

    /// The terminating frame and trailers have been consumed
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Number of frames seen so far, including the terminating one
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Read one line without its `\n` (and `\r`).
    ///
    /// `None` means end-of-stream before any byte of the line.
    async fn read_line(&mut self) -> Result<Option<Vec<u8>>, ChunkedError> {
        let mut line = Vec::new();
        loop {
            let byte = match self.reader.read_u8().await {
                Ok(byte) => byte,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    return Err(ChunkedError::UnexpectedEof);
                }
                Err(e) => return Err(e.into()),
            };

            if byte == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(line));
            }

            if line.len() >= MAX_CHUNK_LINE {
                return Err(ChunkedError::LineTooLong);
            }
            line.push(byte);
        }
    }
}

/// Parse a length line, ignoring chunk extensions
fn parse_size(line: &[u8]) -> Result<u64, ChunkedError> {
    let malformed = || ChunkedError::MalformedLength(String::from_utf8_lossy(line).into_owned());

    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let token = text.split(';').next().unwrap_or("").trim();

    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }

    u64::from_str_radix(token, 16).map_err(|_| malformed())
}
