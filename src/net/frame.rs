//! Newline-delimited JSON framing.
//!
//! # Wire Format
//! One JSON object per line, tagged by `type`, addressed by a client-chosen
//! stream number:
//! ```text
//! → {"type":"message","stream":1,"message":{"phase":"request_headers","payload":{...}}}
//! → {"type":"end","stream":1}
//! → {"type":"abort","stream":1,"reason":"client reset"}
//! ← {"type":"response","stream":1,"response":{"response":{...},"mode_override":{...}}}
//! ← {"type":"error","stream":1,"message":"too many streams"}
//! ```
//!
//! # Design Decisions
//! - Blank lines are skipped
//! - A line longer than `max_frame_bytes` or one that fails to parse is
//!   connection-fatal

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::{PhaseMessage, ProcessingResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Message { stream: u64, message: PhaseMessage },
    End { stream: u64 },
    Abort {
        stream: u64,
        #[serde(default)]
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Response {
        stream: u64,
        response: ProcessingResponse,
    },
    Error {
        stream: u64,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Reads JSON frames from a byte stream, one per line.
///
/// `next` is cancel safe: bytes of a partially read line are kept for the
/// following call.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_frame_bytes: usize,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_frame_bytes,
            line: Vec::new(),
        }
    }

    /// Next frame, or `None` on clean end of input.
    pub async fn next<T>(&mut self) -> Result<Option<T>, FrameError>
    where
        T: for<'de> Deserialize<'de>,
    {
        loop {
            let remaining = self
                .max_frame_bytes
                .saturating_add(1)
                .saturating_sub(self.line.len()) as u64;
            let read = (&mut self.inner)
                .take(remaining)
                .read_until(b'\n', &mut self.line)
                .await?;
            if read == 0 && self.line.is_empty() {
                return Ok(None);
            }

            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\n') {
                line.pop();
            } else if line.len() > self.max_frame_bytes {
                return Err(FrameError::TooLarge {
                    limit: self.max_frame_bytes,
                });
            }
            // Otherwise the input ended without a trailing newline.

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(serde_json::from_slice(&line)?));
        }
    }
}

/// Serialize `frame` as one line.
pub fn encode<T: Serialize>(frame: &T) -> Result<Vec<u8>, FrameError> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write `frame` as one line and flush.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    writer.write_all(&encode(frame)?).await?;
    writer.flush().await?;
    Ok(())
}
