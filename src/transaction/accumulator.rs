//! Size-bounded body buffer.
//!
//! # Responsibilities
//! - Append body chunks in arrival order
//! - Reject, without partial writes, any chunk that would exceed the limit
//! - Hand out cheap snapshots for mutation building outside the store lock
//!
//! # Design Decisions
//! - Bytes live behind an `Arc`; a snapshot is a refcount bump and the
//!   next append copies only while a snapshot is still held
//! - The first rejected chunk seals the buffer so the assembled body never
//!   contains a gap

use std::sync::Arc;
use thiserror::Error;

/// A chunk did not fit under the configured body limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("body overflow: {buffered} bytes buffered, chunk of {attempted} bytes exceeds limit of {limit}")]
pub struct OverflowError {
    pub buffered: usize,
    pub attempted: usize,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct BodyAccumulator {
    buf: Arc<Vec<u8>>,
    max_size: usize,
    end_of_stream: bool,
    truncated: bool,
}

impl BodyAccumulator {
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: Arc::new(Vec::new()),
            max_size,
            end_of_stream: false,
            truncated: false,
        }
    }

    /// Append `bytes`, or leave the buffer untouched and report the overflow.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), OverflowError> {
        let overflow = OverflowError {
            buffered: self.buf.len(),
            attempted: bytes.len(),
            limit: self.max_size,
        };
        if self.truncated {
            return Err(overflow);
        }
        match self.buf.len().checked_add(bytes.len()) {
            Some(total) if total <= self.max_size => {
                if !bytes.is_empty() {
                    Arc::make_mut(&mut self.buf).extend_from_slice(bytes);
                }
                Ok(())
            }
            _ => {
                self.truncated = true;
                Err(overflow)
            }
        }
    }

    pub fn mark_end_of_stream(&mut self) {
        self.end_of_stream = true;
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// True once a chunk has been rejected; later chunks are rejected too.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The content assembled so far. Does not consume; may be called repeatedly.
    pub fn snapshot(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
