//! Stream framing for newline-delimited JSON records.
//!
//! TCP delivers bytes in arbitrary chunks: one read may carry half a record,
//! the tail of one record plus the head of the next, or several records at
//! once. [`Accumulator`] retains whatever has not yet been resolved into a
//! record and hands out one [`Record`] per call.
//!
//! # Draining
//!
//! [`Accumulator::feed`] yields at most one record. When a chunk completes
//! several records the rest stay buffered; call [`Accumulator::next_ready`]
//! (equivalent to `feed(&[])`) until it reports [`Feed::NeedMore`] before
//! reading more bytes from the socket.
//!
//! ```ignore
//! let mut acc = Accumulator::new();
//! let mut feed = acc.feed(&chunk);
//! while let Feed::Ready(record) = feed {
//!     handle(record);
//!     feed = acc.next_ready();
//! }
//! ```

use bytes::BytesMut;
use thiserror::Error;

use crate::record::{Record, TERMINATOR};

/// Initial buffer capacity, sized for one typical record.
pub const DEFAULT_CAPACITY: usize = 2 * 1024;

/// Outcome of feeding bytes to the accumulator.
#[derive(Debug)]
pub enum Feed {
    /// A complete record was decoded.
    Ready(Record),
    /// No terminator buffered yet; supply more bytes.
    NeedMore,
    /// The bytes before a terminator were not a valid record. The offending
    /// line has been consumed.
    Malformed(FramingError),
}

/// A terminated line that failed to decode as a [`Record`].
#[derive(Debug, Error)]
#[error("malformed record ({len} bytes): {source}")]
pub struct FramingError {
    /// Length of the rejected line, terminator excluded.
    pub len: usize,
    /// Lossy UTF-8 rendering of the rejected line, for logging.
    pub line: String,
    /// Decoder error.
    #[source]
    pub source: serde_json::Error,
}

/// Per-connection buffer of received but unresolved bytes.
#[derive(Debug, Default)]
pub struct Accumulator {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no terminator.
    scanned: usize,
}

impl Accumulator {
    /// Create an accumulator with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an accumulator with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Append `chunk` and try to resolve one record.
    pub fn feed(&mut self, chunk: &[u8]) -> Feed {
        self.buffer.extend_from_slice(chunk);
        self.next_ready()
    }

    /// Resolve one record from already-buffered bytes.
    pub fn next_ready(&mut self) -> Feed {
        let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == TERMINATOR)
        else {
            self.scanned = self.buffer.len();
            return Feed::NeedMore;
        };

        let end = self.scanned + offset;
        let line = self.buffer.split_to(end + 1);
        self.scanned = 0;

        let body = &line[..end];
        match serde_json::from_slice::<Record>(body) {
            Ok(record) => Feed::Ready(record),
            Err(source) => Feed::Malformed(FramingError {
                len: body.len(),
                line: String::from_utf8_lossy(body).into_owned(),
                source,
            }),
        }
    }

    /// Bytes received but not yet resolved.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of unresolved bytes.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no unresolved bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
