//! Error types for token stream encoding and decoding.
//!
//! The hot paths of [`Writer`](crate::Writer) and [`Reader`](crate::Reader)
//! do not return `Result` per call. Instead the first error latches on the
//! engine: further writes become no-ops, reads yield zero values, and
//! `eos()` reports true. Callers inspect the latch at natural boundaries via
//! `status()` or [`MemoryWriter::into_bytes`](crate::MemoryWriter::into_bytes),
//! which surface the retained [`Error`].
//!
//! ## Examples
//!
//! ```rust
//! use tokenstream::Reader;
//!
//! // A declared length that runs past the end of the stream.
//! let mut reader = Reader::new(&[0x01, 0x7f]);
//! reader.token();
//! assert!(reader.status().is_err());
//! assert!(reader.eos());
//! ```

use thiserror::Error;

/// All the ways a token stream can fail to encode or decode.
///
/// Errors are `Clone` so that the latched value can be handed out by
/// `status()` without giving up the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The decoder reached the end of the current context while a chunk
    /// header or payload was still required.
    #[error("stream ended inside a chunk header or payload")]
    Truncated,

    /// A reserved varint encoding appeared where it is not valid, such as
    /// the `0xF8` list escape at a length position.
    #[error("reserved varint encoding at offset {offset}")]
    MalformedVarint { offset: usize },

    /// An item emitted inside a container carried a token different from the
    /// container's shared token.
    #[error("container element token {found} does not match container token {expected}")]
    ContainerTokenMismatch { expected: u64, found: u64 },

    /// The underlying byte sink or source failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A declared payload length exceeds what the enclosing context (or the
    /// destination value) can hold.
    #[error("declared payload length {declared} exceeds the {available} available bytes")]
    PayloadTooLarge { declared: u64, available: u64 },
}

impl Error {
    /// Creates an I/O error from any displayable source.
    pub fn io<T: std::fmt::Display>(source: T) -> Self {
        Error::Io(source.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
