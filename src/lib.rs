//! # tokenstream
//!
//! A self-describing binary serialization format built from flat runs of
//! `(token, length, data)` chunks, designed so schemas can evolve in both
//! directions without version negotiation.
//!
//! ## Why another binary format?
//!
//! - **Forward compatible**: a reader skips tokens it does not recognize,
//!   so new writers can add fields freely.
//! - **Backward compatible**: a reader sees absent fields as unchanged from
//!   their pre-read state, so old writers keep working.
//! - **Compact**: integers shed their leading zero (or sign) bytes, floats
//!   shed their low mantissa bytes, fields equal to their declared defaults
//!   vanish entirely, and homogeneous lists factor their shared token out
//!   through a one-byte escape.
//! - **Robust nesting**: records frame themselves as length-bounded
//!   sub-streams, so a corrupt or half-understood inner record can never
//!   desynchronize its parent.
//!
//! There is no outer framing, magic number, or checksum; the stream is just
//! the chunks, and the caller brings the schema.
//!
//! ## Quick Start
//!
//! ```rust
//! use tokenstream::{from_slice, to_vec, token_map};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Employee {
//!     name: String,
//!     birth_year: u16,
//!     badges: Vec<u32>,
//! }
//!
//! token_map!(Employee {
//!     0 => name,
//!     1 => birth_year,
//!     2 => badges,
//! });
//!
//! let employee = Employee {
//!     name: "Ford Prefect".to_string(),
//!     birth_year: 1992,
//!     badges: vec![7, 42],
//! };
//!
//! let bytes = to_vec(&employee).unwrap();
//! let decoded: Employee = from_slice(&bytes).unwrap();
//! assert_eq!(decoded, employee);
//! ```
//!
//! ## The wire, by hand
//!
//! The engines are usable without any schema declaration: a
//! [`Writer`] takes token/value pairs, a [`Reader`] hands back tokens to
//! dispatch on.
//!
//! ```rust
//! use tokenstream::{MemoryWriter, Reader};
//!
//! let mut writer = MemoryWriter::new();
//! writer.put(2u64, &300u32); // 02 02 01 2C: token, length, trimmed payload
//! let bytes = writer.into_bytes().unwrap();
//! assert_eq!(bytes, [0x02, 0x02, 0x01, 0x2c]);
//!
//! let mut reader = Reader::new(&bytes);
//! while !reader.eos() {
//!     match reader.token().value() {
//!         2 => assert_eq!(reader.get::<u32>(), 300),
//!         _ => reader.skip(),
//!     }
//! }
//! ```
//!
//! ## Trimmed defaults
//!
//! By default a field equal to its declared default writes nothing. The
//! reader cannot tell an absent field from a trimmed one, which is exactly
//! the point: readers start from default-initialized records, and the
//! stream only carries the interesting parts. Turn the policy off per
//! writer ([`MemoryWriter::with_trim`]) or per scope ([`TrimGuard`]) when
//! byte-for-byte explicitness matters more than size.
//!
//! ## Dynamic records
//!
//! When the schema is only known at runtime, a [`Generic`] builds the same
//! wire bytes from type-erased slots; see the module docs of
//! [`generic`](crate::generic).

pub mod error;
pub mod generic;
mod macros;
mod number;
pub mod reader;
pub mod schema;
pub mod token;
pub mod value;
mod varint;
pub mod writer;

pub use error::{Error, Result};
pub use generic::Generic;
pub use reader::{Reader, SubStream};
pub use schema::{Accessor, Record, TokenMap, TokenMapBuilder};
pub use token::Token;
pub use value::{Binary, Streamable};
pub use writer::{MemoryWriter, TrimGuard, Writer};

use std::io;

/// Encodes a record to an in-memory stream with default trimming on.
///
/// # Errors
///
/// Returns the first error latched during encoding.
///
/// # Examples
///
/// ```rust
/// use tokenstream::{to_vec, token_map};
///
/// #[derive(Debug, Default)]
/// struct Probe {
///     id: u32,
/// }
///
/// token_map!(Probe { 0 => id });
///
/// assert_eq!(to_vec(&Probe { id: 300 }).unwrap(), [0x00, 0x02, 0x01, 0x2c]);
/// ```
pub fn to_vec<R: Record>(record: &R) -> Result<Vec<u8>> {
    to_vec_with_trim(record, true)
}

/// Encodes a record to an in-memory stream with an explicit trim policy.
///
/// # Errors
///
/// Returns the first error latched during encoding.
pub fn to_vec_with_trim<R: Record>(record: &R, trim_defaults: bool) -> Result<Vec<u8>> {
    let mut writer = MemoryWriter::with_trim(trim_defaults);
    record.write(&mut writer);
    writer.into_bytes()
}

/// Encodes a record to a caller-supplied sink with default trimming on.
///
/// # Errors
///
/// Returns the first error latched during encoding, including sink
/// failures.
pub fn to_writer<R: Record>(sink: &mut dyn io::Write, record: &R) -> Result<()> {
    let mut writer = Writer::new(sink);
    record.write(&mut writer);
    writer.status()
}

/// Decodes a record from a byte slice, starting from its default value.
///
/// Fields absent from the stream keep their defaults; unknown tokens are
/// skipped.
///
/// # Errors
///
/// Returns the first error latched during decoding.
pub fn from_slice<R: Record + Default>(bytes: &[u8]) -> Result<R> {
    let mut record = R::default();
    read_into_slice(bytes, &mut record)?;
    Ok(record)
}

/// Decodes a byte slice into an existing record, preserving any field the
/// stream does not mention.
///
/// # Errors
///
/// Returns the first error latched during decoding.
pub fn read_into_slice<R: Record>(bytes: &[u8], record: &mut R) -> Result<()> {
    let mut reader = Reader::new(bytes);
    record.read(&mut reader);
    reader.status()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        id: u32,
        label: String,
    }

    token_map!(Sample {
        1 => id,
        2 => label,
    });

    #[test]
    fn test_to_vec_from_slice_roundtrip() {
        let sample = Sample {
            id: 9,
            label: "nine".to_string(),
        };
        let bytes = to_vec(&sample).unwrap();
        let decoded: Sample = from_slice(&bytes).unwrap();
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_to_writer_matches_to_vec() {
        let sample = Sample {
            id: 200,
            label: "x".to_string(),
        };
        let mut sink = Vec::new();
        to_writer(&mut sink, &sample).unwrap();
        assert_eq!(sink, to_vec(&sample).unwrap());
    }

    #[test]
    fn test_read_into_preserves_unmentioned_fields() {
        let mut target = Sample {
            id: 1,
            label: "keep me".to_string(),
        };
        // A stream mentioning only the id.
        let bytes = to_vec(&Sample {
            id: 7,
            label: String::new(),
        })
        .unwrap();
        read_into_slice(&bytes, &mut target).unwrap();
        assert_eq!(target.id, 7);
        assert_eq!(target.label, "keep me");
    }

    #[test]
    fn test_untrimmed_stream_roundtrips() {
        let sample = Sample {
            id: 0,
            label: String::new(),
        };
        let bytes = to_vec_with_trim(&sample, false).unwrap();
        assert!(!bytes.is_empty());
        let decoded: Sample = from_slice(&bytes).unwrap();
        assert_eq!(decoded, sample);
    }
}
