//! The capability shared by everything that can travel in a chunk.
//!
//! [`Streamable`] is the single contract behind every `put`/`get`: decode
//! the current element into an existing value, or encode a value under a
//! token. Scalars compress through the numeric codec, strings and
//! [`Binary`] blobs carry raw payload bytes, records frame themselves as
//! sub-streams, and containers expand into runs of chunks behind a shared
//! token.
//!
//! Implement it by hand for a type with a custom wire shape, or let
//! [`token_map!`](crate::token_map) derive it alongside
//! [`Record`](crate::Record) for struct types. For foreign types that
//! cannot implement the trait, register per-field closures on the token map
//! instead.
//!
//! ## Containers
//!
//! A container writes its elements as consecutive chunks under one token,
//! compressed by the `0xF8` list prefix once there are at least two. Inside
//! a container, values that would normally trim away still occupy a chunk
//! (zero-valued scalars get a minimal payload, empty records keep a
//! zero-length stub), because element positions must survive the trip.
//! Reading appends to whatever the destination already holds and stops at
//! the first token that does not belong to the run, pushing it back for the
//! caller.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;

use crate::reader::{Reader, SubStream};
use crate::token::Token;
use crate::writer::{MemoryWriter, Writer};

/// A value that can be decoded from and encoded into a token stream.
///
/// `read_into` consumes the current element's payload; `write_into` emits a
/// chunk under `token`, suppressed when the value equals its default (the
/// declared one, or the type's zero value) and trimming is on.
/// `write_element` is the container variant: it must always leave a chunk
/// behind, so positions inside the run stay meaningful.
pub trait Streamable: Default {
    /// Decodes the current element into `self`.
    fn read_into(&mut self, reader: &mut Reader<'_>);

    /// Encodes `self` as a chunk under `token`.
    fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>);

    /// Encodes `self` as one element of a container run.
    fn write_element(&self, writer: &mut Writer<'_>, token: Token) {
        let saved = writer.set_trim_defaults(false);
        self.write_into(writer, token, None);
        writer.set_trim_defaults(saved);
    }
}

macro_rules! streamable_unsigned {
    ($($ty:ty),+) => {$(
        impl Streamable for $ty {
            fn read_into(&mut self, reader: &mut Reader<'_>) {
                *self = <$ty>::from_be_bytes(reader.fetch_payload(false));
            }

            fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
                let default = default.copied().unwrap_or(0);
                if writer.trim_defaults() && *self == default {
                    writer.clear_pending_token();
                    return;
                }
                writer.put_trimmed(token, &self.to_be_bytes(), false);
            }
        }
    )+};
}

macro_rules! streamable_signed {
    ($($ty:ty),+) => {$(
        impl Streamable for $ty {
            fn read_into(&mut self, reader: &mut Reader<'_>) {
                *self = <$ty>::from_be_bytes(reader.fetch_payload(true));
            }

            fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
                let default = default.copied().unwrap_or(0);
                if writer.trim_defaults() && *self == default {
                    writer.clear_pending_token();
                    return;
                }
                writer.put_trimmed(token, &self.to_be_bytes(), true);
            }
        }
    )+};
}

macro_rules! streamable_float {
    ($($ty:ty),+) => {$(
        impl Streamable for $ty {
            fn read_into(&mut self, reader: &mut Reader<'_>) {
                *self = <$ty>::from_le_bytes(reader.fetch_payload(false));
            }

            fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
                let default = default.copied().unwrap_or(0.0);
                if writer.trim_defaults() && *self == default {
                    writer.clear_pending_token();
                    return;
                }
                // Floats travel little-endian; the leading bytes of that
                // layout are the low mantissa bytes the trim removes.
                writer.put_trimmed(token, &self.to_le_bytes(), false);
            }
        }
    )+};
}

streamable_unsigned!(u16, u32, u64);
streamable_signed!(i16, i32, i64);
streamable_float!(f32, f64);

impl Streamable for u8 {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        *self = reader.fetch_payload::<1>(false)[0];
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
        let default = default.copied().unwrap_or(0);
        if writer.trim_defaults() && *self == default {
            writer.clear_pending_token();
            return;
        }
        writer.put_trimmed(token, &[*self], false);
    }
}

// Single bytes carry their bit pattern; there is nothing to trim or extend.
impl Streamable for i8 {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        *self = reader.fetch_payload::<1>(false)[0] as i8;
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
        let default = default.copied().unwrap_or(0);
        if writer.trim_defaults() && *self == default {
            writer.clear_pending_token();
            return;
        }
        writer.put_trimmed(token, &[*self as u8], false);
    }
}

impl Streamable for bool {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        *self = reader.fetch_payload::<1>(false)[0] == 1;
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
        let default = default.copied().unwrap_or(false);
        u8::from(*self).write_into(writer, token, Some(&u8::from(default)));
    }
}

impl Streamable for String {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        let payload = reader.fetch_payload_bytes();
        if payload.is_empty() {
            self.clear();
        } else {
            *self = String::from_utf8_lossy(payload).into_owned();
        }
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, default: Option<&Self>) {
        writer.put_str_impl(token, self, default.map(String::as_str));
    }
}

/// An opaque byte block written verbatim as one payload.
///
/// This is deliberately a distinct type: `Vec<u8>` is a *container* whose
/// elements each get their own chunk, while a `Binary` is a single chunk of
/// raw bytes.
///
/// # Examples
///
/// ```rust
/// use tokenstream::{Binary, MemoryWriter};
///
/// let mut writer = MemoryWriter::new();
/// writer.put(6u64, &Binary::from(vec![0xde, 0xad]));
/// assert_eq!(writer.into_bytes().unwrap(), [0x06, 0x02, 0xde, 0xad]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Binary(Vec::new())
    }

    /// Consumes the block, returning the underlying bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Binary(bytes)
    }
}

impl From<&[u8]> for Binary {
    fn from(bytes: &[u8]) -> Self {
        Binary(bytes.to_vec())
    }
}

impl Deref for Binary {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Binary {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Streamable for Binary {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        let payload = reader.fetch_payload_bytes();
        self.0.clear();
        self.0.extend_from_slice(payload);
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        writer.put_data(token, &self.0);
    }
}

/// Reads container elements until a foreign token (pushed back) or end of
/// stream. The caller has just consumed the container's first token.
fn read_elements<T: Streamable>(reader: &mut Reader<'_>, mut append: impl FnMut(T)) {
    let container_token = reader.last_token();
    loop {
        let mut item = T::default();
        item.read_into(reader);
        append(item);
        if reader.eos() {
            return;
        }
        if reader.token() != container_token {
            reader.push_last_token();
            return;
        }
    }
}

/// Writes a run of elements behind a list prefix. An empty run is trimmed
/// away, or left as a zero-length chunk when trimming is off.
fn write_elements<'x, T: Streamable + 'x>(
    writer: &mut Writer<'_>,
    token: Token,
    len: usize,
    items: impl Iterator<Item = &'x T>,
) {
    if len > 0 {
        writer.put_container_element_count(token, len as u64);
        for item in items {
            item.write_element(writer, token);
        }
    } else if !writer.trim_defaults() {
        writer.put_data(token, &[]);
    }
    writer.clear_pending_token();
}

/// Writes map entries as a run of `(key, value)` pair sub-streams, each
/// keeping its stub so entry positions survive.
fn write_pair_elements<'x, A: Streamable + 'x, B: Streamable + 'x>(
    writer: &mut Writer<'_>,
    token: Token,
    len: usize,
    items: impl Iterator<Item = (&'x A, &'x B)>,
) {
    if len > 0 {
        writer.put_container_element_count(token, len as u64);
        for (first, second) in items {
            write_pair(writer, token, first, second, true);
        }
    } else if !writer.trim_defaults() {
        writer.put_data(token, &[]);
    }
    writer.clear_pending_token();
}

/// Frames `first`/`second` as a two-chunk sub-stream under tokens 0 and 1.
fn write_pair<A: Streamable, B: Streamable>(
    writer: &mut Writer<'_>,
    token: Token,
    first: &A,
    second: &B,
    keep_stub: bool,
) {
    if writer.status().is_err() {
        return;
    }
    let mut sub = MemoryWriter::inheriting(writer);
    sub.put(0u64, first);
    sub.put(1u64, second);
    writer.put_sub(token, sub, keep_stub);
}

impl<A: Streamable, B: Streamable> Streamable for (A, B) {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        reader.prime_element_at_start();
        if reader.bad() {
            return;
        }
        let mut sub = SubStream::new(reader);
        while !sub.eos() {
            match sub.token().value() {
                0 => self.0.read_into(&mut sub),
                1 => self.1.read_into(&mut sub),
                _ => {}
            }
        }
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_pair(writer, token, &self.0, &self.1, false);
    }

    fn write_element(&self, writer: &mut Writer<'_>, token: Token) {
        write_pair(writer, token, &self.0, &self.1, true);
    }
}

impl<T: Streamable> Streamable for Vec<T> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        let hint = reader.next_container_element_count();
        if hint > 0 {
            self.reserve(hint);
        }
        read_elements(reader, |item| self.push(item));
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_elements(writer, token, self.len(), self.iter());
    }
}

impl<T: Streamable> Streamable for VecDeque<T> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        let hint = reader.next_container_element_count();
        if hint > 0 {
            self.reserve(hint);
        }
        read_elements(reader, |item| self.push_back(item));
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_elements(writer, token, self.len(), self.iter());
    }
}

impl<T: Streamable + Ord> Streamable for BTreeSet<T> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        read_elements(reader, |item| {
            self.insert(item);
        });
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_elements(writer, token, self.len(), self.iter());
    }
}

impl<T: Streamable + Eq + Hash> Streamable for HashSet<T> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        let hint = reader.next_container_element_count();
        if hint > 0 {
            self.reserve(hint);
        }
        read_elements(reader, |item| {
            self.insert(item);
        });
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_elements(writer, token, self.len(), self.iter());
    }
}

impl<K: Streamable + Ord, V: Streamable> Streamable for BTreeMap<K, V> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        read_elements::<(K, V)>(reader, |(key, value)| {
            self.insert(key, value);
        });
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_pair_elements(
            writer,
            token,
            self.len(),
            self.iter(),
        );
    }
}

impl<K: Streamable + Eq + Hash, V: Streamable> Streamable for HashMap<K, V> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        read_elements::<(K, V)>(reader, |(key, value)| {
            self.insert(key, value);
        });
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_pair_elements(
            writer,
            token,
            self.len(),
            self.iter(),
        );
    }
}

impl<K: Streamable + Eq + Hash, V: Streamable> Streamable for IndexMap<K, V> {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        read_elements::<(K, V)>(reader, |(key, value)| {
            self.insert(key, value);
        });
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        write_pair_elements(
            writer,
            token,
            self.len(),
            self.iter(),
        );
    }
}
