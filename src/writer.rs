//! The streaming encoder.
//!
//! A [`Writer`] turns `put` calls into a flat run of
//! `<token> <length> <payload>` chunks on a caller-supplied byte sink. A
//! [`MemoryWriter`] is the same engine over an internal growable buffer; the
//! encoder itself uses one as scratch space whenever a nested record or pair
//! has to be measured before its framing length can be written.
//!
//! Two pieces of state shape every chunk:
//!
//! - the *pending token* set by [`Writer::put_token`], consumed by the next
//!   value write;
//! - the *trim policy*: with `trim_defaults` on (the default), a value equal
//!   to its declared default writes nothing at all. Readers are expected to
//!   start from default-initialized records, so an absent chunk and a
//!   default value are indistinguishable. [`TrimGuard`] flips the policy for
//!   a lexical scope.
//!
//! Errors latch: after the first failure every further call is a no-op and
//! [`Writer::status`] reports the retained [`Error`].
//!
//! ## Examples
//!
//! ```rust
//! use tokenstream::MemoryWriter;
//!
//! let mut writer = MemoryWriter::new();
//! writer.put(0u64, &9u8).put(1u64, &"hello".to_string());
//! let bytes = writer.into_bytes().unwrap();
//! assert_eq!(bytes, [0x00, 0x01, 0x09, 0x01, 0x05, b'h', b'e', b'l', b'l', b'o']);
//! ```

use std::io;
use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};
use crate::schema::{Record, TokenMap};
use crate::token::Token;
use crate::value::Streamable;
use crate::{number, varint};

enum Sink<'a> {
    Borrowed(&'a mut dyn io::Write),
    Owned(Vec<u8>),
}

/// Streaming encoder over a borrowed byte sink.
///
/// The writer does not own the sink and never seeks; everything it emits is
/// append-only. For an owned in-memory stream use [`MemoryWriter`].
///
/// # Examples
///
/// ```rust
/// use tokenstream::Writer;
///
/// let mut sink = Vec::new();
/// let mut writer = Writer::new(&mut sink);
/// writer.put(2u64, &300u32);
/// writer.status().unwrap();
/// assert_eq!(sink, [0x02, 0x02, 0x01, 0x2c]);
/// ```
pub struct Writer<'a> {
    sink: Sink<'a>,
    written: u64,
    next_token: Token,
    trim_defaults: bool,
    error: Option<Error>,
    container_token: Token,
    container_element_count: u64,
    container_element_index: u64,
}

impl<'a> Writer<'a> {
    /// Creates a writer over `sink` with default trimming on.
    pub fn new(sink: &'a mut dyn io::Write) -> Writer<'a> {
        Writer::with_trim(sink, true)
    }

    /// Creates a writer over `sink` with an explicit trim policy.
    ///
    /// With `trim_defaults` off, default-valued fields still occupy chunks
    /// (zero-length for strings and containers, a minimal payload for
    /// numbers), which costs space but lets a reader distinguish "written as
    /// default" from "not written".
    pub fn with_trim(sink: &'a mut dyn io::Write, trim_defaults: bool) -> Writer<'a> {
        Writer {
            sink: Sink::Borrowed(sink),
            written: 0,
            next_token: Token::INVALID,
            trim_defaults,
            error: None,
            container_token: Token::INVALID,
            container_element_count: 0,
            container_element_index: 0,
        }
    }

    fn owned(trim_defaults: bool) -> Writer<'static> {
        Writer {
            sink: Sink::Owned(Vec::new()),
            written: 0,
            next_token: Token::INVALID,
            trim_defaults,
            error: None,
            container_token: Token::INVALID,
            container_element_count: 0,
            container_element_index: 0,
        }
    }

    /// Number of bytes emitted so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.written
    }

    /// Returns `true` if nothing has been emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Current trim policy.
    #[must_use]
    pub fn trim_defaults(&self) -> bool {
        self.trim_defaults
    }

    /// Returns the latched error, if any.
    pub fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Records a token for the next value write.
    ///
    /// Nothing reaches the sink yet; a trimmed default may still turn the
    /// whole chunk into a no-op.
    ///
    /// # Panics
    ///
    /// Panics if a token is already pending (a missing value write).
    pub fn put_token(&mut self, token: impl Into<Token>) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        assert!(
            !self.next_token.is_valid(),
            "put_token called while a token is already pending"
        );
        self.next_token = token.into();
        self
    }

    /// Writes one value as a chunk under `token`.
    ///
    /// Scalars compare against their zero default; use
    /// [`Writer::put_with_default`] for a declared default.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::MemoryWriter;
    ///
    /// let mut writer = MemoryWriter::new();
    /// writer.put(2u64, &300u32);
    /// writer.put(3u64, &vec![1u8, 2, 3]); // containers work the same way
    /// writer.put(4u64, &0u64); // equal to its default: nothing written
    /// assert_eq!(
    ///     writer.into_bytes().unwrap(),
    ///     [0x02, 0x02, 0x01, 0x2c, 0xf8, 0x03, 0x03, 0x01, 0x01, 0x01, 0x02, 0x01, 0x03]
    /// );
    /// ```
    pub fn put<V: Streamable>(&mut self, token: impl Into<Token>, value: &V) -> &mut Self {
        value.write_into(self, token.into(), None);
        self
    }

    /// Writes one value as a chunk under `token`, suppressed when it equals
    /// `default` and trimming is on.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::MemoryWriter;
    ///
    /// let mut writer = MemoryWriter::new();
    /// writer.put_with_default(0u64, &7u32, &7u32); // trimmed
    /// writer.put_with_default(1u64, &9u32, &7u32); // written
    /// assert_eq!(writer.into_bytes().unwrap(), [0x01, 0x01, 0x09]);
    /// ```
    pub fn put_with_default<V: Streamable>(
        &mut self,
        token: impl Into<Token>,
        value: &V,
        default: &V,
    ) -> &mut Self {
        value.write_into(self, token.into(), Some(default));
        self
    }

    /// Writes one value under the pending token.
    pub fn put_value<V: Streamable>(&mut self, value: &V) -> &mut Self {
        let token = self.next_token;
        value.write_into(self, token, None);
        self
    }

    /// Writes one value under the pending token, with a declared default.
    pub fn put_value_with_default<V: Streamable>(&mut self, value: &V, default: &V) -> &mut Self {
        let token = self.next_token;
        value.write_into(self, token, Some(default));
        self
    }

    /// Writes a string chunk. An empty (or `None`-like) string is trimmed
    /// unless a non-empty default demands an explicit zero-length chunk.
    pub fn put_str(&mut self, token: impl Into<Token>, value: &str) -> &mut Self {
        self.put_str_impl(token.into(), value, None);
        self
    }

    /// Writes a string chunk with a declared default.
    pub fn put_str_with_default(
        &mut self,
        token: impl Into<Token>,
        value: &str,
        default: &str,
    ) -> &mut Self {
        self.put_str_impl(token.into(), value, Some(default));
        self
    }

    pub(crate) fn put_str_impl(&mut self, token: Token, value: &str, default: Option<&str>) {
        let needs_write = if self.trim_defaults {
            match default {
                Some(d) if !d.is_empty() => value.is_empty() || value != d,
                _ => !value.is_empty(),
            }
        } else {
            true
        };
        if needs_write {
            if value.is_empty() {
                let saved = self.trim_defaults;
                self.trim_defaults = false;
                self.put_data(token, &[]);
                self.trim_defaults = saved;
            } else {
                self.put_data(token, value.as_bytes());
            }
        }
        self.next_token = Token::INVALID;
    }

    /// Writes a UTF-16 string, transcoded to UTF-8 on the wire. Unpaired
    /// surrogates become replacement characters.
    pub fn put_utf16(&mut self, token: impl Into<Token>, value: &[u16]) -> &mut Self {
        self.put_utf16_impl(token.into(), value, None);
        self
    }

    /// Writes a UTF-16 string with a declared default.
    pub fn put_utf16_with_default(
        &mut self,
        token: impl Into<Token>,
        value: &[u16],
        default: &[u16],
    ) -> &mut Self {
        self.put_utf16_impl(token.into(), value, Some(default));
        self
    }

    fn put_utf16_impl(&mut self, token: Token, value: &[u16], default: Option<&[u16]>) {
        let needs_write = if self.trim_defaults {
            match default {
                Some(d) if !d.is_empty() => value.is_empty() || value != d,
                _ => !value.is_empty(),
            }
        } else {
            true
        };
        if needs_write {
            if value.is_empty() {
                let saved = self.trim_defaults;
                self.trim_defaults = false;
                self.put_data(token, &[]);
                self.trim_defaults = saved;
            } else {
                let utf8 = String::from_utf16_lossy(value);
                self.put_data(token, utf8.as_bytes());
            }
        }
        self.next_token = Token::INVALID;
    }

    /// Writes an opaque byte block as one chunk.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::MemoryWriter;
    ///
    /// let mut writer = MemoryWriter::new();
    /// writer.put_bytes(6u64, &[0xca, 0xfe]);
    /// assert_eq!(writer.into_bytes().unwrap(), [0x06, 0x02, 0xca, 0xfe]);
    /// ```
    pub fn put_bytes(&mut self, token: impl Into<Token>, block: &[u8]) -> &mut Self {
        self.put_data(token.into(), block);
        self
    }

    /// Copies the whole of `source` into one chunk.
    ///
    /// The source is drained to memory first so the framing length can be
    /// written ahead of the payload.
    pub fn put_reader(&mut self, token: impl Into<Token>, source: &mut dyn io::Read) -> &mut Self {
        let token = token.into();
        if self.error.is_some() {
            return self;
        }
        let mut block = Vec::new();
        match source.read_to_end(&mut block) {
            Ok(_) => self.put_data(token, &block),
            Err(err) => self.fail(Error::io(err)),
        }
        self
    }

    /// Frames everything a finished [`MemoryWriter`] emitted as one chunk.
    ///
    /// Useful for assembling sub-streams by hand; an error latched on the
    /// sub-writer transfers to this writer.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::MemoryWriter;
    ///
    /// let mut sub = MemoryWriter::new();
    /// sub.put(0u64, &27u8);
    ///
    /// let mut writer = MemoryWriter::new();
    /// writer.put_writer(3u64, &sub);
    /// assert_eq!(writer.into_bytes().unwrap(), [0x03, 0x03, 0x00, 0x01, 0x1b]);
    /// ```
    pub fn put_writer(&mut self, token: impl Into<Token>, sub: &MemoryWriter) -> &mut Self {
        let token = token.into();
        if self.error.is_some() {
            return self;
        }
        if let Err(err) = sub.status() {
            self.fail(err);
            self.next_token = Token::INVALID;
            return self;
        }
        self.put_data(token, sub.bytes());
        self
    }

    /// Writes a record as a length-framed sub-stream under `token`.
    ///
    /// With trimming on, a record whose every field trims away normally
    /// vanishes entirely; `keep_stub` keeps the two-byte `<token> <0>` header
    /// instead, which container elements need as positional placeholders.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::{token_map, MemoryWriter};
    ///
    /// #[derive(Debug, Default)]
    /// struct Date {
    ///     day: u8,
    ///     month: u8,
    /// }
    ///
    /// token_map!(Date {
    ///     0 => day,
    ///     1 => month,
    /// });
    ///
    /// let mut writer = MemoryWriter::new();
    /// writer.put_record(3u64, &Date { day: 27, month: 3 }, false);
    /// assert_eq!(
    ///     writer.into_bytes().unwrap(),
    ///     [0x03, 0x06, 0x00, 0x01, 0x1b, 0x01, 0x01, 0x03]
    /// );
    /// ```
    pub fn put_record<R: Record>(
        &mut self,
        token: impl Into<Token>,
        record: &R,
        keep_stub: bool,
    ) -> &mut Self {
        let token = token.into();
        if self.error.is_some() {
            return self;
        }
        let mut sub = MemoryWriter::inheriting(self);
        record.write(&mut sub);
        self.put_sub(token, sub, keep_stub);
        self
    }

    /// Writes a record through an explicit token map instead of its own.
    pub fn put_record_with_map<R>(
        &mut self,
        token: impl Into<Token>,
        record: &R,
        map: &TokenMap<R>,
        keep_stub: bool,
    ) -> &mut Self {
        let token = token.into();
        if self.error.is_some() {
            return self;
        }
        let mut sub = MemoryWriter::inheriting(self);
        map.write(record, &mut sub);
        self.put_sub(token, sub, keep_stub);
        self
    }

    /// Writes a record through an explicit token map under the pending token.
    pub fn put_value_record_with_map<R>(
        &mut self,
        record: &R,
        map: &TokenMap<R>,
        keep_stub: bool,
    ) -> &mut Self {
        let token = self.next_token;
        self.put_record_with_map(token, record, map, keep_stub)
    }

    /// Announces a container of `count` elements sharing `token`.
    ///
    /// Emits the list prefix (`0xF8` escape plus the element count) and arms
    /// the container scope: the shared token is written once by the first
    /// element, and every element until the count runs out must carry the
    /// same token. Counts of 0 and 1 write nothing; such lists degenerate to
    /// an absent chunk or a single plain chunk.
    ///
    /// The container `put` impls call this themselves; it is public for
    /// hand-rolled element loops.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::{MemoryWriter, TrimGuard};
    ///
    /// let mut writer = MemoryWriter::new();
    /// {
    ///     let mut elements = TrimGuard::new(&mut writer, false);
    ///     elements.put_container_element_count(0x20u64, 3);
    ///     for value in [1u8, 2, 3] {
    ///         elements.put(0x20u64, &value);
    ///     }
    /// }
    /// assert_eq!(
    ///     writer.into_bytes().unwrap(),
    ///     [0xf8, 0x03, 0x20, 0x01, 0x01, 0x01, 0x02, 0x01, 0x03]
    /// );
    /// ```
    pub fn put_container_element_count(
        &mut self,
        token: impl Into<Token>,
        count: u64,
    ) -> &mut Self {
        if self.error.is_some() || count < 2 {
            return self;
        }
        self.container_token = token.into();
        self.container_element_count = count;
        self.container_element_index = 0;
        self.write_raw(&[varint::LIST_ESCAPE]);
        self.write_varint(count);
        self
    }

    pub(crate) fn set_trim_defaults(&mut self, trim: bool) -> bool {
        std::mem::replace(&mut self.trim_defaults, trim)
    }

    pub(crate) fn clear_pending_token(&mut self) {
        self.next_token = Token::INVALID;
    }

    pub(crate) fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Finishes a scratch sub-writer: applies the keep-stub override, frames
    /// its bytes as one chunk, and propagates any latched sub-error.
    pub(crate) fn put_sub(&mut self, token: Token, sub: MemoryWriter, keep_stub: bool) {
        let (bytes, error) = sub.into_parts();
        if let Some(err) = error {
            self.fail(err);
            self.next_token = Token::INVALID;
            return;
        }
        let saved = self.trim_defaults;
        self.trim_defaults = saved && !keep_stub;
        self.put_data(token, &bytes);
        self.trim_defaults = saved;
    }

    /// Emits a chunk of raw payload bytes. A zero-length payload is trimmed
    /// away entirely when trimming is on.
    pub(crate) fn put_data(&mut self, token: Token, payload: &[u8]) {
        if self.error.is_some() {
            return;
        }
        self.put_data_header(token, payload.len() as u64);
        if self.error.is_none() && !payload.is_empty() {
            self.write_raw(payload);
        }
    }

    /// Emits a numeric chunk after leading-byte compression.
    pub(crate) fn put_trimmed(&mut self, token: Token, full: &[u8], extended_sign: bool) {
        if self.error.is_some() {
            return;
        }
        let payload = if extended_sign {
            number::trim_signed(full)
        } else {
            number::trim_unsigned(full)
        };
        self.put_data(token, payload);
    }

    /// Writes the `<token> <length>` header, enforcing the container token
    /// discipline and the trim policy.
    fn put_data_header(&mut self, token: Token, len: u64) {
        self.next_token = Token::INVALID;
        if len == 0 && self.trim_defaults {
            return;
        }
        if self.container_token.is_valid() {
            if token != self.container_token {
                self.fail(Error::ContainerTokenMismatch {
                    expected: self.container_token.value(),
                    found: token.value(),
                });
                return;
            }
            // The shared token goes out once, ahead of the first element.
            if self.container_element_index == 0 {
                self.write_varint(token.value());
            }
            self.container_element_index += 1;
            if self.container_element_index == self.container_element_count {
                self.container_token = Token::INVALID;
                self.container_element_count = 0;
                self.container_element_index = 0;
            }
        } else if !token.is_valid() {
            // Only the very first chunk of a stream may go out as a naked
            // length-framed value.
            assert!(
                self.written == 0,
                "chunk written with no pending token mid-stream"
            );
        } else {
            self.write_varint(token.value());
        }
        self.write_varint(len);
    }

    fn write_varint(&mut self, value: u64) {
        let mut buf = [0u8; varint::MAX_ENCODED_LEN];
        let len = varint::encode(value, &mut buf);
        self.write_raw(&buf[..len]);
    }

    fn write_raw(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        let outcome = match &mut self.sink {
            Sink::Borrowed(sink) => sink.write_all(bytes),
            Sink::Owned(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
        };
        match outcome {
            Ok(()) => self.written += bytes.len() as u64,
            Err(err) => self.fail(Error::io(err)),
        }
    }
}

impl std::fmt::Debug for Writer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("written", &self.written)
            .field("trim_defaults", &self.trim_defaults)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Streaming encoder over an internal growable buffer.
///
/// Dereferences to [`Writer`], so every `put` operation is available
/// directly. [`MemoryWriter::into_bytes`] surfaces the latched error, making
/// it the natural end-of-encoding checkpoint.
///
/// # Examples
///
/// ```rust
/// use tokenstream::MemoryWriter;
///
/// let mut writer = MemoryWriter::new();
/// writer.put_token(0u64).put_value(&27u8);
/// assert_eq!(writer.into_bytes().unwrap(), [0x00, 0x01, 0x1b]);
/// ```
#[derive(Debug)]
pub struct MemoryWriter {
    inner: Writer<'static>,
}

impl MemoryWriter {
    /// Creates an in-memory writer with default trimming on.
    #[must_use]
    pub fn new() -> Self {
        MemoryWriter {
            inner: Writer::owned(true),
        }
    }

    /// Creates an in-memory writer with an explicit trim policy.
    #[must_use]
    pub fn with_trim(trim_defaults: bool) -> Self {
        MemoryWriter {
            inner: Writer::owned(trim_defaults),
        }
    }

    /// Creates a scratch writer inheriting `parent`'s trim policy, the way
    /// nested sub-streams are measured.
    #[must_use]
    pub fn inheriting(parent: &Writer<'_>) -> Self {
        MemoryWriter {
            inner: Writer::owned(parent.trim_defaults),
        }
    }

    /// The bytes emitted so far.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match &self.inner.sink {
            Sink::Owned(buf) => buf,
            Sink::Borrowed(_) => unreachable!("MemoryWriter always owns its sink"),
        }
    }

    /// Consumes the writer, returning the encoded stream or the latched
    /// error.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let (bytes, error) = self.into_parts();
        match error {
            Some(err) => Err(err),
            None => Ok(bytes),
        }
    }

    fn into_parts(self) -> (Vec<u8>, Option<Error>) {
        let error = self.inner.error;
        match self.inner.sink {
            Sink::Owned(buf) => (buf, error),
            Sink::Borrowed(_) => unreachable!("MemoryWriter always owns its sink"),
        }
    }
}

impl Default for MemoryWriter {
    fn default() -> Self {
        MemoryWriter::new()
    }
}

impl Deref for MemoryWriter {
    type Target = Writer<'static>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for MemoryWriter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// Scope guard that temporarily switches a writer's trim policy.
///
/// The previous policy is restored on drop, on every exit path.
///
/// # Examples
///
/// ```rust
/// use tokenstream::{MemoryWriter, TrimGuard};
///
/// let mut writer = MemoryWriter::new();
/// {
///     let mut verbose = TrimGuard::new(&mut writer, false);
///     verbose.put(4u64, &0u32); // zero still written: 04 01 00
/// }
/// assert!(writer.trim_defaults());
/// assert_eq!(writer.into_bytes().unwrap(), [0x04, 0x01, 0x00]);
/// ```
pub struct TrimGuard<'w, 'a> {
    writer: &'w mut Writer<'a>,
    saved: bool,
}

impl<'w, 'a> TrimGuard<'w, 'a> {
    /// Switches `writer` to the given trim policy until the guard drops.
    pub fn new(writer: &'w mut Writer<'a>, trim_defaults: bool) -> Self {
        let saved = writer.set_trim_defaults(trim_defaults);
        TrimGuard { writer, saved }
    }
}

impl Drop for TrimGuard<'_, '_> {
    fn drop(&mut self) {
        self.writer.trim_defaults = self.saved;
    }
}

impl<'a> Deref for TrimGuard<'_, 'a> {
    type Target = Writer<'a>;

    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl DerefMut for TrimGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.writer
    }
}
