//! The streaming decoder.
//!
//! A [`Reader`] walks a byte slice as a run of `<token> <length> <payload>`
//! chunks. The usual shape is a loop: fetch a token with [`Reader::token`],
//! dispatch on it, and pull the payload with [`Reader::get`] or one of the
//! typed helpers. Payloads that nobody consumes are skipped automatically on
//! the next [`Reader::token`] call, which is all it takes to ignore fields
//! from a newer schema.
//!
//! Nested records live inside length-framed sub-streams; a [`SubStream`]
//! guard narrows the reader to one chunk's payload and, on drop, snaps the
//! cursor to the declared end no matter how much the inner decoder actually
//! consumed. Containers written with the `0xF8` list prefix are walked
//! transparently: the reader synthesizes the shared token for every element,
//! so the dispatch loop never notices the compressed framing.
//!
//! Errors latch: after the first failure every read yields zero values and
//! [`Reader::eos`] reports true. [`Reader::status`] surfaces the retained
//! [`Error`].
//!
//! ## Examples
//!
//! ```rust
//! use tokenstream::Reader;
//!
//! // Chunk: token 2, length 2, payload 0x01 0x2C (the integer 300).
//! let mut reader = Reader::new(&[0x02, 0x02, 0x01, 0x2c]);
//! while !reader.eos() {
//!     match reader.token().value() {
//!         2 => assert_eq!(reader.get::<u32>(), 300),
//!         _ => reader.skip(),
//!     }
//! }
//! ```

use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};
use crate::schema::{Record, TokenMap};
use crate::token::Token;
use crate::value::Streamable;
use crate::varint::{self, Prefix};

/// Context saved and restored by [`SubStream`]: the end of the readable
/// region plus the container bookkeeping confined to it.
#[derive(Debug, Clone)]
struct Context {
    end: usize,
    container_token: Token,
    element_count: usize,
    element_index: usize,
    element_end: usize,
}

impl Context {
    fn with_end(end: usize) -> Self {
        Context {
            end,
            container_token: Token::INVALID,
            element_count: 0,
            element_index: 0,
            element_end: 0,
        }
    }
}

/// Streaming decoder over a borrowed byte slice.
///
/// The slice's length is the initial end-of-stream bound; sub-stream scopes
/// narrow it and restore it. The reader never allocates for skips and hands
/// out payload slices borrowed straight from the input.
pub struct Reader<'b> {
    buf: &'b [u8],
    offset: usize,
    remaining_in_element: usize,
    next_container_element_count: usize,
    last_token: Token,
    token_pushed: bool,
    error: Option<Error>,
    context: Context,
}

impl<'b> Reader<'b> {
    /// Creates a reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'b [u8]) -> Reader<'b> {
        Reader {
            buf: bytes,
            offset: 0,
            remaining_in_element: 0,
            next_container_element_count: 0,
            last_token: Token::INVALID,
            token_pushed: false,
            error: None,
            context: Context::with_end(bytes.len()),
        }
    }

    /// Returns the latched error, if any.
    pub fn status(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Byte offset of the cursor from the start of the stream.
    #[must_use]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// True at (or past) the end of the current context, or once an error
    /// has latched. A pushed-back token keeps the stream alive.
    #[must_use]
    pub fn eos(&self) -> bool {
        self.error.is_some() || (self.offset >= self.context.end && !self.token_pushed)
    }

    /// True if consuming `bytes` more would overrun the current context.
    #[must_use]
    pub fn past_eos(&self, bytes: usize) -> bool {
        self.context.end != 0
            && self
                .offset
                .checked_add(bytes)
                .map_or(true, |end| end > self.context.end)
    }

    /// True if the cursor sits exactly on the end of the current context.
    /// Meant for tests that pin stream sizes.
    #[must_use]
    pub fn verify_eos(&self) -> bool {
        self.context.end != 0 && self.offset == self.context.end
    }

    /// The token most recently returned by [`Reader::token`].
    #[must_use]
    pub fn last_token(&self) -> Token {
        self.last_token
    }

    /// Pushes the last token back so the next [`Reader::token`] returns it
    /// again. One level of look-ahead, used by container loops to hand the
    /// first foreign token back to their caller.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::{Reader, Token};
    ///
    /// let mut reader = Reader::new(&[0x07, 0x01, 0x05]);
    /// assert_eq!(reader.token(), Token::new(7));
    /// reader.push_last_token();
    /// assert_eq!(reader.token(), Token::new(7));
    /// ```
    pub fn push_last_token(&mut self) {
        self.token_pushed = true;
    }

    /// Element count announced by the most recent list prefix, or 0. Valid
    /// while the first element of the container is about to be decoded;
    /// containers use it to preallocate.
    #[must_use]
    pub fn next_container_element_count(&self) -> usize {
        self.next_container_element_count
    }

    /// Skips whatever remains of the current element's payload.
    ///
    /// Calling [`Reader::token`] without consuming the payload skips it too;
    /// `skip` just makes the intent explicit in dispatch loops.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::{Reader, Token};
    ///
    /// let mut reader = Reader::new(&[0x09, 0x02, 0xaa, 0xbb, 0x01, 0x01, 0x2a]);
    /// reader.token();
    /// reader.skip(); // token 9 is somebody else's field
    /// assert_eq!(reader.token(), Token::new(1));
    /// assert_eq!(reader.get::<u8>(), 42);
    /// ```
    pub fn skip(&mut self) {
        let bytes = self.remaining_in_element;
        self.skip_bytes(bytes);
    }

    /// Advances to the next chunk header and returns its token.
    ///
    /// Any unread payload from the previous chunk is skipped first. Inside a
    /// container span the shared token is synthesized for each element
    /// without touching the wire. Returns [`Token::INVALID`] once the stream
    /// is exhausted or an error has latched.
    pub fn token(&mut self) -> Token {
        if self.error.is_some() {
            return Token::INVALID;
        }
        if self.token_pushed {
            self.token_pushed = false;
            return self.last_token;
        }
        if self.remaining_in_element > 0 {
            self.skip();
            if self.eos() {
                return Token::INVALID;
            }
        }

        self.next_container_element_count = 0;
        let mut update_element_end = false;

        if self.context.element_end != 0 && self.context.element_end == self.offset {
            // The cursor sits on the next element of an open container.
            if self.past_eos(1) {
                return self.fail_token(Error::Truncated);
            }
            self.last_token = self.context.container_token;
            self.context.element_index += 1;
            if self.context.element_index == self.context.element_count {
                self.context.container_token = Token::INVALID;
                self.context.element_count = 0;
                self.context.element_index = 0;
                self.context.element_end = 0;
            } else {
                update_element_end = true;
            }
        } else {
            if self.past_eos(2) {
                return self.fail_token(Error::Truncated);
            }
            self.last_token = Token::new(self.decode_token());
            // A list prefix right here makes this the shared token of a new
            // container span.
            if self.next_container_element_count > 1 {
                self.context.container_token = self.last_token;
                self.context.element_count = self.next_container_element_count;
                self.context.element_index = 1;
                update_element_end = true;
            }
        }

        if self.error.is_some() {
            self.last_token = Token::INVALID;
            return Token::INVALID;
        }

        self.remaining_in_element = self.decode_length();
        if update_element_end {
            self.context.element_end = self.offset.saturating_add(self.remaining_in_element);
        }
        if self.error.is_some() {
            self.last_token = Token::INVALID;
            return Token::INVALID;
        }
        if self.past_eos(self.remaining_in_element) {
            return self.fail_token(Error::PayloadTooLarge {
                declared: self.remaining_in_element as u64,
                available: self.context.end.saturating_sub(self.offset) as u64,
            });
        }

        self.last_token
    }

    /// Like [`Reader::token`], converted into a caller-side token type
    /// (typically a `#[repr(u64)]`-style enum with a `From<u64>` impl).
    pub fn token_as<T: From<u64>>(&mut self) -> T {
        T::from(self.token().value())
    }

    /// Decodes the current element's payload into a fresh value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::Reader;
    ///
    /// let mut reader = Reader::new(&[0x01, 0x02, 0x01, 0x2c]);
    /// reader.token();
    /// assert_eq!(reader.get::<u32>(), 300);
    /// ```
    #[must_use]
    pub fn get<V: Streamable>(&mut self) -> V {
        let mut value = V::default();
        value.read_into(self);
        value
    }

    /// Decodes the current element's payload into `dest`.
    ///
    /// Containers append; everything else is replaced. A zero-length payload
    /// yields the type's zero value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::Reader;
    ///
    /// // Consecutive chunks under one token decode as container elements.
    /// let mut reader = Reader::new(&[0x05, 0x01, 0x0a, 0x05, 0x01, 0x0b]);
    /// let mut values: Vec<u8> = Vec::new();
    /// while !reader.eos() {
    ///     match reader.token().value() {
    ///         5 => reader.read_into(&mut values),
    ///         _ => reader.skip(),
    ///     }
    /// }
    /// assert_eq!(values, [0x0a, 0x0b]);
    /// ```
    pub fn read_into<V: Streamable>(&mut self, dest: &mut V) {
        dest.read_into(self);
    }

    /// Reads a string payload transcoded back to UTF-16.
    #[must_use]
    pub fn get_utf16(&mut self) -> Vec<u16> {
        let payload = self.fetch_payload_bytes();
        if payload.is_empty() {
            return Vec::new();
        }
        String::from_utf8_lossy(payload).encode_utf16().collect()
    }

    /// Reads a record from the current element through its own token map.
    ///
    /// The record's chunks live in a length-framed sub-stream; the cursor
    /// lands exactly on the sub-stream's declared end afterwards, whatever
    /// the record's map did or did not understand.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::{token_map, Reader};
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
    /// let bytes = [0x03, 0x06, 0x00, 0x01, 0x1b, 0x01, 0x01, 0x03];
    /// let mut reader = Reader::new(&bytes);
    /// let mut date = Date::default();
    /// while !reader.eos() {
    ///     match reader.token().value() {
    ///         3 => reader.get_record(&mut date),
    ///         _ => reader.skip(),
    ///     }
    /// }
    /// assert_eq!(date.day, 27);
    /// assert_eq!(date.month, 3);
    /// ```
    pub fn get_record<R: Record>(&mut self, record: &mut R) {
        self.prime_element_at_start();
        if self.error.is_some() {
            return;
        }
        let mut sub = SubStream::new(self);
        record.read(&mut sub);
    }

    /// Reads a record from the current element through an explicit map.
    pub fn get_record_with_map<R>(&mut self, record: &mut R, map: &TokenMap<R>) {
        self.prime_element_at_start();
        if self.error.is_some() {
            return;
        }
        let mut sub = SubStream::new(self);
        map.read(record, &mut sub);
    }

    /// A reader handed a bare record sub-stream (nothing consumed yet)
    /// first decodes the naked framing length.
    pub(crate) fn prime_element_at_start(&mut self) {
        if self.offset == 0 {
            self.remaining_in_element = self.decode_length();
        }
    }

    pub(crate) fn bad(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn fail_token(&mut self, error: Error) -> Token {
        self.last_token = Token::INVALID;
        self.fail(error);
        Token::INVALID
    }

    fn skip_bytes(&mut self, bytes: usize) {
        self.token_pushed = false;
        self.remaining_in_element = 0;
        if self.error.is_some() || bytes == 0 {
            return;
        }
        match self.offset.checked_add(bytes) {
            Some(end) if end <= self.buf.len() => self.offset = end,
            _ => self.fail(Error::Truncated),
        }
    }

    fn next_byte(&mut self) -> u8 {
        if self.offset >= self.buf.len() {
            self.fail(Error::Truncated);
            return 0;
        }
        let byte = self.buf[self.offset];
        self.offset += 1;
        byte
    }

    fn decode_token(&mut self) -> u64 {
        self.read_length_encoded(true)
    }

    fn decode_length(&mut self) -> usize {
        self.read_length_encoded(false) as usize
    }

    fn read_length_encoded(&mut self, for_token: bool) -> u64 {
        if self.past_eos(1) {
            self.fail(Error::Truncated);
            return 0;
        }
        if self.error.is_some() {
            return 0;
        }
        let first = self.next_byte();
        if self.error.is_some() {
            return 0;
        }
        match varint::classify(first) {
            Prefix::Short(value) => u64::from(value),
            Prefix::Pair(high) => {
                if self.past_eos(1) {
                    self.fail(Error::Truncated);
                    return 0;
                }
                let low = self.next_byte();
                if self.error.is_some() {
                    return 0;
                }
                (u64::from(high) << 8) | u64::from(low)
            }
            Prefix::ListEscape => {
                if !for_token {
                    self.fail(Error::MalformedVarint {
                        offset: self.offset - 1,
                    });
                    return 0;
                }
                self.next_container_element_count = self.decode_length();
                // The shared token may not itself be another escape.
                self.read_length_encoded(false)
            }
            Prefix::Extended(count) => {
                if self.past_eos(count) {
                    self.fail(Error::Truncated);
                    return 0;
                }
                self.remaining_in_element = count;
                u64::from_be_bytes(self.fetch_payload::<8>(false))
            }
        }
    }

    /// Consumes the current payload right-aligned into an `N`-byte buffer,
    /// zero-filled or sign-extended on the left.
    pub(crate) fn fetch_payload<const N: usize>(&mut self, sign_extend: bool) -> [u8; N] {
        let mut out = [0u8; N];
        if self.error.is_some() {
            return out;
        }
        let len = self.remaining_in_element;
        if len == 0 {
            return out;
        }
        if len > N {
            self.fail(Error::PayloadTooLarge {
                declared: len as u64,
                available: N as u64,
            });
            return out;
        }
        if self.offset + len > self.buf.len() {
            self.fail(Error::Truncated);
            return out;
        }
        out[N - len..].copy_from_slice(&self.buf[self.offset..self.offset + len]);
        self.offset += len;
        self.remaining_in_element = 0;
        if sign_extend && len < N && out[N - len] & 0x80 == 0x80 {
            for byte in &mut out[..N - len] {
                *byte = 0xff;
            }
        }
        out
    }

    /// Consumes the current payload as a borrowed slice.
    pub(crate) fn fetch_payload_bytes(&mut self) -> &'b [u8] {
        if self.error.is_some() {
            return &[];
        }
        let len = self.remaining_in_element;
        if len == 0 {
            return &[];
        }
        let end = match self.offset.checked_add(len) {
            Some(end) if end <= self.buf.len() => end,
            _ => {
                self.fail(Error::Truncated);
                return &[];
            }
        };
        let payload = &self.buf[self.offset..end];
        self.offset = end;
        self.remaining_in_element = 0;
        payload
    }
}

impl std::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("offset", &self.offset)
            .field("end", &self.context.end)
            .field("last_token", &self.last_token)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Scope guard that narrows a reader to the current element's payload.
///
/// On construction the reader's end-of-stream bound becomes the end of the
/// element and the container bookkeeping starts fresh. On drop, unread inner
/// bytes are skipped and the previous context is restored, so a sloppy or
/// failing inner decoder can never desynchronize its caller.
///
/// # Examples
///
/// ```rust
/// use tokenstream::{Reader, SubStream};
///
/// // Token 3 framing a sub-stream holding one chunk: token 0, value 0x1B.
/// let mut reader = Reader::new(&[0x03, 0x03, 0x00, 0x01, 0x1b]);
/// reader.token();
/// {
///     let mut sub = SubStream::new(&mut reader);
///     while !sub.eos() {
///         match sub.token().value() {
///             0 => assert_eq!(sub.get::<u8>(), 0x1b),
///             _ => sub.skip(),
///         }
///     }
/// }
/// assert!(reader.eos());
/// ```
pub struct SubStream<'r, 'b> {
    reader: &'r mut Reader<'b>,
    saved: Context,
}

impl<'r, 'b> SubStream<'r, 'b> {
    /// Narrows `reader` to the payload of the element just announced by
    /// [`Reader::token`].
    pub fn new(reader: &'r mut Reader<'b>) -> Self {
        let saved = reader.context.clone();
        let end = reader.offset.saturating_add(reader.remaining_in_element);
        reader.context = Context::with_end(end);
        reader.remaining_in_element = 0;
        SubStream { reader, saved }
    }
}

impl Drop for SubStream<'_, '_> {
    fn drop(&mut self) {
        let unread = self.reader.context.end.saturating_sub(self.reader.offset);
        self.reader.skip_bytes(unread);
        self.reader.context = self.saved.clone();
    }
}

impl<'b> Deref for SubStream<'_, 'b> {
    type Target = Reader<'b>;

    fn deref(&self) -> &Self::Target {
        self.reader
    }
}

impl DerefMut for SubStream<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader
    }
}
