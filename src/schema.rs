//! Static schema binding: token maps and the `Record` trait.
//!
//! A [`TokenMap`] binds each field of a record type to a token and a pair of
//! accessors. Writing walks the map in declared order, emitting one chunk
//! per field; reading walks the *stream*, looks every incoming token up in
//! the map, and silently skips the ones it does not know. That asymmetry is
//! the whole compatibility story: fields can be added, reordered, or
//! retired without breaking either direction.
//!
//! Maps are usually declared with the [`token_map!`](crate::token_map)
//! macro, which also wires up the [`Streamable`](crate::Streamable) impl so
//! records nest inside other records and containers. The builder API
//! underneath is public for the cases the macro cannot express, such as
//! binding fields of a foreign type through custom closures.
//!
//! ## Base records
//!
//! A derived record brings in its base two ways:
//!
//! - [`TokenMapBuilder::nested_base`] frames the base as its own sub-stream
//!   chunk under a dedicated token. Token spaces stay separate; costs a few
//!   framing bytes. Safe under renumbering.
//! - [`TokenMapBuilder::include_base`] merges the base's entries into the
//!   derived map. No framing overhead; tokens must not overlap.

use indexmap::IndexMap;

use crate::reader::Reader;
use crate::token::Token;
use crate::writer::Writer;

type GetFn<T> = Box<dyn Fn(&mut Reader<'_>, &mut T) + Send + Sync>;
type PutFn<T> = Box<dyn Fn(&mut Writer<'_>, &T) + Send + Sync>;

/// The read/write accessor pair bound to one token.
pub struct Accessor<T: ?Sized> {
    get: GetFn<T>,
    put: PutFn<T>,
}

impl<T: ?Sized> Accessor<T> {
    /// Decodes one field of `record` from the reader's current element.
    pub fn get(&self, reader: &mut Reader<'_>, record: &mut T) {
        (self.get)(reader, record);
    }

    /// Encodes one field of `record` under the writer's pending token.
    pub fn put(&self, writer: &mut Writer<'_>, record: &T) {
        (self.put)(writer, record);
    }
}

/// An ordered, token-unique set of field accessors for a record type.
pub struct TokenMap<T> {
    entries: IndexMap<u64, Accessor<T>>,
}

impl<T> TokenMap<T> {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> TokenMapBuilder<T> {
        TokenMapBuilder {
            entries: IndexMap::new(),
        }
    }

    /// Looks up the accessor for `token`.
    #[must_use]
    pub fn get(&self, token: Token) -> Option<&Accessor<T>> {
        self.entries.get(&token.value())
    }

    /// Number of bound fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no fields are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(token, accessor)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (Token, &Accessor<T>)> {
        self.entries
            .iter()
            .map(|(token, accessor)| (Token::new(*token), accessor))
    }

    /// Writes every bound field of `record`, in declared order.
    pub fn write(&self, record: &T, writer: &mut Writer<'_>) {
        for (token, accessor) in self.iter() {
            writer.put_token(token);
            accessor.put(writer, record);
        }
    }

    /// Reads chunks into `record` until the current context ends,
    /// dispatching known tokens and skipping the rest.
    pub fn read(&self, record: &mut T, reader: &mut Reader<'_>) {
        if self.is_empty() {
            return;
        }
        while !reader.eos() {
            let token = reader.token();
            if let Some(accessor) = self.get(token) {
                accessor.get(reader, record);
            }
        }
    }
}

impl<T> std::fmt::Debug for TokenMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMap")
            .field("tokens", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`TokenMap`]. Panics on duplicate tokens, which are always a
/// schema-declaration bug.
///
/// The [`token_map!`](crate::token_map) macro drives this for ordinary
/// struct fields; use it directly when a field needs hand-written wire
/// logic, such as a type from another crate:
///
/// ```rust
/// use std::sync::LazyLock;
/// use std::time::Duration;
/// use tokenstream::{Reader, Record, TokenMap, Writer};
///
/// #[derive(Debug, Default)]
/// struct Heartbeat {
///     interval: Duration, // not a wire type by itself
/// }
///
/// impl Record for Heartbeat {
///     fn token_map() -> &'static TokenMap<Self> {
///         static MAP: LazyLock<TokenMap<Heartbeat>> = LazyLock::new(|| {
///             TokenMap::builder()
///                 .field(
///                     0u64,
///                     |reader: &mut Reader<'_>, record: &mut Heartbeat| {
///                         record.interval = Duration::from_millis(reader.get::<u64>());
///                     },
///                     |writer: &mut Writer<'_>, record: &Heartbeat| {
///                         writer.put_value(&(record.interval.as_millis() as u64));
///                     },
///                 )
///                 .build()
///         });
///         &MAP
///     }
/// }
///
/// let beat = Heartbeat {
///     interval: Duration::from_millis(250),
/// };
/// let bytes = tokenstream::to_vec(&beat).unwrap();
/// let decoded: Heartbeat = tokenstream::from_slice(&bytes).unwrap();
/// assert_eq!(decoded.interval, beat.interval);
/// ```
pub struct TokenMapBuilder<T> {
    entries: IndexMap<u64, Accessor<T>>,
}

impl<T> TokenMapBuilder<T> {
    /// Binds `token` to a getter/putter pair.
    ///
    /// The putter runs with the token already pending on the writer; the
    /// getter runs with the reader positioned on the field's payload.
    #[must_use]
    pub fn field<G, P>(mut self, token: impl Into<Token>, get: G, put: P) -> Self
    where
        G: Fn(&mut Reader<'_>, &mut T) + Send + Sync + 'static,
        P: Fn(&mut Writer<'_>, &T) + Send + Sync + 'static,
    {
        self.insert(token.into(), Box::new(get), Box::new(put));
        self
    }

    /// Frames the base portion of the record as a nested sub-stream under
    /// `token`, using the base type's own token map.
    #[must_use]
    pub fn nested_base<B>(
        self,
        token: impl Into<Token>,
        base_ref: fn(&T) -> &B,
        base_mut: fn(&mut T) -> &mut B,
    ) -> Self
    where
        B: Record + 'static,
        T: 'static,
    {
        self.field(
            token,
            move |reader: &mut Reader<'_>, record: &mut T| {
                reader.get_record_with_map(base_mut(record), B::token_map());
            },
            move |writer: &mut Writer<'_>, record: &T| {
                writer.put_value_record_with_map(base_ref(record), B::token_map(), false);
            },
        )
    }

    /// Merges every entry of the base type's token map into this one,
    /// projected through the given accessors.
    ///
    /// # Panics
    ///
    /// Panics if a base token collides with an already-declared token.
    #[must_use]
    pub fn include_base<B>(
        mut self,
        base_ref: fn(&T) -> &B,
        base_mut: fn(&mut T) -> &mut B,
    ) -> Self
    where
        B: Record + 'static,
        T: 'static,
    {
        for (token, accessor) in B::token_map().iter() {
            self.insert(
                token,
                Box::new(move |reader: &mut Reader<'_>, record: &mut T| {
                    accessor.get(reader, base_mut(record));
                }),
                Box::new(move |writer: &mut Writer<'_>, record: &T| {
                    accessor.put(writer, base_ref(record));
                }),
            );
        }
        self
    }

    /// Finishes the map.
    #[must_use]
    pub fn build(self) -> TokenMap<T> {
        TokenMap {
            entries: self.entries,
        }
    }

    fn insert(&mut self, token: Token, get: GetFn<T>, put: PutFn<T>) {
        assert!(
            token.is_valid(),
            "the invalid token sentinel cannot be bound to a field"
        );
        let previous = self
            .entries
            .insert(token.value(), Accessor { get, put });
        assert!(
            previous.is_none(),
            "duplicate token {} in token map",
            token.value()
        );
    }
}

/// A struct type bound to a token map.
///
/// The provided `write`/`read` walk the map; override them for a fully
/// hand-rolled wire shape (the map can then be empty). Most types get their
/// impl from [`token_map!`](crate::token_map).
pub trait Record
where
    Self: 'static,
{
    /// The token map binding this type's fields.
    fn token_map() -> &'static TokenMap<Self>
    where
        Self: Sized;

    /// Writes every field as a top-level chunk of `writer`.
    fn write(&self, writer: &mut Writer<'_>)
    where
        Self: Sized,
    {
        Self::token_map().write(self, writer);
    }

    /// Reads chunks into `self` until the reader's current context ends.
    fn read(&mut self, reader: &mut Reader<'_>)
    where
        Self: Sized,
    {
        Self::token_map().read(self, reader);
    }
}
