//! Runtime-built records.
//!
//! A [`Generic`] is a record assembled at runtime: an ordered mapping from
//! token to a type-erased value slot. It serializes exactly like a static
//! [`Record`](crate::Record) with the same tokens and values, so the two
//! forms interoperate freely on the wire; a stream written from a `Generic`
//! reads back into a struct and vice versa.
//!
//! Reading is registration-driven: every token you want to receive must be
//! added (with a placeholder value) before the read, because the slot's type
//! is what tells the decoder how to interpret the payload. Unregistered
//! tokens are skipped like any other unknown field.
//!
//! ## Examples
//!
//! ```rust
//! use tokenstream::{Generic, MemoryWriter, Reader};
//!
//! let mut employee = Generic::new();
//! employee
//!     .add(0u64, 9u8)
//!     .add(1u64, 1992u16)
//!     .add_str(2u64, "Ford Prefect");
//!
//! let mut writer = MemoryWriter::new();
//! employee.write(&mut writer);
//! let bytes = writer.into_bytes().unwrap();
//!
//! let mut decoded = Generic::new();
//! decoded
//!     .add(0u64, 0u8)
//!     .add(1u64, 0u16)
//!     .add_str(2u64, "");
//! let mut reader = Reader::new(&bytes);
//! decoded.read(&mut reader);
//! assert_eq!(decoded.value::<String>(2u64), Some(&"Ford Prefect".to_string()));
//! ```

use std::any::Any;
use std::collections::BTreeMap;

use crate::reader::{Reader, SubStream};
use crate::token::Token;
use crate::value::Streamable;
use crate::writer::{MemoryWriter, Writer};

trait Member: Send + Sync {
    fn get(&mut self, reader: &mut Reader<'_>);
    fn put(&self, token: Token, writer: &mut Writer<'_>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot<T: Streamable> {
    value: T,
    default: Option<T>,
}

impl<T: Streamable + Send + Sync + 'static> Member for Slot<T> {
    fn get(&mut self, reader: &mut Reader<'_>) {
        self.value.read_into(reader);
    }

    fn put(&self, token: Token, writer: &mut Writer<'_>) {
        self.value.write_into(writer, token, self.default.as_ref());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A dynamic record: type-erased values keyed by token, iterated in
/// ascending token order on write.
#[derive(Default)]
pub struct Generic {
    members: BTreeMap<u64, Box<dyn Member>>,
}

impl Generic {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Generic {
            members: BTreeMap::new(),
        }
    }

    /// Registers `value` under `token`, replacing any previous slot.
    pub fn add<T: Streamable + Send + Sync + 'static>(
        &mut self,
        token: impl Into<Token>,
        value: T,
    ) -> &mut Self {
        self.members.insert(
            token.into().value(),
            Box::new(Slot {
                value,
                default: None,
            }),
        );
        self
    }

    /// Registers `value` under `token` with a declared default; the field
    /// trims away when the two are equal.
    pub fn add_with_default<T: Streamable + Send + Sync + 'static>(
        &mut self,
        token: impl Into<Token>,
        value: T,
        default: T,
    ) -> &mut Self {
        self.members.insert(
            token.into().value(),
            Box::new(Slot {
                value,
                default: Some(default),
            }),
        );
        self
    }

    /// Registers a string value under `token`.
    pub fn add_str(&mut self, token: impl Into<Token>, value: &str) -> &mut Self {
        self.add(token, value.to_string())
    }

    /// Number of registered members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if no members are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True if `token` has a registered slot.
    #[must_use]
    pub fn contains(&self, token: impl Into<Token>) -> bool {
        self.members.contains_key(&token.into().value())
    }

    /// Borrows the value registered under `token`, if its type matches.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tokenstream::Generic;
    ///
    /// let mut record = Generic::new();
    /// record.add(4u64, 99u32);
    /// assert_eq!(record.value::<u32>(4u64), Some(&99));
    /// assert_eq!(record.value::<u8>(4u64), None); // wrong type
    /// assert_eq!(record.value::<u32>(5u64), None); // unknown token
    /// ```
    #[must_use]
    pub fn value<T: Streamable + Send + Sync + 'static>(
        &self,
        token: impl Into<Token>,
    ) -> Option<&T> {
        self.members
            .get(&token.into().value())
            .and_then(|member| member.as_any().downcast_ref::<Slot<T>>())
            .map(|slot| &slot.value)
    }

    /// Mutably borrows the value registered under `token`, if its type
    /// matches.
    pub fn value_mut<T: Streamable + Send + Sync + 'static>(
        &mut self,
        token: impl Into<Token>,
    ) -> Option<&mut T> {
        self.members
            .get_mut(&token.into().value())
            .and_then(|member| member.as_any_mut().downcast_mut::<Slot<T>>())
            .map(|slot| &mut slot.value)
    }

    /// Writes every member as a top-level chunk, in ascending token order.
    pub fn write(&self, writer: &mut Writer<'_>) {
        for (token, member) in &self.members {
            member.put(Token::new(*token), writer);
        }
    }

    /// Reads chunks into registered members until the current context ends.
    pub fn read(&mut self, reader: &mut Reader<'_>) {
        while !reader.eos() {
            let token = reader.token();
            if let Some(member) = self.members.get_mut(&token.value()) {
                member.get(reader);
            }
        }
    }
}

impl std::fmt::Debug for Generic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generic")
            .field("tokens", &self.members.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Streamable for Generic {
    fn read_into(&mut self, reader: &mut Reader<'_>) {
        reader.prime_element_at_start();
        if reader.bad() {
            return;
        }
        let mut sub = SubStream::new(reader);
        self.read(&mut sub);
    }

    fn write_into(&self, writer: &mut Writer<'_>, token: Token, _default: Option<&Self>) {
        if writer.status().is_err() {
            return;
        }
        let mut sub = MemoryWriter::inheriting(writer);
        self.write(&mut sub);
        writer.put_sub(token, sub, false);
    }

    fn write_element(&self, writer: &mut Writer<'_>, token: Token) {
        if writer.status().is_err() {
            return;
        }
        let mut sub = MemoryWriter::inheriting(writer);
        self.write(&mut sub);
        writer.put_sub(token, sub, true);
    }
}
