//! Declarative schema registration.
//!
//! [`token_map!`](crate::token_map) binds struct fields to tokens and
//! generates both the [`Record`](crate::Record) impl (so the type reads and
//! writes through its map) and the [`Streamable`](crate::Streamable) impl
//! (so it nests inside other records and containers).
//! [`streamable_enum!`](crate::streamable_enum) puts a fieldless enum on the
//! wire as its underlying integer.

/// Binds a struct's fields to tokens, generating its
/// [`Record`](crate::Record) and [`Streamable`](crate::Streamable) impls.
///
/// Entry forms:
///
/// - `TOKEN => field` — plain field, trimmed against the type's zero value;
/// - `TOKEN => field = default` — field with a declared default;
/// - `nested TOKEN => field: BaseType` — the base record framed as its own
///   sub-stream under `TOKEN` (token spaces stay separate);
/// - `flatten field: BaseType` — the base record's entries merged in
///   (tokens must not overlap).
///
/// Tokens are integer expressions or fieldless enum variants (anything
/// `as u64` accepts). Fields must be [`Streamable`](crate::Streamable).
///
/// # Examples
///
/// Declared defaults must agree with the values a fresh record starts
/// from: the reader cannot tell a trimmed field from an absent one.
///
/// ```rust
/// use tokenstream::{from_slice, to_vec, token_map};
///
/// #[derive(Debug, PartialEq)]
/// struct Release {
///     name: String,
///     major: u32,
///     downloads: Vec<u64>,
/// }
///
/// impl Default for Release {
///     fn default() -> Self {
///         Release {
///             name: String::new(),
///             major: 1,
///             downloads: Vec::new(),
///         }
///     }
/// }
///
/// token_map!(Release {
///     0 => name,
///     1 => major = 1u32,
///     2 => downloads,
/// });
///
/// let release = Release {
///     name: "quake".to_string(),
///     major: 1,
///     downloads: vec![10, 20],
/// };
/// let bytes = to_vec(&release).unwrap();
/// let decoded: Release = from_slice(&bytes).unwrap();
/// assert_eq!(decoded, release);
/// ```
#[macro_export]
macro_rules! token_map {
    ($ty:ty { $($body:tt)* }) => {
        impl $crate::Record for $ty {
            fn token_map() -> &'static $crate::TokenMap<Self> {
                static MAP: ::std::sync::LazyLock<$crate::TokenMap<$ty>> =
                    ::std::sync::LazyLock::new(|| {
                        $crate::token_map!(@entries $ty;
                            $crate::TokenMap::<$ty>::builder();
                            $($body)*)
                        .build()
                    });
                &MAP
            }
        }

        impl $crate::Streamable for $ty {
            fn read_into(&mut self, reader: &mut $crate::Reader<'_>) {
                reader.get_record(self);
            }

            fn write_into(
                &self,
                writer: &mut $crate::Writer<'_>,
                token: $crate::Token,
                _default: ::std::option::Option<&Self>,
            ) {
                writer.put_record(token, self, false);
            }

            fn write_element(&self, writer: &mut $crate::Writer<'_>, token: $crate::Token) {
                writer.put_record(token, self, true);
            }
        }
    };

    (@entries $ty:ty; $b:expr;) => { $b };

    (@entries $ty:ty; $b:expr; nested $tok:expr => $field:ident : $base:ty $(, $($rest:tt)*)?) => {
        $crate::token_map!(@entries $ty;
            $b.nested_base::<$base>(
                ($tok) as u64,
                (|record: &$ty| &record.$field) as fn(&$ty) -> &$base,
                (|record: &mut $ty| &mut record.$field) as fn(&mut $ty) -> &mut $base,
            );
            $($($rest)*)?)
    };

    (@entries $ty:ty; $b:expr; flatten $field:ident : $base:ty $(, $($rest:tt)*)?) => {
        $crate::token_map!(@entries $ty;
            $b.include_base::<$base>(
                (|record: &$ty| &record.$field) as fn(&$ty) -> &$base,
                (|record: &mut $ty| &mut record.$field) as fn(&mut $ty) -> &mut $base,
            );
            $($($rest)*)?)
    };

    (@entries $ty:ty; $b:expr; $tok:expr => $field:ident = $default:expr $(, $($rest:tt)*)?) => {
        $crate::token_map!(@entries $ty;
            {
                let default = ::std::convert::Into::into($default);
                $b.field(
                    ($tok) as u64,
                    |reader: &mut $crate::Reader<'_>, record: &mut $ty| {
                        reader.read_into(&mut record.$field);
                    },
                    move |writer: &mut $crate::Writer<'_>, record: &$ty| {
                        writer.put_value_with_default(&record.$field, &default);
                    },
                )
            };
            $($($rest)*)?)
    };

    (@entries $ty:ty; $b:expr; $tok:expr => $field:ident $(, $($rest:tt)*)?) => {
        $crate::token_map!(@entries $ty;
            $b.field(
                ($tok) as u64,
                |reader: &mut $crate::Reader<'_>, record: &mut $ty| {
                    reader.read_into(&mut record.$field);
                },
                |writer: &mut $crate::Writer<'_>, record: &$ty| {
                    writer.put_value(&record.$field);
                },
            );
            $($($rest)*)?)
    };
}

/// Puts a fieldless enum on the wire as its underlying integer.
///
/// The enum needs `Copy` and a `Default` variant. A wire value matching no
/// listed variant leaves the destination unchanged, the same way an absent
/// field would.
///
/// # Examples
///
/// ```rust
/// use tokenstream::{streamable_enum, MemoryWriter};
///
/// #[derive(Debug, Default, Clone, Copy, PartialEq)]
/// enum Compression {
///     #[default]
///     None = 0,
///     Deflate = 1,
///     Lzma = 2,
/// }
///
/// streamable_enum!(Compression as u8 { None, Deflate, Lzma });
///
/// let mut writer = MemoryWriter::new();
/// writer.put(4u64, &Compression::Lzma);
/// assert_eq!(writer.into_bytes().unwrap(), [0x04, 0x01, 0x02]);
/// ```
#[macro_export]
macro_rules! streamable_enum {
    ($ty:ty as $repr:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::Streamable for $ty {
            fn read_into(&mut self, reader: &mut $crate::Reader<'_>) {
                let mut raw = <$repr as ::std::default::Default>::default();
                $crate::Streamable::read_into(&mut raw, reader);
                $(
                    if raw == <$ty>::$variant as $repr {
                        *self = <$ty>::$variant;
                        return;
                    }
                )+
            }

            fn write_into(
                &self,
                writer: &mut $crate::Writer<'_>,
                token: $crate::Token,
                default: ::std::option::Option<&Self>,
            ) {
                let raw = *self as $repr;
                match default {
                    ::std::option::Option::Some(default) => {
                        let default = *default as $repr;
                        $crate::Streamable::write_into(
                            &raw,
                            writer,
                            token,
                            ::std::option::Option::Some(&default),
                        );
                    }
                    ::std::option::Option::None => {
                        $crate::Streamable::write_into(
                            &raw,
                            writer,
                            token,
                            ::std::option::Option::None,
                        );
                    }
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{from_slice, to_vec, MemoryWriter, Reader};

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    enum Channel {
        #[default]
        Stable = 0,
        Beta = 1,
        Nightly = 2,
    }

    streamable_enum!(Channel as u8 { Stable, Beta, Nightly });

    #[derive(Debug, PartialEq)]
    struct BuildInfo {
        number: u32,
        channel: Channel,
        host: String,
    }

    impl Default for BuildInfo {
        fn default() -> Self {
            BuildInfo {
                number: 0,
                channel: Channel::Stable,
                host: "localhost".to_string(),
            }
        }
    }

    token_map!(BuildInfo {
        0 => number,
        1 => channel = Channel::Stable,
        2 => host = "localhost",
    });

    #[test]
    fn test_token_map_roundtrip() {
        let info = BuildInfo {
            number: 88,
            channel: Channel::Nightly,
            host: "ci-worker-3".to_string(),
        };
        let bytes = to_vec(&info).unwrap();
        let decoded: BuildInfo = from_slice(&bytes).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_declared_defaults_trim() {
        let info = BuildInfo {
            number: 0,
            channel: Channel::Stable,
            host: "localhost".to_string(),
        };
        assert_eq!(to_vec(&info).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_enum_unknown_discriminant_leaves_value() {
        // token 1 carrying discriminant 9, which no variant claims.
        let mut reader = Reader::new(&[0x01, 0x01, 0x09]);
        let mut channel = Channel::Beta;
        reader.token();
        reader.read_into(&mut channel);
        assert_eq!(channel, Channel::Beta);
    }

    #[test]
    fn test_enum_on_the_wire_is_its_integer() {
        let mut writer = MemoryWriter::new();
        writer.put(3u64, &Channel::Beta);
        assert_eq!(writer.into_bytes().unwrap(), [0x03, 0x01, 0x01]);
    }
}
