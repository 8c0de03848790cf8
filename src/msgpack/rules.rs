//! Declarative codec rules for user structs.
//!
//! Three rule shapes are supported, mirroring the three declaration
//! flavours of the wire format:
//!
//! * [`mp_array_rule!`]: the struct is an array of its fields, in the
//!   declared order;
//! * [`mp_map_rule!`]: the struct is a map of literal keys (string or
//!   integer) to fields; unclaimed keys are skipped on decode;
//! * [`mp_transparent_rule!`]: the struct encodes as its single field.
//!
//! Each combined rule also exists as separate `_enc_rule!` / `_dec_rule!`
//! forms for types that only travel one way.
//!
//! ```
//! use zero_tarantool::{mp_array_rule, mp_map_rule};
//!
//! #[derive(Default, Debug, PartialEq)]
//! struct Account {
//!     id: u64,
//!     name: String,
//!     balance: f64,
//! }
//! mp_array_rule!(Account { id, name, balance });
//!
//! #[derive(Default, Debug, PartialEq)]
//! struct Limits {
//!     rate: u32,
//!     burst: u32,
//! }
//! mp_map_rule!(Limits { "rate" => rate, "burst" => burst });
//! ```

/// Encode-only half of [`mp_array_rule!`].
#[macro_export]
macro_rules! mp_array_enc_rule {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::msgpack::Encode for $ty {
            fn encode(&self, enc: &mut $crate::msgpack::Encoder<'_>) {
                enc.encode_arr_header([$(stringify!($field)),+].len() as u32);
                $($crate::msgpack::Encode::encode(&self.$field, enc);)+
            }
        }
    };
}

/// Decode-only half of [`mp_array_rule!`].
#[macro_export]
macro_rules! mp_array_dec_rule {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::msgpack::Decode for $ty {
            const FAMILIES: $crate::msgpack::Family = $crate::msgpack::Family::ARR;

            fn read_value(
                &mut self,
                head: $crate::msgpack::MpHead,
                dec: &mut $crate::msgpack::Decoder<'_>,
            ) -> ::core::result::Result<(), $crate::DecodeError> {
                let n = match head {
                    $crate::msgpack::MpHead::Arr(n) => n,
                    _ => {
                        return Err($crate::DecodeError::WrongType {
                            expected: Self::FAMILIES,
                            got: head.family(),
                        })
                    }
                };
                if n as usize != [$(stringify!($field)),+].len() {
                    dec.skip_rest_of(head)?;
                    return Err($crate::DecodeError::WrongType {
                        expected: Self::FAMILIES,
                        got: $crate::msgpack::Family::ARR,
                    });
                }
                $(dec.decode(&mut self.$field)?;)+
                Ok(())
            }
        }
    };
}

/// Declare a struct to travel as a MessagePack array of its fields.
#[macro_export]
macro_rules! mp_array_rule {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        $crate::mp_array_enc_rule!($ty { $($field),+ });
        $crate::mp_array_dec_rule!($ty { $($field),+ });
    };
}

/// Encode-only half of [`mp_map_rule!`].
#[macro_export]
macro_rules! mp_map_enc_rule {
    ($ty:ty { $($key:expr => $field:ident),+ $(,)? }) => {
        impl $crate::msgpack::Encode for $ty {
            fn encode(&self, enc: &mut $crate::msgpack::Encoder<'_>) {
                enc.encode_map_header([$(stringify!($field)),+].len() as u32);
                $(
                    $crate::msgpack::Encode::encode(&$key, enc);
                    $crate::msgpack::Encode::encode(&self.$field, enc);
                )+
            }
        }
    };
}

/// Decode-only half of [`mp_map_rule!`].
#[macro_export]
macro_rules! mp_map_dec_rule {
    ($ty:ty { $($key:expr => $field:ident),+ $(,)? }) => {
        impl $crate::msgpack::Decode for $ty {
            const FAMILIES: $crate::msgpack::Family = $crate::msgpack::Family::MAP;

            fn read_value(
                &mut self,
                head: $crate::msgpack::MpHead,
                dec: &mut $crate::msgpack::Decoder<'_>,
            ) -> ::core::result::Result<(), $crate::DecodeError> {
                let n = match head {
                    $crate::msgpack::MpHead::Map(n) => n,
                    _ => {
                        return Err($crate::DecodeError::WrongType {
                            expected: Self::FAMILIES,
                            got: head.family(),
                        })
                    }
                };
                for _ in 0..n {
                    let key = dec.read_map_key()?;
                    let mut matched = false;
                    $(
                        if !matched
                            && $crate::msgpack::MapKeyPattern::matches(&$key, &key)
                        {
                            dec.decode(&mut self.$field)?;
                            matched = true;
                        }
                    )+
                    if !matched {
                        dec.skip()?;
                    }
                }
                Ok(())
            }
        }
    };
}

/// Declare a struct to travel as a MessagePack map of literal keys to
/// fields. Keys may be string or integer literals.
#[macro_export]
macro_rules! mp_map_rule {
    ($ty:ty { $($key:expr => $field:ident),+ $(,)? }) => {
        $crate::mp_map_enc_rule!($ty { $($key => $field),+ });
        $crate::mp_map_dec_rule!($ty { $($key => $field),+ });
    };
}

/// Declare a struct to travel as its single field. The field type must be
/// named for the decode side.
#[macro_export]
macro_rules! mp_transparent_rule {
    ($ty:ty { $field:ident : $fty:ty }) => {
        impl $crate::msgpack::Encode for $ty {
            fn encode(&self, enc: &mut $crate::msgpack::Encoder<'_>) {
                $crate::msgpack::Encode::encode(&self.$field, enc);
            }
        }

        impl $crate::msgpack::Decode for $ty {
            const FAMILIES: $crate::msgpack::Family =
                <$fty as $crate::msgpack::Decode>::FAMILIES;

            fn read_value(
                &mut self,
                head: $crate::msgpack::MpHead,
                dec: &mut $crate::msgpack::Decoder<'_>,
            ) -> ::core::result::Result<(), $crate::DecodeError> {
                $crate::msgpack::Decode::read_value(&mut self.$field, head, dec)
            }
        }
    };
}
