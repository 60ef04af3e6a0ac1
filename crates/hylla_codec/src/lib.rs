//! # Hylla Codec
//!
//! The record value model for Hylla and its canonical CBOR encoding.
//!
//! Shelf records are trees of [`Value`]s: scalars, byte and text strings,
//! timestamps, arrays, nested records, and opaque objects carried as a
//! type tag plus a binary payload. The storage layer only ever sees the
//! canonical bytes produced here.
//!
//! ## Canonical CBOR Rules
//!
//! - Map keys are text, sorted by their encoded form (length-first, then bytewise)
//! - Integers use shortest encoding
//! - Floats are 64-bit; NaN is rejected
//! - Timestamps are tag 0 with an RFC 3339 string
//! - Opaque objects are tag 27 wrapping `[type_tag, payload]`
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use hylla_codec::{decode_record, encode_record, Record, Value};
//!
//! let mut record = Record::new();
//! record.insert("title".into(), Value::from("Dune"));
//! record.insert("year".into(), Value::Integer(1965));
//!
//! let bytes = encode_record(&record).unwrap();
//! assert_eq!(decode_record(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod serde_impl;
mod value;

pub use decoder::{decode_record, from_cbor, CanonicalDecoder};
pub use encoder::{encode_record, to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{Opaque, Record, Value, ValueKind};

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

impl Encode for Record {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        encode_record(self)
    }
}

impl Decode for Record {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        decode_record(bytes)
    }
}
