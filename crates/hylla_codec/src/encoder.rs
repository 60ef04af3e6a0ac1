//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{Opaque, Record, Value};
use chrono::{DateTime, SecondsFormat, Utc};

/// CBOR tag for an RFC 3339 date/time string.
pub(crate) const TAG_DATETIME: u64 = 0;

/// Tag wrapping `[type_tag, payload]` for opaque objects.
pub(crate) const TAG_OPAQUE: u64 = 27;

/// Encode a value to canonical CBOR bytes.
///
/// This function produces deterministic output following the canonical
/// CBOR rules specified in RFC 8949 Section 4.2.1:
/// - Map keys are sorted by their encoded form (length-first, then bytewise)
/// - Integers use the shortest possible encoding
/// - Floats are always encoded as 64-bit
/// - No indefinite-length encoding
///
/// # Errors
///
/// Returns an error if the value cannot be encoded (e.g., contains NaN).
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// Encode a record to canonical CBOR bytes.
///
/// # Errors
///
/// Returns an error if any value in the record cannot be encoded.
pub fn encode_record(record: &Record) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode_map(record)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder.
///
/// This encoder produces deterministic CBOR output suitable for
/// storing shelf records.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => {
                self.encode_null();
                Ok(())
            }
            Value::Bool(b) => {
                self.encode_bool(*b);
                Ok(())
            }
            Value::Integer(n) => {
                self.encode_integer(*n);
                Ok(())
            }
            Value::Float(x) => self.encode_float(*x),
            Value::Bytes(b) => {
                self.encode_bytes(b);
                Ok(())
            }
            Value::Text(s) => {
                self.encode_text(s);
                Ok(())
            }
            Value::DateTime(dt) => {
                self.encode_datetime(dt);
                Ok(())
            }
            Value::Array(arr) => self.encode_array(arr),
            Value::Map(map) => self.encode_map(map),
            Value::Opaque(opaque) => {
                self.encode_opaque(opaque);
                Ok(())
            }
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn encode_null(&mut self) {
        // CBOR null is simple value 22 (0xf6)
        self.buffer.push(0xf6);
    }

    fn encode_bool(&mut self, b: bool) {
        // CBOR false is 0xf4, true is 0xf5
        self.buffer.push(if b { 0xf5 } else { 0xf4 });
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // CBOR negative integers encode -(n+1)
            // For n in [-2^63, -1], -(n+1) is in [0, 2^63-1]
            let abs_minus_one = (-(n + 1)) as u64;
            self.encode_unsigned(1, abs_minus_one);
        }
    }

    fn encode_float(&mut self, x: f64) -> CodecResult<()> {
        if x.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&x.to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_bytes(&mut self, bytes: &[u8]) {
        self.encode_unsigned(2, bytes.len() as u64);
        self.buffer.extend_from_slice(bytes);
    }

    fn encode_text(&mut self, text: &str) {
        self.encode_unsigned(3, text.len() as u64);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    fn encode_datetime(&mut self, dt: &DateTime<Utc>) {
        self.encode_unsigned(6, TAG_DATETIME);
        self.encode_text(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }

    fn encode_opaque(&mut self, opaque: &Opaque) {
        self.encode_unsigned(6, TAG_OPAQUE);
        self.encode_unsigned(4, 2);
        self.encode_text(&opaque.type_tag);
        self.encode_bytes(&opaque.payload);
    }

    fn encode_array(&mut self, arr: &[Value]) -> CodecResult<()> {
        self.encode_unsigned(4, arr.len() as u64);
        for item in arr {
            self.encode(item)?;
        }
        Ok(())
    }

    fn encode_map(&mut self, map: &Record) -> CodecResult<()> {
        // First, encode all keys to get their canonical byte representation
        let mut encoded_pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(map.len());

        for (key, value) in map {
            let mut key_encoder = CanonicalEncoder::new();
            key_encoder.encode_text(key);
            encoded_pairs.push((key_encoder.into_bytes(), value));
        }

        // Sort by encoded key (length-first, then bytewise)
        encoded_pairs.sort_by(|a, b| match a.0.len().cmp(&b.0.len()) {
            std::cmp::Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        self.encode_unsigned(5, map.len() as u64);
        for (encoded_key, value) in encoded_pairs {
            self.buffer.extend_from_slice(&encoded_key);
            self.encode(value)?;
        }

        Ok(())
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}
