//! Canonical CBOR decoder.

use crate::encoder::{TAG_DATETIME, TAG_OPAQUE};
use crate::error::{CodecError, CodecResult};
use crate::value::{Opaque, Record, Value};
use chrono::{DateTime, Utc};

/// Decode a value from CBOR bytes.
///
/// The input must hold exactly one value.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR, contain
/// forbidden constructs (NaN, indefinite-length), or carry trailing bytes.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// Decode a record from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes do not decode to a single map.
pub fn decode_record(bytes: &[u8]) -> CodecResult<Record> {
    match from_cbor(bytes)? {
        Value::Map(map) => Ok(map),
        other => Err(CodecError::invalid_structure(format!(
            "expected a record, found {}",
            other.kind()
        ))),
    }
}

/// A canonical CBOR decoder.
///
/// This decoder validates that input follows canonical CBOR rules
/// and rejects forbidden constructs.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Maximum allowed element count for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum allowed byte/string length.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                // Negative integer: value is -(n+1)
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-n - 1))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => self.decode_bytes(additional_info).map(Value::Bytes),
            3 => self.decode_text(additional_info).map(Value::Text),
            4 => self.decode_array(additional_info),
            5 => self.decode_map(additional_info),
            6 => self.decode_tagged(additional_info),
            7 => self.decode_simple(additional_info),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.data.len() - self.pos {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    #[inline]
    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let non_canonical =
            || CodecError::invalid_structure("non-canonical: value could be encoded in fewer bytes");
        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => {
                let byte = self.read_byte()?;
                if byte < 24 {
                    return Err(non_canonical());
                }
                Ok(u64::from(byte))
            }
            25 => {
                let value = u16::from_be_bytes(self.read_array()?);
                if u8::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(u64::from(value))
            }
            26 => {
                let value = u32::from_be_bytes(self.read_array()?);
                if u16::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(u64::from(value))
            }
            27 => {
                let value = u64::from_be_bytes(self.read_array()?);
                if u32::try_from(value).is_ok() {
                    return Err(non_canonical());
                }
                Ok(value)
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            _ => Err(CodecError::IndefiniteLengthForbidden),
        }
    }

    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed,
        })
    }

    fn decode_bytes(&mut self, additional_info: u8) -> CodecResult<Vec<u8>> {
        let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    fn decode_text(&mut self, additional_info: u8) -> CodecResult<String> {
        let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
        let bytes = self.read_bytes(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_string())
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let data = self.data;
        let mut map = Record::new();
        let mut prev_key_bytes: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let Value::Text(key) = self.decode()? else {
                return Err(CodecError::invalid_structure("map keys must be text"));
            };
            let key_bytes = &data[key_start..self.pos];

            // Keys must be strictly increasing, which also rules out duplicates
            if let Some(prev) = prev_key_bytes {
                if compare_cbor_bytes(prev, key_bytes) != std::cmp::Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            prev_key_bytes = Some(key_bytes);

            let value = self.decode()?;
            map.insert(key, value);
        }

        Ok(Value::Map(map))
    }

    fn decode_tagged(&mut self, additional_info: u8) -> CodecResult<Value> {
        let tag = self.decode_unsigned(additional_info)?;
        match tag {
            TAG_DATETIME => {
                let Value::Text(text) = self.decode()? else {
                    return Err(CodecError::invalid_structure(
                        "datetime tag must wrap a text string",
                    ));
                };
                DateTime::parse_from_rfc3339(&text)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|_| CodecError::InvalidDateTime { value: text })
            }
            TAG_OPAQUE => match self.decode()? {
                Value::Array(items) => match <[Value; 2]>::try_from(items) {
                    Ok([Value::Text(type_tag), Value::Bytes(payload)]) => {
                        Ok(Value::Opaque(Opaque { type_tag, payload }))
                    }
                    _ => Err(CodecError::invalid_structure(
                        "opaque tag must wrap [text, bytes]",
                    )),
                },
                _ => Err(CodecError::invalid_structure(
                    "opaque tag must wrap [text, bytes]",
                )),
            },
            other => Err(CodecError::unsupported_type(format!("tag {other}"))),
        }
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            23 => {
                // undefined - treat as null
                Ok(Value::Null)
            }
            24 => {
                let simple = self.read_byte()?;
                match simple {
                    0..=31 => Err(CodecError::invalid_structure(
                        "non-canonical: simple value should use direct encoding",
                    )),
                    _ => Err(CodecError::unsupported_type(format!(
                        "simple value {simple}"
                    ))),
                }
            }
            25 | 26 => Err(CodecError::invalid_structure(
                "non-canonical: floats must use 64-bit encoding",
            )),
            27 => {
                let x = f64::from_be_bytes(self.read_array()?);
                if x.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(x))
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!(
                "simple value {additional_info}"
            ))),
        }
    }
}

/// Compare two CBOR byte sequences for canonical ordering.
/// Uses length-first, then bytewise comparison.
fn compare_cbor_bytes(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => a.cmp(b),
        other => other,
    }
}
