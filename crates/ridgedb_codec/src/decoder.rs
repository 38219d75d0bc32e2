//! Value decoder.

use crate::encoder::TIMESTAMP_TAG;
use crate::error::{CodecError, CodecResult};
use crate::value::DataValue;

/// Decode exactly one value.
///
/// # Errors
///
/// Returns an error if the bytes are malformed, use an unsupported item,
/// or contain trailing data.
pub fn decode_value(bytes: &[u8]) -> CodecResult<DataValue> {
    let mut decoder = ValueDecoder::new(bytes);
    let value = decoder.decode()?;
    decoder.finish()?;
    Ok(value)
}

/// Decode exactly one sequence of values.
///
/// # Errors
///
/// Returns an error if the bytes are not a single well-formed sequence.
pub fn decode_values(bytes: &[u8]) -> CodecResult<Vec<DataValue>> {
    let mut decoder = ValueDecoder::new(bytes);
    let values = decoder.decode_sequence()?;
    decoder.finish()?;
    Ok(values)
}

/// Maximum element count accepted for a sequence.
const MAX_SEQUENCE_ELEMENTS: u64 = 64 * 1024;

/// Maximum byte/string length accepted.
const MAX_BYTES_LENGTH: u64 = 64 * 1024 * 1024;

/// A streaming decoder over a byte slice.
pub struct ValueDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ValueDecoder<'a> {
    /// Create a new decoder for the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed input.
    pub fn decode(&mut self) -> CodecResult<DataValue> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(DataValue::Integer)
                    .map_err(|_| CodecError::invalid_structure("integer out of i64 range"))
            }
            1 => self.decode_negative(additional_info).map(DataValue::Integer),
            2 => {
                let bytes = self.read_length_prefixed(additional_info)?;
                Ok(DataValue::Bytes(bytes.to_vec()))
            }
            3 => {
                let bytes = self.read_length_prefixed(additional_info)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(DataValue::Text(text.to_string()))
            }
            4 => Err(CodecError::unsupported_type("nested sequence")),
            6 => {
                let tag = self.decode_unsigned(additional_info)?;
                if tag != TIMESTAMP_TAG {
                    return Err(CodecError::unsupported_type(format!("tag {tag}")));
                }
                match self.decode()? {
                    DataValue::Integer(t) => Ok(DataValue::Timestamp(t)),
                    _ => Err(CodecError::invalid_structure("timestamp tag must wrap an integer")),
                }
            }
            7 => self.decode_simple(additional_info),
            _ => Err(CodecError::unsupported_type(format!("major type {major_type}"))),
        }
    }

    /// Decode a definite-length sequence header followed by its values.
    ///
    /// # Errors
    ///
    /// Returns an error if the next item is not a sequence or any element
    /// is malformed.
    pub fn decode_sequence(&mut self) -> CodecResult<Vec<DataValue>> {
        let initial_byte = self.read_byte()?;
        if initial_byte >> 5 != 4 {
            return Err(CodecError::invalid_structure("expected a sequence"));
        }
        let len = self.decode_unsigned(initial_byte & 0x1f)?;
        if len > MAX_SEQUENCE_ELEMENTS {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_SEQUENCE_ELEMENTS,
            });
        }

        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            values.push(self.decode()?);
        }
        Ok(values)
    }

    /// Fails unless every byte has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingBytes`] if input remains.
    pub fn finish(&self) -> CodecResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                remaining: self.data.len() - self.pos,
            })
        }
    }

    /// Check if all bytes have been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => Ok(u64::from(self.read_byte()?)),
            25 => Ok(u64::from(u16::from_be_bytes(self.read_array()?))),
            26 => Ok(u64::from(u32::from_be_bytes(self.read_array()?))),
            27 => Ok(u64::from_be_bytes(self.read_array()?)),
            31 => Err(CodecError::unsupported_type("indefinite length")),
            _ => Err(CodecError::invalid_structure("reserved additional info")),
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn decode_negative(&mut self, additional_info: u8) -> CodecResult<i64> {
        let n = self.decode_unsigned(additional_info)?;
        if n > i64::MAX as u64 {
            return Err(CodecError::invalid_structure("integer out of i64 range"));
        }
        Ok(-(n as i64) - 1)
    }

    fn read_length_prefixed(&mut self, additional_info: u8) -> CodecResult<&'a [u8]> {
        let len = self.decode_unsigned(additional_info)?;
        if len > MAX_BYTES_LENGTH {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: MAX_BYTES_LENGTH,
            });
        }
        self.read_bytes(len as usize)
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<DataValue> {
        match additional_info {
            20 => Ok(DataValue::Bool(false)),
            21 => Ok(DataValue::Bool(true)),
            22 => Ok(DataValue::Null),
            27 => Ok(DataValue::Float(f64::from_be_bytes(self.read_array()?))),
            25 | 26 => Err(CodecError::unsupported_type("half or single precision float")),
            other => Err(CodecError::unsupported_type(format!("simple value {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_value, encode_values};

    #[test]
    fn decode_integer_extremes() {
        for n in [0, 23, 24, 255, 256, 65535, 65536, i64::MAX, -1, -24, -25, i64::MIN] {
            let bytes = encode_value(&DataValue::Integer(n));
            assert_eq!(decode_value(&bytes).unwrap(), DataValue::Integer(n));
        }
    }

    #[test]
    fn decode_rejects_out_of_range_unsigned() {
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(decode_value(&bytes).is_err());
    }

    #[test]
    fn decode_truncated_text_fails() {
        let result = decode_value(&[0x65, b'h', b'e']);
        assert_eq!(result, Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn decode_invalid_utf8_fails() {
        let result = decode_value(&[0x62, 0xff, 0xfe]);
        assert_eq!(result, Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let result = decode_value(&[0x01, 0x02]);
        assert_eq!(result, Err(CodecError::TrailingBytes { remaining: 1 }));
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(decode_value(&[0xc2, 0x01]).is_err());
    }

    #[test]
    fn decode_rejects_nested_sequences() {
        assert!(decode_values(&[0x81, 0x80]).is_err());
    }

    #[test]
    fn decode_sequence_requires_array_header() {
        assert!(decode_values(&[0x01]).is_err());
    }

    #[test]
    fn decode_sequence_roundtrip() {
        let row = vec![DataValue::Timestamp(-5), DataValue::Null, DataValue::from("z")];
        let bytes = encode_values(&row);
        let mut decoder = ValueDecoder::new(&bytes);
        assert_eq!(decoder.decode_sequence().unwrap(), row);
        assert!(decoder.is_empty());
        assert!(decoder.remaining().is_empty());
    }
}
