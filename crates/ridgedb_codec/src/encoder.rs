//! Value encoder.

use crate::value::DataValue;
use bytes::BufMut;

/// CBOR tag marking an integer as a timestamp.
pub(crate) const TIMESTAMP_TAG: u64 = 1;

/// Encode one value.
///
/// Encoding is deterministic: equal values always produce identical bytes.
#[must_use]
pub fn encode_value(value: &DataValue) -> Vec<u8> {
    let mut encoder = ValueEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// Encode an ordered sequence of values (a row or a composite key).
#[must_use]
pub fn encode_values(values: &[DataValue]) -> Vec<u8> {
    let mut encoder = ValueEncoder::with_capacity(values.len() * 9 + 1);
    encoder.encode_sequence(values);
    encoder.into_bytes()
}

/// A value encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct ValueEncoder {
    buffer: Vec<u8>,
}

impl ValueEncoder {
    /// Create a new encoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &DataValue) {
        match value {
            DataValue::Null => self.buffer.put_u8(0xf6),
            DataValue::Bool(b) => self.buffer.put_u8(if *b { 0xf5 } else { 0xf4 }),
            DataValue::Integer(n) => self.encode_integer(*n),
            DataValue::Float(f) => {
                self.buffer.put_u8(0xfb);
                self.buffer.put_f64(*f);
            }
            DataValue::Timestamp(t) => {
                self.encode_header(6, TIMESTAMP_TAG);
                self.encode_integer(*t);
            }
            DataValue::Text(s) => {
                self.encode_header(3, s.len() as u64);
                self.buffer.put_slice(s.as_bytes());
            }
            DataValue::Bytes(b) => {
                self.encode_header(2, b.len() as u64);
                self.buffer.put_slice(b);
            }
        }
    }

    /// Encode a definite-length sequence of values.
    pub fn encode_sequence(&mut self, values: &[DataValue]) {
        self.encode_header(4, values.len() as u64);
        for value in values {
            self.encode(value);
        }
    }

    /// Consume this encoder and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_header(0, n as u64);
        } else {
            // -1 encodes as argument 0, -2 as 1, ...
            self.encode_header(1, (-(n + 1)) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_header(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.put_u8(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.put_u8(mt | 24);
            self.buffer.put_u8(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.put_u8(mt | 25);
            self.buffer.put_u16(value as u16);
        } else if u32::try_from(value).is_ok() {
            self.buffer.put_u8(mt | 26);
            self.buffer.put_u32(value as u32);
        } else {
            self.buffer.put_u8(mt | 27);
            self.buffer.put_u64(value);
        }
    }
}
