//! # RidgeDB Codec
//!
//! Typed column values and their stable byte encoding.
//!
//! [`DataValue`] is the unit every row column and every index key component
//! is made of. It carries a total order (used for key comparison) and a
//! deterministic byte encoding (used for on-page storage).
//!
//! ## Encoding
//!
//! Values are encoded as a subset of CBOR:
//! - integers use the shortest header form (major types 0 and 1)
//! - byte and text strings use major types 2 and 3
//! - sequences (rows, composite keys) are definite-length arrays (major type 4)
//! - timestamps are tag 1 wrapping an integer of microseconds
//! - null, booleans and 64-bit floats use major type 7
//!
//! ## Usage
//!
//! ```
//! use ridgedb_codec::{decode_values, encode_values, DataValue};
//!
//! let row = vec![DataValue::Integer(7), DataValue::from("seven")];
//! let bytes = encode_values(&row);
//! assert_eq!(decode_values(&bytes).unwrap(), row);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode_value, decode_values, ValueDecoder};
pub use encoder::{encode_value, encode_values, ValueEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{DataType, DataValue};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = DataValue> {
        prop_oneof![
            Just(DataValue::Null),
            any::<bool>().prop_map(DataValue::Bool),
            any::<i64>().prop_map(DataValue::Integer),
            any::<f64>().prop_map(DataValue::Float),
            any::<i64>().prop_map(DataValue::Timestamp),
            ".{0,24}".prop_map(DataValue::Text),
            prop::collection::vec(any::<u8>(), 0..32).prop_map(DataValue::Bytes),
        ]
    }

    #[test]
    fn roundtrip_mixed_row() {
        let row = vec![
            DataValue::Integer(-100),
            DataValue::Text("hello world".to_string()),
            DataValue::Null,
            DataValue::Float(2.5),
            DataValue::Timestamp(1_700_000_000_000_000),
            DataValue::Bool(true),
            DataValue::Bytes(vec![1, 2, 3]),
        ];
        let bytes = encode_values(&row);
        assert_eq!(decode_values(&bytes).unwrap(), row);
    }

    #[test]
    fn roundtrip_empty_sequence() {
        let bytes = encode_values(&[]);
        assert_eq!(bytes, vec![0x80]);
        assert!(decode_values(&bytes).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn sequence_roundtrip_is_lossless(values in prop::collection::vec(value_strategy(), 0..8)) {
            let bytes = encode_values(&values);
            let decoded = decode_values(&bytes).unwrap();
            prop_assert_eq!(decoded, values);
        }

        #[test]
        fn single_value_roundtrip_is_lossless(value in value_strategy()) {
            let bytes = encode_value(&value);
            prop_assert_eq!(decode_value(&bytes).unwrap(), value);
        }
    }
}
