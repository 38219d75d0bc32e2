//! Composite index keys.
//!
//! A [`CompositeKey`] is an ordered tuple of [`DataValue`]s and the only key
//! type any index in this crate stores. Keys compare lexicographically,
//! component by component; on a common prefix the shorter key sorts first.
//! That last rule is what lets a secondary index probe with just the
//! indexed-column prefix of its `(index columns ++ primary key)` entries.

use crate::error::CoreResult;
use ridgedb_codec::{decode_values, encode_value, encode_values, DataValue};
use std::fmt;

/// An immutable ordered tuple of values.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey(Vec<DataValue>);

impl CompositeKey {
    /// Creates a key from its components.
    #[must_use]
    pub fn new(values: Vec<DataValue>) -> Self {
        Self(values)
    }

    /// Creates a key by cloning a slice of values.
    #[must_use]
    pub fn from_slice(values: &[DataValue]) -> Self {
        Self(values.to_vec())
    }

    /// Returns the key components.
    #[must_use]
    pub fn values(&self) -> &[DataValue] {
        &self.0
    }

    /// Consumes the key and returns its components.
    #[must_use]
    pub fn into_values(self) -> Vec<DataValue> {
        self.0
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the zero-component key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the first components of `self` equal `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &CompositeKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns `self ++ suffix`.
    #[must_use]
    pub fn concat(&self, suffix: &CompositeKey) -> CompositeKey {
        let mut values = Vec::with_capacity(self.len() + suffix.len());
        values.extend_from_slice(&self.0);
        values.extend_from_slice(&suffix.0);
        Self(values)
    }

    /// Returns the key made of the components from `start` onwards.
    #[must_use]
    pub fn suffix_from(&self, start: usize) -> CompositeKey {
        Self(self.0.get(start..).map(<[DataValue]>::to_vec).unwrap_or_default())
    }

    /// Returns the key made of the first `len` components.
    #[must_use]
    pub fn prefix(&self, len: usize) -> CompositeKey {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// Returns true if any component is `NULL`.
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.0.iter().any(DataValue::is_null)
    }

    /// Serializes the key.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_values(&self.0)
    }

    /// Deserializes a key produced by [`CompositeKey::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes are not a single value sequence.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(Self(decode_values(bytes)?))
    }

    /// Order-insensitive hash over all components.
    ///
    /// Each component is hashed over its encoded bytes; the component hashes
    /// are then folded with XOR and a wrapping multiply-add, both of which
    /// commute, and the result is finalized so the low-order bits used by a
    /// hash directory are well mixed.
    #[must_use]
    pub fn hash_code(&self) -> u64 {
        const MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

        let mut xor_acc = 0u64;
        let mut sum_acc = 0u64;
        for value in &self.0 {
            let h = fnv1a(&encode_value(value));
            xor_acc ^= h;
            sum_acc = sum_acc.wrapping_add(h.wrapping_mul(MULTIPLIER));
        }
        finalize(xor_acc ^ sum_acc.rotate_left(29) ^ self.0.len() as u64)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

fn finalize(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl From<Vec<DataValue>> for CompositeKey {
    fn from(values: Vec<DataValue>) -> Self {
        Self(values)
    }
}

impl From<DataValue> for CompositeKey {
    fn from(value: DataValue) -> Self {
        Self(vec![value])
    }
}

impl From<i64> for CompositeKey {
    fn from(n: i64) -> Self {
        Self(vec![DataValue::Integer(n)])
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(values: &[i64]) -> CompositeKey {
        CompositeKey::new(values.iter().copied().map(DataValue::Integer).collect())
    }

    #[test]
    fn lexicographic_ordering() {
        assert!(key(&[1, 9]) < key(&[2, 0]));
        assert!(key(&[1, 2]) < key(&[1, 3]));
        assert_eq!(key(&[4, 4]), key(&[4, 4]));
    }

    #[test]
    fn shorter_prefix_sorts_first() {
        assert!(key(&[1]) < key(&[1, i64::MIN]));
        assert!(key(&[]) < key(&[i64::MIN]));
        assert_ne!(key(&[1]), key(&[1, 0]));
    }

    #[test]
    fn starts_with_and_concat() {
        let idx = key(&[7]);
        let pk = key(&[100, 200]);
        let full = idx.concat(&pk);
        assert_eq!(full, key(&[7, 100, 200]));
        assert!(full.starts_with(&idx));
        assert!(!full.starts_with(&key(&[8])));
        assert_eq!(full.suffix_from(1), pk);
        assert_eq!(full.prefix(1), idx);
        assert_eq!(full.suffix_from(9), key(&[]));
    }

    #[test]
    fn has_null_detects_null_component() {
        let k = CompositeKey::new(vec![DataValue::Integer(1), DataValue::Null]);
        assert!(k.has_null());
        assert!(!key(&[1]).has_null());
    }

    #[test]
    fn hash_code_ignores_component_order() {
        let a = CompositeKey::new(vec![DataValue::from("x"), DataValue::Integer(3)]);
        let b = CompositeKey::new(vec![DataValue::Integer(3), DataValue::from("x")]);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(a.hash_code(), key(&[3]).hash_code());
    }

    #[test]
    fn display_renders_tuple() {
        let k = CompositeKey::new(vec![DataValue::Integer(1), DataValue::from("a")]);
        assert_eq!(k.to_string(), "(1, 'a')");
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(CompositeKey::from_bytes(&[0x01]).is_err());
    }

    proptest! {
        #[test]
        fn key_bytes_roundtrip(values in prop::collection::vec(any::<i64>(), 0..6), text in "[a-z]{0,8}") {
            let mut components: Vec<DataValue> = values.into_iter().map(DataValue::Integer).collect();
            components.push(DataValue::Text(text));
            let k = CompositeKey::new(components);
            prop_assert_eq!(CompositeKey::from_bytes(&k.to_bytes()).unwrap(), k);
        }

        #[test]
        fn ordering_matches_component_ordering(a in any::<(i64, i64)>(), b in any::<(i64, i64)>()) {
            let ka = key(&[a.0, a.1]);
            let kb = key(&[b.0, b.1]);
            prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
        }
    }
}
