//! Typed column values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// `BOOLEAN`
    Bool,
    /// `BIGINT` and narrower integer types.
    Integer,
    /// `DOUBLE`
    Float,
    /// `TIMESTAMP` (microseconds since the epoch).
    Timestamp,
    /// `VARCHAR` / `TEXT`
    Text,
    /// `VARBINARY` / `BLOB`
    Bytes,
}

impl DataType {
    /// Returns true for types a full-text index can tokenize.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, DataType::Text)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "BOOLEAN",
            DataType::Integer => "BIGINT",
            DataType::Float => "DOUBLE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Text => "TEXT",
            DataType::Bytes => "BLOB",
        };
        f.write_str(name)
    }
}

/// A single typed value.
///
/// Values are totally ordered: first by type rank
/// (`Null < Bool < Integer < Float < Timestamp < Text < Bytes`), then by
/// content. Floats compare with IEEE-754 `totalOrder`, so equality, ordering
/// and hashing always agree.
#[derive(Debug, Clone)]
pub enum DataValue {
    /// SQL `NULL`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl DataValue {
    fn type_rank(&self) -> u8 {
        match self {
            DataValue::Null => 0,
            DataValue::Bool(_) => 1,
            DataValue::Integer(_) => 2,
            DataValue::Float(_) => 3,
            DataValue::Timestamp(_) => 4,
            DataValue::Text(_) => 5,
            DataValue::Bytes(_) => 6,
        }
    }

    /// Returns the column type this value inhabits, or `None` for `NULL`.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            DataValue::Null => None,
            DataValue::Bool(_) => Some(DataType::Bool),
            DataValue::Integer(_) => Some(DataType::Integer),
            DataValue::Float(_) => Some(DataType::Float),
            DataValue::Timestamp(_) => Some(DataType::Timestamp),
            DataValue::Text(_) => Some(DataType::Text),
            DataValue::Bytes(_) => Some(DataType::Bytes),
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DataValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DataValue {}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Ordering::Equal,
            (DataValue::Bool(a), DataValue::Bool(b)) => a.cmp(b),
            (DataValue::Integer(a), DataValue::Integer(b)) => a.cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.total_cmp(b),
            (DataValue::Timestamp(a), DataValue::Timestamp(b)) => a.cmp(b),
            (DataValue::Text(a), DataValue::Text(b)) => a.cmp(b),
            (DataValue::Bytes(a), DataValue::Bytes(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            DataValue::Null => {}
            DataValue::Bool(b) => b.hash(state),
            DataValue::Integer(n) | DataValue::Timestamp(n) => n.hash(state),
            DataValue::Float(f) => f.to_bits().hash(state),
            DataValue::Text(s) => s.hash(state),
            DataValue::Bytes(b) => b.hash(state),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => f.write_str("NULL"),
            DataValue::Bool(b) => write!(f, "{b}"),
            DataValue::Integer(n) => write!(f, "{n}"),
            DataValue::Float(n) => write!(f, "{n}"),
            DataValue::Timestamp(t) => write!(f, "ts:{t}"),
            DataValue::Text(s) => write!(f, "'{s}'"),
            DataValue::Bytes(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<i64> for DataValue {
    fn from(n: i64) -> Self {
        DataValue::Integer(n)
    }
}

impl From<i32> for DataValue {
    fn from(n: i32) -> Self {
        DataValue::Integer(i64::from(n))
    }
}

impl From<u32> for DataValue {
    fn from(n: u32) -> Self {
        DataValue::Integer(i64::from(n))
    }
}

impl From<f64> for DataValue {
    fn from(n: f64) -> Self {
        DataValue::Float(n)
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::Text(s)
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for DataValue {
    fn from(b: Vec<u8>) -> Self {
        DataValue::Bytes(b)
    }
}

impl<T: Into<DataValue>> From<Option<T>> for DataValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(DataValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &DataValue) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn type_rank_orders_across_types() {
        let mut values = vec![
            DataValue::Bytes(vec![0]),
            DataValue::Text("a".into()),
            DataValue::Timestamp(0),
            DataValue::Float(0.0),
            DataValue::Integer(i64::MAX),
            DataValue::Bool(true),
            DataValue::Null,
        ];
        values.sort();
        assert_eq!(values[0], DataValue::Null);
        assert_eq!(values[1], DataValue::Bool(true));
        assert_eq!(values[2], DataValue::Integer(i64::MAX));
        assert_eq!(values[6], DataValue::Bytes(vec![0]));
    }

    #[test]
    fn integers_order_numerically() {
        let mut values: Vec<DataValue> = [5, -3, 0, 100, -100].into_iter().map(DataValue::from).collect();
        values.sort();
        let sorted: Vec<i64> = values.iter().filter_map(DataValue::as_integer).collect();
        assert_eq!(sorted, vec![-100, -3, 0, 5, 100]);
    }

    #[test]
    fn float_equality_matches_hash() {
        let a = DataValue::Float(f64::NAN);
        let b = DataValue::Float(f64::NAN);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(DataValue::Float(0.0), DataValue::Float(-0.0));
    }

    #[test]
    fn integer_and_timestamp_are_distinct() {
        assert_ne!(DataValue::Integer(5), DataValue::Timestamp(5));
        assert!(DataValue::Integer(5) < DataValue::Timestamp(5));
    }

    #[test]
    fn value_accessors() {
        assert!(DataValue::Null.is_null());
        assert_eq!(DataValue::Bool(true).as_bool(), Some(true));
        assert_eq!(DataValue::Integer(42).as_integer(), Some(42));
        assert_eq!(DataValue::Text("42".into()).as_integer(), None);
        assert_eq!(DataValue::Text("hi".into()).as_text(), Some("hi"));
        assert_eq!(DataValue::Bytes(vec![1, 2]).as_bytes(), Some(&[1, 2][..]));
        assert_eq!(DataValue::Float(1.5).as_float(), Some(1.5));
    }

    #[test]
    fn data_type_of_values() {
        assert_eq!(DataValue::Null.data_type(), None);
        assert_eq!(DataValue::from("x").data_type(), Some(DataType::Text));
        assert!(DataType::Text.is_textual());
        assert!(!DataType::Integer.is_textual());
    }

    #[test]
    fn from_impls() {
        assert_eq!(DataValue::from(42i32), DataValue::Integer(42));
        assert_eq!(DataValue::from(None::<i64>), DataValue::Null);
        assert_eq!(DataValue::from(Some("a")), DataValue::Text("a".into()));
    }

    #[test]
    fn display_formats() {
        assert_eq!(DataValue::Null.to_string(), "NULL");
        assert_eq!(DataValue::from("bob").to_string(), "'bob'");
        assert_eq!(DataValue::Bytes(vec![0xab, 0x01]).to_string(), "x'ab01'");
    }
}
