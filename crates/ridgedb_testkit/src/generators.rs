//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random keys and rows that satisfy the
//! schemas in [`crate::fixtures`].

use crate::fixtures::user_row;
use proptest::prelude::*;
use ridgedb_codec::DataValue;
use ridgedb_core::{CompositeKey, Row};
use std::collections::BTreeSet;

/// Strategy for generating any column value, including NULL.
pub fn data_value_strategy() -> impl Strategy<Value = DataValue> {
    prop_oneof![
        Just(DataValue::Null),
        any::<bool>().prop_map(DataValue::Bool),
        any::<i64>().prop_map(DataValue::Integer),
        (-1.0e9f64..1.0e9).prop_map(DataValue::Float),
        any::<i64>().prop_map(DataValue::Timestamp),
        "[a-z0-9 ]{0,16}".prop_map(DataValue::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(DataValue::Bytes),
    ]
}

/// Strategy for generating composite keys of `width` components.
pub fn composite_key_strategy(width: usize) -> impl Strategy<Value = CompositeKey> {
    prop::collection::vec(data_value_strategy(), width).prop_map(CompositeKey::new)
}

/// Strategy for generating single-integer keys.
pub fn integer_key_strategy() -> impl Strategy<Value = CompositeKey> {
    any::<i64>().prop_map(CompositeKey::from)
}

/// Strategy for generating up to `max` distinct primary key ids.
pub fn distinct_ids_strategy(max: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::btree_set(-10_000i64..10_000, 0..max)
        .prop_map(|ids: BTreeSet<i64>| ids.into_iter().collect())
}

/// Strategy for generating a city name from a small pool, so secondary
/// index keys repeat.
pub fn city_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["oslo", "bergen", "tromso", "lima", "quito"])
        .prop_map(str::to_string)
}

/// Strategy for generating `users` rows with distinct ids.
pub fn user_rows_strategy(max: usize) -> impl Strategy<Value = Vec<Row>> {
    distinct_ids_strategy(max).prop_flat_map(|ids| {
        let len = ids.len();
        (
            Just(ids),
            prop::collection::vec(city_strategy(), len),
            prop::collection::vec(prop::option::of("[a-z]{1,8}"), len),
        )
            .prop_map(|(ids, cities, emails)| {
                ids.into_iter()
                    .zip(cities)
                    .zip(emails)
                    .map(|((id, city), email)| {
                        let email = email.map(|local| format!("{local}{id}@example.com"));
                        user_row(id, &format!("user{id}"), &city, email.as_deref())
                    })
                    .collect()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::users_schema;

    proptest! {
        #[test]
        fn keys_have_requested_width(key in composite_key_strategy(3)) {
            prop_assert_eq!(key.len(), 3);
        }

        #[test]
        fn ids_are_sorted_and_distinct(ids in distinct_ids_strategy(50)) {
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn user_rows_validate(rows in user_rows_strategy(20)) {
            let schema = users_schema();
            for row in &rows {
                prop_assert!(row.validate(&schema).is_ok());
            }
        }
    }
}
