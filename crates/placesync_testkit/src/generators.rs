//! Property-based test generators using proptest.
//!
//! Provides strategies for generating source identifiers, records and
//! load batches that keep the invariants the engine relies on.

use placesync_model::{Properties, Record, RemoteId};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for source identifiers as they appear in CSV `id` columns.
pub fn source_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,6}").expect("Invalid regex")
}

/// Strategy for scalar property values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::string::string_regex("[a-zA-Z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

/// Strategy for property maps. Never produces `url` or `id` keys.
pub fn properties_strategy() -> impl Strategy<Value = Properties> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z_]{1,8}")
            .expect("Invalid regex")
            .prop_filter("reserved key", |k| k != "url" && k != "id"),
        scalar_strategy(),
        0..5,
    )
    .prop_map(|map| map.into_iter().collect())
}

/// Strategy for records, a mix of synced and unsynced.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (
        prop::option::of(1i64..10_000),
        properties_strategy(),
        prop::option::of(source_id_strategy()),
    )
        .prop_map(|(id, properties, source_id)| {
            let mut record = Record::new(None, properties);
            record.source_identifier = source_id;
            if let Some(id) = id {
                record.mark_synced(RemoteId::Int(id), format!("https://x/places/{}", id));
            }
            record
        })
}

/// Strategy for a batch of records.
pub fn record_batch_strategy(
    min: usize,
    max: usize,
) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_strategy(), min..max)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
