//! Ordered secondary index over record ids.

use crate::index::IndexKey;
use crate::query::Direction;
use crate::schema::{IndexDefinition, KeyPath};
use crate::types::Record;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// One declared index: an ordered map from key to the ids that hold it.
///
/// Supports equality lookups, ordered scans in either direction and
/// bounded range scans. Uniqueness is not enforced here; writers check a
/// whole batch against the unique indexes of its collection first.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    definition: IndexDefinition,
    entries: BTreeMap<IndexKey, BTreeSet<String>>,
    len: usize,
}

impl SecondaryIndex {
    /// Creates an empty index for `definition`.
    #[must_use]
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    /// Returns the declaration this index was built from.
    #[must_use]
    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Extracts this index's key from a record.
    ///
    /// Returns `None` when any component is missing or not indexable.
    #[must_use]
    pub fn key_for(&self, record: &Record) -> Option<IndexKey> {
        match &self.definition.key_path {
            KeyPath::Field(field) => record.get_path(field).and_then(IndexKey::from_json),
            KeyPath::Composite(fields) => fields
                .iter()
                .map(|field| record.get_path(field).and_then(IndexKey::from_json))
                .collect::<Option<Vec<_>>>()
                .map(IndexKey::Tuple),
        }
    }

    /// Adds `record` under its key, if it has one.
    pub fn index_record(&mut self, id: &str, record: &Record) {
        if let Some(key) = self.key_for(record) {
            self.insert(key, id);
        }
    }

    /// Removes `record` from under its key, if it has one.
    pub fn unindex_record(&mut self, id: &str, record: &Record) {
        if let Some(key) = self.key_for(record) {
            self.remove(&key, id);
        }
    }

    /// Maps `key` to `id`.
    pub fn insert(&mut self, key: IndexKey, id: &str) {
        if self.entries.entry(key).or_default().insert(id.to_string()) {
            self.len += 1;
        }
    }

    /// Removes the `key` to `id` mapping. Returns whether it existed.
    pub fn remove(&mut self, key: &IndexKey, id: &str) -> bool {
        let Some(ids) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = ids.remove(id);
        if removed {
            self.len -= 1;
        }
        if ids.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Returns the ids holding exactly `key`, in id order.
    #[must_use]
    pub fn lookup(&self, key: &IndexKey) -> Vec<String> {
        self.entries
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns ids whose key lies within the bounds, ordered by key and
    /// then by id, in the requested direction.
    ///
    /// An empty or inverted range yields no ids.
    #[must_use]
    pub fn range(
        &self,
        lower: Bound<&IndexKey>,
        upper: Bound<&IndexKey>,
        direction: Direction,
    ) -> Vec<String> {
        if is_empty_range(lower, upper) {
            return Vec::new();
        }

        let range = self.entries.range::<IndexKey, _>((lower, upper));
        match direction {
            Direction::Ascending => range.flat_map(|(_, ids)| ids.iter().cloned()).collect(),
            Direction::Descending => range
                .rev()
                .flat_map(|(_, ids)| ids.iter().rev().cloned())
                .collect(),
        }
    }

    /// Returns every indexed id in key order.
    #[must_use]
    pub fn scan(&self, direction: Direction) -> Vec<String> {
        self.range(Bound::Unbounded, Bound::Unbounded, direction)
    }

    /// Returns the number of key to id mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every mapping.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
    }
}

/// `BTreeMap::range` panics on inverted bounds, so they are filtered first.
fn is_empty_range(lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    fn key(value: serde_json::Value) -> IndexKey {
        IndexKey::from_json(&value).unwrap()
    }

    #[test]
    fn records_without_the_field_are_skipped() {
        let mut index = SecondaryIndex::new(IndexDefinition::field("userId", "userId"));
        index.index_record("p1", &record(json!({"id": "p1", "userId": "u1"})));
        index.index_record("p2", &record(json!({"id": "p2"})));
        index.index_record("p3", &record(json!({"id": "p3", "userId": null})));

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(&key(json!("u1"))), vec!["p1"]);
    }

    #[test]
    fn composite_keys_need_every_component() {
        let mut index = SecondaryIndex::new(IndexDefinition::composite(
            "userLesson",
            ["userId", "lessonId"],
        ));
        index.index_record("p1", &record(json!({"userId": "u1", "lessonId": "l1"})));
        index.index_record("p2", &record(json!({"userId": "u1", "lessonId": "l2"})));
        index.index_record("p3", &record(json!({"userId": "u1"})));

        assert_eq!(index.lookup(&key(json!(["u1", "l1"]))), vec!["p1"]);
        assert!(index.lookup(&key(json!(["u1"]))).is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn remove_drops_empty_buckets() {
        let mut index = SecondaryIndex::new(IndexDefinition::field("lang", "language"));
        index.insert(key(json!("rust")), "a");
        assert!(index.remove(&key(json!("rust")), "a"));
        assert!(!index.remove(&key(json!("rust")), "a"));
        assert!(index.is_empty());
        assert!(index.scan(Direction::Ascending).is_empty());
    }

    #[test]
    fn ranges_respect_bounds_and_direction() {
        let mut index = SecondaryIndex::new(IndexDefinition::field("score", "score"));
        for (id, score) in [("a", 10), ("b", 20), ("c", 30), ("d", 20)] {
            index.insert(key(json!(score)), id);
        }

        let lo = key(json!(20));
        let hi = key(json!(30));
        assert_eq!(
            index.range(Bound::Included(&lo), Bound::Excluded(&hi), Direction::Ascending),
            vec!["b", "d"]
        );
        assert_eq!(
            index.range(Bound::Included(&lo), Bound::Unbounded, Direction::Descending),
            vec!["c", "d", "b"]
        );
        assert!(index
            .range(Bound::Included(&hi), Bound::Included(&lo), Direction::Ascending)
            .is_empty());
        assert!(index
            .range(Bound::Excluded(&lo), Bound::Excluded(&lo), Direction::Ascending)
            .is_empty());
    }
}
