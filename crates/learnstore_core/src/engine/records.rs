//! Record reads and writes.

use super::state::CollectionState;
use super::Engine;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexKey;
use crate::journal::JournalOp;
use crate::query::{Direction, IndexFilter, QueryOptions};
use crate::types::{IntoRecord, Record};
use serde_json::Value;
use std::ops::Bound;

impl Engine {
    /// Point lookup. Returns `None` when the id is absent.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if the collection was never declared.
    pub fn get(&self, collection: &str, id: &str) -> CoreResult<Option<Record>> {
        self.read(|state| {
            let records = &state.collection(collection)?.records;
            self.metrics.record_read();
            Ok(records.get(id).cloned())
        })
    }

    /// Returns every record, or the records matching an index filter, in id
    /// order, optionally capped at `limit`.
    pub fn get_all(
        &self,
        collection: &str,
        filter: Option<&IndexFilter>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Record>> {
        self.read(|state| {
            let col = state.collection(collection)?;
            let limit = limit.unwrap_or(usize::MAX);
            match filter {
                Some(filter) => {
                    let ids = self.matching_ids(col, filter)?;
                    Ok(resolve(col, ids.iter().take(limit)))
                }
                None => {
                    self.metrics.record_scan();
                    Ok(col.records.values().take(limit).cloned().collect())
                }
            }
        })
    }

    /// Equality lookup on a declared index.
    ///
    /// Composite indexes take an array holding one value per field.
    ///
    /// # Errors
    ///
    /// `IndexNotFound` if the index is not declared on the collection.
    pub fn get_all_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> CoreResult<Vec<Record>> {
        self.get_all(collection, Some(&IndexFilter::new(index, value.clone())), None)
    }

    /// Ordered scan over an index (or over ids), bounded by a key range and
    /// optionally capped.
    pub fn query(&self, collection: &str, options: &QueryOptions) -> CoreResult<Vec<Record>> {
        let (lower, upper) = options.range.to_keys()?;
        let limit = options.limit.unwrap_or(usize::MAX);

        self.read(|state| {
            let col = state.collection(collection)?;
            match &options.index {
                Some(name) => {
                    let index = col.index(name)?;
                    self.metrics.record_index_lookup();
                    let ids = index.range(lower.as_ref(), upper.as_ref(), options.direction);
                    Ok(resolve(col, ids.iter().take(limit)))
                }
                None => {
                    self.metrics.record_scan();
                    let in_range = |id: &&String| {
                        let key = IndexKey::Text((*id).clone());
                        lower_ok(&lower, &key) && upper_ok(&upper, &key)
                    };
                    let ids: Vec<&String> = match options.direction {
                        Direction::Ascending => {
                            col.records.keys().filter(in_range).take(limit).collect()
                        }
                        Direction::Descending => {
                            col.records.keys().rev().filter(in_range).take(limit).collect()
                        }
                    };
                    Ok(resolve(col, ids.into_iter()))
                }
            }
        })
    }

    /// Counts every record, or the records matching an index filter.
    pub fn count(&self, collection: &str, filter: Option<&IndexFilter>) -> CoreResult<usize> {
        self.read(|state| {
            let col = state.collection(collection)?;
            match filter {
                Some(filter) => Ok(self.matching_ids(col, filter)?.len()),
                None => Ok(col.records.len()),
            }
        })
    }

    /// Inserts a record. Returns its id.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if a record with the same id exists, `MissingId` if the
    /// record has no string id, `UniqueConstraint` on a unique index clash.
    pub fn add(&self, collection: &str, record: impl IntoRecord) -> CoreResult<String> {
        let (id, record) = with_id(collection, record.into_record()?)?;
        self.write(|state| {
            let col = state.collection(collection)?;
            if col.records.contains_key(&id) {
                return Err(CoreError::duplicate_key(collection, id.as_str()));
            }
            col.check_unique(std::slice::from_ref(&(id.clone(), record.clone())))?;
            state.commit(JournalOp::Put {
                collection: collection.to_string(),
                record,
            })?;
            self.metrics.record_writes(1);
            tracing::debug!(collection, id = %id, "record added");
            Ok(id)
        })
    }

    /// Inserts or replaces a record. Returns its id.
    pub fn put(&self, collection: &str, record: impl IntoRecord) -> CoreResult<String> {
        let (id, record) = with_id(collection, record.into_record()?)?;
        self.write(|state| {
            let col = state.collection(collection)?;
            col.check_unique(std::slice::from_ref(&(id.clone(), record.clone())))?;
            state.commit(JournalOp::Put {
                collection: collection.to_string(),
                record,
            })?;
            self.metrics.record_writes(1);
            tracing::debug!(collection, id = %id, "record put");
            Ok(id)
        })
    }

    /// Deletes a record. Returns whether it existed.
    pub fn delete(&self, collection: &str, id: &str) -> CoreResult<bool> {
        self.write(|state| {
            if !state.collection(collection)?.records.contains_key(id) {
                return Ok(false);
            }
            state.commit(JournalOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
            self.metrics.record_deletes(1);
            tracing::debug!(collection, id, "record deleted");
            Ok(true)
        })
    }

    /// Removes every record of a collection. Returns how many there were.
    pub fn clear(&self, collection: &str) -> CoreResult<usize> {
        self.write(|state| {
            let removed = state.collection(collection)?.records.len();
            if removed > 0 {
                state.commit(JournalOp::Clear {
                    collection: collection.to_string(),
                })?;
                self.metrics.record_deletes(removed as u64);
            }
            tracing::debug!(collection, removed, "collection cleared");
            Ok(removed)
        })
    }

    /// Inserts or replaces several records as one atomic write.
    ///
    /// The whole batch is validated before anything is written; on error
    /// nothing is stored. Returns the number of records written.
    pub fn batch_put<I, R>(&self, collection: &str, records: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        let records = keyed(collection, records)?;
        self.commit_puts(collection, records, false, None)
    }

    /// Replaces the whole content of a collection with `records` in one
    /// atomic write.
    ///
    /// Uniqueness is judged against the new content only. On error the
    /// existing records are left untouched.
    pub fn replace_collection<I, R>(&self, collection: &str, records: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        let records = keyed(collection, records)?;
        self.commit_puts(collection, records, true, None)
    }

    /// Like [`batch_put`](Self::batch_put), with a cache entry stored in the
    /// same write. The entry never expires.
    pub fn batch_put_with_cache<I, R>(
        &self,
        collection: &str,
        records: I,
        key: &str,
        value: Value,
    ) -> CoreResult<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoRecord,
    {
        let records = keyed(collection, records)?;
        let entry = JournalOp::CacheSet {
            key: key.to_string(),
            value,
            expires_at: None,
        };
        self.commit_puts(collection, records, false, Some(entry))
    }

    fn commit_puts(
        &self,
        collection: &str,
        records: Vec<(String, Record)>,
        replace: bool,
        trailer: Option<JournalOp>,
    ) -> CoreResult<usize> {
        self.write(|state| {
            let col = state.collection(collection)?;
            let cleared = if replace {
                CollectionState::new(col.schema.clone()).check_unique(&records)?;
                col.records.len()
            } else {
                col.check_unique(&records)?;
                0
            };
            let written = records.len();

            let mut ops = Vec::with_capacity(written + 2);
            if cleared > 0 {
                ops.push(JournalOp::Clear {
                    collection: collection.to_string(),
                });
            }
            ops.extend(records.into_iter().map(|(_, record)| JournalOp::Put {
                collection: collection.to_string(),
                record,
            }));
            ops.extend(trailer);
            if ops.is_empty() {
                return Ok(0);
            }

            state.commit(JournalOp::Batch { ops })?;
            self.metrics.record_writes(written as u64);
            if cleared > 0 {
                self.metrics.record_deletes(cleared as u64);
            }
            self.metrics.record_batch();
            tracing::debug!(collection, written, cleared, "batch put");
            Ok(written)
        })
    }

    /// Deletes several records as one atomic write. Ids that do not exist
    /// are skipped. Returns the number of records deleted.
    pub fn batch_delete<I, S>(&self, collection: &str, ids: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write(|state| {
            let col = state.collection(collection)?;
            let mut targets: Vec<String> = Vec::new();
            for id in ids {
                let id = id.as_ref();
                if col.records.contains_key(id) && !targets.iter().any(|t| t == id) {
                    targets.push(id.to_string());
                }
            }
            let deleted = targets.len();
            if deleted == 0 {
                return Ok(0);
            }
            let ops = targets
                .into_iter()
                .map(|id| JournalOp::Delete {
                    collection: collection.to_string(),
                    id,
                })
                .collect();
            state.commit(JournalOp::Batch { ops })?;
            self.metrics.record_deletes(deleted as u64);
            self.metrics.record_batch();
            tracing::debug!(collection, deleted, "batch delete");
            Ok(deleted)
        })
    }

    fn matching_ids(&self, col: &CollectionState, filter: &IndexFilter) -> CoreResult<Vec<String>> {
        let index = col.index(&filter.index)?;
        self.metrics.record_index_lookup();
        Ok(IndexKey::from_json(&filter.value)
            .map(|key| index.lookup(&key))
            .unwrap_or_default())
    }
}

fn keyed<I, R>(collection: &str, records: I) -> CoreResult<Vec<(String, Record)>>
where
    I: IntoIterator<Item = R>,
    R: IntoRecord,
{
    records
        .into_iter()
        .map(|r| with_id(collection, r.into_record()?))
        .collect()
}

fn with_id(collection: &str, record: Record) -> CoreResult<(String, Record)> {
    match record.id() {
        Some(id) => Ok((id.to_string(), record)),
        None => Err(CoreError::MissingId {
            collection: collection.to_string(),
        }),
    }
}

fn resolve<'a>(col: &CollectionState, ids: impl Iterator<Item = &'a String>) -> Vec<Record> {
    ids.filter_map(|id| col.records.get(id).cloned()).collect()
}

fn lower_ok(bound: &Bound<IndexKey>, key: &IndexKey) -> bool {
    match bound {
        Bound::Included(lo) => key >= lo,
        Bound::Excluded(lo) => key > lo,
        Bound::Unbounded => true,
    }
}

fn upper_ok(bound: &Bound<IndexKey>, key: &IndexKey) -> bool {
    match bound {
        Bound::Included(hi) => key <= hi,
        Bound::Excluded(hi) => key < hi,
        Bound::Unbounded => true,
    }
}
