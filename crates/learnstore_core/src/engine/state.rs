//! In-memory image of an open store.

use crate::dir::StoreDir;
use crate::engine::cache::CacheEntry;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexKey, SecondaryIndex};
use crate::journal::{Journal, JournalOp};
use crate::manifest::Manifest;
use crate::schema::CollectionSchema;
use crate::types::Record;
use std::collections::{BTreeMap, BTreeSet};

/// Records and indexes of one collection.
#[derive(Debug)]
pub(crate) struct CollectionState {
    pub(crate) schema: CollectionSchema,
    pub(crate) records: BTreeMap<String, Record>,
    pub(crate) indexes: BTreeMap<String, SecondaryIndex>,
}

impl CollectionState {
    pub(crate) fn new(schema: CollectionSchema) -> Self {
        let indexes = schema
            .indexes
            .iter()
            .map(|def| (def.name.clone(), SecondaryIndex::new(def.clone())))
            .collect();
        Self {
            schema,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// Re-declares the collection, rebuilding every index from the records.
    pub(crate) fn redeclare(&mut self, schema: CollectionSchema) {
        let records = std::mem::take(&mut self.records);
        *self = Self::new(schema);
        for (id, record) in records {
            self.insert(id, record);
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.schema.name
    }

    pub(crate) fn index(&self, name: &str) -> CoreResult<&SecondaryIndex> {
        self.indexes
            .get(name)
            .ok_or_else(|| CoreError::index_not_found(self.name(), name))
    }

    fn insert(&mut self, id: String, record: Record) {
        if let Some(old) = self.records.get(&id) {
            for index in self.indexes.values_mut() {
                index.unindex_record(&id, old);
            }
        }
        for index in self.indexes.values_mut() {
            index.index_record(&id, &record);
        }
        self.records.insert(id, record);
    }

    fn remove(&mut self, id: &str) -> Option<Record> {
        let old = self.records.remove(id)?;
        for index in self.indexes.values_mut() {
            index.unindex_record(id, &old);
        }
        Some(old)
    }

    fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Checks that writing `records` would leave every unique index intact.
    ///
    /// Records later in the slice replace earlier ones with the same id.
    /// Stored holders that the batch itself rewrites are judged by their new
    /// value, not the stored one.
    pub(crate) fn check_unique(&self, records: &[(String, Record)]) -> CoreResult<()> {
        let mut finals: BTreeMap<&str, &Record> = BTreeMap::new();
        for (id, record) in records {
            finals.insert(id.as_str(), record);
        }
        let rewritten: BTreeSet<&str> = finals.keys().copied().collect();

        for index in self.indexes.values() {
            if !index.definition().unique {
                continue;
            }
            let mut claimed: BTreeMap<IndexKey, &str> = BTreeMap::new();
            for (&id, &record) in &finals {
                let Some(key) = index.key_for(record) else {
                    continue;
                };
                let stored = index
                    .lookup(&key)
                    .into_iter()
                    .find(|holder| holder.as_str() != id && !rewritten.contains(holder.as_str()));
                let conflict = stored.is_some()
                    || claimed.get(&key).is_some_and(|&other| other != id);
                if conflict {
                    return Err(CoreError::UniqueConstraint {
                        collection: self.name().to_string(),
                        index: index.name().to_string(),
                        value: key.to_json().to_string(),
                    });
                }
                claimed.insert(key, id);
            }
        }
        Ok(())
    }
}

/// Everything held while the engine is open.
pub(crate) struct OpenState {
    pub(crate) dir: Option<StoreDir>,
    pub(crate) manifest: Manifest,
    pub(crate) journal: Journal,
    pub(crate) collections: BTreeMap<String, CollectionState>,
    pub(crate) cache: BTreeMap<String, CacheEntry>,
}

impl OpenState {
    pub(crate) fn new(dir: Option<StoreDir>, manifest: Manifest, journal: Journal) -> Self {
        Self {
            dir,
            manifest,
            journal,
            collections: BTreeMap::new(),
            cache: BTreeMap::new(),
        }
    }

    pub(crate) fn collection(&self, name: &str) -> CoreResult<&CollectionState> {
        self.collections
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Declares or re-declares a collection.
    pub(crate) fn declare(&mut self, schema: CollectionSchema) {
        match self.collections.get_mut(&schema.name) {
            Some(existing) => existing.redeclare(schema),
            None => {
                self.collections
                    .insert(schema.name.clone(), CollectionState::new(schema));
            }
        }
    }

    /// Appends `op` to the journal, then applies it.
    ///
    /// Callers validate first: once the frame is written the change is
    /// durable and applying it cannot fail.
    pub(crate) fn commit(&mut self, op: JournalOp) -> CoreResult<()> {
        self.journal.append(&op)?;
        self.apply(op);
        Ok(())
    }

    /// Applies an operation to the in-memory image.
    ///
    /// Collections missing from the image are created without indexes; that
    /// only happens when replaying data of a collection no longer declared.
    pub(crate) fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::Put { collection, record } => {
                let Some(id) = record.id().map(str::to_string) else {
                    return;
                };
                self.collection_for_apply(collection).insert(id, record);
            }
            JournalOp::Delete { collection, id } => {
                self.collection_for_apply(collection).remove(&id);
            }
            JournalOp::Clear { collection } => {
                self.collection_for_apply(collection).clear();
            }
            JournalOp::Batch { ops } => {
                for op in ops {
                    self.apply(op);
                }
            }
            JournalOp::CacheSet {
                key,
                value,
                expires_at,
            } => {
                self.cache.insert(key, CacheEntry { value, expires_at });
            }
            JournalOp::CacheRemove { key } => {
                self.cache.remove(&key);
            }
        }
    }

    fn collection_for_apply(&mut self, name: String) -> &mut CollectionState {
        self.collections
            .entry(name)
            .or_insert_with_key(|name| CollectionState::new(CollectionSchema::new(name.clone())))
    }

    /// Builds the operations that recreate the current image.
    pub(crate) fn image(&self) -> Vec<JournalOp> {
        let mut ops = Vec::new();
        for state in self.collections.values() {
            if state.records.is_empty() {
                continue;
            }
            ops.push(JournalOp::Batch {
                ops: state
                    .records
                    .values()
                    .map(|record| JournalOp::Put {
                        collection: state.name().to_string(),
                        record: record.clone(),
                    })
                    .collect(),
            });
        }
        for (key, entry) in &self.cache {
            ops.push(JournalOp::CacheSet {
                key: key.clone(),
                value: entry.value.clone(),
                expires_at: entry.expires_at,
            });
        }
        ops
    }

    pub(crate) fn save_manifest(&self) -> CoreResult<()> {
        match &self.dir {
            Some(dir) => dir.save_manifest(&self.manifest),
            None => Ok(()),
        }
    }
}
