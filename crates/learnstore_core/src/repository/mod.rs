//! Typed repositories over engine collections.
//!
//! A [`Repository<T>`] binds one [`Entity`] type to its collection and
//! speaks in typed structs instead of raw records. Every write publishes a
//! [`RepositoryEvent`] on the shared [`EventBus`].
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Arc::new(Engine::in_memory(Config::default()));
//! engine.initialize()?;
//! let repos = Repositories::new(engine, EventBus::new());
//!
//! let user = repos.users.create(User {
//!     email: "ann@example.com".into(),
//!     username: "ann".into(),
//!     ..User::default()
//! })?;
//! assert!(repos.users.find_by_email("ann@example.com")?.is_some());
//! ```

mod events;
mod specialized;

pub use events::{
    EventBus, Operation, Outcome, RepositoryEvent, RepositoryObserver, TracingObserver,
    DEFAULT_HISTORY,
};
pub use specialized::{
    AchievementRepository, ConversationRepository, LessonRepository, PointsRewardRepository,
    PointsTransactionRepository, ProgressRepository, ProjectRepository, Repositories,
    UserPointsRewardRepository, UserPointsStatsRepository, UserRepository,
};

use crate::engine::Engine;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexKey;
use crate::query::Direction;
use crate::types::{new_id, now_iso, Record, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Paging and ordering for [`Repository::find_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Maximum number of entities returned.
    pub limit: Option<usize>,
    /// Entities skipped before the first one returned.
    pub offset: usize,
    /// Field (dotted paths allowed) to sort by. Id order when absent.
    pub order_by: Option<String>,
    /// Sort direction.
    pub direction: Direction,
}

impl FindOptions {
    /// Every entity in id order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the result.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` entities.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sorts by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    /// Largest first.
    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.direction = Direction::Descending;
        self
    }
}

/// One item of a batch that was rejected.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the item in the input.
    pub index: usize,
    /// Id of the item, when it had one.
    pub id: Option<String>,
    /// Why it was rejected.
    pub error: CoreError,
}

/// Per-item outcome of a repository batch.
#[derive(Debug)]
pub struct BatchReport<T> {
    /// Items written, in input order.
    pub succeeded: Vec<T>,
    /// Ids that did not exist (updates and deletes only).
    pub missing: Vec<String>,
    /// Items rejected.
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            missing: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    /// Returns true when no item was rejected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Records a per-item error, or aborts the batch on an engine fault.
    fn reject(&mut self, index: usize, id: Option<String>, error: CoreError) -> CoreResult<()> {
        if error.is_engine_fault() {
            return Err(error);
        }
        self.failed.push(BatchFailure { index, id, error });
        Ok(())
    }
}

/// Typed access to the collection of `T`.
pub struct Repository<T: Entity> {
    engine: Arc<Engine>,
    events: EventBus,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            events: self.events.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.collection())
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Repository<T> {
    /// Creates a repository publishing to `events`.
    pub fn new(engine: Arc<Engine>, events: EventBus) -> Self {
        Self {
            engine,
            events,
            _marker: PhantomData,
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        T::KIND.collection_name()
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Looks up an entity by id.
    pub fn find_by_id(&self, id: &str) -> CoreResult<Option<T>> {
        self.engine
            .get(self.collection(), id)?
            .map(|record| T::from_record(&record))
            .transpose()
    }

    /// Returns a page of entities.
    ///
    /// With `order_by`, records are sorted by that field using index key
    /// order; records lacking the field come after the others when
    /// ascending. Equal keys keep id order when ascending.
    pub fn find_all(&self, options: &FindOptions) -> CoreResult<Vec<T>> {
        let mut records = self.engine.get_all(self.collection(), None, None)?;
        if let Some(field) = &options.order_by {
            records.sort_by_cached_key(|record| {
                let key = record.get_path(field).and_then(IndexKey::from_json);
                (key.is_none(), key)
            });
        }
        if options.direction == Direction::Descending {
            records.reverse();
        }
        records
            .iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(T::from_record)
            .collect()
    }

    /// Equality lookup on a declared index of the collection.
    ///
    /// # Errors
    ///
    /// `IndexNotFound` if `index` is not declared.
    pub fn find_by_index(&self, index: &str, value: impl Into<Value>) -> CoreResult<Vec<T>> {
        self.engine
            .get_all_by_index(self.collection(), index, &value.into())?
            .iter()
            .map(T::from_record)
            .collect()
    }

    /// Returns the first entity an index maps the value to.
    pub fn find_one_by_index(&self, index: &str, value: impl Into<Value>) -> CoreResult<Option<T>> {
        Ok(self.find_by_index(index, value)?.into_iter().next())
    }

    /// Stores a new entity.
    ///
    /// Assigns a fresh id unless one is set, sets `createdAt` unless set and
    /// always sets `updatedAt`. Returns the entity as stored.
    ///
    /// # Errors
    ///
    /// `DuplicateKey` if the id exists, `UniqueConstraint` if a unique index
    /// already holds one of its values.
    pub fn create(&self, entity: T) -> CoreResult<T> {
        let entity = stamp_new(entity);
        let id = entity.id().to_string();
        let result = self.insert(entity);
        self.publish(Operation::Create, vec![id], &result);
        result
    }

    /// Merges a partial object into an existing entity.
    ///
    /// Top-level fields of `patch` replace the stored ones; `id` and
    /// `createdAt` are kept and `updatedAt` is bumped. Returns `Ok(None)`
    /// when the id does not exist. Never creates.
    ///
    /// # Errors
    ///
    /// `Serialization` if the patch is not an object or the merged record no
    /// longer decodes as `T`.
    pub fn update<P: Serialize>(&self, id: &str, patch: &P) -> CoreResult<Option<T>> {
        let result = Record::from_serialize(patch).and_then(|patch| self.merge(id, patch));
        self.publish_found(Operation::Update, id, &result);
        result
    }

    /// Modifies an existing entity in place.
    ///
    /// The closure cannot change the id or `createdAt`. Returns `Ok(None)`
    /// when the id does not exist.
    pub fn update_with(&self, id: &str, f: impl FnOnce(&mut T)) -> CoreResult<Option<T>> {
        let result = self.modify(id, f);
        self.publish_found(Operation::Update, id, &result);
        result
    }

    /// Deletes an entity. Returns false when the id does not exist.
    pub fn delete(&self, id: &str) -> CoreResult<bool> {
        let result = self.engine.delete(self.collection(), id);
        match &result {
            Ok(false) => {}
            Ok(true) => self.events.publish(RepositoryEvent::success(
                self.collection(),
                Operation::Delete,
                vec![id.to_string()],
            )),
            Err(err) => self.events.publish(RepositoryEvent::failure(
                self.collection(),
                Operation::Delete,
                vec![id.to_string()],
                err.to_string(),
            )),
        }
        result
    }

    /// Returns the number of entities.
    pub fn count(&self) -> CoreResult<usize> {
        self.engine.count(self.collection(), None)
    }

    /// Returns true if the id exists.
    pub fn exists(&self, id: &str) -> CoreResult<bool> {
        Ok(self.engine.get(self.collection(), id)?.is_some())
    }

    /// Creates each entity independently.
    ///
    /// Rejected items are reported and the rest are still written. Engine
    /// faults abort the batch with an error; items written before the fault
    /// stay written.
    pub fn batch_create(
        &self,
        entities: impl IntoIterator<Item = T>,
    ) -> CoreResult<BatchReport<T>> {
        let mut report = BatchReport::default();
        let outcome = entities
            .into_iter()
            .enumerate()
            .try_for_each(|(index, entity)| {
                let entity = stamp_new(entity);
                let id = entity.id().to_string();
                match self.insert(entity) {
                    Ok(entity) => {
                        report.succeeded.push(entity);
                        Ok(())
                    }
                    Err(err) => report.reject(index, Some(id), err),
                }
            });
        self.finish_batch(Operation::BatchCreate, &report, outcome, |e| e.id().to_string())?;
        Ok(report)
    }

    /// Applies each `(id, patch)` pair independently.
    ///
    /// Unknown ids are listed in [`BatchReport::missing`].
    pub fn batch_update<P, I>(&self, updates: I) -> CoreResult<BatchReport<T>>
    where
        P: Serialize,
        I: IntoIterator<Item = (String, P)>,
    {
        let mut report = BatchReport::default();
        let outcome = updates
            .into_iter()
            .enumerate()
            .try_for_each(|(index, (id, patch))| {
                let result =
                    Record::from_serialize(&patch).and_then(|patch| self.merge(&id, patch));
                match result {
                    Ok(Some(entity)) => report.succeeded.push(entity),
                    Ok(None) => report.missing.push(id),
                    Err(err) => report.reject(index, Some(id), err)?,
                }
                Ok(())
            });
        self.finish_batch(Operation::BatchUpdate, &report, outcome, |e| e.id().to_string())?;
        Ok(report)
    }

    /// Deletes each id independently. Returns the deleted ids.
    pub fn batch_delete<I, S>(&self, ids: I) -> CoreResult<BatchReport<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = BatchReport::default();
        let outcome = ids.into_iter().enumerate().try_for_each(|(index, id)| {
            let id = id.as_ref().to_string();
            match self.engine.delete(self.collection(), &id) {
                Ok(true) => report.succeeded.push(id),
                Ok(false) => report.missing.push(id),
                Err(err) => report.reject(index, Some(id), err)?,
            }
            Ok(())
        });
        self.finish_batch(Operation::BatchDelete, &report, outcome, String::clone)?;
        Ok(report)
    }

    fn insert(&self, entity: T) -> CoreResult<T> {
        self.engine.add(self.collection(), entity.to_record()?)?;
        Ok(entity)
    }

    fn merge(&self, id: &str, patch: Record) -> CoreResult<Option<T>> {
        let Some(mut record) = self.engine.get(self.collection(), id)? else {
            return Ok(None);
        };
        for (field, value) in patch.fields() {
            if field != ID_FIELD && field != CREATED_AT_FIELD {
                record.insert(field.clone(), value.clone());
            }
        }
        record.insert(UPDATED_AT_FIELD, Value::String(now_iso()));
        let entity = T::from_record(&record)?;
        self.engine.put(self.collection(), record)?;
        Ok(Some(entity))
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut T)) -> CoreResult<Option<T>> {
        let Some(mut record) = self.engine.get(self.collection(), id)? else {
            return Ok(None);
        };
        let mut entity = T::from_record(&record)?;
        let before = entity.to_record()?;
        f(&mut entity);
        let after = entity.to_record()?;

        let created_at = record.get(CREATED_AT_FIELD).cloned();
        record.apply_changes(&before, &after);
        record.set_id(id);
        match created_at {
            Some(value) => record.insert(CREATED_AT_FIELD, value),
            None => record.remove(CREATED_AT_FIELD),
        };
        record.insert(UPDATED_AT_FIELD, Value::String(now_iso()));

        let entity = T::from_record(&record)?;
        self.engine.put(self.collection(), record)?;
        Ok(Some(entity))
    }

    fn publish<R>(&self, operation: Operation, ids: Vec<String>, result: &CoreResult<R>) {
        let event = match result {
            Ok(_) => RepositoryEvent::success(self.collection(), operation, ids),
            Err(err) => {
                RepositoryEvent::failure(self.collection(), operation, ids, err.to_string())
            }
        };
        self.events.publish(event);
    }

    fn publish_found(&self, operation: Operation, id: &str, result: &CoreResult<Option<T>>) {
        if !matches!(result, Ok(None)) {
            self.publish(operation, vec![id.to_string()], result);
        }
    }

    fn finish_batch<R>(
        &self,
        operation: Operation,
        report: &BatchReport<R>,
        outcome: CoreResult<()>,
        id_of: impl Fn(&R) -> String,
    ) -> CoreResult<()> {
        let ids = report.succeeded.iter().map(id_of).collect::<Vec<_>>();
        if !ids.is_empty() {
            self.events
                .publish(RepositoryEvent::success(self.collection(), operation, ids));
        }
        for failure in &report.failed {
            self.events.publish(RepositoryEvent::failure(
                self.collection(),
                operation,
                failure.id.iter().cloned().collect(),
                failure.error.to_string(),
            ));
        }
        if let Err(err) = &outcome {
            self.events.publish(RepositoryEvent::failure(
                self.collection(),
                operation,
                Vec::new(),
                err.to_string(),
            ));
        }
        outcome
    }
}

fn stamp_new<T: Entity>(mut entity: T) -> T {
    let now = now_iso();
    let meta = entity.meta_mut();
    if meta.id.is_empty() {
        meta.id = new_id();
    }
    if meta.created_at.is_empty() {
        meta.created_at = now.clone();
    }
    meta.updated_at = now;
    entity
}
