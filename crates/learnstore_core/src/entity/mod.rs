//! Typed application entities.
//!
//! Each entity is a plain `serde` struct whose wire form is the record
//! stored by the engine: camelCase fields with `id`, `createdAt` and
//! `updatedAt` flattened in from [`RecordMeta`].

mod kind;
mod models;

pub use kind::{application_schema, EntityKind, OWNER_FIELD};
pub use models::{
    Achievement, Conversation, ConversationMessage, Difficulty, Lesson, PointsReward,
    PointsTransaction, PrivacySettings, Progress, Project, User, UserPointsReward,
    UserPointsStats, UserPreferences,
};

use crate::error::CoreResult;
use crate::types::Record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Identity and timestamps shared by every record.
///
/// Empty strings mean "not assigned yet"; repositories fill them on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordMeta {
    /// Primary key.
    pub id: String,
    /// ISO-8601 creation time.
    pub created_at: String,
    /// ISO-8601 time of the last update.
    pub updated_at: String,
}

impl RecordMeta {
    /// Metadata with a caller-chosen id and no timestamps yet.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A typed record of one application collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the entity lives in.
    const KIND: EntityKind;

    /// Returns the identity and timestamps.
    fn meta(&self) -> &RecordMeta;

    /// Returns the identity and timestamps for modification.
    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Returns the id.
    fn id(&self) -> &str {
        &self.meta().id
    }

    /// Converts to the stored form.
    fn to_record(&self) -> CoreResult<Record> {
        Record::from_serialize(self)
    }

    /// Converts from the stored form.
    fn from_record(record: &Record) -> CoreResult<Self> {
        record.to_typed()
    }
}

macro_rules! impl_entity {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl Entity for $ty {
                const KIND: EntityKind = EntityKind::$kind;

                fn meta(&self) -> &RecordMeta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut RecordMeta {
                    &mut self.meta
                }
            }
        )+
    };
}

impl_entity! {
    User => Users,
    Lesson => Lessons,
    Progress => Progress,
    Project => Projects,
    Conversation => Conversations,
    PointsTransaction => PointsTransactions,
    PointsReward => PointsRewards,
    UserPointsReward => UserPointsRewards,
    UserPointsStats => UserPointsStats,
    Achievement => Achievements,
}
