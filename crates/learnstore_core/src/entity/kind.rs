//! The closed set of application collections.

use crate::schema::{CollectionSchema, IndexDefinition};
use crate::types::CREATED_AT_FIELD;
use std::fmt;

/// Field naming the owning user on user-owned records.
pub const OWNER_FIELD: &str = "userId";

/// One application collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Learner accounts. The root every owned record points at.
    Users,
    /// Course lessons.
    Lessons,
    /// Per-user lesson progress.
    Progress,
    /// User code projects.
    Projects,
    /// Tutor chat sessions.
    Conversations,
    /// Points earned or spent.
    PointsTransactions,
    /// Rewards that can be bought with points.
    PointsRewards,
    /// Rewards a user has redeemed.
    UserPointsRewards,
    /// Aggregated points per user.
    UserPointsStats,
    /// Achievement templates.
    Achievements,
}

impl EntityKind {
    /// Every kind, users first.
    pub const ALL: [Self; 10] = [
        Self::Users,
        Self::Lessons,
        Self::Progress,
        Self::Projects,
        Self::Conversations,
        Self::PointsTransactions,
        Self::PointsRewards,
        Self::UserPointsRewards,
        Self::UserPointsStats,
        Self::Achievements,
    ];

    /// Returns the collection name.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Lessons => "lessons",
            Self::Progress => "progress",
            Self::Projects => "projects",
            Self::Conversations => "conversations",
            Self::PointsTransactions => "pointsTransactions",
            Self::PointsRewards => "pointsRewards",
            Self::UserPointsRewards => "userPointsRewards",
            Self::UserPointsStats => "userPointsStats",
            Self::Achievements => "achievements",
        }
    }

    /// Resolves a collection name.
    #[must_use]
    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection_name() == name)
    }

    /// Returns the field holding the owning user id, for user-owned kinds.
    #[must_use]
    pub const fn owner_field(self) -> Option<&'static str> {
        match self {
            Self::Progress
            | Self::Projects
            | Self::Conversations
            | Self::PointsTransactions
            | Self::UserPointsRewards
            | Self::UserPointsStats => Some(OWNER_FIELD),
            Self::Users | Self::Lessons | Self::PointsRewards | Self::Achievements => None,
        }
    }

    /// Fields every record of this kind must carry besides `id`.
    #[must_use]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Users => &["email", "username"],
            Self::Lessons => &["courseId", "title"],
            Self::Progress => &["userId", "lessonId"],
            Self::Projects => &["userId", "title"],
            Self::Conversations => &["userId", "sessionId"],
            Self::PointsTransactions => &["userId", "amount"],
            Self::PointsRewards => &["name", "cost"],
            Self::UserPointsRewards => &["userId", "rewardId"],
            Self::UserPointsStats => &["userId"],
            Self::Achievements => &["name", "category"],
        }
    }

    /// Returns the collection declaration with its indexes.
    #[must_use]
    pub fn schema(self) -> CollectionSchema {
        fn field(name: &str, path: &str) -> IndexDefinition {
            IndexDefinition::field(name, path)
        }

        let schema = CollectionSchema::new(self.collection_name());
        let schema = match self {
            Self::Users => schema
                .with_index(field("email", "email").unique())
                .with_index(field("username", "username")),
            Self::Lessons => schema
                .with_index(field("courseId", "courseId"))
                .with_index(field("category", "category"))
                .with_index(field("difficulty", "difficulty")),
            Self::Progress => schema
                .with_index(field("userId", "userId"))
                .with_index(field("lessonId", "lessonId"))
                .with_index(IndexDefinition::composite(
                    "userLesson",
                    ["userId", "lessonId"],
                )),
            Self::Projects => schema
                .with_index(field("userId", "userId"))
                .with_index(field("language", "language")),
            Self::Conversations => schema
                .with_index(field("userId", "userId"))
                .with_index(field("sessionId", "sessionId")),
            Self::PointsTransactions | Self::UserPointsRewards | Self::UserPointsStats => {
                schema.with_index(field("userId", "userId"))
            }
            Self::PointsRewards => schema,
            Self::Achievements => schema.with_index(field("category", "category")),
        };
        schema.with_index(field(CREATED_AT_FIELD, CREATED_AT_FIELD))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// Declarations of every application collection.
#[must_use]
pub fn application_schema() -> Vec<CollectionSchema> {
    EntityKind::ALL.into_iter().map(EntityKind::schema).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_collection(kind.collection_name()), Some(kind));
        }
        assert_eq!(EntityKind::from_collection("nope"), None);
    }

    #[test]
    fn owned_kinds_point_at_users() {
        assert_eq!(EntityKind::Progress.owner_field(), Some("userId"));
        assert_eq!(EntityKind::Users.owner_field(), None);
        assert_eq!(EntityKind::Achievements.owner_field(), None);
    }

    #[test]
    fn schema_declares_lookup_indexes() {
        let users = EntityKind::Users.schema();
        assert!(users.index("email").unwrap().unique);
        assert!(users.index("createdAt").is_some());

        let progress = EntityKind::Progress.schema();
        assert_eq!(
            progress.index("userLesson").unwrap().key_path.fields(),
            vec!["userId", "lessonId"]
        );
        assert_eq!(application_schema().len(), EntityKind::ALL.len());
    }
}
