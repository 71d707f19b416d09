//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random application data
//! that keeps the store's invariants: string ids, unique emails and
//! progress inside `[0, 100]`.

use learnstore_core::entity::{Difficulty, Lesson, Progress, User};
use learnstore_core::{EntityKind, Record};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Strategy for generating valid record ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{4,12}").expect("Invalid regex")
}

/// Strategy for generating application collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(EntityKind::ALL.to_vec()).prop_map(EntityKind::collection_name)
}

/// Strategy for generating scalar field values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::String),
    ]
}

/// Strategy for generating flat records with the given id.
pub fn record_strategy(id: String) -> impl Strategy<Value = Record> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z][a-zA-Z]{0,9}").expect("Invalid regex"),
        scalar_strategy(),
        0..6,
    )
    .prop_map(move |fields| {
        let mut map: Map<String, Value> = fields.into_iter().collect();
        map.insert("id".to_string(), Value::String(id.clone()));
        Record::from_value(Value::Object(map)).expect("object is a record")
    })
}

/// Strategy for generating users with distinct usernames and emails.
pub fn users_strategy(max: usize) -> impl Strategy<Value = Vec<User>> {
    prop::collection::btree_set(
        prop::string::string_regex("[a-z]{3,10}").expect("Invalid regex"),
        1..=max.max(1),
    )
    .prop_map(|names| {
        names
            .into_iter()
            .map(|name| User {
                email: format!("{name}@example.com"),
                display_name: name.to_uppercase(),
                username: name,
                ..User::default()
            })
            .collect()
    })
}

/// Strategy for generating lessons of a handful of courses.
pub fn lesson_strategy() -> impl Strategy<Value = Lesson> {
    (
        prop::sample::select(vec!["rust-101", "python-101", "web-201"]),
        prop::string::string_regex("[A-Z][a-z]{2,12}").expect("Invalid regex"),
        prop::sample::select(vec![
            Difficulty::Beginner,
            Difficulty::Intermediate,
            Difficulty::Advanced,
        ]),
        1u32..50,
    )
        .prop_map(|(course, title, difficulty, order)| Lesson {
            course_id: course.to_string(),
            title,
            category: "general".to_string(),
            difficulty,
            order,
            duration_minutes: 15,
            ..Lesson::default()
        })
}

/// Strategy for generating progress of the given users on the given lessons.
pub fn progress_strategy(
    user_ids: Vec<String>,
    lesson_ids: Vec<String>,
) -> impl Strategy<Value = Progress> {
    (
        prop::sample::select(user_ids),
        prop::sample::select(lesson_ids),
        0u32..=100,
    )
        .prop_map(|(user_id, lesson_id, percentage)| Progress {
            user_id,
            lesson_id,
            completion_percentage: f64::from(percentage),
            completed: percentage == 100,
            ..Progress::default()
        })
}

/// An engine operation over a small id space, for model checks.
#[derive(Debug, Clone)]
pub enum EngineOperation {
    /// Insert a record; fails if the id exists.
    Add {
        /// Record id
        id: String,
        /// Stored value
        value: i64,
    },
    /// Insert or replace a record.
    Put {
        /// Record id
        id: String,
        /// Stored value
        value: i64,
    },
    /// Delete a record.
    Delete {
        /// Record id
        id: String,
    },
    /// Read a record.
    Get {
        /// Record id
        id: String,
    },
}

impl EngineOperation {
    /// Returns the record this operation would write.
    pub fn record(id: &str, value: i64) -> Value {
        json!({ "id": id, "value": value })
    }
}

/// Strategy for generating operation sequences over `ids` distinct ids.
pub fn operations_strategy(
    ids: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<EngineOperation>> {
    let id = (0..ids.max(1)).prop_map(|i| format!("rec-{i}"));
    let op = (0u8..4, id, any::<i64>()).prop_map(|(kind, id, value)| match kind {
        0 => EngineOperation::Add { id, value },
        1 => EngineOperation::Put { id, value },
        2 => EngineOperation::Delete { id },
        _ => EngineOperation::Get { id },
    });
    prop::collection::vec(op, 1..max_ops.max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_record_strategy_keeps_id() {
        let mut runner = TestRunner::default();
        let record = record_strategy("abc".to_string())
            .new_tree(&mut runner)
            .unwrap()
            .current();
        assert_eq!(record.id(), Some("abc"));
    }

    proptest! {
        #[test]
        fn generated_users_have_unique_emails(users in users_strategy(8)) {
            let mut emails: Vec<_> = users.iter().map(|u| u.email.clone()).collect();
            emails.sort();
            emails.dedup();
            prop_assert_eq!(emails.len(), users.len());
        }

        #[test]
        fn generated_progress_is_in_range(
            progress in progress_strategy(vec!["u1".into()], vec!["l1".into(), "l2".into()])
        ) {
            prop_assert!((0.0..=100.0).contains(&progress.completion_percentage));
            prop_assert_eq!(progress.completed, progress.completion_percentage >= 100.0);
        }

        #[test]
        fn generated_collections_are_known(name in collection_name_strategy()) {
            prop_assert!(EntityKind::from_collection(name).is_some());
        }
    }
}
