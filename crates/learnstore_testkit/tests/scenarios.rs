//! Cross-module scenarios: engine laws, migrations, repositories and
//! maintenance working over one store.

use learnstore_core::entity::{Lesson, Progress, RecordMeta, User};
use learnstore_core::migration::{FnMigration, SeedAchievementTemplates};
use learnstore_core::{Config, CoreError, Engine, ImportOptions, Record};
use learnstore_testkit::prelude::*;
use learnstore_testkit::scenarios::{orphan_user, seed_sample_data};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

fn user(id: &str) -> User {
    User {
        meta: RecordMeta::with_id(id),
        email: format!("{id}@example.com"),
        username: id.to_string(),
        ..User::default()
    }
}

fn lesson(id: &str) -> Lesson {
    Lesson {
        meta: RecordMeta::with_id(id),
        course_id: "rust-101".to_string(),
        title: format!("Lesson {id}"),
        ..Lesson::default()
    }
}

fn progress(id: &str, user_id: &str, lesson_id: &str) -> Progress {
    Progress {
        meta: RecordMeta::with_id(id),
        user_id: user_id.to_string(),
        lesson_id: lesson_id.to_string(),
        completion_percentage: 50.0,
        ..Progress::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn added_records_read_back_unchanged(
        record in id_strategy().prop_flat_map(record_strategy)
    ) {
        let store = TestStore::memory();
        let id = store.add("lessons", record.clone()).unwrap();
        prop_assert_eq!(store.get("lessons", &id).unwrap(), Some(record));
    }

    #[test]
    fn put_is_idempotent_and_add_rejects_duplicates(
        id in id_strategy(),
        first in any::<i64>(),
        second in any::<i64>(),
    ) {
        let store = TestStore::memory();
        store.put("lessons", EngineOperation::record(&id, first)).unwrap();
        store.put("lessons", EngineOperation::record(&id, second)).unwrap();
        prop_assert_eq!(store.count("lessons", None).unwrap(), 1);

        let err = store.add("lessons", EngineOperation::record(&id, first)).unwrap_err();
        let is_duplicate = matches!(err, CoreError::DuplicateKey { .. });
        prop_assert!(is_duplicate);
        let stored = store.get("lessons", &id).unwrap().unwrap();
        prop_assert_eq!(stored.get("value"), Some(&json!(second)));
    }

    #[test]
    fn engine_matches_a_map_model(ops in operations_strategy(6, 40)) {
        let store = TestStore::memory();
        let mut model: BTreeMap<String, i64> = BTreeMap::new();

        for op in ops {
            match op {
                EngineOperation::Add { id, value } => {
                    let result = store.add("lessons", EngineOperation::record(&id, value));
                    if model.contains_key(&id) {
                        let is_duplicate = matches!(result, Err(CoreError::DuplicateKey { .. }));
                        prop_assert!(is_duplicate);
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(id, value);
                    }
                }
                EngineOperation::Put { id, value } => {
                    store.put("lessons", EngineOperation::record(&id, value)).unwrap();
                    model.insert(id, value);
                }
                EngineOperation::Delete { id } => {
                    let existed = store.delete("lessons", &id).unwrap();
                    prop_assert_eq!(existed, model.remove(&id).is_some());
                }
                EngineOperation::Get { id } => {
                    let value = store
                        .get("lessons", &id)
                        .unwrap()
                        .and_then(|r| r.get("value").and_then(serde_json::Value::as_i64));
                    prop_assert_eq!(value, model.get(&id).copied());
                }
            }
        }

        store.reopen();
        prop_assert_eq!(store.count("lessons", None).unwrap(), model.len());
    }
}

#[test]
fn running_all_migrations_leaves_nothing_pending() {
    let store = TestStore::memory();
    let mut manager = store.migrations();
    manager
        .register(Box::new(FnMigration::new(3, "noop", |ctx| {
            ctx.custom("nothing to do");
            Ok(())
        })))
        .unwrap();

    let report = manager.run_pending_migrations().unwrap();
    assert_eq!(report.final_version, 3);

    let status = manager.status().unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.applied_versions, vec![1, 2, 3]);
}

#[test]
fn a_failing_migration_keeps_earlier_progress() {
    let store = TestStore::memory();
    let mut manager = store.migrations();
    manager
        .register(Box::new(FnMigration::new(3, "broken", |_| {
            Err(CoreError::invalid_operation("boom"))
        })))
        .unwrap();
    manager
        .register(Box::new(FnMigration::new(4, "after", |_| Ok(()))))
        .unwrap();

    let err = manager.run_pending_migrations().unwrap_err();
    assert!(matches!(err, CoreError::MigrationFailed { version: 3, .. }));

    let status = manager.status().unwrap();
    assert_eq!(status.applied_versions, vec![1, 2]);
    assert_eq!(status.pending_versions, vec![3, 4]);

    // The ledger is durable: a fresh manager over the reopened store agrees.
    store.reopen();
    let status = store.migrations().status().unwrap();
    assert_eq!(status.applied_versions, vec![1, 2]);
}

#[test]
fn builtin_migrations_seed_achievements_and_default_analytics() {
    let store = TestStore::memory();
    let repos = store.repositories();
    repos.users.create(user("u1")).unwrap();
    repos.users.create(user("u2")).unwrap();

    store.migrations().run_pending_migrations().unwrap();

    assert_eq!(store.count("achievements", None).unwrap(), 2);
    for id in SeedAchievementTemplates::IDS {
        assert!(repos.achievements.exists(id).unwrap());
    }
    for record in store.get_all("users", None, None).unwrap() {
        assert_eq!(
            record.get_path("preferences.privacy.allowAnalytics"),
            Some(&json!(true))
        );
    }
}

#[test]
fn export_then_import_with_clear_round_trips() {
    let store = TestStore::memory();
    let repos = store.repositories();
    let sample = seed_sample_data(&repos);
    let maintenance = store.maintenance();

    let exported = maintenance.export_data(None).unwrap();
    assert!(exported.warnings.is_empty());

    repos.lessons.delete(&sample.lessons[0].meta.id).unwrap();
    repos.users.create(user("extra")).unwrap();
    store
        .put("projects", json!({"id": "stray", "userId": "nobody", "title": "x"}))
        .unwrap();

    let report = maintenance
        .import_data(&exported.snapshot, &ImportOptions::new().clear_existing(true))
        .unwrap();
    assert!(report.errors.is_empty());
    let total: usize = exported.snapshot.values().map(Vec::len).sum();
    assert_eq!(report.imported, total);

    let again = maintenance.export_data(None).unwrap();
    assert_eq!(again.snapshot, exported.snapshot);
}

#[test]
fn failed_import_with_clear_keeps_existing_data() {
    let store = TestStore::memory();
    let repos = store.repositories();
    let sample = seed_sample_data(&repos);
    let maintenance = store.maintenance();
    let before = maintenance.export_data(None).unwrap().snapshot;

    let clash = |id: &str| {
        Record::from_value(json!({"id": id, "email": "dup@x.io", "username": id})).unwrap()
    };
    let mut snapshot = BTreeMap::new();
    snapshot.insert("users".to_string(), vec![clash("n1"), clash("n2")]);

    let options = ImportOptions::new().clear_existing(true);
    assert!(maintenance.import_data(&snapshot, &options).is_err());
    let report = maintenance
        .import_data(&snapshot, &options.skip_errors(true))
        .unwrap();
    assert_eq!(report.errors.len(), 1);

    assert_eq!(maintenance.export_data(None).unwrap().snapshot, before);
    assert_eq!(
        repos.users.find_by_id(&sample.users[0].meta.id).unwrap(),
        Some(sample.users[0].clone())
    );
}

#[test]
fn typed_updates_keep_fields_outside_the_model() {
    let store = TestStore::memory();
    store
        .put(
            "users",
            json!({
                "id": "u1",
                "email": "ann@example.com",
                "username": "ann",
                "role": "admin",
                "licenseKey": "k",
                "preferences": {"theme": "dark", "beta": true},
            }),
        )
        .unwrap();
    let users = store.repositories().users;

    let user = users.record_login("u1").unwrap().unwrap();
    assert!(user.last_login_at.is_some());
    users
        .update_with("u1", |u| u.preferences.theme = "light".to_string())
        .unwrap();

    let stored = store.get("users", "u1").unwrap().unwrap();
    assert_eq!(stored.get("role"), Some(&json!("admin")));
    assert_eq!(stored.get("licenseKey"), Some(&json!("k")));
    assert_eq!(stored.get_path("preferences.theme"), Some(&json!("light")));
    assert_eq!(stored.get_path("preferences.beta"), Some(&json!(true)));
    assert!(stored.get("lastLoginAt").is_some());
    assert!(stored.created_at().is_none());
}

#[test]
fn cleanup_removes_only_orphans() {
    let store = TestStore::memory();
    let repos = store.repositories();
    let sample = seed_sample_data(&repos);
    let (ann, ben) = (&sample.users[0], &sample.users[1]);

    orphan_user(&repos, &ben.meta.id);
    let report = store.maintenance().cleanup_orphaned_data();

    assert!(report.errors.is_empty());
    assert_eq!(report.cleaned, sample.owned_by(&ben.meta.id));
    assert_eq!(report.details.get("progress"), Some(&1));
    assert_eq!(report.details.get("projects"), Some(&1));

    assert!(repos.progress.find_by_user(&ben.meta.id).unwrap().is_empty());
    assert_eq!(repos.progress.find_by_user(&ann.meta.id).unwrap().len(), 2);
    assert_eq!(repos.projects.find_by_user(&ann.meta.id).unwrap().len(), 1);

    // Nothing left to do on a second pass.
    assert_eq!(store.maintenance().cleanup_orphaned_data().cleaned, 0);
}

#[test]
fn progress_of_a_deleted_user_is_cleaned() {
    let store = TestStore::memory();
    let repos = store.repositories();
    repos.users.create(user("u1")).unwrap();
    repos.lessons.create(lesson("l1")).unwrap();
    repos.progress.create(progress("p1", "u1", "l1")).unwrap();

    assert!(repos.users.delete("u1").unwrap());
    let report = store.maintenance().cleanup_orphaned_data();

    assert_eq!(report.details.get("progress"), Some(&1));
    assert!(repos.progress.find_by_id("p1").unwrap().is_none());
}

#[test]
fn composite_index_needs_both_fields_to_match() {
    let store = TestStore::memory();
    let repos = store.repositories();
    repos.progress.create(progress("p1", "u1", "l1")).unwrap();
    repos.progress.create(progress("p2", "u1", "l2")).unwrap();
    repos.progress.create(progress("p3", "u2", "l1")).unwrap();

    let hits = store
        .get_all_by_index("progress", "userLesson", &json!(["u1", "l1"]))
        .unwrap();
    let ids: Vec<_> = hits.iter().filter_map(Record::id).collect();
    assert_eq!(ids, vec!["p1"]);

    assert!(store
        .get_all_by_index("progress", "userLesson", &json!(["u2", "l2"]))
        .unwrap()
        .is_empty());
    assert!(repos
        .progress
        .find_by_user_and_lesson("u1", "l1")
        .unwrap()
        .is_some());
}

#[test]
fn file_store_survives_reopen_and_refuses_a_second_opener() {
    with_file_store(|store, path| {
        let repos = store.repositories();
        let sample = seed_sample_data(&repos);

        let second = Engine::open(path, Config::default());
        let err = second.initialize().unwrap_err();
        assert!(matches!(err, CoreError::StorageUnavailable { .. }));

        store.reopen();
        let users = store.repositories().users;
        let ann = users.find_by_email("ann@example.com").unwrap().unwrap();
        assert_eq!(ann, sample.users[0]);
        assert_eq!(store.count("progress", None).unwrap(), 3);
    });
}

#[test]
fn integrity_check_passes_on_sample_data_and_flags_bad_progress() {
    let store = TestStore::memory();
    let repos = store.repositories();
    seed_sample_data(&repos);
    assert!(store.maintenance().validate_data_integrity().valid);

    store
        .put(
            "progress",
            json!({"id": "bad", "userId": "u9", "lessonId": "l9", "completionPercentage": 140}),
        )
        .unwrap();
    let report = store.maintenance().validate_data_integrity();
    assert!(!report.valid);
    assert!(report.errors.iter().any(|issue| issue.entity.contains("bad")));
}

#[test]
fn backup_restores_a_wiped_store() {
    let store = TestStore::memory();
    let repos = store.repositories();
    seed_sample_data(&repos);
    let maintenance = store.maintenance();
    let before = maintenance.export_data(None).unwrap().snapshot;

    let key = maintenance.create_backup().unwrap();
    for name in store.collection_names().unwrap() {
        store.clear(&name).unwrap();
    }
    maintenance
        .restore_backup(&key, &ImportOptions::new().clear_existing(true))
        .unwrap();

    assert_eq!(maintenance.export_data(None).unwrap().snapshot, before);
}

#[test]
fn repository_events_reach_subscribers() {
    let store = TestStore::memory();
    let receiver = store.events.subscribe();
    let repos = store.repositories();
    seed_sample_data(&repos);

    let events: Vec<_> = receiver.try_iter().collect();
    assert_eq!(events.len(), 2 + 3 + 3 + 2 * 3);
    assert!(events.iter().all(|e| e.outcome.is_success()));
}
