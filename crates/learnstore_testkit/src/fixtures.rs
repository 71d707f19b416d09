//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common application data.

use learnstore_core::{Config, Engine, EventBus, Maintenance, MigrationManager, Repositories};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Directory name of file-backed test stores inside their temp dir.
pub const STORE_DIR: &str = "store";

/// An initialized test store with automatic cleanup.
pub struct TestStore {
    /// The engine.
    pub engine: Arc<Engine>,
    /// Event bus shared by every repository handed out.
    pub events: EventBus,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store with the application schema.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates an in-memory store with a custom configuration.
    pub fn memory_with(config: Config) -> Self {
        let engine = Arc::new(Engine::in_memory(config));
        engine.initialize().expect("Failed to open in-memory store");
        Self {
            engine,
            events: EventBus::new(),
            temp_dir: None,
        }
    }

    /// Creates a store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let engine = Arc::new(Engine::open(
            temp_dir.path().join(STORE_DIR),
            Config::default(),
        ));
        engine.initialize().expect("Failed to open file store");
        Self {
            engine,
            events: EventBus::new(),
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(STORE_DIR))
    }

    /// Closes and reopens the engine, replaying the journal.
    pub fn reopen(&self) {
        self.engine.close().expect("Failed to close store");
        self.engine.initialize().expect("Failed to reopen store");
    }

    /// Builds the application repositories over this store.
    pub fn repositories(&self) -> Repositories {
        Repositories::new(Arc::clone(&self.engine), self.events.clone())
    }

    /// Builds the maintenance utilities over this store.
    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(Arc::clone(&self.engine))
    }

    /// Builds a migration manager with the built-in migrations registered.
    pub fn migrations(&self) -> MigrationManager {
        MigrationManager::with_builtin(Arc::clone(&self.engine))
            .expect("Failed to register built-in migrations")
    }
}

impl Deref for TestStore {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use learnstore_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         store
///             .add("lessons", serde_json::json!({"id": "l1", "title": "Intro"}))
///             .unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore, &Path) -> R,
{
    let store = TestStore::file();
    let path = store.path().expect("File store should have a path");
    f(&store, &path)
}

/// Application data helpers.
pub mod scenarios {
    use learnstore_core::entity::{
        Lesson, PointsTransaction, Progress, Project, User, UserPointsStats,
    };
    use learnstore_core::{EntityKind, Repositories};

    /// Records created by [`seed_sample_data`].
    #[derive(Debug, Clone)]
    pub struct SampleData {
        /// Two learners, `ann` then `ben`.
        pub users: Vec<User>,
        /// Three lessons of one course, in course order.
        pub lessons: Vec<Lesson>,
        /// Ann on lessons 1 and 2, Ben on lesson 1.
        pub progress: Vec<Progress>,
        /// One project per user.
        pub projects: Vec<Project>,
        /// One transaction per user.
        pub points_transactions: Vec<PointsTransaction>,
        /// One stats record per user.
        pub points_stats: Vec<UserPointsStats>,
    }

    impl SampleData {
        /// Number of records owned by `user_id`.
        pub fn owned_by(&self, user_id: &str) -> usize {
            self.progress.iter().filter(|p| p.user_id == user_id).count()
                + self.projects.iter().filter(|p| p.user_id == user_id).count()
                + self
                    .points_transactions
                    .iter()
                    .filter(|t| t.user_id == user_id)
                    .count()
                + self.points_stats.iter().filter(|s| s.user_id == user_id).count()
        }

        /// Number of user-owned records across every collection.
        pub fn owned_total(&self) -> usize {
            self.progress.len()
                + self.projects.len()
                + self.points_transactions.len()
                + self.points_stats.len()
        }
    }

    /// Creates a small, consistent data set through the repositories.
    pub fn seed_sample_data(repos: &Repositories) -> SampleData {
        let users: Vec<User> = ["ann", "ben"]
            .into_iter()
            .map(|name| {
                repos
                    .users
                    .create(User {
                        email: format!("{name}@example.com"),
                        username: name.to_string(),
                        display_name: name.to_uppercase(),
                        ..User::default()
                    })
                    .expect("Failed to create user")
            })
            .collect();

        let lessons: Vec<Lesson> = (1..=3)
            .map(|order| {
                repos
                    .lessons
                    .create(Lesson {
                        course_id: "rust-101".to_string(),
                        title: format!("Lesson {order}"),
                        category: if order == 3 { "advanced" } else { "basics" }.to_string(),
                        order,
                        duration_minutes: 10 * order,
                        ..Lesson::default()
                    })
                    .expect("Failed to create lesson")
            })
            .collect();

        let plan = [(0, 0, 100.0), (0, 1, 40.0), (1, 0, 25.0)];
        let progress = plan
            .into_iter()
            .map(|(user, lesson, percentage)| {
                repos
                    .progress
                    .create(Progress {
                        user_id: users[user].meta.id.clone(),
                        lesson_id: lessons[lesson].meta.id.clone(),
                        completion_percentage: percentage,
                        completed: percentage >= 100.0,
                        ..Progress::default()
                    })
                    .expect("Failed to create progress")
            })
            .collect();

        let mut projects = Vec::new();
        let mut points_transactions = Vec::new();
        let mut points_stats = Vec::new();
        for (i, user) in users.iter().enumerate() {
            projects.push(
                repos
                    .projects
                    .create(Project {
                        user_id: user.meta.id.clone(),
                        title: format!("{} playground", user.username),
                        language: if i == 0 { "rust" } else { "python" }.to_string(),
                        code: "fn main() {}".to_string(),
                        ..Project::default()
                    })
                    .expect("Failed to create project"),
            );
            points_transactions.push(
                repos
                    .points_transactions
                    .create(PointsTransaction {
                        user_id: user.meta.id.clone(),
                        amount: 10,
                        reason: "lesson completed".to_string(),
                        ..PointsTransaction::default()
                    })
                    .expect("Failed to create points transaction"),
            );
            points_stats.push(
                repos
                    .user_points_stats
                    .create(UserPointsStats {
                        user_id: user.meta.id.clone(),
                        total_points: 10,
                        level: 1,
                        ..UserPointsStats::default()
                    })
                    .expect("Failed to create points stats"),
            );
        }

        SampleData {
            users,
            lessons,
            progress,
            projects,
            points_transactions,
            points_stats,
        }
    }

    /// Removes a user straight from the engine, leaving everything the user
    /// owned behind as orphans.
    pub fn orphan_user(repos: &Repositories, user_id: &str) {
        let removed = repos
            .users
            .engine()
            .delete(EntityKind::Users.collection_name(), user_id)
            .expect("Failed to delete user");
        assert!(removed, "user {user_id} did not exist");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = TestStore::memory();
        assert!(store.is_open());
        assert!(store.path().is_none());
    }

    #[test]
    fn test_file_store_reopens_with_data() {
        with_file_store(|store, path| {
            assert!(path.exists());
            let id = store
                .add("lessons", serde_json::json!({"id": "l1", "title": "Intro"}))
                .unwrap();
            store.reopen();
            assert!(store.get("lessons", &id).unwrap().is_some());
        });
    }

    #[test]
    fn test_sample_data_scenario() {
        with_temp_store(|store| {
            let repos = store.repositories();
            let sample = scenarios::seed_sample_data(&repos);
            assert_eq!(sample.users.len(), 2);
            assert_eq!(sample.owned_total(), 9);
            assert_eq!(sample.owned_by(&sample.users[0].meta.id), 5);
            assert_eq!(store.count("progress", None).unwrap(), 3);
        });
    }
}
