//! Per-entity repositories with index finders.

use super::{EventBus, FindOptions, Repository};
use crate::engine::Engine;
use crate::entity::{
    Achievement, Conversation, ConversationMessage, Difficulty, Lesson, PointsReward,
    PointsTransaction, Progress, Project, User, UserPointsReward, UserPointsStats, OWNER_FIELD,
};
use crate::error::{CoreError, CoreResult};
use crate::types::now_iso;
use serde_json::json;
use std::ops::Deref;
use std::sync::Arc;

macro_rules! specialized_repository {
    ($(#[$doc:meta])* $name:ident => $entity:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: Repository<$entity>,
        }

        impl $name {
            /// Creates the repository.
            pub fn new(engine: Arc<Engine>, events: EventBus) -> Self {
                Self {
                    inner: Repository::new(engine, events),
                }
            }
        }

        impl Deref for $name {
            type Target = Repository<$entity>;

            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }
    };
}

specialized_repository! {
    /// Learner accounts.
    UserRepository => User
}

impl UserRepository {
    /// Looks up a user by login address.
    pub fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.find_one_by_index("email", email)
    }

    /// Looks up a user by handle.
    pub fn find_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        self.find_one_by_index("username", username)
    }

    /// Stamps `lastLoginAt` with the current time.
    pub fn record_login(&self, id: &str) -> CoreResult<Option<User>> {
        self.update_with(id, |user| user.last_login_at = Some(now_iso()))
    }
}

specialized_repository! {
    /// Course lessons.
    LessonRepository => Lesson
}

impl LessonRepository {
    /// Lessons of a course, in course order.
    pub fn find_by_course(&self, course_id: &str) -> CoreResult<Vec<Lesson>> {
        let mut lessons = self.find_by_index("courseId", course_id)?;
        lessons.sort_by_key(|lesson| lesson.order);
        Ok(lessons)
    }

    /// Lessons of a category.
    pub fn find_by_category(&self, category: &str) -> CoreResult<Vec<Lesson>> {
        self.find_by_index("category", category)
    }

    /// Lessons of a difficulty.
    pub fn find_by_difficulty(&self, difficulty: Difficulty) -> CoreResult<Vec<Lesson>> {
        self.find_by_index("difficulty", difficulty.as_str())
    }
}

specialized_repository! {
    /// Per-user lesson progress.
    ProgressRepository => Progress
}

impl ProgressRepository {
    /// Progress records of a user.
    pub fn find_by_user(&self, user_id: &str) -> CoreResult<Vec<Progress>> {
        self.find_by_index(OWNER_FIELD, user_id)
    }

    /// Progress records on a lesson.
    pub fn find_by_lesson(&self, lesson_id: &str) -> CoreResult<Vec<Progress>> {
        self.find_by_index("lessonId", lesson_id)
    }

    /// The progress of one user on one lesson.
    pub fn find_by_user_and_lesson(
        &self,
        user_id: &str,
        lesson_id: &str,
    ) -> CoreResult<Option<Progress>> {
        self.find_one_by_index("userLesson", json!([user_id, lesson_id]))
    }

    /// Records a completion percentage, creating the progress record on
    /// first access. Reaching 100 marks the lesson completed.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `percentage` is outside `[0, 100]`.
    pub fn upsert_completion(
        &self,
        user_id: &str,
        lesson_id: &str,
        percentage: f64,
    ) -> CoreResult<Progress> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(CoreError::invalid_operation(format!(
                "completion percentage {percentage} is outside [0, 100]"
            )));
        }
        let now = now_iso();
        let apply = |progress: &mut Progress| {
            progress.completion_percentage = percentage;
            progress.completed = percentage >= 100.0;
            progress.last_accessed_at = Some(now.clone());
        };

        if let Some(existing) = self.find_by_user_and_lesson(user_id, lesson_id)? {
            if let Some(updated) = self.update_with(&existing.meta.id, &apply)? {
                return Ok(updated);
            }
        }

        let mut progress = Progress {
            user_id: user_id.to_string(),
            lesson_id: lesson_id.to_string(),
            ..Progress::default()
        };
        apply(&mut progress);
        self.create(progress)
    }
}

specialized_repository! {
    /// User code projects.
    ProjectRepository => Project
}

impl ProjectRepository {
    /// Projects of a user.
    pub fn find_by_user(&self, user_id: &str) -> CoreResult<Vec<Project>> {
        self.find_by_index(OWNER_FIELD, user_id)
    }

    /// Projects written in a language.
    pub fn find_by_language(&self, language: &str) -> CoreResult<Vec<Project>> {
        self.find_by_index("language", language)
    }
}

specialized_repository! {
    /// Tutor chat sessions.
    ConversationRepository => Conversation
}

impl ConversationRepository {
    /// Conversations of a user.
    pub fn find_by_user(&self, user_id: &str) -> CoreResult<Vec<Conversation>> {
        self.find_by_index(OWNER_FIELD, user_id)
    }

    /// The conversation of a chat session.
    pub fn find_by_session(&self, session_id: &str) -> CoreResult<Option<Conversation>> {
        self.find_one_by_index("sessionId", session_id)
    }

    /// Appends a message. Returns `Ok(None)` if the conversation is unknown.
    pub fn append_message(
        &self,
        id: &str,
        message: ConversationMessage,
    ) -> CoreResult<Option<Conversation>> {
        self.update_with(id, |conversation| conversation.messages.push(message))
    }
}

specialized_repository! {
    /// Points earned or spent.
    PointsTransactionRepository => PointsTransaction
}

impl PointsTransactionRepository {
    /// Transactions of a user.
    pub fn find_by_user(&self, user_id: &str) -> CoreResult<Vec<PointsTransaction>> {
        self.find_by_index(OWNER_FIELD, user_id)
    }

    /// Net points of a user.
    pub fn total_for_user(&self, user_id: &str) -> CoreResult<i64> {
        Ok(self
            .find_by_user(user_id)?
            .iter()
            .map(|transaction| transaction.amount)
            .sum())
    }
}

specialized_repository! {
    /// Rewards that can be bought with points.
    PointsRewardRepository => PointsReward
}

impl PointsRewardRepository {
    /// Rewards currently on offer.
    pub fn find_available(&self) -> CoreResult<Vec<PointsReward>> {
        Ok(self
            .find_all(&FindOptions::new().order_by("cost"))?
            .into_iter()
            .filter(|reward| reward.available)
            .collect())
    }
}

specialized_repository! {
    /// Rewards a user has redeemed.
    UserPointsRewardRepository => UserPointsReward
}

impl UserPointsRewardRepository {
    /// Redemptions of a user.
    pub fn find_by_user(&self, user_id: &str) -> CoreResult<Vec<UserPointsReward>> {
        self.find_by_index(OWNER_FIELD, user_id)
    }
}

specialized_repository! {
    /// Aggregated points per user.
    UserPointsStatsRepository => UserPointsStats
}

impl UserPointsStatsRepository {
    /// The stats record of a user.
    pub fn find_by_user(&self, user_id: &str) -> CoreResult<Option<UserPointsStats>> {
        self.find_one_by_index(OWNER_FIELD, user_id)
    }
}

specialized_repository! {
    /// Achievement templates.
    AchievementRepository => Achievement
}

impl AchievementRepository {
    /// Achievements of a category.
    pub fn find_by_category(&self, category: &str) -> CoreResult<Vec<Achievement>> {
        self.find_by_index("category", category)
    }
}

/// One repository per application collection, sharing an engine and an
/// event bus.
#[derive(Debug, Clone)]
pub struct Repositories {
    /// `users`.
    pub users: UserRepository,
    /// `lessons`.
    pub lessons: LessonRepository,
    /// `progress`.
    pub progress: ProgressRepository,
    /// `projects`.
    pub projects: ProjectRepository,
    /// `conversations`.
    pub conversations: ConversationRepository,
    /// `pointsTransactions`.
    pub points_transactions: PointsTransactionRepository,
    /// `pointsRewards`.
    pub points_rewards: PointsRewardRepository,
    /// `userPointsRewards`.
    pub user_points_rewards: UserPointsRewardRepository,
    /// `userPointsStats`.
    pub user_points_stats: UserPointsStatsRepository,
    /// `achievements`.
    pub achievements: AchievementRepository,
    events: EventBus,
}

impl Repositories {
    /// Builds every repository over `engine`.
    pub fn new(engine: Arc<Engine>, events: EventBus) -> Self {
        Self {
            users: UserRepository::new(Arc::clone(&engine), events.clone()),
            lessons: LessonRepository::new(Arc::clone(&engine), events.clone()),
            progress: ProgressRepository::new(Arc::clone(&engine), events.clone()),
            projects: ProjectRepository::new(Arc::clone(&engine), events.clone()),
            conversations: ConversationRepository::new(Arc::clone(&engine), events.clone()),
            points_transactions: PointsTransactionRepository::new(
                Arc::clone(&engine),
                events.clone(),
            ),
            points_rewards: PointsRewardRepository::new(Arc::clone(&engine), events.clone()),
            user_points_rewards: UserPointsRewardRepository::new(
                Arc::clone(&engine),
                events.clone(),
            ),
            user_points_stats: UserPointsStatsRepository::new(Arc::clone(&engine), events.clone()),
            achievements: AchievementRepository::new(engine, events.clone()),
            events,
        }
    }

    /// Returns the shared event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
