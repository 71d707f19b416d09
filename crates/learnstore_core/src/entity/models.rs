//! Entity structs.

use super::RecordMeta;
use serde::{Deserialize, Serialize};

/// A learner account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Login address; unique.
    pub email: String,
    /// Public handle.
    pub username: String,
    /// Name shown in the UI.
    #[serde(default)]
    pub display_name: String,
    /// Avatar location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// UI and privacy preferences.
    #[serde(default)]
    pub preferences: UserPreferences,
    /// Last successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<String>,
}

/// UI and privacy preferences of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    /// `light`, `dark` or `system`.
    pub theme: String,
    /// UI language tag.
    pub language: String,
    /// Whether reminders are sent.
    pub notifications: bool,
    /// Privacy choices.
    pub privacy: PrivacySettings,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: "system".to_string(),
            language: "en".to_string(),
            notifications: true,
            privacy: PrivacySettings::default(),
        }
    }
}

/// Privacy choices of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacySettings {
    /// Analytics opt-in. Absent on accounts created before it existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_analytics: Option<bool>,
    /// Whether other learners can see the profile.
    pub profile_visible: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            allow_analytics: None,
            profile_visible: true,
        }
    }
}

/// Lesson difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// No prior knowledge.
    #[default]
    Beginner,
    /// Builds on beginner lessons.
    Intermediate,
    /// Expects fluency.
    Advanced,
}

impl Difficulty {
    /// Returns the stored name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// A lesson within a course.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Course the lesson belongs to.
    pub course_id: String,
    /// Title.
    pub title: String,
    /// Short summary.
    #[serde(default)]
    pub description: String,
    /// Topic used for browsing.
    #[serde(default)]
    pub category: String,
    /// Difficulty.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Position within the course.
    #[serde(default)]
    pub order: u32,
    /// Expected duration.
    #[serde(default)]
    pub duration_minutes: u32,
}

/// How far a user got through a lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Owning user.
    pub user_id: String,
    /// Lesson tracked.
    pub lesson_id: String,
    /// Percentage in `[0, 100]`.
    #[serde(default)]
    pub completion_percentage: f64,
    /// Set once the lesson is finished.
    #[serde(default)]
    pub completed: bool,
    /// Total time spent.
    #[serde(default)]
    pub time_spent_seconds: u64,
    /// Quiz score, if the lesson has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// When the user last opened the lesson.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<String>,
}

/// A user's code project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Owning user.
    pub user_id: String,
    /// Title.
    pub title: String,
    /// Programming language.
    #[serde(default)]
    pub language: String,
    /// Source code.
    #[serde(default)]
    pub code: String,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One message of a tutor conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// ISO-8601 send time.
    pub timestamp: String,
}

/// A tutor chat session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Owning user.
    pub user_id: String,
    /// Client session the chat belongs to.
    pub session_id: String,
    /// Lesson being discussed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    /// Messages, oldest first.
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

/// Points earned (positive) or spent (negative).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsTransaction {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Owning user.
    pub user_id: String,
    /// Signed amount.
    pub amount: i64,
    /// Why the points moved.
    #[serde(default)]
    pub reason: String,
}

/// A reward on offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsReward {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Price in points.
    pub cost: i64,
    /// Whether it can currently be redeemed.
    #[serde(default)]
    pub available: bool,
}

/// A reward a user redeemed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPointsReward {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Owning user.
    pub user_id: String,
    /// Redeemed reward.
    pub reward_id: String,
    /// Redemption time.
    #[serde(default)]
    pub redeemed_at: String,
}

/// Points totals of one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPointsStats {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Owning user.
    pub user_id: String,
    /// Balance.
    #[serde(default)]
    pub total_points: i64,
    /// Level derived from lifetime points.
    #[serde(default)]
    pub level: u32,
    /// Consecutive active days.
    #[serde(default)]
    pub streak_days: u32,
}

/// An achievement template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Name.
    pub name: String,
    /// What earns it.
    #[serde(default)]
    pub description: String,
    /// Grouping, e.g. `learning` or `streak`.
    pub category: String,
    /// Points granted.
    #[serde(default)]
    pub points: i64,
    /// Icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}
