//! Migrations shipped with the application.

use super::{Migration, MigrationContext, MigrationVersion};
use crate::entity::{Achievement, Entity, EntityKind, RecordMeta};
use crate::error::CoreResult;
use crate::types::{now_iso, Record};
use serde_json::Value;

/// Returns the application's migrations, ascending.
#[must_use]
pub fn builtin_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(SeedAchievementTemplates),
        Box::new(AllowAnalyticsDefault),
    ]
}

const ACHIEVEMENTS: &str = EntityKind::Achievements.collection_name();
const USERS: &str = EntityKind::Users.collection_name();

/// Version 1: seeds the two starter achievement templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedAchievementTemplates;

impl SeedAchievementTemplates {
    /// Ids of the seeded templates.
    pub const IDS: [&'static str; 2] = ["achievement-first-lesson", "achievement-week-streak"];

    fn templates() -> Vec<Achievement> {
        let now = now_iso();
        let meta = |id: &str| RecordMeta {
            id: id.to_string(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        vec![
            Achievement {
                meta: meta(Self::IDS[0]),
                name: "First Steps".to_string(),
                description: "Complete your first lesson".to_string(),
                category: "learning".to_string(),
                points: 10,
                icon: Some("footprints".to_string()),
            },
            Achievement {
                meta: meta(Self::IDS[1]),
                name: "Week Warrior".to_string(),
                description: "Study seven days in a row".to_string(),
                category: "streak".to_string(),
                points: 50,
                icon: Some("flame".to_string()),
            },
        ]
    }
}

impl Migration for SeedAchievementTemplates {
    fn version(&self) -> MigrationVersion {
        1
    }

    fn name(&self) -> &str {
        "seed_achievement_templates"
    }

    fn description(&self) -> Option<&str> {
        Some("Seed two achievement templates")
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        let records = Self::templates()
            .iter()
            .map(Entity::to_record)
            .collect::<CoreResult<Vec<_>>>()?;
        let count = ctx.batch_put(ACHIEVEMENTS, records)?;
        ctx.seeded(ACHIEVEMENTS, count);
        Ok(())
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        let count = ctx.batch_delete(ACHIEVEMENTS, Self::IDS)?;
        ctx.removed(ACHIEVEMENTS, count);
        Ok(())
    }

    fn supports_rollback(&self) -> bool {
        true
    }
}

/// Version 2: defaults `preferences.privacy.allowAnalytics` to `true` on
/// every user that has no value for it.
///
/// The ids it touched are remembered so that rolling back only removes
/// values this migration added.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnalyticsDefault;

impl AllowAnalyticsDefault {
    /// Field path being defaulted.
    pub const FIELD: &'static str = "preferences.privacy.allowAnalytics";
    /// Cache key listing the users that received the default.
    pub const TOUCHED_KEY: &'static str = "migrations:2:defaulted";
}

impl Migration for AllowAnalyticsDefault {
    fn version(&self) -> MigrationVersion {
        2
    }

    fn name(&self) -> &str {
        "default_allow_analytics"
    }

    fn description(&self) -> Option<&str> {
        Some("Add allowAnalytics default to all users")
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        let mut touched = Vec::new();
        let mut updated: Vec<Record> = Vec::new();
        for mut user in ctx.get_all(USERS, None, None)? {
            if user.get_path(Self::FIELD).is_some_and(|v| !v.is_null()) {
                continue;
            }
            user.set_path(Self::FIELD, Value::Bool(true));
            if let Some(id) = user.id() {
                touched.push(Value::from(id));
            }
            updated.push(user);
        }

        let count =
            ctx.batch_put_with_cache(USERS, updated, Self::TOUCHED_KEY, Value::Array(touched))?;
        ctx.updated(USERS, count);
        Ok(())
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        let touched: Vec<String> = match ctx.get_cache(Self::TOUCHED_KEY)? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };

        let mut reverted = Vec::new();
        for id in &touched {
            if let Some(mut user) = ctx.get(USERS, id)? {
                user.remove_path(Self::FIELD);
                reverted.push(user);
            }
        }

        let count = ctx.batch_put(USERS, reverted)?;
        ctx.remove_cache(Self::TOUCHED_KEY)?;
        ctx.updated(USERS, count);
        Ok(())
    }

    fn supports_rollback(&self) -> bool {
        true
    }
}
