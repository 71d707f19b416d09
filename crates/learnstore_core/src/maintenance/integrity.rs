//! Integrity validation across application collections.

use super::Maintenance;
use crate::entity::EntityKind;
use crate::error::{CoreError, CoreResult};
use crate::types::{parse_iso, Record, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Field holding a progress percentage.
const COMPLETION_FIELD: &str = "completionPercentage";

/// One problem found by [`Maintenance::validate_data_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityIssue {
    /// `collection/id` of the offending record, or the collection name.
    pub entity: String,
    /// What is wrong.
    pub reason: String,
}

impl IntegrityIssue {
    fn new(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Converts the issue into an `IntegrityViolation` error.
    #[must_use]
    pub fn into_error(self) -> CoreError {
        CoreError::integrity_violation(self.entity, self.reason)
    }
}

/// Result of [`Maintenance::validate_data_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// True when there are no errors. Warnings do not count.
    pub valid: bool,
    /// Broken invariants.
    pub errors: Vec<IntegrityIssue>,
    /// Suspicious but tolerated data, such as dangling owner ids.
    pub warnings: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// Returns the first error as an `IntegrityViolation`.
    pub fn into_result(self) -> CoreResult<()> {
        match self.errors.into_iter().next() {
            Some(issue) => Err(issue.into_error()),
            None => Ok(()),
        }
    }
}

impl Maintenance {
    /// Checks every application collection.
    ///
    /// Errors: missing or null required fields, completion percentages
    /// outside `[0, 100]`, null owner ids and unreadable collections.
    /// Warnings: owner ids naming no user and timestamps that do not parse
    /// or run backwards.
    pub fn validate_data_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        let mut users: Option<BTreeSet<String>> = None;

        for kind in EntityKind::ALL {
            let name = kind.collection_name();
            let records = match self.engine.get_all(name, None, None) {
                Ok(records) => records,
                Err(err) => {
                    report.errors.push(IntegrityIssue::new(name, err.to_string()));
                    continue;
                }
            };
            if kind == EntityKind::Users {
                users = Some(records.iter().filter_map(Record::id).map(str::to_string).collect());
            }
            for record in &records {
                check_record(kind, record, users.as_ref(), &mut report);
            }
        }

        report.valid = report.errors.is_empty();
        tracing::info!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "integrity validation finished"
        );
        report
    }
}

fn check_record(
    kind: EntityKind,
    record: &Record,
    users: Option<&BTreeSet<String>>,
    report: &mut IntegrityReport,
) {
    let name = kind.collection_name();
    let entity = format!("{name}/{}", record.id().unwrap_or("<no id>"));
    if record.id().is_none() {
        report
            .errors
            .push(IntegrityIssue::new(&entity, "record has no string id"));
    }

    for field in kind.required_fields() {
        if record.get(field).map_or(true, Value::is_null) {
            report.errors.push(IntegrityIssue::new(
                &entity,
                format!("missing required field {field}"),
            ));
        }
    }

    if kind == EntityKind::Progress {
        if let Some(value) = record.get(COMPLETION_FIELD) {
            match value.as_f64() {
                Some(pct) if (0.0..=100.0).contains(&pct) => {}
                _ => report.errors.push(IntegrityIssue::new(
                    &entity,
                    format!("{COMPLETION_FIELD} {value} is outside [0, 100]"),
                )),
            }
        }
    }

    if let (Some(owner), Some(users)) = (kind.owner_field(), users) {
        if let Some(owner_id) = record.get_str(owner) {
            if !users.contains(owner_id) {
                report.warnings.push(IntegrityIssue::new(
                    &entity,
                    format!("{owner} {owner_id} names no user"),
                ));
            }
        }
    }

    for field in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
        if let Some(value) = record.get(field) {
            if value.as_str().and_then(parse_iso).is_none() {
                report
                    .warnings
                    .push(IntegrityIssue::new(&entity, format!("{field} {value} is not ISO-8601")));
            }
        }
    }
    let created = record.created_at().and_then(parse_iso);
    let updated = record.updated_at().and_then(parse_iso);
    if let (Some(created), Some(updated)) = (created, updated) {
        if updated < created {
            report.warnings.push(IntegrityIssue::new(
                &entity,
                format!("{UPDATED_AT_FIELD} is before {CREATED_AT_FIELD}"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::Engine;
    use serde_json::json;
    use std::sync::Arc;

    fn maintenance() -> Maintenance {
        let engine = Arc::new(Engine::in_memory(Config::default()));
        engine.initialize().unwrap();
        Maintenance::new(engine)
    }

    #[test]
    fn clean_store_is_valid() {
        let m = maintenance();
        m.engine()
            .put(
                "users",
                json!({"id": "u1", "email": "a@x.io", "username": "a",
                       "createdAt": "2024-01-01T00:00:00.000Z",
                       "updatedAt": "2024-01-02T00:00:00.000Z"}),
            )
            .unwrap();
        m.engine()
            .put(
                "progress",
                json!({"id": "p1", "userId": "u1", "lessonId": "l1", "completionPercentage": 100}),
            )
            .unwrap();

        let report = m.validate_data_integrity();
        assert!(report.valid, "{report:?}");
        assert!(report.warnings.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn broken_invariants_are_errors() {
        let m = maintenance();
        m.engine()
            .put(
                "progress",
                json!({"id": "p1", "userId": null, "lessonId": "l1", "completionPercentage": 140}),
            )
            .unwrap();

        let report = m.validate_data_integrity();
        assert!(!report.valid);
        let reasons: Vec<_> = report.errors.iter().map(|e| e.reason.as_str()).collect();
        assert!(reasons.contains(&"missing required field userId"));
        assert!(reasons.iter().any(|r| r.starts_with("completionPercentage 140")));
        assert!(matches!(
            report.into_result(),
            Err(CoreError::IntegrityViolation { ref entity, .. }) if entity == "progress/p1"
        ));
    }

    #[test]
    fn dangling_owners_and_bad_timestamps_are_warnings() {
        let m = maintenance();
        m.engine()
            .put(
                "projects",
                json!({"id": "j1", "userId": "ghost", "title": "t", "createdAt": "yesterday"}),
            )
            .unwrap();

        let report = m.validate_data_integrity();
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().all(|w| w.entity == "projects/j1"));
    }
}
