//! Query descriptions for index lookups and ordered scans.

use crate::error::{CoreError, CoreResult};
use crate::index::IndexKey;
use serde_json::Value;
use std::ops::Bound;

/// Scan direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    /// Smallest key first.
    #[default]
    Ascending,
    /// Largest key first.
    Descending,
}

/// Equality filter on a declared index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFilter {
    /// Index name.
    pub index: String,
    /// Value the key must equal. Composite indexes take an array.
    pub value: Value,
}

impl IndexFilter {
    /// Creates a filter.
    pub fn new(index: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            index: index.into(),
            value: value.into(),
        }
    }
}

/// Bounds on the keys a scan visits.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    /// Lower bound.
    pub lower: Bound<Value>,
    /// Upper bound.
    pub upper: Bound<Value>,
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

impl KeyRange {
    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key.
    pub fn only(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            lower: Bound::Included(value.clone()),
            upper: Bound::Included(value),
        }
    }

    /// Keys `>= value`.
    pub fn at_least(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Included(value.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Keys `> value`.
    pub fn greater_than(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Excluded(value.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Keys `<= value`.
    pub fn at_most(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Included(value.into()),
        }
    }

    /// Keys `< value`.
    pub fn less_than(value: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(value.into()),
        }
    }

    /// Keys in `[lower, upper]`.
    pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self {
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    /// Converts both bounds to index keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if a bound is not an indexable value.
    pub fn to_keys(&self) -> CoreResult<(Bound<IndexKey>, Bound<IndexKey>)> {
        Ok((bound_key(&self.lower)?, bound_key(&self.upper)?))
    }
}

fn bound_key(bound: &Bound<Value>) -> CoreResult<Bound<IndexKey>> {
    let key = |value: &Value| {
        IndexKey::from_json(value).ok_or_else(|| {
            CoreError::invalid_operation(format!("{value} cannot bound an index range"))
        })
    };
    Ok(match bound {
        Bound::Included(value) => Bound::Included(key(value)?),
        Bound::Excluded(value) => Bound::Excluded(key(value)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}

/// An ordered scan over one index, or over ids when no index is named.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Index to scan; `None` scans in id order.
    pub index: Option<String>,
    /// Scan direction.
    pub direction: Direction,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
    /// Key bounds.
    pub range: KeyRange,
}

impl QueryOptions {
    /// Scans `index` in ascending order.
    pub fn index(index: impl Into<String>) -> Self {
        Self {
            index: Some(index.into()),
            ..Self::default()
        }
    }

    /// Scans in id order.
    #[must_use]
    pub fn by_id() -> Self {
        Self::default()
    }

    /// Sets the direction.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Scans largest key first.
    #[must_use]
    pub fn descending(self) -> Self {
        self.direction(Direction::Descending)
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restricts the scan to `range`.
    #[must_use]
    pub fn range(mut self, range: KeyRange) -> Self {
        self.range = range;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ranges_convert_to_keys() {
        let (lo, hi) = KeyRange::between(1, 5).to_keys().unwrap();
        assert_eq!(lo, Bound::Included(IndexKey::number(1.0)));
        assert_eq!(hi, Bound::Included(IndexKey::number(5.0)));

        let (lo, hi) = KeyRange::greater_than("m").to_keys().unwrap();
        assert_eq!(lo, Bound::Excluded(IndexKey::Text("m".into())));
        assert_eq!(hi, Bound::Unbounded);
    }

    #[test]
    fn null_bounds_are_rejected() {
        assert!(matches!(
            KeyRange::at_most(json!(null)).to_keys(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn options_builder() {
        let options = QueryOptions::index("createdAt").descending().limit(5);
        assert_eq!(options.index.as_deref(), Some("createdAt"));
        assert_eq!(options.direction, Direction::Descending);
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.range, KeyRange::all());
    }
}
