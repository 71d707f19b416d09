//! Collection and index declarations.

use serde::{Deserialize, Serialize};

/// Which record field, or fields, an index is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// A single (possibly dotted) field path.
    Field(String),
    /// An ordered tuple of field paths.
    Composite(Vec<String>),
}

impl KeyPath {
    /// Returns the field paths making up the key.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Field(field) => vec![field.as_str()],
            Self::Composite(fields) => fields.iter().map(String::as_str).collect(),
        }
    }
}

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Name used by lookups (`getAllByIndex("progress", "userLesson", ..)`).
    pub name: String,
    /// Field(s) the index is keyed on.
    pub key_path: KeyPath,
    /// Whether two records may share a key.
    pub unique: bool,
}

impl IndexDefinition {
    /// Declares a non-unique index on one field.
    pub fn field(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: KeyPath::Field(field.into()),
            unique: false,
        }
    }

    /// Declares a non-unique index on a tuple of fields.
    pub fn composite<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            key_path: KeyPath::Composite(fields.into_iter().map(Into::into).collect()),
            unique: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A named collection and the indexes declared on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Secondary indexes.
    pub indexes: Vec<IndexDefinition>,
}

impl CollectionSchema {
    /// Declares a collection with no secondary indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds an index declaration.
    #[must_use]
    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Finds an index declaration by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|idx| idx.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_declares_indexes() {
        let schema = CollectionSchema::new("progress")
            .with_index(IndexDefinition::field("userId", "userId"))
            .with_index(IndexDefinition::composite("userLesson", ["userId", "lessonId"]));

        assert_eq!(schema.indexes.len(), 2);
        assert_eq!(
            schema.index("userLesson").unwrap().key_path.fields(),
            vec!["userId", "lessonId"]
        );
        assert!(schema.index("email").is_none());
    }

    #[test]
    fn key_paths_serialize_like_indexeddb() {
        let single = serde_json::to_value(KeyPath::Field("email".into())).unwrap();
        let composite =
            serde_json::to_value(KeyPath::Composite(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(single, serde_json::json!("email"));
        assert_eq!(composite, serde_json::json!(["a", "b"]));
    }
}
