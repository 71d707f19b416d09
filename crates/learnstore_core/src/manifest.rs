//! Store manifest.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Current manifest format version.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Metadata persisted next to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Layout version of the store directory.
    pub format_version: u32,
    /// Store name from the configuration that created it.
    pub store_name: String,
    /// Highest schema version the store has been opened with.
    pub schema_version: u32,
    /// Collections declared so far.
    #[serde(default)]
    pub collections: Vec<String>,
    /// When the journal was last compacted.
    #[serde(default)]
    pub last_vacuum: Option<String>,
}

impl Manifest {
    /// Creates a manifest for a new store.
    #[must_use]
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            store_name: store_name.into(),
            schema_version: 0,
            collections: Vec::new(),
            last_vacuum: None,
        }
    }

    /// Records a collection name. Returns true if it was new.
    pub fn declare_collection(&mut self, name: &str) -> bool {
        if self.collections.iter().any(|c| c == name) {
            return false;
        }
        self.collections.push(name.to_string());
        self.collections.sort();
        true
    }

    /// Encodes the manifest as pretty JSON.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a manifest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the bytes are not a manifest this build
    /// understands.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let manifest: Self = serde_json::from_slice(data)
            .map_err(|e| CoreError::invalid_format(format!("manifest: {e}")))?;
        if manifest.format_version > MANIFEST_FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "manifest format {} is newer than supported {}",
                manifest.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_roundtrip() {
        let mut manifest = Manifest::new("learnstore");
        manifest.schema_version = 2;
        assert!(manifest.declare_collection("users"));
        assert!(manifest.declare_collection("progress"));
        assert!(!manifest.declare_collection("users"));

        let decoded = Manifest::decode(&manifest.encode().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.collections, vec!["progress", "users"]);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = String::from_utf8(Manifest::new("x").encode().unwrap()).unwrap();
        assert!(json.contains("\"schemaVersion\""));
        assert!(json.contains("\"formatVersion\""));
    }

    #[test]
    fn newer_format_is_rejected() {
        let data = br#"{"formatVersion": 99, "storeName": "x", "schemaVersion": 1}"#;
        assert!(matches!(
            Manifest::decode(data),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn garbage_is_invalid_format() {
        assert!(matches!(
            Manifest::decode(b"EMFN\x01"),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}
