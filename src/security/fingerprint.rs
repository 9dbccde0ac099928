//! Fingerprints: stable identity stamps for agents, tasks, and crews.
//!
//! A fingerprint is a UUID string (random v4, or deterministic v5 when
//! derived from a seed under the project namespace), a creation timestamp,
//! and a shallow metadata map. Fingerprints are created at entity
//! construction and never mutated afterwards except through explicit
//! replacement of the whole stamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::constants::troupe_namespace;

/// Metadata is capped at 10 KiB once serialized.
pub const MAX_METADATA_BYTES: usize = 10 * 1024;

/// Identity stamp attached to agents, tasks, and crews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    uuid_str: String,
    created_at: DateTime<Utc>,
    /// Shallow metadata map. Values must not be objects (depth limit 1).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Fingerprint {
    /// Generate a fingerprint. With a seed the UUID is deterministic (v5
    /// under the project namespace); without one it is random (v4).
    ///
    /// # Panics
    ///
    /// Panics if the metadata violates [`validate_metadata`](Self::validate_metadata).
    pub fn generate(
        seed: Option<&str>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Self {
        let uuid_str = match seed {
            Some(s) => Uuid::new_v5(&troupe_namespace(), s.as_bytes()).to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let metadata = metadata.unwrap_or_default();
        Self::validate_metadata(&metadata).expect("invalid fingerprint metadata");
        Self {
            uuid_str,
            created_at: Utc::now(),
            metadata,
        }
    }

    /// Check the metadata constraints: serialized size at most 10 KiB, and
    /// no object values (depth limit 1).
    pub fn validate_metadata(
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<(), String> {
        let serialized = serde_json::to_string(metadata).map_err(|e| e.to_string())?;
        if serialized.len() > MAX_METADATA_BYTES {
            return Err(format!(
                "metadata exceeds maximum size of {} bytes",
                MAX_METADATA_BYTES
            ));
        }
        for (key, value) in metadata {
            if value.is_object() {
                return Err(format!(
                    "metadata value for key '{}' exceeds depth limit of 1",
                    key
                ));
            }
        }
        Ok(())
    }

    /// The UUID as a string.
    pub fn uuid_str(&self) -> &str {
        &self.uuid_str
    }

    /// The UUID as a parsed value.
    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.uuid_str).expect("fingerprint holds a valid uuid")
    }

    /// When this fingerprint was created.
    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    /// Rebuild a fingerprint from its dictionary form.
    pub fn from_dict(data: &HashMap<String, serde_json::Value>) -> Result<Self, String> {
        let uuid_str = data
            .get("uuid_str")
            .and_then(|v| v.as_str())
            .ok_or("missing uuid_str")?
            .to_string();
        let created_at = data
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);
        let metadata = data
            .get("metadata")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Ok(Self {
            uuid_str,
            created_at,
            metadata,
        })
    }

    /// Serialize to a dictionary.
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "uuid_str".to_string(),
            serde_json::Value::String(self.uuid_str.clone()),
        );
        map.insert(
            "created_at".to_string(),
            serde_json::Value::String(self.created_at.to_rfc3339()),
        );
        map.insert(
            "metadata".to_string(),
            serde_json::to_value(&self.metadata).unwrap_or_default(),
        );
        map
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::generate(None, None)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uuid_str)
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.uuid_str == other.uuid_str
    }
}

impl Eq for Fingerprint {}

impl std::hash::Hash for Fingerprint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid_str.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = Fingerprint::generate(Some("seed"), None);
        let b = Fingerprint::generate(Some("seed"), None);
        assert_eq!(a.uuid_str(), b.uuid_str());

        let c = Fingerprint::generate(Some("other-seed"), None);
        assert_ne!(a.uuid_str(), c.uuid_str());
    }

    #[test]
    fn unseeded_generation_is_random() {
        let a = Fingerprint::generate(None, None);
        let b = Fingerprint::generate(None, None);
        assert_ne!(a.uuid_str(), b.uuid_str());
    }

    #[test]
    fn dict_round_trip_preserves_identity() {
        let mut metadata = HashMap::new();
        metadata.insert("env".to_string(), serde_json::json!("prod"));
        let original = Fingerprint::generate(Some("round-trip"), Some(metadata));

        let restored = Fingerprint::from_dict(&original.to_dict()).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.metadata, original.metadata);
        assert_eq!(
            restored.created_at().timestamp_millis(),
            original.created_at().timestamp_millis()
        );
    }

    #[test]
    fn metadata_at_limit_is_accepted() {
        // Build a map whose serialized form lands exactly on the cap.
        let mut metadata = HashMap::new();
        let overhead = serde_json::to_string(&{
            let mut m = HashMap::new();
            m.insert("k".to_string(), serde_json::json!(""));
            m
        })
        .unwrap()
        .len();
        let filler = "x".repeat(MAX_METADATA_BYTES - overhead);
        metadata.insert("k".to_string(), serde_json::json!(filler));

        let serialized = serde_json::to_string(&metadata).unwrap();
        assert_eq!(serialized.len(), MAX_METADATA_BYTES);
        assert!(Fingerprint::validate_metadata(&metadata).is_ok());

        // One byte more tips it over.
        metadata.insert("k".to_string(), serde_json::json!(format!("{}x", filler)));
        assert!(Fingerprint::validate_metadata(&metadata).is_err());
    }

    #[test]
    fn nested_metadata_is_rejected() {
        let mut metadata = HashMap::new();
        metadata.insert("nested".to_string(), serde_json::json!({"a": 1}));
        assert!(Fingerprint::validate_metadata(&metadata).is_err());

        let mut flat = HashMap::new();
        flat.insert("list".to_string(), serde_json::json!([1, 2, 3]));
        flat.insert("num".to_string(), serde_json::json!(42));
        assert!(Fingerprint::validate_metadata(&flat).is_ok());
    }
}
