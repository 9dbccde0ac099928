//! Security configuration carried by every identifiable entity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::fingerprint::Fingerprint;

/// Wraps the fingerprint an entity was stamped with. Kept as a struct so
/// further security settings can ride along without touching every call
/// site.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Identity stamp of the owning entity.
    pub fingerprint: Fingerprint,
}

impl SecurityConfig {
    /// New config with a fresh random fingerprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// New config around an existing fingerprint.
    pub fn with_fingerprint(fingerprint: Fingerprint) -> Self {
        Self { fingerprint }
    }

    /// Serialize to a dictionary.
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "fingerprint".to_string(),
            serde_json::to_value(self.fingerprint.to_dict()).unwrap_or_default(),
        );
        map
    }

    /// Rebuild from a dictionary, falling back to a fresh fingerprint when
    /// the field is absent.
    pub fn from_dict(data: &HashMap<String, serde_json::Value>) -> Result<Self, String> {
        let fingerprint = match data.get("fingerprint") {
            Some(value) => {
                let map: HashMap<String, serde_json::Value> =
                    serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
                Fingerprint::from_dict(&map)?
            }
            None => Fingerprint::default(),
        };
        Ok(Self { fingerprint })
    }
}
