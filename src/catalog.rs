//! Device catalog: friendly names mapped to hub entity identifiers

use indexmap::IndexMap;

use crate::{Error, Result};

/// Immutable mapping of friendly device names to entity IDs
///
/// Keeps the order in which devices were configured so the prompt lists
/// them the way the user wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCatalog {
    entries: IndexMap<String, String>,
}

impl DeviceCatalog {
    /// Parse a catalog from a JSON object of `name -> entity_id`
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a JSON object whose values are all strings
    pub fn from_json(json: &str) -> Result<Self> {
        // IndexMap keeps document order, serde_json's Map would sort keys
        let map: IndexMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| Error::Catalog(format!("expected a JSON object of names: {e}")))?;

        let mut entries = IndexMap::with_capacity(map.len());
        for (name, entity) in map {
            let serde_json::Value::String(entity_id) = entity else {
                return Err(Error::Catalog(format!(
                    "entity id for \"{name}\" must be a string"
                )));
            };
            entries.insert(name, entity_id);
        }

        let catalog = Self { entries };
        if catalog.is_empty() {
            tracing::warn!("device catalog is empty");
        } else {
            tracing::debug!(devices = catalog.len(), "device catalog loaded");
        }

        Ok(catalog)
    }

    /// Number of devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no devices
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entity ID by friendly name
    #[must_use]
    pub fn entity_id(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Iterate `(name, entity_id)` pairs in configured order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<N: Into<String>, E: Into<String>> FromIterator<(N, E)> for DeviceCatalog {
    fn from_iter<T: IntoIterator<Item = (N, E)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, e)| (n.into(), e.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order() {
        let catalog = DeviceCatalog::from_json(
            r#"{"kitchen light": "switch.kitchen_light", "tv": "media_player.living_room"}"#,
        )
        .unwrap();

        let names: Vec<_> = catalog.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["kitchen light", "tv"]);
        assert_eq!(catalog.entity_id("tv"), Some("media_player.living_room"));
    }

    #[test]
    fn test_empty_catalog_is_allowed() {
        let catalog = DeviceCatalog::from_json("{}").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_malformed_catalog_rejected() {
        assert!(matches!(
            DeviceCatalog::from_json("{not json"),
            Err(Error::Catalog(_))
        ));
        assert!(matches!(
            DeviceCatalog::from_json(r#"["switch.kitchen"]"#),
            Err(Error::Catalog(_))
        ));
        assert!(matches!(
            DeviceCatalog::from_json(r#"{"lamp": 3}"#),
            Err(Error::Catalog(_))
        ));
    }
}
