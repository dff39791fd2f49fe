//! Entity, Collection and SourceKey data structures.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AppError, Result};

/// Ordered mapping of category-specific fields.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Identifies one tracked listing: a source (e.g. a company) and a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceKey {
    source: String,
    category: String,
}

impl SourceKey {
    /// Create a key, rejecting names that are unsafe as storage path segments.
    pub fn new(source: impl Into<String>, category: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let category = category.into();
        validate_segment("source", &source)?;
        validate_segment("category", &category)?;
        Ok(Self { source, category })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Relative storage location: `{source}/{category}.json`.
    pub fn storage_path(&self) -> String {
        format!("{}/{}.json", self.source, self.category)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.category)
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AppError::validation(format!("{what} name is empty")));
    }
    if value.starts_with('.') {
        return Err(AppError::validation(format!(
            "{what} name '{value}' must not start with '.'"
        )));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(AppError::validation(format!(
            "{what} name '{value}' may only contain ASCII letters, digits, '-', '_' and '.'"
        )));
    }
    Ok(())
}

/// One observed item with a stable identity and a content fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier derived from natural-key fields
    pub id: String,

    /// Content hash, empty when the category has no content
    #[serde(default)]
    pub fingerprint: String,

    /// Category-specific fields as observed
    #[serde(default)]
    pub attributes: Attributes,
}

impl Entity {
    pub fn new(id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fingerprint: fingerprint.into(),
            attributes: Attributes::new(),
        }
    }

    /// Attach an attribute (builder style).
    pub fn with_attr(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

/// Entities observed for one key at one point in time, unique by id.
///
/// Keeps observation order. Inserting an id that is already present replaces
/// the earlier entity in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, returning the one it replaced if the id was taken.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        match self.index.get(&entity.id) {
            Some(&pos) => Some(std::mem::replace(&mut self.entities[pos], entity)),
            None => {
                self.index.insert(entity.id.clone(), self.entities.len());
                self.entities.push(entity);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&pos| &self.entities[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.id.as_str())
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut collection = Collection::new();
        for entity in iter {
            collection.insert(entity);
        }
        collection
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entities.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Collection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let entities = Vec::<Entity>::deserialize(deserializer)?;
        Ok(entities.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_key_accepts_simple_names() {
        let key = SourceKey::new("skild_ai", "position").unwrap();
        assert_eq!(key.storage_path(), "skild_ai/position.json");
        assert_eq!(key.to_string(), "skild_ai/position");
    }

    #[test]
    fn test_source_key_rejects_path_segments() {
        assert!(SourceKey::new("../etc", "position").is_err());
        assert!(SourceKey::new("acme", "a/b").is_err());
        assert!(SourceKey::new("", "post").is_err());
        assert!(SourceKey::new(".hidden", "post").is_err());
    }

    #[test]
    fn test_collection_last_write_wins_in_place() {
        let mut collection = Collection::new();
        collection.insert(Entity::new("a", "h1"));
        collection.insert(Entity::new("b", "h2"));
        let replaced = collection.insert(Entity::new("a", "h3"));

        assert_eq!(replaced.map(|e| e.fingerprint), Some("h1".to_string()));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get("a").unwrap().fingerprint, "h3");
        assert_eq!(collection.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_collection_serializes_as_sequence() {
        let collection: Collection = vec![
            Entity::new("a", "h1").with_attr("title", "A"),
            Entity::new("b", ""),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&collection).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["id"], "a");
        assert_eq!(json[0]["attributes"]["title"], "A");

        let back: Collection = serde_json::from_value(json).unwrap();
        assert_eq!(back, collection);
    }

    #[test]
    fn test_entity_defaults_missing_fingerprint() {
        let entity: Entity = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(entity.fingerprint, "");
        assert!(entity.attributes.is_empty());
    }
}
