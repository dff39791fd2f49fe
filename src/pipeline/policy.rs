//! Per-category identity and content rules.
//!
//! Every category is compared by the same engine; what differs is how an id
//! and a fingerprint are pulled out of a record. That knowledge lives behind
//! [`EntityPolicy`]. [`FieldPolicy`] covers the common case of naming fields.
//!
//! Built-in categories:
//!
//! | category   | id                                   | fingerprint    |
//! |------------|--------------------------------------|----------------|
//! | `post`     | `path` if present, else title + date | `excerpt`      |
//! | `position` | title + location                     | `description`  |
//! | `member`   | name                                 | none           |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, RecordError, Result};
use crate::models::{Attributes, CategoryConfig};
use crate::utils::{normalize_whitespace, scalar_text, slugify, value_kind};

/// Separator placed between the slugs of natural-key fields.
pub const KEY_SEPARATOR: &str = "__";

/// Id given to records whose natural key is entirely empty.
pub const UNKEYED_ID: &str = "unkeyed";

/// Identity derived from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    /// Natural-key fields that were empty or absent
    pub missing: Vec<String>,
}

/// Strategy for deriving identity, content and display fields of a category.
pub trait EntityPolicy: Send + Sync + fmt::Debug {
    /// Category this policy applies to.
    fn category(&self) -> &str;

    /// Derive the stable id of a record.
    fn identity(&self, attributes: &Attributes) -> std::result::Result<Identity, RecordError>;

    /// Whitespace-normalized content text. Empty when there is none.
    fn content(&self, attributes: &Attributes) -> std::result::Result<String, RecordError>;

    /// Fields worth showing next to a change.
    fn display(&self, attributes: &Attributes) -> Attributes;

    /// Field a bare scalar record is stored under, if the category accepts them.
    fn scalar_field(&self) -> Option<&str> {
        None
    }

    /// Whether change records carry before/after content text.
    fn carries_content(&self) -> bool {
        false
    }
}

/// Policy described entirely by field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    category: String,
    key_fields: Vec<String>,
    content_fields: Vec<String>,
    display_fields: Vec<String>,
    stable_key_field: Option<String>,
    scalar_field: Option<String>,
    include_content: bool,
}

impl FieldPolicy {
    pub fn new(category: impl Into<String>, key_fields: &[&str]) -> Self {
        Self {
            category: category.into(),
            key_fields: to_strings(key_fields),
            content_fields: Vec::new(),
            display_fields: Vec::new(),
            stable_key_field: None,
            scalar_field: None,
            include_content: false,
        }
    }

    pub fn content_fields(mut self, fields: &[&str]) -> Self {
        self.content_fields = to_strings(fields);
        self
    }

    pub fn display_fields(mut self, fields: &[&str]) -> Self {
        self.display_fields = to_strings(fields);
        self
    }

    pub fn stable_key_field(mut self, field: &str) -> Self {
        self.stable_key_field = Some(field.to_string());
        self
    }

    pub fn scalar_field(mut self, field: &str) -> Self {
        self.scalar_field = Some(field.to_string());
        self
    }

    pub fn include_content(mut self, include: bool) -> Self {
        self.include_content = include;
        self
    }

    /// Blog posts: keyed by permanent path when the source gives one,
    /// otherwise by title and publication date.
    pub fn post() -> Self {
        Self::new("post", &["title", "date"])
            .stable_key_field("path")
            .content_fields(&["excerpt"])
            .display_fields(&["title", "url", "date"])
            .include_content(true)
    }

    /// Job positions: keyed by title and location, changed when the
    /// description text changes.
    pub fn position() -> Self {
        Self::new("position", &["title", "location"])
            .content_fields(&["description"])
            .display_fields(&["title", "location", "compensation"])
            .include_content(true)
    }

    /// Team members: a bare list of names.
    pub fn member() -> Self {
        Self::new("member", &["name"])
            .display_fields(&["name"])
            .scalar_field("name")
    }

    fn field_text(
        attributes: &Attributes,
        field: &str,
    ) -> std::result::Result<String, RecordError> {
        match attributes.get(field) {
            None => Ok(String::new()),
            Some(value) => scalar_text(value).ok_or_else(|| RecordError::NonScalarField {
                field: field.to_string(),
                kind: value_kind(value),
            }),
        }
    }
}

impl From<&CategoryConfig> for FieldPolicy {
    fn from(config: &CategoryConfig) -> Self {
        Self {
            category: config.name.clone(),
            key_fields: config.key_fields.clone(),
            content_fields: config.content_fields.clone(),
            display_fields: config.display_fields.clone(),
            stable_key_field: config.stable_key_field.clone(),
            scalar_field: config.scalar_field.clone(),
            include_content: config.include_content,
        }
    }
}

impl EntityPolicy for FieldPolicy {
    fn category(&self) -> &str {
        &self.category
    }

    fn identity(&self, attributes: &Attributes) -> std::result::Result<Identity, RecordError> {
        if let Some(field) = &self.stable_key_field {
            let stable = Self::field_text(attributes, field)?;
            let stable = stable.trim();
            if !stable.is_empty() {
                return Ok(Identity {
                    id: stable.to_string(),
                    missing: Vec::new(),
                });
            }
        }

        let mut parts = Vec::with_capacity(self.key_fields.len());
        let mut missing = Vec::new();
        for field in &self.key_fields {
            let text = normalize_whitespace(&Self::field_text(attributes, field)?);
            if text.is_empty() {
                missing.push(field.clone());
            }
            parts.push(slugify(&text));
        }

        // Slug each field on its own so the separator marks field boundaries.
        let id = if parts.iter().all(String::is_empty) {
            UNKEYED_ID.to_string()
        } else {
            parts.join(KEY_SEPARATOR)
        };
        Ok(Identity { id, missing })
    }

    fn content(&self, attributes: &Attributes) -> std::result::Result<String, RecordError> {
        let mut parts = Vec::with_capacity(self.content_fields.len());
        for field in &self.content_fields {
            parts.push(normalize_whitespace(&Self::field_text(attributes, field)?));
        }
        if parts.iter().all(String::is_empty) {
            return Ok(String::new());
        }
        Ok(parts.join("\n"))
    }

    fn display(&self, attributes: &Attributes) -> Attributes {
        self.display_fields
            .iter()
            .filter_map(|field| {
                attributes
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect()
    }

    fn scalar_field(&self) -> Option<&str> {
        self.scalar_field.as_deref()
    }

    fn carries_content(&self) -> bool {
        self.include_content
    }
}

fn to_strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// Lookup table from category name to policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn EntityPolicy>>,
}

impl PolicyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `post`, `position` and `member`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(FieldPolicy::post());
        registry.register(FieldPolicy::position());
        registry.register(FieldPolicy::member());
        registry
    }

    /// Built-ins plus the configured categories, which win on name clashes.
    pub fn from_config(categories: &[CategoryConfig]) -> Self {
        let mut registry = Self::with_builtins();
        for category in categories {
            registry.register(FieldPolicy::from(category));
        }
        registry
    }

    /// Register a policy, replacing any existing one for the same category.
    pub fn register(&mut self, policy: impl EntityPolicy + 'static) {
        self.policies
            .insert(policy.category().to_string(), Arc::new(policy));
    }

    pub fn get(&self, category: &str) -> Result<Arc<dyn EntityPolicy>> {
        self.policies
            .get(category)
            .cloned()
            .ok_or_else(|| AppError::UnknownCategory(category.to_string()))
    }

    /// Registered category names, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
