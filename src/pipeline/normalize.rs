//! Entity normalization.
//!
//! Turns raw adapter records into entities with a stable id and a content
//! fingerprint. Normalization is pure: the same record and policy always
//! produce the same entity.

use serde_json::Value;

use crate::error::RecordError;
use crate::models::{Attributes, Collection, Entity};
use crate::pipeline::policy::EntityPolicy;
use crate::utils::hash::sha256_hex;
use crate::utils::value_kind;

/// A normalized record plus the data-quality notes it raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub entity: Entity,
    /// Natural-key fields that were empty
    pub missing_key_fields: Vec<String>,
}

/// Fingerprint of already-normalized content text. Empty content has an
/// empty fingerprint so that "no content" never reads as a change.
pub fn fingerprint(content: &str) -> String {
    if content.is_empty() {
        String::new()
    } else {
        sha256_hex(content)
    }
}

/// Normalize one raw record under a category policy.
pub fn normalize(
    record: &Value,
    policy: &dyn EntityPolicy,
) -> std::result::Result<Normalized, RecordError> {
    let attributes = to_attributes(record, policy)?;
    let identity = policy.identity(&attributes)?;
    let content = policy.content(&attributes)?;

    Ok(Normalized {
        entity: Entity {
            id: identity.id,
            fingerprint: fingerprint(&content),
            attributes,
        },
        missing_key_fields: identity.missing,
    })
}

fn to_attributes(
    record: &Value,
    policy: &dyn EntityPolicy,
) -> std::result::Result<Attributes, RecordError> {
    match record {
        Value::Object(map) => Ok(map.clone()),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => match policy.scalar_field() {
            Some(field) => {
                let mut map = Attributes::new();
                map.insert(field.to_string(), record.clone());
                Ok(map)
            }
            None => Err(RecordError::NotAnObject(value_kind(record))),
        },
        Value::Null | Value::Array(_) => Err(RecordError::NotAnObject(value_kind(record))),
    }
}

/// Outcome of normalizing a whole batch of raw records.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub collection: Collection,
    /// Index and reason of every record left out
    pub skipped: Vec<(usize, RecordError)>,
    /// Ids that appeared more than once (later record kept)
    pub duplicates: Vec<String>,
    /// Index, id and missing fields of records with a degenerate key
    pub missing_keys: Vec<(usize, String, Vec<String>)>,
}

/// Normalize every record, skipping the ones that fail.
pub fn normalize_all(records: &[Value], policy: &dyn EntityPolicy) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, record) in records.iter().enumerate() {
        match normalize(record, policy) {
            Ok(normalized) => {
                if !normalized.missing_key_fields.is_empty() {
                    batch.missing_keys.push((
                        index,
                        normalized.entity.id.clone(),
                        normalized.missing_key_fields,
                    ));
                }
                let id = normalized.entity.id.clone();
                if batch.collection.insert(normalized.entity).is_some() {
                    batch.duplicates.push(id);
                }
            }
            Err(error) => batch.skipped.push((index, error)),
        }
    }

    batch
}
