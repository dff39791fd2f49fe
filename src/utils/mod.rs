//! Utility functions and helpers.

pub mod hash;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Runs of anything that is not a letter, a digit, `+` or `#`.
static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}+#]+").expect("valid slug pattern"));

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduce text to a lowercase, dash-separated slug.
///
/// `+` and `#` survive so that names like "C++" and "C#" stay apart.
///
/// # Examples
/// ```
/// use tracker::utils::slugify;
///
/// assert_eq!(slugify("San Francisco, CA"), "san-francisco-ca");
/// assert_eq!(slugify("C# Developer"), "c#-developer");
/// ```
pub fn slugify(s: &str) -> String {
    let lowered = s.to_lowercase();
    NON_SLUG
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Text of a scalar JSON value. `None` for arrays and objects.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Short name of a JSON value's type, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "bool",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
