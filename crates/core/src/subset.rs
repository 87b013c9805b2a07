//! Object-subset matching
//!
//! Answers "does this cached resource satisfy these creation arguments":
//! every field present in the required object must hold an equal value in
//! the actual object. Fields only the actual object has are ignored.
//!
//! Matching is one level deep. A nested object or array in `required` is not
//! itself matched as a subset; it must equal the actual field as a whole.

use serde::Serialize;
use serde_json::Value;

/// Check that every field of `required` appears in `actual` with an equal value.
///
/// Non-object inputs degrade gracefully: a `null` requirement is satisfied
/// by anything, any other scalar requirement must equal `actual`.
pub fn is_subset_of(required: &Value, actual: &Value) -> bool {
    match (required, actual) {
        (Value::Object(required), Value::Object(actual)) => required
            .iter()
            .all(|(key, value)| actual.get(key) == Some(value)),
        (Value::Object(required), _) => required.is_empty(),
        (Value::Null, _) => true,
        (required, actual) => required == actual,
    }
}

/// Serialize both sides and apply [`is_subset_of`].
///
/// Returns `false` when either side fails to serialize.
pub fn options_match<O, D>(options: &O, data: &D) -> bool
where
    O: Serialize + ?Sized,
    D: Serialize + ?Sized,
{
    match (serde_json::to_value(options), serde_json::to_value(data)) {
        (Ok(required), Ok(actual)) => is_subset_of(&required, &actual),
        _ => false,
    }
}
