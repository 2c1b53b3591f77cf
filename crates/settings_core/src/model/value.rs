//! Setting values and truthiness.

use serde_json::Value;
use std::collections::BTreeMap;

/// Arbitrary JSON-compatible setting payload.
pub type SettingValue = Value;

/// Name to value projection of one resolved scope.
pub type SettingsMap = BTreeMap<String, SettingValue>;

/// Returns whether a stored value counts as present for `remember`.
///
/// `null`, `false`, numeric zero, the empty string and empty arrays/objects
/// are falsy. The string `"0"` is truthy.
pub fn is_truthy(value: &SettingValue) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
