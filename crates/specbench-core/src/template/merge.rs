//! Parent/child deep merge with array-replace semantics.

use serde_json::Value;

/// Merge `child` over `parent`, returning a new document.
///
/// - key only in parent: parent value kept
/// - child value is an array: child array replaces parent array entirely
/// - both values are objects: merged recursively
/// - anything else: child value wins
///
/// Arrays are never unioned element-wise; a child that redeclares a list
/// must repeat every element it wants to keep.
pub fn deep_merge(parent: &Value, child: &Value) -> Value {
    match (parent, child) {
        (Value::Object(p), Value::Object(c)) => {
            let mut merged = p.clone();
            for (key, child_value) in c {
                let next = match merged.get(key) {
                    Some(parent_value) => deep_merge(parent_value, child_value),
                    None => child_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, child) => child.clone(),
    }
}
