// src/core/object_store/merge.rs

//! The `extendObject` deep merge: objects merge key-wise, arrays and scalars
//! are replaced, and an explicit `null` in the patch deletes the
//! corresponding path only when that key is on the `preserveSettings` list.

use serde_json::Value;

/// Recursively merges `patch` into `base` in place.
///
/// `preserve` lists the top-level keys (dotted one level, e.g. `"name"`)
/// for which an explicit `null` in the patch deletes the key from `base`
/// rather than being stored literally. This mirrors `setObject`'s
/// `preserveSettings` option; `extendObject` itself applies no
/// preservation, so callers pass an empty slice from `extend_object`.
pub fn deep_merge(base: &mut Value, patch: &Value, preserve: &[String]) {
    merge_inner(base, patch, preserve, "");
}

fn merge_inner(base: &mut Value, patch: &Value, preserve: &[String], path: &str) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };

                if patch_value.is_null() && preserve.iter().any(|p| p == &child_path) {
                    base_map.remove(key);
                    continue;
                }

                match base_map.get_mut(key) {
                    Some(existing) if patch_value.is_object() && existing.is_object() => {
                        merge_inner(existing, patch_value, preserve, &child_path);
                    }
                    _ => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}
