//! Recursive override merging.
//!
//! Mappings merge key by key; every other value (scalars and lists alike)
//! is replaced wholesale by the overriding value.

use serde_json::Value;

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Return `base` with `overlay` merged on top.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    let mut merged = base.clone();
    merge_into(&mut merged, overlay);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_maps_merge() {
        let base = json!({"kwargs": {"algorithms": ["gpz"]}, "x": 1});
        let overlay = json!({"kwargs": {"gpz_method": "GL"}});
        assert_eq!(
            deep_merge(&base, &overlay),
            json!({"kwargs": {"algorithms": ["gpz"], "gpz_method": "GL"}, "x": 1})
        );
    }

    #[test]
    fn test_lists_are_replaced() {
        let base = json!({"pipelines": ["all"], "x": 1});
        let overlay = json!({"pipelines": ["pz"]});
        assert_eq!(deep_merge(&base, &overlay), json!({"pipelines": ["pz"], "x": 1}));
    }

    #[test]
    fn test_scalar_replaces_map() {
        let base = json!({"a": {"b": 1}});
        let overlay = json!({"a": 2});
        assert_eq!(deep_merge(&base, &overlay), json!({"a": 2}));
    }

    #[test]
    fn test_key_order_is_preserved() {
        let base = json!({"z": 1, "a": 2});
        let merged = deep_merge(&base, &json!({"m": 3, "z": 4}));
        let keys: Vec<&str> = merged.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
