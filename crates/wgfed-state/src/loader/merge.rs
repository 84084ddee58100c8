//! Layering of configuration mappings.

use serde_json::Value as JsonValue;

use super::ConfigMap;

/// Merge `overlay` into `base`.
///
/// Mappings merge key by key, sequences are concatenated and any other
/// value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: &mut ConfigMap, overlay: ConfigMap) {
    for (key, incoming) in overlay {
        if let Some(existing) = base.get_mut(&key) {
            merge_value(existing, incoming);
        } else {
            base.insert(key, incoming);
        }
    }
}

fn merge_value(existing: &mut JsonValue, incoming: JsonValue) {
    match (existing, incoming) {
        (JsonValue::Object(existing), JsonValue::Object(incoming)) => {
            deep_merge(existing, incoming)
        }
        (JsonValue::Array(existing), JsonValue::Array(incoming)) => existing.extend(incoming),
        (slot, incoming) => *slot = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: JsonValue) -> ConfigMap {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_nested_mappings_merge() {
        let mut base = map(json!({"interface": {"address": ["10.0.0.1/24"], "mtu": 1420}}));
        deep_merge(
            &mut base,
            map(json!({"interface": {"mtu": 1380, "table": "off"}})),
        );
        assert_eq!(
            base,
            map(json!({"interface": {"address": ["10.0.0.1/24"], "mtu": 1380, "table": "off"}}))
        );
    }

    #[test]
    fn test_sequences_concatenate() {
        let mut base = map(json!({"post_up": ["a"]}));
        deep_merge(&mut base, map(json!({"post_up": ["b", "c"]})));
        assert_eq!(base, map(json!({"post_up": ["a", "b", "c"]})));
    }

    #[test]
    fn test_type_change_overrides() {
        let mut base = map(json!({"dns": ["1.1.1.1"], "table": {"id": 7}}));
        deep_merge(&mut base, map(json!({"dns": "9.9.9.9", "table": null})));
        assert_eq!(base, map(json!({"dns": "9.9.9.9", "table": null})));
    }

    #[test]
    fn test_empty_overlay_is_identity() {
        let mut base = map(json!({"a": 1}));
        deep_merge(&mut base, ConfigMap::new());
        assert_eq!(base, map(json!({"a": 1})));
    }
}
