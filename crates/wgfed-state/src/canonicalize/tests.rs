//! Canonicalization behavior tests.

use super::*;
use serde_json::{json, Value as JsonValue};

// ==================== Canonical Output ====================

#[test]
fn test_jcs_key_ordering() {
    let a = parse_yaml_strict("z: 1\na: 2\nm: 3").unwrap();
    let b = parse_yaml_strict("a: 2\nm: 3\nz: 1").unwrap();
    assert_eq!(
        to_canonical_string(&a).unwrap(),
        to_canonical_string(&b).unwrap()
    );
    assert_eq!(to_canonical_string(&a).unwrap(), r#"{"a":2,"m":3,"z":1}"#);
}

#[test]
fn test_jcs_nested_interface_data() {
    let value = json!({
        "interface": {
            "listen_port": 35200,
            "address": ["10.10.100.1/24"],
        },
        "name": "wg0",
    });
    assert_eq!(
        to_canonical_string(&value).unwrap(),
        r#"{"interface":{"address":["10.10.100.1/24"],"listen_port":35200},"name":"wg0"}"#
    );
}

#[test]
fn test_yaml_and_json_agree() {
    let yaml = parse_yaml_strict("address: 10.10.100.1/24\nport: 35200\n").unwrap();
    let json = parse_json_strict(r#"{"port": 35200, "address": "10.10.100.1/24"}"#).unwrap();
    assert_eq!(
        to_canonical_jcs_bytes(&yaml).unwrap(),
        to_canonical_jcs_bytes(&json).unwrap()
    );
}

#[test]
fn test_canonical_digest_over_utf8_bytes() {
    let value = parse_yaml_strict("name: café\n").unwrap();
    let digest = canonical_digest(&value).unwrap();
    assert!(digest.starts_with("sha256:"));
    assert_eq!(digest.len(), 7 + 64);

    let bytes = to_canonical_jcs_bytes(&value).unwrap();
    assert_eq!(digest, crate::digest::sha256_prefixed(&bytes));
}

#[test]
fn test_canonical_digest_matches_signed_message() {
    let value = parse_json_strict(r#"{"listen_port": 51820, "address": ["10.0.0.1/24"]}"#).unwrap();
    let message = to_canonical_string(&value).unwrap();
    assert_eq!(
        canonical_digest(&value).unwrap(),
        crate::digest::sha256_prefixed(message.as_bytes())
    );
}

// ==================== Strict YAML ====================

#[test]
fn test_reject_anchor() {
    let yaml = "anchor: &myanchor value\nref: *myanchor";
    assert!(matches!(
        parse_yaml_strict(yaml),
        Err(CanonicalizeError::AnchorFound { .. })
    ));
}

#[test]
fn test_reject_alias_in_sequence() {
    let yaml = "items:\n  - *ref";
    assert!(matches!(
        parse_yaml_strict(yaml),
        Err(CanonicalizeError::AliasFound { .. })
    ));
}

#[test]
fn test_reject_tags() {
    for yaml in [
        "date: !!timestamp 2026-01-29",
        "value: !<tag:custom> data",
        "value: !custom data",
    ] {
        assert!(
            matches!(
                parse_yaml_strict(yaml),
                Err(CanonicalizeError::TagFound { .. })
            ),
            "tag should be rejected: {}",
            yaml
        );
    }
}

#[test]
fn test_shell_commands_are_not_node_properties() {
    let yaml = "post_up:\n  - iptables -A FORWARD -i wg0 -j ACCEPT && echo up\n  - test 1 != 2\n  - echo 2 * 3\n";
    let value = parse_yaml_strict(yaml).unwrap();
    assert_eq!(value["post_up"].as_array().unwrap().len(), 3);
}

#[test]
fn test_indicators_inside_plain_scalars_are_content() {
    let yaml = "post_up:\n  - ls *conf\n  - sleep 1 &wait\nnote: hello !important\n";
    let value = parse_yaml_strict(yaml).unwrap();
    assert_eq!(
        value,
        json!({"post_up": ["ls *conf", "sleep 1 &wait"], "note": "hello !important"})
    );
}

#[test]
fn test_indicators_inside_block_scalars_are_content() {
    for (yaml, expected) in [
        ("script: |\n  line one\n  &second line\n", "line one\n&second line\n"),
        ("script: >-\n  *first\n  !second\n", "*first !second"),
        ("- |\n  &item\n", "&item\n"),
        ("--- |\n  &document\n", "&document\n"),
    ] {
        let value = parse_yaml_strict(yaml).unwrap();
        let scalar = value
            .get("script")
            .or_else(|| value.get(0))
            .unwrap_or(&value);
        assert_eq!(scalar, expected, "{:?}", yaml);
    }
}

#[test]
fn test_indicators_inside_multi_line_scalars_are_content() {
    let value = parse_yaml_strict("key: first\n  &second *third\nnext: \"one\n  !two\"\n").unwrap();
    assert_eq!(value, json!({"key": "first &second *third", "next": "one !two"}));
}

#[test]
fn test_properties_after_scalars_are_still_rejected() {
    for (yaml, expected) in [
        ("script: |\n  &content\nnext: &x 1\n", "anchor"),
        ("- name: a\n  value: &x 1\n", "anchor"),
        ("key: first\n  continued\nother: *ref\n", "alias"),
        ("next: \"one\n  two\"\nref: *x\n", "alias"),
        ("hosts: [a, &x b]\n", "anchor"),
        ("hosts: {a: 1, b: !custom 2}\n", "tag"),
        ("--- &doc\na: 1\n", "anchor"),
    ] {
        let result = parse_yaml_strict(yaml);
        let rejected = match expected {
            "anchor" => matches!(result, Err(CanonicalizeError::AnchorFound { .. })),
            "alias" => matches!(result, Err(CanonicalizeError::AliasFound { .. })),
            _ => matches!(result, Err(CanonicalizeError::TagFound { .. })),
        };
        assert!(rejected, "{:?} should be rejected as {}: {:?}", yaml, expected, result);
    }
}

#[test]
fn test_rendered_yaml_loads_back() {
    for value in [
        json!({"post_up": ["ls *conf"]}),
        json!(["sleep 1 &wait"]),
        json!({"note": "hello !important"}),
        json!({"script": "line one\n&second line"}),
    ] {
        let rendered = serde_yaml::to_string(&value).unwrap();
        assert_eq!(parse_yaml_strict(&rendered).unwrap(), value, "{}", rendered);
    }
}

#[test]
fn test_markers_inside_quotes_are_ignored() {
    let yaml = "a: \"&not-an-anchor\"\nb: '*not-an-alias'\nc: \"say \\\"!hi\\\"\"";
    let value = parse_yaml_strict(yaml).unwrap();
    assert_eq!(value["a"], "&not-an-anchor");
    assert_eq!(value["b"], "*not-an-alias");
}

#[test]
fn test_comment_is_ignored() {
    let value = parse_yaml_strict("a: 1 # &anchor *alias !tag\n").unwrap();
    assert_eq!(value, json!({"a": 1}));
}

#[test]
fn test_reject_multi_document() {
    let result = parse_yaml_strict("doc1: value\n---\ndoc2: value");
    assert!(
        matches!(result, Err(CanonicalizeError::ParseError { .. })),
        "multiple documents should be rejected: {:?}",
        result
    );
}

#[test]
fn test_reject_yaml_duplicate_key() {
    let result = parse_yaml_strict("a: 1\na: 2");
    assert!(result.is_err(), "duplicate key should be rejected");
}

#[test]
fn test_reject_non_string_key() {
    assert!(matches!(
        parse_yaml_strict("1: one"),
        Err(CanonicalizeError::NonStringKey { .. })
    ));
}

#[test]
fn test_reject_float() {
    for yaml in ["value: 3.14159", "value: 1.5e10"] {
        assert!(matches!(
            parse_yaml_strict(yaml),
            Err(CanonicalizeError::FloatNotAllowed { .. })
        ));
    }
}

#[test]
fn test_integer_bounds() {
    assert!(parse_yaml_strict("value: 9007199254740992").is_ok());
    assert!(parse_yaml_strict("value: -9007199254740992").is_ok());
    assert!(matches!(
        parse_yaml_strict("value: 9007199254740993"),
        Err(CanonicalizeError::IntegerOutOfRange { .. })
    ));
    assert!(matches!(
        parse_json_strict(r#"{"value": 18446744073709551615}"#),
        Err(CanonicalizeError::IntegerOutOfRange { .. })
    ));
}

// ==================== Strict JSON ====================

#[test]
fn test_reject_json_duplicate_key() {
    let result = parse_json_strict(r#"{"nonce": "a", "nonce": "b"}"#);
    assert_eq!(
        result,
        Err(CanonicalizeError::DuplicateKey {
            key: "nonce".to_string()
        })
    );
}

#[test]
fn test_reject_nested_json_duplicate_key() {
    let result = parse_json_strict(r#"{"data": {"a": 1, "b": [{"x": 1, "x": 2}]}}"#);
    assert!(matches!(result, Err(CanonicalizeError::DuplicateKey { .. })));
}

#[test]
fn test_reject_json_float() {
    assert!(matches!(
        parse_json_strict(r#"{"mtu": 1420.5}"#),
        Err(CanonicalizeError::FloatNotAllowed { .. })
    ));
}

#[test]
fn test_reject_trailing_json() {
    assert!(matches!(
        parse_json_strict(r#"{"a": 1} {"b": 2}"#),
        Err(CanonicalizeError::ParseError { .. })
    ));
}

#[test]
fn test_json_preserves_values() {
    let value = parse_json_strict(r#"{"a": null, "b": true, "c": [1, "two"]}"#).unwrap();
    assert_eq!(value, json!({"a": null, "b": true, "c": [1, "two"]}));
}

// ==================== Limits ====================

#[test]
fn test_max_depth() {
    let mut value = JsonValue::from(1);
    for _ in 0..=MAX_DEPTH {
        value = json!({ "k": value });
    }
    assert!(matches!(
        check_limits(&value, 0),
        Err(CanonicalizeError::MaxDepthExceeded { .. })
    ));

    let mut shallow = JsonValue::from(1);
    for _ in 0..10 {
        shallow = json!([shallow]);
    }
    assert!(check_limits(&shallow, 0).is_ok());
}

#[test]
fn test_max_keys_per_mapping() {
    let map: serde_json::Map<String, JsonValue> = (0..=MAX_KEYS_PER_MAPPING)
        .map(|i| (format!("k{}", i), JsonValue::from(i as i64)))
        .collect();
    assert!(matches!(
        check_limits(&JsonValue::Object(map), 0),
        Err(CanonicalizeError::MaxKeysExceeded { .. })
    ));
}

#[test]
fn test_string_too_long() {
    let value = json!({ "blob": "x".repeat(MAX_STRING_LENGTH + 1) });
    assert!(matches!(
        check_limits(&value, 0),
        Err(CanonicalizeError::StringTooLong { .. })
    ));
}

#[test]
fn test_input_too_large() {
    let content = " ".repeat(MAX_TOTAL_SIZE + 1);
    assert!(matches!(
        parse_yaml_strict(&content),
        Err(CanonicalizeError::InputTooLarge { .. })
    ));
    assert!(matches!(
        parse_json_strict(&content),
        Err(CanonicalizeError::InputTooLarge { .. })
    ));
}
