//! JCS (JSON Canonicalization Scheme) output and strict JSON input.

use std::collections::HashSet;
use std::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::errors::{
    CanonicalizeError, CanonicalizeResult, MAX_DEPTH, MAX_KEYS_PER_MAPPING, MAX_SAFE_INTEGER,
    MAX_STRING_LENGTH, MAX_TOTAL_SIZE, MIN_SAFE_INTEGER,
};

/// Convert a value to JCS (RFC 8785) bytes.
///
/// Keys are sorted by UTF-16 code units, no insignificant whitespace is
/// emitted and numbers use the ECMAScript representation.
pub fn to_canonical_jcs_bytes<T: Serialize + ?Sized>(value: &T) -> CanonicalizeResult<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(|e| CanonicalizeError::SerializeError {
        message: e.to_string(),
    })
}

/// Convert a value to its JCS string.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> CanonicalizeResult<String> {
    serde_jcs::to_string(value).map_err(|e| CanonicalizeError::SerializeError {
        message: e.to_string(),
    })
}

/// Parse JSON, rejecting duplicate keys and values outside the canonical subset.
pub fn parse_json_strict(content: &str) -> CanonicalizeResult<JsonValue> {
    if content.len() > MAX_TOTAL_SIZE {
        return Err(CanonicalizeError::InputTooLarge {
            size: content.len(),
        });
    }

    let mut deserializer = serde_json::Deserializer::from_str(content);
    let value = UniqueKeys
        .deserialize(&mut deserializer)
        .and_then(|value| deserializer.end().map(|()| value))
        .map_err(|e| classify_json_error(&e))?;

    check_limits(&value, 0)?;
    Ok(value)
}

/// Enforce depth, size, integer range and no-float rules on a parsed value.
pub(crate) fn check_limits(value: &JsonValue, depth: usize) -> CanonicalizeResult<()> {
    if depth > MAX_DEPTH {
        return Err(CanonicalizeError::MaxDepthExceeded { depth });
    }

    match value {
        JsonValue::Null | JsonValue::Bool(_) => Ok(()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                if !(MIN_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i) {
                    return Err(CanonicalizeError::IntegerOutOfRange {
                        value: i.to_string(),
                    });
                }
                Ok(())
            } else if n.is_u64() {
                // Any u64 that does not fit in i64 is above 2^53.
                Err(CanonicalizeError::IntegerOutOfRange {
                    value: n.to_string(),
                })
            } else {
                Err(CanonicalizeError::FloatNotAllowed {
                    value: n.to_string(),
                })
            }
        }
        JsonValue::String(s) => {
            if s.len() > MAX_STRING_LENGTH {
                return Err(CanonicalizeError::StringTooLong { length: s.len() });
            }
            Ok(())
        }
        JsonValue::Array(items) => items
            .iter()
            .try_for_each(|item| check_limits(item, depth + 1)),
        JsonValue::Object(map) => {
            if map.len() > MAX_KEYS_PER_MAPPING {
                return Err(CanonicalizeError::MaxKeysExceeded { count: map.len() });
            }
            for (key, item) in map {
                if key.len() > MAX_STRING_LENGTH {
                    return Err(CanonicalizeError::StringTooLong { length: key.len() });
                }
                check_limits(item, depth + 1)?;
            }
            Ok(())
        }
    }
}

const DUPLICATE_KEY_PREFIX: &str = "duplicate key: ";

fn classify_json_error(err: &serde_json::Error) -> CanonicalizeError {
    let message = err.to_string();
    match message.strip_prefix(DUPLICATE_KEY_PREFIX) {
        Some(rest) => CanonicalizeError::DuplicateKey {
            // serde_json appends " at line X column Y"
            key: rest
                .rsplit_once(" at line ")
                .map(|(key, _)| key)
                .unwrap_or(rest)
                .to_string(),
        },
        None => CanonicalizeError::ParseError { message },
    }
}

/// Builds a `serde_json::Value`, failing on the first repeated key in a mapping.
struct UniqueKeys;

impl<'de> DeserializeSeed<'de> for UniqueKeys {
    type Value = JsonValue;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(UniqueKeysVisitor)
    }
}

struct UniqueKeysVisitor;

impl<'de> Visitor<'de> for UniqueKeysVisitor {
    type Value = JsonValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<JsonValue, E> {
        Ok(JsonValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<JsonValue, E> {
        Ok(JsonValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<JsonValue, E> {
        Ok(JsonValue::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<JsonValue, E> {
        serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .ok_or_else(|| E::custom(format!("non-finite number {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<JsonValue, E> {
        Ok(JsonValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<JsonValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(UniqueKeys)? {
            items.push(item);
        }
        Ok(JsonValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<JsonValue, A::Error> {
        let mut map = serde_json::Map::new();
        let mut seen = HashSet::new();
        while let Some(key) = access.next_key::<String>()? {
            if !seen.insert(key.clone()) {
                return Err(de::Error::custom(format!("{}{}", DUPLICATE_KEY_PREFIX, key)));
            }
            let value = access.next_value_seed(UniqueKeys)?;
            map.insert(key, value);
        }
        Ok(JsonValue::Object(map))
    }
}
