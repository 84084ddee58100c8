//! Strict YAML parsing into JSON values.

use serde_json::Value as JsonValue;

use super::errors::{CanonicalizeError, CanonicalizeResult, MAX_TOTAL_SIZE};
use super::json::check_limits;

/// Parse YAML restricted to the subset that has a single canonical JSON form.
///
/// Rejects anchors, aliases, tags, multiple documents, duplicate keys,
/// non-string keys and floats, then applies the shared document limits.
pub fn parse_yaml_strict(content: &str) -> CanonicalizeResult<JsonValue> {
    if content.len() > MAX_TOTAL_SIZE {
        return Err(CanonicalizeError::InputTooLarge {
            size: content.len(),
        });
    }

    // serde_yaml expands aliases silently, so node properties are caught on the raw text.
    scan_node_properties(content)?;

    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| classify_yaml_error(&e))?;

    let json_value = yaml_to_json(&yaml_value)?;
    check_limits(&json_value, 0)?;
    Ok(json_value)
}

fn classify_yaml_error(err: &serde_yaml::Error) -> CanonicalizeError {
    let message = err.to_string();
    if message.contains("duplicate entry") {
        CanonicalizeError::DuplicateKey { key: message }
    } else {
        CanonicalizeError::ParseError { message }
    }
}

/// Look for `&anchor`, `*alias` and `!tag` properties where a node starts.
///
/// Scalar content is never inspected: quoted text, plain scalars (including
/// their continuation lines) and block scalar bodies may contain any of
/// these characters.
fn scan_node_properties(content: &str) -> CanonicalizeResult<()> {
    let mut scanner = PropertyScanner::default();
    for (line_num, line) in content.lines().enumerate() {
        scanner.scan_line(line, line_num + 1)?;
    }
    Ok(())
}

/// Scanner state carried from one line to the next.
#[derive(Debug, Default)]
struct PropertyScanner {
    quote: Option<char>,
    escaped: bool,
    flow_depth: usize,
    expect_node: bool,
    /// Set after a plain or block scalar: deeper lines are its content.
    scalar_column: Option<usize>,
}

impl PropertyScanner {
    fn scan_line(&mut self, line: &str, line_num: usize) -> CanonicalizeResult<()> {
        let indent = line.len() - line.trim_start_matches(' ').len();
        let blank = line.trim().is_empty();

        if self.quote.is_none() {
            if let Some(column) = self.scalar_column {
                if blank || indent > column {
                    return Ok(());
                }
                self.scalar_column = None;
            }
        }
        if blank {
            return Ok(());
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        if self.quote.is_none() && self.flow_depth == 0 {
            let trimmed = line.trim_end();
            if trimmed == "---" || trimmed == "..." {
                return Ok(());
            }
            if trimmed.starts_with("--- ") {
                i = 4;
            }
            self.expect_node = true;
        }

        // Column owning the value being scanned: a key, a `-` entry or the line.
        let mut owner = indent;
        let mut node_column = indent;
        let mut in_plain = false;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            let separated = next.map_or(true, is_yaml_space);

            if let Some(quote) = self.quote {
                if quote == '"' {
                    if self.escaped {
                        self.escaped = false;
                    } else if c == '\\' {
                        self.escaped = true;
                    } else if c == '"' {
                        self.quote = None;
                    }
                } else if c == '\'' {
                    self.quote = None;
                }
                i += 1;
                continue;
            }

            let after_space = i == 0 || is_yaml_space(chars[i - 1]);
            let in_flow = self.flow_depth > 0;

            match c {
                '#' if after_space => break,
                ':' if separated || in_flow => {
                    in_plain = false;
                    owner = node_column;
                    self.expect_node = true;
                }
                ',' if in_flow => {
                    in_plain = false;
                    self.expect_node = true;
                }
                ']' | '}' if in_flow => {
                    in_plain = false;
                    self.flow_depth -= 1;
                    self.expect_node = false;
                }
                _ if in_plain || is_yaml_space(c) => {}
                _ if self.expect_node => match c {
                    '&' => {
                        return Err(CanonicalizeError::AnchorFound {
                            position: format!("line {}", line_num),
                        })
                    }
                    '*' => {
                        return Err(CanonicalizeError::AliasFound {
                            position: format!("line {}", line_num),
                        })
                    }
                    '!' => {
                        let tag: String = chars[i..]
                            .iter()
                            .take_while(|c| !c.is_whitespace())
                            .collect();
                        return Err(CanonicalizeError::TagFound { tag });
                    }
                    '"' | '\'' => {
                        self.quote = Some(c);
                        self.expect_node = false;
                        node_column = i;
                    }
                    '[' | '{' => self.flow_depth += 1,
                    '-' | '?' if !in_flow && separated => owner = i,
                    '|' | '>' if !in_flow => {
                        self.scalar_column = Some(owner);
                        self.expect_node = false;
                        return Ok(());
                    }
                    _ => {
                        in_plain = true;
                        self.expect_node = false;
                        node_column = i;
                    }
                },
                _ => {}
            }
            i += 1;
        }

        if in_plain && self.flow_depth == 0 {
            self.scalar_column = Some(owner);
        }
        Ok(())
    }
}

fn is_yaml_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn yaml_to_json(yaml: &serde_yaml::Value) -> CanonicalizeResult<JsonValue> {
    match yaml {
        serde_yaml::Value::Null => Ok(JsonValue::Null),

        serde_yaml::Value::Bool(b) => Ok(JsonValue::Bool(*b)),

        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(JsonValue::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(JsonValue::from(u))
            } else {
                Err(CanonicalizeError::FloatNotAllowed {
                    value: n.to_string(),
                })
            }
        }

        serde_yaml::Value::String(s) => Ok(JsonValue::String(s.clone())),

        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .map(yaml_to_json)
            .collect::<CanonicalizeResult<Vec<_>>>()
            .map(JsonValue::Array),

        serde_yaml::Value::Mapping(map) => {
            let mut json_map = serde_json::Map::new();

            for (key, value) in map {
                let key_str = match key {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => {
                        return Err(CanonicalizeError::NonStringKey {
                            key: format!("{:?}", other),
                        })
                    }
                };

                if json_map.contains_key(&key_str) {
                    return Err(CanonicalizeError::DuplicateKey { key: key_str });
                }

                let json_value = yaml_to_json(value)?;
                json_map.insert(key_str, json_value);
            }

            Ok(JsonValue::Object(json_map))
        }

        serde_yaml::Value::Tagged(tagged) => Err(CanonicalizeError::TagFound {
            tag: tagged.tag.to_string(),
        }),
    }
}
