//! JSON parsing: strict parse, dotted-path flattening, metadata key extraction

use crate::document::{MetaValue, ParsedDocument, Section};
use crate::error::{ParseError, Result};
use serde_json::Value;
use std::path::Path;

/// Recursion depth cap for pathological nesting
const MAX_DEPTH: usize = 10;

/// Parse a JSON file.
///
/// The document is flattened to `dotted.key: scalar` lines; arrays of
/// primitives collapse to a comma-joined value and object arrays index as
/// `key[i].sub`. Well-known metadata keys at the top level are extracted and
/// excluded from the section list.
pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::Failed(e.to_string()))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let mut doc = ParsedDocument::default();

    match value {
        Value::Object(map) => {
            for (key, sub) in map {
                if let Some((meta_key, meta_value)) = metadata_entry(&key, &sub) {
                    doc.metadata.insert(meta_key, meta_value);
                    continue;
                }
                let mut lines = Vec::new();
                flatten(&key, &sub, 0, &mut lines);
                doc.sections.push(Section {
                    title: Some(key),
                    content: lines.join("\n"),
                    page: None,
                });
            }
        }
        other => {
            let mut lines = Vec::new();
            flatten("", &other, 0, &mut lines);
            doc.sections.push(Section {
                title: None,
                content: lines.join("\n"),
                page: None,
            });
        }
    }

    doc.content = doc
        .sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(doc)
}

/// Map well-known top-level keys to canonical metadata entries
fn metadata_entry(key: &str, value: &Value) -> Option<(String, MetaValue)> {
    let canonical = match key.to_ascii_lowercase().as_str() {
        "title" | "name" => "title",
        "author" => "author",
        "description" | "summary" => "description",
        "tags" | "keywords" => "tags",
        "category" | "type" => "category",
        _ => return None,
    };

    let meta = match value {
        Value::String(s) => MetaValue::String(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetaValue::Integer(i)
            } else {
                MetaValue::Float(n.as_f64()?)
            }
        }
        Value::Bool(b) => MetaValue::Bool(*b),
        Value::Array(items) => MetaValue::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(MetaValue::String(s.clone())),
                    Value::Number(n) => n.as_i64().map(MetaValue::Integer),
                    Value::Bool(b) => Some(MetaValue::Bool(*b)),
                    _ => None,
                })
                .collect(),
        ),
        _ => return None,
    };
    Some((canonical.to_string(), meta))
}

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten a value into `path: scalar` lines, capped at `MAX_DEPTH`
fn flatten(prefix: &str, value: &Value, depth: usize, out: &mut Vec<String>) {
    if depth >= MAX_DEPTH {
        out.push(format!("{prefix}: [max depth reached]"));
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, sub) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, sub, depth + 1, out);
            }
        }
        Value::Array(items) => {
            if items.iter().all(is_primitive) {
                let joined = items
                    .iter()
                    .map(primitive_text)
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push(format!("{prefix}: {joined}"));
            } else {
                for (i, item) in items.iter().enumerate() {
                    flatten(&format!("{prefix}[{i}]"), item, depth + 1, out);
                }
            }
        }
        other => out.push(format!("{}: {}", prefix, primitive_text(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    fn parse_json(content: &str) -> Result<ParsedDocument> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, content).unwrap();
        parse(&path)
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = parse_json("{not json").unwrap_err();
        assert!(matches!(err, RagError::Parse(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_flatten_nested_object() {
        let doc = parse_json(r#"{"config": {"db": {"host": "localhost", "port": 5432}}}"#).unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.content.contains("config.db.host: localhost"));
        assert!(doc.content.contains("config.db.port: 5432"));
    }

    #[test]
    fn test_primitive_array_collapses() {
        let doc = parse_json(r#"{"colors": ["red", "green", "blue"]}"#).unwrap();
        assert!(doc.content.contains("colors: red, green, blue"));
    }

    #[test]
    fn test_object_array_indexes() {
        let doc = parse_json(r#"{"items": [{"sku": "a"}, {"sku": "b"}]}"#).unwrap();
        assert!(doc.content.contains("items[0].sku: a"));
        assert!(doc.content.contains("items[1].sku: b"));
    }

    #[test]
    fn test_metadata_keys_extracted_and_excluded() {
        let doc = parse_json(
            r#"{"title": "Guide", "tags": ["howto", "rust"], "body": "text here"}"#,
        )
        .unwrap();
        assert_eq!(doc.metadata.get("title").unwrap().as_str(), Some("Guide"));
        assert_eq!(
            doc.metadata.get("tags").unwrap().to_string_lossy(),
            "howto, rust"
        );
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].title.as_deref(), Some("body"));
        assert!(!doc.content.contains("Guide"));
    }

    #[test]
    fn test_depth_cap_marker() {
        let mut nested = String::from("1");
        for _ in 0..12 {
            nested = format!("{{\"n\": {nested}}}");
        }
        let doc = parse_json(&nested).unwrap();
        assert!(doc.content.contains("[max depth reached]"));
    }
}
