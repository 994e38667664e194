//! Configuration values with deep merge and dot-path assignment

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Configuration value tree with deep merge capability
///
/// The tree is an ordered mapping: keys keep the order in which they were
/// first introduced (serde_json's preserve-order map).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Parse values from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Maps: recursive merge, key by key
    /// - Lists: overlay replaces base wholesale (no element-wise merge)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g. "image.tag", "servers[0].port")
    ///
    /// Intermediate maps and lists are created as needed. A path that walks
    /// through an existing scalar, indexes into a map, or keys into a list
    /// fails with `ConfigPathConflict`. A list index may overwrite an
    /// existing element or append at exactly the current length.
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let segments = parse_path(path)?;
        set_nested(&mut self.0, path, &segments, value)
    }

    /// Get a value by dotted path, `None` if any step is missing or mistyped
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let segments = parse_path(path).ok()?;
        get_nested(&self.0, &segments)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

/// Compute the effective configuration for an operation
///
/// Precedence, lowest to highest:
/// 1. `defaults` (from the chart)
/// 2. each element of `file_overrides`, in order
/// 3. each `key=value` entry of `inline_overrides`, in order
///
/// Pure: inputs are never mutated and the result shares no structure with
/// them. Resolving twice with identical inputs yields identical output.
pub fn resolve(
    defaults: &Values,
    file_overrides: &[Values],
    inline_overrides: &[String],
) -> Result<Values> {
    let mut effective = defaults.clone();

    for overlay in file_overrides {
        effective.merge(overlay);
    }

    for assignment in inline_overrides {
        let (path, raw) =
            assignment
                .split_once('=')
                .ok_or_else(|| CoreError::ConfigSyntaxError {
                    input: assignment.clone(),
                    message: "expected key=value".to_string(),
                })?;
        let value = parse_inline_value(raw).map_err(|message| CoreError::ConfigSyntaxError {
            input: assignment.clone(),
            message,
        })?;
        effective.set(path, value)?;
    }

    Ok(effective)
}

/// Parse the right-hand side of an inline assignment into a typed value
///
/// `true`/`false`/`null` and numbers parse to their JSON types; a value
/// starting with `[` or `{` must be a valid JSON literal; everything else
/// is taken as a string.
fn parse_inline_value(raw: &str) -> std::result::Result<JsonValue, String> {
    if raw == "true" {
        return Ok(JsonValue::Bool(true));
    }
    if raw == "false" {
        return Ok(JsonValue::Bool(false));
    }
    if raw == "null" {
        return Ok(JsonValue::Null);
    }
    if let Ok(num) = raw.parse::<i64>() {
        return Ok(JsonValue::Number(num.into()));
    }
    if let Ok(num) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(num) {
            return Ok(JsonValue::Number(n));
        }
    }
    if raw.starts_with('[') || raw.starts_with('{') {
        return serde_json::from_str(raw).map_err(|e| format!("invalid JSON literal: {}", e));
    }
    Ok(JsonValue::String(raw.to_string()))
}

/// One step of a parsed dot-path
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a dot-path into segments, e.g. "a.b[0].c" -> [Key(a), Key(b), Index(0), Key(c)]
fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let syntax_err = |message: &str| CoreError::ConfigSyntaxError {
        input: path.to_string(),
        message: message.to_string(),
    };

    if path.is_empty() {
        return Err(syntax_err("empty path"));
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return Err(syntax_err("empty path segment"));
        }

        let (key, mut rest) = match part.find('[') {
            Some(0) => (None, part),
            Some(i) => (Some(&part[..i]), &part[i..]),
            None => (Some(part), ""),
        };

        if let Some(key) = key {
            segments.push(PathSegment::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let Some(inner) = rest.strip_prefix('[') else {
                return Err(syntax_err("unexpected characters after list index"));
            };
            let Some(close) = inner.find(']') else {
                return Err(syntax_err("unterminated list index"));
            };
            let index: usize = inner[..close]
                .parse()
                .map_err(|_| syntax_err("list index is not a non-negative integer"))?;
            segments.push(PathSegment::Index(index));
            rest = &inner[close + 1..];
        }
    }

    Ok(segments)
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value, creating intermediate containers as needed
fn set_nested(
    value: &mut JsonValue,
    path: &str,
    segments: &[PathSegment],
    new_value: JsonValue,
) -> Result<()> {
    let Some((segment, remaining)) = segments.split_first() else {
        *value = new_value;
        return Ok(());
    };

    let conflict = |message: String| CoreError::ConfigPathConflict {
        path: path.to_string(),
        message,
    };

    match segment {
        PathSegment::Key(key) => {
            if value.is_null() {
                *value = JsonValue::Object(serde_json::Map::new());
            }
            let map = value.as_object_mut().ok_or_else(|| {
                conflict(format!("cannot descend into non-map value with key '{}'", key))
            })?;
            let entry = map.entry(key.clone()).or_insert(JsonValue::Null);
            set_nested(entry, path, remaining, new_value)
        }
        PathSegment::Index(index) => {
            if value.is_null() {
                *value = JsonValue::Array(Vec::new());
            }
            let list = value
                .as_array_mut()
                .ok_or_else(|| conflict(format!("cannot index into non-list value with [{}]", index)))?;
            if *index > list.len() {
                return Err(conflict(format!(
                    "index {} out of range for list of length {}",
                    index,
                    list.len()
                )));
            }
            if *index == list.len() {
                list.push(JsonValue::Null);
            }
            set_nested(&mut list[*index], path, remaining, new_value)
        }
    }
}

/// Get a nested value by parsed segments
fn get_nested<'a>(value: &'a JsonValue, segments: &[PathSegment]) -> Option<&'a JsonValue> {
    let Some((segment, remaining)) = segments.split_first() else {
        return Some(value);
    };

    match segment {
        PathSegment::Key(key) => match value {
            JsonValue::Object(map) => map.get(key).and_then(|v| get_nested(v, remaining)),
            _ => None,
        },
        PathSegment::Index(index) => match value {
            JsonValue::Array(list) => list.get(*index).and_then(|v| get_nested(v, remaining)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_merge_replaces_lists_wholesale() {
        let mut base = Values::from_yaml("ports: [80, 443, 8080]").unwrap();
        let overlay = Values::from_yaml("ports: [9090]").unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("ports").unwrap(), &serde_json::json!([9090]));
    }

    #[test]
    fn test_set_nested() {
        let mut values = Values::new();
        values.set("image.tag", JsonValue::String("v1".into())).unwrap();
        values.set("replicas", JsonValue::Number(3.into())).unwrap();

        assert_eq!(values.get("image.tag").unwrap(), "v1");
        assert_eq!(values.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_set_list_index() {
        let mut values = Values::from_yaml("servers:\n  - port: 80\n  - port: 443").unwrap();
        values.set("servers[1].port", 8443.into()).unwrap();

        assert_eq!(values.get("servers[0].port").unwrap(), 80);
        assert_eq!(values.get("servers[1].port").unwrap(), 8443);
    }

    #[test]
    fn test_set_list_append() {
        let mut values = Values::from_yaml("hosts: [a]").unwrap();
        values.set("hosts[1]", "b".into()).unwrap();

        assert_eq!(values.get("hosts[1]").unwrap(), "b");

        // Past the end is a conflict, not a silent pad
        let err = values.set("hosts[5]", "z".into()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigPathConflict { .. }));
    }

    #[test]
    fn test_index_into_scalar_conflicts() {
        let mut values = Values::from_yaml("replicas: 3").unwrap();
        let err = values.set("replicas[0]", 1.into()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigPathConflict { .. }));
    }

    #[test]
    fn test_key_into_scalar_conflicts() {
        let mut values = Values::from_yaml("name: web").unwrap();
        let err = values.set("name.first", "w".into()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigPathConflict { .. }));
    }

    #[test]
    fn test_key_into_list_conflicts() {
        let mut values = Values::from_yaml("hosts: [a, b]").unwrap();
        let err = values.set("hosts.first", "a".into()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigPathConflict { .. }));
    }

    #[test]
    fn test_parse_path_syntax_errors() {
        assert!(matches!(
            parse_path("a..b").unwrap_err(),
            CoreError::ConfigSyntaxError { .. }
        ));
        assert!(matches!(
            parse_path("a[1").unwrap_err(),
            CoreError::ConfigSyntaxError { .. }
        ));
        assert!(matches!(
            parse_path("a[x]").unwrap_err(),
            CoreError::ConfigSyntaxError { .. }
        ));
        assert!(matches!(
            parse_path("").unwrap_err(),
            CoreError::ConfigSyntaxError { .. }
        ));
    }

    #[test]
    fn test_resolve_precedence() {
        let defaults = Values::from_yaml("image:\n  tag: \"1.0\"\nreplicas: 1").unwrap();
        let file_a = Values::from_yaml("replicas: 2").unwrap();
        let file_b = Values::from_yaml("replicas: 3\nimage:\n  tag: \"2.0\"").unwrap();

        let effective = resolve(
            &defaults,
            &[file_a, file_b],
            &["image.tag=3.0".to_string()],
        )
        .unwrap();

        // Later file wins over earlier file
        assert_eq!(effective.get("replicas").unwrap(), 3);
        // Inline wins over every file
        assert_eq!(effective.get("image.tag").unwrap(), "3.0");
    }

    #[test]
    fn test_resolve_inline_wins_regardless_of_file_order() {
        let defaults = Values::new();
        let file = Values::from_yaml("debug: false").unwrap();
        let inline = vec!["debug=true".to_string()];

        let effective = resolve(&defaults, &[file], &inline).unwrap();
        assert_eq!(effective.get("debug").unwrap(), true);
    }

    #[test]
    fn test_resolve_later_inline_wins() {
        let effective = resolve(
            &Values::new(),
            &[],
            &["replicas=2".to_string(), "replicas=5".to_string()],
        )
        .unwrap();
        assert_eq!(effective.get("replicas").unwrap(), 5);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let defaults = Values::from_yaml("a: 1\nb:\n  c: [1, 2]").unwrap();
        let files = vec![Values::from_yaml("b:\n  c: [3]").unwrap()];
        let inline = vec!["b.d=x".to_string(), "a=2".to_string()];

        let first = resolve(&defaults, &files, &inline).unwrap();
        let second = resolve(&defaults, &files, &inline).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_typed_inline_values() {
        let effective = resolve(
            &Values::new(),
            &[],
            &[
                "enabled=true".to_string(),
                "replicas=5".to_string(),
                "ratio=0.5".to_string(),
                "tag=v1.2".to_string(),
                "empty=null".to_string(),
                "ports=[80,443]".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(effective.get("enabled").unwrap(), true);
        assert_eq!(effective.get("replicas").unwrap(), 5);
        assert_eq!(effective.get("ratio").unwrap(), 0.5);
        assert_eq!(effective.get("tag").unwrap(), "v1.2");
        assert_eq!(effective.get("empty").unwrap(), &JsonValue::Null);
        assert_eq!(effective.get("ports").unwrap(), &serde_json::json!([80, 443]));
    }

    #[test]
    fn test_resolve_syntax_errors() {
        let missing_eq = resolve(&Values::new(), &[], &["no-equals-sign".to_string()]);
        assert!(matches!(
            missing_eq.unwrap_err(),
            CoreError::ConfigSyntaxError { .. }
        ));

        let bad_json = resolve(&Values::new(), &[], &["ports=[80,".to_string()]);
        assert!(matches!(
            bad_json.unwrap_err(),
            CoreError::ConfigSyntaxError { .. }
        ));
    }

    #[test]
    fn test_resolve_conflict_with_file_value() {
        // File puts a scalar where the inline path needs a list
        let file = Values::from_yaml("ports: all").unwrap();
        let result = resolve(&Values::new(), &[file], &["ports[0]=80".to_string()]);
        assert!(matches!(
            result.unwrap_err(),
            CoreError::ConfigPathConflict { .. }
        ));
    }

    #[test]
    fn test_resolve_does_not_mutate_inputs() {
        let defaults = Values::from_yaml("a: 1").unwrap();
        let file = Values::from_yaml("a: 2").unwrap();
        let snapshot = defaults.clone();

        let _ = resolve(&defaults, &[file], &[]).unwrap();
        assert_eq!(defaults, snapshot);
    }
}
