//! Document kinds and read-only helpers over parsed YAML documents.
//!
//! Generated documents are kept as `serde_yaml::Value` so tagged nodes
//! (`!secret`, `!input`) and non-string keys survive parsing. The helpers
//! here see through tags and report locations as dotted paths such as
//! `action[0].target.entity_id`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

static ENTITY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*\.[a-z0-9_]+$").unwrap());

/// Keys whose values reference entities.
const ENTITY_KEYS: [&str; 3] = ["entity_id", "entity", "entities"];

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Kind of configuration document being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Automation,
    Dashboard,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Automation => "automation",
            DocumentKind::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automation" => Ok(DocumentKind::Automation),
            "dashboard" | "lovelace" => Ok(DocumentKind::Dashboard),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

/// What the backend is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Write a new document from scratch.
    Generate,
    /// Audit an existing document and return a corrected version.
    Review,
    /// Apply a requested change to an existing document.
    Modify,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Generate => "generate",
            RequestKind::Review => "review",
            RequestKind::Modify => "modify",
        }
    }

    /// Review and modification work on an existing document.
    pub fn needs_existing_document(&self) -> bool {
        !matches!(self, RequestKind::Generate)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generate" | "generation" => Ok(RequestKind::Generate),
            "review" => Ok(RequestKind::Review),
            "modify" | "modification" => Ok(RequestKind::Modify),
            other => Err(format!("unknown request kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// See through YAML tags to the underlying value.
pub fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

/// Look up a string key on a mapping node.
pub fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match untag(value) {
        Value::Mapping(map) => map.get(key).map(untag),
        _ => None,
    }
}

/// Treat a single node as a one-element list; `null` is empty.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match untag(value) {
        Value::Sequence(items) => items.iter().map(untag).collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Render a mapping key for messages; non-scalar keys yield `None`.
pub fn key_str(key: &Value) -> Option<String> {
    match untag(key) {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Join a path and a mapping key.
pub fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Join a path and a sequence index.
pub fn join_index(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

/// Split a document into its top-level items: a list yields one item per
/// element, anything else is a single item at the root.
pub fn top_level_items(doc: &Value) -> Vec<(String, &Value)> {
    match untag(doc) {
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (join_index("", i), untag(item)))
            .collect(),
        other => vec![(String::new(), other)],
    }
}

/// Call `visit` for every mapping node below (and including) `value`.
pub fn walk_mappings<'a, F>(value: &'a Value, path: &str, visit: &mut F)
where
    F: FnMut(&str, &'a Mapping),
{
    match untag(value) {
        Value::Mapping(map) => {
            visit(path, map);
            for (key, child) in map {
                let Some(key) = key_str(key) else { continue };
                walk_mappings(child, &join_key(path, &key), visit);
            }
        }
        Value::Sequence(items) => {
            for (i, child) in items.iter().enumerate() {
                walk_mappings(child, &join_index(path, i), visit);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Whether `s` has the shape of an entity id (`domain.object_id`).
pub fn is_entity_id(s: &str) -> bool {
    ENTITY_ID_RE.is_match(s)
}

/// Domain part of an entity id or service name.
pub fn domain_of(id: &str) -> Option<&str> {
    id.split_once('.').map(|(domain, _)| domain)
}

/// One entity id referenced by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub location: String,
    pub entity_id: String,
}

/// Every entity id referenced under `entity_id`, `entity` or `entities`.
///
/// Comma-separated strings are split. Mappings inside `entities` lists are
/// visited as ordinary `entity` keys. Templates and non-id strings are skipped.
pub fn entity_references(value: &Value, path: &str) -> Vec<EntityReference> {
    let mut refs = Vec::new();
    walk_mappings(value, path, &mut |at, map| {
        for key in ENTITY_KEYS {
            let Some(node) = map.get(key) else { continue };
            let location = join_key(at, key);
            for candidate in scalar_strings(untag(node)) {
                for part in candidate.split(',') {
                    let id = part.trim();
                    if is_entity_id(id) {
                        refs.push(EntityReference {
                            location: location.clone(),
                            entity_id: id.to_string(),
                        });
                    }
                }
            }
        }
    });
    refs
}

fn scalar_strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Sequence(items) => items
            .iter()
            .filter_map(|item| match untag(item) {
                Value::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A service invocation found in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall<'a> {
    pub location: String,
    /// The raw value, e.g. `light.turn_on`.
    pub target: String,
    /// The mapping that holds the call, including `data` and `target`.
    pub call: &'a Mapping,
}

impl ServiceCall<'_> {
    /// `(domain, service)` when the target has the `domain.service` shape.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.target
            .split_once('.')
            .filter(|(d, s)| !d.is_empty() && !s.is_empty())
    }
}

/// Every service call under `service`, `perform_action` or `action` keys.
///
/// `action` doubles as the automation action list and as dashboard tap
/// actions (`action: toggle`), so it only counts when its value is a
/// dotted string.
pub fn service_calls<'a>(value: &'a Value, path: &str) -> Vec<ServiceCall<'a>> {
    let mut calls = Vec::new();
    walk_mappings(value, path, &mut |at, map| {
        for key in ["service", "perform_action", "action"] {
            let Some(Value::String(target)) = map.get(key).map(untag) else {
                continue;
            };
            if target.contains("{{") {
                continue;
            }
            if key == "action" && !target.contains('.') {
                continue;
            }
            calls.push(ServiceCall {
                location: join_key(at, key),
                target: target.trim().to_string(),
                call: map,
            });
        }
    });
    calls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).expect("yaml")
    }

    #[test]
    fn test_kinds_parse_from_str() {
        assert_eq!("Dashboard".parse::<DocumentKind>(), Ok(DocumentKind::Dashboard));
        assert_eq!("modify".parse::<RequestKind>(), Ok(RequestKind::Modify));
        assert!("script".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_entity_references_cover_all_shapes() {
        let doc = yaml(
            r#"
trigger:
  - platform: state
    entity_id: sensor.temp
action:
  - service: light.turn_on
    target:
      entity_id:
        - light.kitchen
        - light.hall
  - service: notify.notify
    data:
      message: "{{ states('sensor.temp') }}"
cards:
  - type: entities
    entities:
      - switch.fan
      - entity: lock.front_door
"#,
        );
        let ids: Vec<String> = entity_references(&doc, "")
            .into_iter()
            .map(|r| r.entity_id)
            .collect();
        assert!(ids.contains(&"sensor.temp".to_string()));
        assert!(ids.contains(&"light.kitchen".to_string()));
        assert!(ids.contains(&"light.hall".to_string()));
        assert!(ids.contains(&"switch.fan".to_string()));
        assert!(ids.contains(&"lock.front_door".to_string()));
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_entity_reference_locations() {
        let doc = yaml("action:\n  - target:\n      entity_id: light.kitchen, light.hall\n");
        let refs = entity_references(&doc, "");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].location, "action[0].target.entity_id");
    }

    #[test]
    fn test_service_calls_skip_tap_actions() {
        let doc = yaml(
            r#"
action:
  - action: light.turn_on
  - service: scene.turn_on
cards:
  - type: button
    tap_action:
      action: toggle
"#,
        );
        let calls = service_calls(&doc, "");
        let targets: Vec<&str> = calls.iter().map(|c| c.target.as_str()).collect();
        assert_eq!(targets, vec!["light.turn_on", "scene.turn_on"]);
        assert_eq!(calls[0].split(), Some(("light", "turn_on")));
    }

    #[test]
    fn test_top_level_items_for_list_documents() {
        let doc = yaml("- alias: a\n- alias: b\n");
        let items = top_level_items(&doc);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].0, "[1]");
    }

    #[test]
    fn test_tags_are_transparent() {
        let doc = yaml("entity_id: !input target_light\nalias: !secret name\n");
        assert!(get(&doc, "alias").is_some());
        assert!(entity_references(&doc, "").is_empty());
    }
}
