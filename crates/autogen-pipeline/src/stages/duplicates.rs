//! Stage 5: overlap with automations and dashboard views that already exist.

use autogen_core::document::{as_list, get, join_index, join_key, top_level_items, untag};
use autogen_core::{DocumentKind, ValidationFinding, ValidationStage};
use autogen_registry::{AutomationEntry, RegistryItem, RegistrySnapshot};
use serde_json::Value as Json;
use serde_yaml::Value;

/// Automation sections compared block by block, singular key first.
const SECTIONS: [(&str, &str); 3] = [
    ("trigger", "triggers"),
    ("condition", "conditions"),
    ("action", "actions"),
];

/// Older and newer spellings of the same key inside a block.
const KEY_ALIASES: [(&str, &str); 2] = [("platform", "trigger"), ("service", "action")];

pub fn check(doc: &Value, kind: DocumentKind, snapshot: &RegistrySnapshot) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    match kind {
        DocumentKind::Automation => check_automations(doc, snapshot, &mut findings),
        DocumentKind::Dashboard => check_views(doc, snapshot, &mut findings),
    }
    findings
}

fn check_automations(doc: &Value, snapshot: &RegistrySnapshot, findings: &mut Vec<ValidationFinding>) {
    let existing: Vec<&AutomationEntry> = snapshot.automations().collect();
    if existing.is_empty() {
        return;
    }

    for (path, item) in top_level_items(doc) {
        if !item.is_mapping() {
            continue;
        }

        if let Some(Value::String(alias)) = get(item, "alias") {
            let wanted = normalize(alias);
            let same = existing
                .iter()
                .find(|a| a.alias.as_deref().map(normalize).as_deref() == Some(wanted.as_str()));
            if let Some(other) = same {
                findings.push(
                    ValidationFinding::advisory(
                        ValidationStage::Duplicates,
                        join_key(&path, "alias"),
                        format!("an automation named '{}' already exists", alias.trim()),
                    )
                    .with_ref(&other.id),
                );
            }
        }

        for (singular, plural) in SECTIONS {
            let Some((key, value)) = [singular, plural]
                .into_iter()
                .find_map(|key| get(item, key).map(|value| (key, value)))
            else {
                continue;
            };
            for (i, block) in as_list(value).into_iter().enumerate() {
                let Some(block) = to_json(block) else { continue };
                let owner = existing
                    .iter()
                    .find(|a| existing_blocks(&a.config, singular, plural).contains(&block));
                if let Some(other) = owner {
                    findings.push(
                        ValidationFinding::advisory(
                            ValidationStage::Duplicates,
                            join_index(&join_key(&path, key), i),
                            format!(
                                "this {singular} duplicates one in existing automation '{}'",
                                other.display_name()
                            ),
                        )
                        .with_ref(&other.id),
                    );
                }
            }
        }
    }
}

fn check_views(doc: &Value, snapshot: &RegistrySnapshot, findings: &mut Vec<ValidationFinding>) {
    let Some(Value::Sequence(views)) = get(doc, "views") else {
        return;
    };
    for (i, view) in views.iter().enumerate() {
        let view = untag(view);
        let location = join_index("views", i);

        let path = match get(view, "path") {
            Some(Value::String(p)) => Some(p.as_str()),
            _ => None,
        };
        if let Some(path) = path {
            if let Some(other) = snapshot
                .dashboard_views()
                .find(|v| v.path.as_deref() == Some(path))
            {
                findings.push(
                    ValidationFinding::advisory(
                        ValidationStage::Duplicates,
                        join_key(&location, "path"),
                        format!("view path '{path}' already exists in dashboard '{}'", other.dashboard),
                    )
                    .with_ref(other.id()),
                );
                continue;
            }
        }

        if let Some(Value::String(title)) = get(view, "title") {
            let wanted = normalize(title);
            if let Some(other) = snapshot
                .dashboard_views()
                .find(|v| v.title.as_deref().map(normalize).as_deref() == Some(wanted.as_str()))
            {
                findings.push(
                    ValidationFinding::advisory(
                        ValidationStage::Duplicates,
                        join_key(&location, "title"),
                        format!("a view titled '{}' already exists in dashboard '{}'", title.trim(), other.dashboard),
                    )
                    .with_ref(other.id()),
                );
            }
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Convert a YAML block to JSON for comparison with registry configs.
/// Blocks JSON cannot represent (non-string keys) never match.
fn to_json(block: &Value) -> Option<Json> {
    serde_json::to_value(block).ok().map(canonical)
}

fn existing_blocks(config: &Json, singular: &str, plural: &str) -> Vec<Json> {
    let section = config.get(singular).or_else(|| config.get(plural));
    match section {
        Some(Json::Array(items)) => items.iter().cloned().map(canonical).collect(),
        Some(block @ Json::Object(_)) => vec![canonical(block.clone())],
        _ => Vec::new(),
    }
}

/// Rename legacy keys at the top of a block so both spellings compare equal.
fn canonical(mut block: Json) -> Json {
    if let Json::Object(map) = &mut block {
        for (old, new) in KEY_ALIASES {
            if map.contains_key(new) {
                continue;
            }
            if let Some(value) = map.remove(old) {
                map.insert(new.to_string(), value);
            }
        }
    }
    block
}
