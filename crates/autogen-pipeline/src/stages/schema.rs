//! Stage 4: required keys and nesting for each document kind.
//!
//! Structural problems that Home Assistant would reject are blocking and
//! send the document back for repair. Cosmetic problems (missing alias,
//! unknown card type) are advisory.

use autogen_core::document::{get, join_index, join_key, top_level_items, untag};
use autogen_core::{DocumentKind, ValidationFinding, ValidationStage};
use serde_yaml::Value;

use super::type_name;

const AUTOMATION_MODES: [&str; 4] = ["single", "restart", "queued", "parallel"];

pub const VALID_CARD_TYPES: [&str; 28] = [
    "entities",
    "gauge",
    "glance",
    "history-graph",
    "horizontal-stack",
    "vertical-stack",
    "media-control",
    "thermostat",
    "weather-forecast",
    "picture-entity",
    "button",
    "light",
    "markdown",
    "map",
    "conditional",
    "grid",
    "statistics-graph",
    "logbook",
    "calendar",
    "energy-date-selection",
    "energy-usage-graph",
    "alarm-panel",
    "humidifier",
    "sensor",
    "tile",
    "area",
    "heading",
    "sections",
];

/// Card types that need a single `entity`.
const ENTITY_CARDS: [&str; 11] = [
    "gauge",
    "thermostat",
    "media-control",
    "weather-forecast",
    "picture-entity",
    "button",
    "light",
    "humidifier",
    "sensor",
    "tile",
    "alarm-panel",
];

/// Card types that nest a `cards` list.
const STACK_CARDS: [&str; 3] = ["horizontal-stack", "vertical-stack", "grid"];

const CARD_TYPE_HINT: &str =
    "use a built-in type such as entities, gauge, glance, history-graph, thermostat, media-control";

pub fn check(doc: &Value, kind: DocumentKind) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    match kind {
        DocumentKind::Automation => check_automations(doc, &mut findings),
        DocumentKind::Dashboard => check_dashboard(doc, &mut findings),
    }
    findings
}

fn blocking(location: &str, message: impl Into<String>) -> ValidationFinding {
    ValidationFinding::blocking(ValidationStage::Schema, location, message)
}

fn advisory(location: &str, message: impl Into<String>) -> ValidationFinding {
    ValidationFinding::advisory(ValidationStage::Schema, location, message)
}

// ---------------------------------------------------------------------------
// Automations
// ---------------------------------------------------------------------------

/// Automation section; decides what its entries must look like.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Trigger,
    Condition,
    Action,
}

impl Section {
    fn keys(&self) -> [&'static str; 2] {
        match self {
            Section::Trigger => ["trigger", "triggers"],
            Section::Condition => ["condition", "conditions"],
            Section::Action => ["action", "actions"],
        }
    }

    fn name(&self) -> &'static str {
        self.keys()[0]
    }
}

fn check_automations(doc: &Value, findings: &mut Vec<ValidationFinding>) {
    if let Value::Sequence(items) = untag(doc) {
        if items.is_empty() {
            findings.push(blocking("", "document contains no automations"));
            return;
        }
    }
    for (path, item) in top_level_items(doc) {
        check_automation(&path, item, findings);
    }
}

fn check_automation(path: &str, item: &Value, findings: &mut Vec<ValidationFinding>) {
    if !item.is_mapping() {
        findings.push(blocking(
            path,
            format!("automation must be a mapping, found {}", type_name(item)),
        ));
        return;
    }

    for section in [Section::Trigger, Section::Action] {
        if section_value(item, section).is_none() {
            findings.push(blocking(
                path,
                format!("automation is missing required key '{}'", section.name()),
            ));
        }
    }
    for section in [Section::Trigger, Section::Condition, Section::Action] {
        if let Some((key, value)) = section_value(item, section) {
            check_section(&join_key(path, key), value, section, findings);
        }
    }

    match get(item, "alias") {
        Some(Value::String(alias)) if !alias.trim().is_empty() => {}
        _ => findings.push(
            advisory(path, "automation has no alias")
                .with_suggestion("add a short descriptive alias"),
        ),
    }

    if let Some(mode) = get(item, "mode") {
        let known = matches!(mode, Value::String(m) if AUTOMATION_MODES.contains(&m.as_str()));
        if !known {
            let shown = match mode {
                Value::String(m) => m.clone(),
                other => type_name(other).to_string(),
            };
            findings.push(
                advisory(&join_key(path, "mode"), format!("unknown mode '{shown}'"))
                    .with_suggestion("use one of: single, restart, queued, parallel"),
            );
        }
    }
}

fn section_value<'a>(item: &'a Value, section: Section) -> Option<(&'static str, &'a Value)> {
    section
        .keys()
        .into_iter()
        .find_map(|key| get(item, key).map(|value| (key, value)))
}

fn check_section(path: &str, value: &Value, section: Section, findings: &mut Vec<ValidationFinding>) {
    let entries: Vec<(String, &Value)> = match value {
        Value::Mapping(_) => vec![(path.to_string(), value)],
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, entry)| (join_index(path, i), untag(entry)))
            .collect(),
        // Conditions accept a bare template string.
        Value::String(_) if section == Section::Condition => return,
        other => {
            findings.push(blocking(
                path,
                format!(
                    "'{}' must be a mapping or a list of mappings, found {}",
                    section.name(),
                    type_name(other)
                ),
            ));
            return;
        }
    };

    if entries.is_empty() && section != Section::Condition {
        let message = match section {
            Section::Trigger => "automation has no triggers and will never run",
            _ => "automation has no actions",
        };
        findings.push(advisory(path, message));
    }

    for (at, entry) in entries {
        match entry {
            Value::Mapping(_) => {
                if section == Section::Trigger
                    && get(entry, "platform").is_none()
                    && get(entry, "trigger").is_none()
                {
                    findings.push(blocking(&at, "trigger is missing 'platform'"));
                }
            }
            Value::String(_) if section == Section::Condition => {}
            other => findings.push(blocking(
                &at,
                format!(
                    "each {} entry must be a mapping, found {}",
                    section.name(),
                    type_name(other)
                ),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboards
// ---------------------------------------------------------------------------

fn check_dashboard(doc: &Value, findings: &mut Vec<ValidationFinding>) {
    let doc = untag(doc);
    if !doc.is_mapping() {
        findings.push(blocking(
            "",
            format!("dashboard must be a mapping, found {}", type_name(doc)),
        ));
        return;
    }
    let Some(views) = get(doc, "views") else {
        findings.push(blocking("", "dashboard is missing required key 'views'"));
        return;
    };
    let Value::Sequence(views) = views else {
        findings.push(blocking("views", "'views' must be a list"));
        return;
    };
    if views.is_empty() {
        findings.push(advisory("views", "dashboard has no views"));
    }

    for (i, view) in views.iter().enumerate() {
        let path = join_index("views", i);
        let view = untag(view);
        if !view.is_mapping() {
            findings.push(blocking(
                &path,
                format!("view must be a mapping, found {}", type_name(view)),
            ));
            continue;
        }
        if let Some(cards) = get(view, "cards") {
            check_cards(&join_key(&path, "cards"), cards, findings);
        }
        if let Some(Value::Sequence(sections)) = get(view, "sections") {
            for (j, section) in sections.iter().enumerate() {
                if let Some(cards) = get(section, "cards") {
                    let at = join_key(&join_index(&join_key(&path, "sections"), j), "cards");
                    check_cards(&at, cards, findings);
                }
            }
        }
    }
}

fn check_cards(path: &str, cards: &Value, findings: &mut Vec<ValidationFinding>) {
    let Value::Sequence(cards) = cards else {
        findings.push(advisory(path, "'cards' should be a list"));
        return;
    };
    for (i, card) in cards.iter().enumerate() {
        check_card(&join_index(path, i), untag(card), findings);
    }
}

fn check_card(path: &str, card: &Value, findings: &mut Vec<ValidationFinding>) {
    if !card.is_mapping() {
        findings.push(advisory(
            path,
            format!("card should be a mapping, found {}", type_name(card)),
        ));
        return;
    }
    let Some(card_type) = get(card, "type") else {
        findings.push(advisory(path, "card is missing 'type'"));
        return;
    };
    let Value::String(card_type) = card_type else {
        findings.push(advisory(&join_key(path, "type"), "card type should be a string"));
        return;
    };
    if card_type.starts_with("custom:") {
        return;
    }
    if !VALID_CARD_TYPES.contains(&card_type.as_str()) {
        findings.push(
            advisory(&join_key(path, "type"), format!("unknown card type '{card_type}'"))
                .with_suggestion(CARD_TYPE_HINT),
        );
        return;
    }

    if ENTITY_CARDS.contains(&card_type.as_str()) && get(card, "entity").is_none() {
        findings.push(advisory(
            path,
            format!("'{card_type}' card is missing required field 'entity'"),
        ));
    }
    if STACK_CARDS.contains(&card_type.as_str()) {
        match get(card, "cards") {
            Some(nested) => check_cards(&join_key(path, "cards"), nested, findings),
            None => findings.push(advisory(path, format!("'{card_type}' card has no 'cards'"))),
        }
    }
    if card_type == "conditional" {
        if let Some(nested) = get(card, "card") {
            check_card(&join_key(path, "card"), nested, findings);
        }
    }
}
