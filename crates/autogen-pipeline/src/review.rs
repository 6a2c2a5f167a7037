//! Deterministic review rules for documents the user already runs.
//!
//! A review request runs these over the existing document before the model
//! sees it. Findings never block; they are reported next to the model's
//! own review.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use autogen_core::document::{
    as_list, domain_of, get, join_index, join_key, top_level_items, untag,
};
use autogen_core::{DocumentKind, SensitivePolicy};
use autogen_registry::RegistrySnapshot;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Domains whose entities normally deserve a place on a dashboard.
const DISPLAYABLE_DOMAINS: [&str; 14] = [
    "binary_sensor",
    "camera",
    "climate",
    "cover",
    "fan",
    "humidifier",
    "light",
    "lock",
    "media_player",
    "sensor",
    "switch",
    "vacuum",
    "water_heater",
    "weather",
];

/// Card built for each domain's entities.
const RECOMMENDED_CARDS: [(&str, &str); 5] = [
    ("camera", "picture-entity"),
    ("climate", "thermostat"),
    ("media_player", "media-control"),
    ("sensor", "gauge"),
    ("weather", "weather-forecast"),
];

const STACK_CARDS: [&str; 2] = ["horizontal-stack", "vertical-stack"];

/// Top-level cards a view may hold before it should be grouped.
const MAX_UNGROUPED_CARDS: usize = 8;

/// Entity ids listed per domain in summary findings.
const MAX_EXAMPLES: usize = 3;

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSeverity {
    Critical,
    Warning,
    Suggestion,
    Info,
}

impl ReviewSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewSeverity::Critical => "critical",
            ReviewSeverity::Warning => "warning",
            ReviewSeverity::Suggestion => "suggestion",
            ReviewSeverity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewCategory {
    TriggerEfficiency,
    MissingGuards,
    Security,
    DeprecatedPatterns,
    UnusedEntities,
    InconsistentCards,
    MissingAreaCoverage,
    CardTypeRecommendation,
    LayoutOptimization,
}

impl ReviewCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewCategory::TriggerEfficiency => "trigger_efficiency",
            ReviewCategory::MissingGuards => "missing_guards",
            ReviewCategory::Security => "security",
            ReviewCategory::DeprecatedPatterns => "deprecated_patterns",
            ReviewCategory::UnusedEntities => "unused_entities",
            ReviewCategory::InconsistentCards => "inconsistent_cards",
            ReviewCategory::MissingAreaCoverage => "missing_area_coverage",
            ReviewCategory::CardTypeRecommendation => "card_type_recommendation",
            ReviewCategory::LayoutOptimization => "layout_optimization",
        }
    }
}

/// One observation about an existing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub severity: ReviewSeverity,
    pub category: ReviewCategory,
    /// Automation alias or id, view title; empty for whole-dashboard findings.
    pub subject: String,
    /// Dotted path inside the document.
    pub location: String,
    pub title: String,
    pub description: String,
}

impl ReviewFinding {
    fn new(
        severity: ReviewSeverity,
        category: ReviewCategory,
        location: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            subject: String::new(),
            location: location.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

impl fmt::Display for ReviewFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}]", self.severity.as_str(), self.category.as_str())?;
        if !self.subject.is_empty() {
            write!(f, " {}:", self.subject)?;
        }
        write!(f, " {}", self.title)?;
        if !self.location.is_empty() {
            write!(f, " (at {})", self.location)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Runs every rule for a document kind.
#[derive(Debug, Clone, Default)]
pub struct ReviewRules {
    sensitive: SensitivePolicy,
}

impl ReviewRules {
    pub fn new(sensitive: SensitivePolicy) -> Self {
        Self { sensitive }
    }

    pub fn review(&self, doc: &Value, kind: DocumentKind, snapshot: &RegistrySnapshot) -> Vec<ReviewFinding> {
        let findings = match kind {
            DocumentKind::Automation => self.review_automations(doc),
            DocumentKind::Dashboard => review_dashboard(doc, snapshot),
        };
        tracing::debug!(kind = %kind, findings = findings.len(), "review rules finished");
        findings
    }

    fn review_automations(&self, doc: &Value) -> Vec<ReviewFinding> {
        let mut findings = Vec::new();
        for (path, item) in top_level_items(doc) {
            if !item.is_mapping() {
                continue;
            }
            let automation = Automation::read(&path, item);
            findings.extend(automation.trigger_efficiency());
            findings.extend(automation.missing_guards());
            findings.extend(self.security(&automation));
            findings.extend(automation.deprecated_patterns());
        }
        findings
    }

    /// Actions on sensitive domains: critical without any condition,
    /// a warning otherwise.
    fn security(&self, automation: &Automation<'_>) -> Vec<ReviewFinding> {
        let mut findings = Vec::new();
        for (location, action) in &automation.actions {
            let mut domains = BTreeSet::new();
            if let Some(domain) = action_service(action).and_then(domain_of) {
                domains.insert(domain.to_string());
            }
            for id in action_entity_ids(action) {
                if let Some(domain) = domain_of(id) {
                    domains.insert(domain.to_string());
                }
            }
            let sensitive: Vec<String> = domains
                .into_iter()
                .filter(|d| self.sensitive.is_sensitive_domain(d))
                .collect();
            if sensitive.is_empty() {
                continue;
            }

            let listed = sensitive.join(", ");
            let (severity, detail) = if automation.conditions.is_empty() {
                (
                    ReviewSeverity::Critical,
                    "It has no conditions, so the action runs unconditionally.",
                )
            } else {
                (
                    ReviewSeverity::Warning,
                    "Check that the conditions prevent unintended activation.",
                )
            };
            findings.push(
                ReviewFinding::new(
                    severity,
                    ReviewCategory::Security,
                    location.clone(),
                    format!("Sensitive domain without adequate guards: {listed}"),
                    format!("This automation controls sensitive domain(s): {listed}. {detail}"),
                )
                .about(&automation.subject),
            );
        }
        findings
    }
}

/// The parts of one automation the rules look at.
struct Automation<'a> {
    subject: String,
    triggers: Vec<(String, &'a Value)>,
    conditions: Vec<(String, &'a Value)>,
    actions: Vec<(String, &'a Value)>,
}

impl<'a> Automation<'a> {
    fn read(path: &str, item: &'a Value) -> Self {
        let subject = ["alias", "id"]
            .into_iter()
            .find_map(|key| match get(item, key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "unnamed automation".to_string());
        let mut triggers = section(item, path, "trigger", "triggers");
        let conditions = section(item, path, "condition", "conditions");
        let mut actions = section(item, path, "action", "actions");
        triggers.retain(|(_, v)| v.is_mapping());
        actions.retain(|(_, v)| v.is_mapping());
        Self {
            subject,
            triggers,
            conditions,
            actions,
        }
    }

    /// `time_pattern` triggers that poll every few seconds or minutes.
    fn trigger_efficiency(&self) -> Vec<ReviewFinding> {
        self.triggers
            .iter()
            .filter(|(_, trigger)| trigger_platform(trigger) == Some("time_pattern"))
            .filter(|(_, trigger)| {
                let by_seconds = get(trigger, "seconds").is_some();
                let by_minutes = matches!(
                    get(trigger, "minutes"),
                    Some(Value::String(m)) if m.trim_start().starts_with('/')
                );
                by_seconds || by_minutes
            })
            .map(|(location, _)| {
                ReviewFinding::new(
                    ReviewSeverity::Warning,
                    ReviewCategory::TriggerEfficiency,
                    location.clone(),
                    "Frequent time_pattern trigger",
                    "This automation polls on a short time_pattern. A state trigger or a \
                     longer interval usually does the same job.",
                )
                .about(&self.subject)
            })
            .collect()
    }

    fn missing_guards(&self) -> Option<ReviewFinding> {
        if self.triggers.is_empty() || !self.conditions.is_empty() {
            return None;
        }
        Some(
            ReviewFinding::new(
                ReviewSeverity::Suggestion,
                ReviewCategory::MissingGuards,
                self.triggers[0].0.clone(),
                "No conditions defined",
                "This automation has triggers but no conditions. Conditions keep it \
                 from firing when it should not.",
            )
            .about(&self.subject),
        )
    }

    /// `homeassistant.turn_on` / `turn_off` instead of the target's own domain.
    fn deprecated_patterns(&self) -> Vec<ReviewFinding> {
        let mut findings = Vec::new();
        for (location, action) in &self.actions {
            let Some(service) = action_service(action) else { continue };
            let verb = match service {
                "homeassistant.turn_on" => "turn_on",
                "homeassistant.turn_off" => "turn_off",
                _ => continue,
            };
            let mut description =
                format!("`{service}` is a generic call. Domain-specific services are clearer.");
            if let Some(domain) = action_entity_ids(action).into_iter().find_map(domain_of) {
                description.push_str(&format!(" Use `{domain}.{verb}` instead."));
            }
            findings.push(
                ReviewFinding::new(
                    ReviewSeverity::Suggestion,
                    ReviewCategory::DeprecatedPatterns,
                    location.clone(),
                    format!("Generic {service} call"),
                    description,
                )
                .about(&self.subject),
            );
        }
        findings
    }
}

/// Items of the first non-empty spelling of a section, with their paths.
fn section<'a>(item: &'a Value, path: &str, singular: &str, plural: &str) -> Vec<(String, &'a Value)> {
    for key in [singular, plural] {
        let Some(value) = get(item, key) else { continue };
        let at = join_key(path, key);
        let items: Vec<(String, &Value)> = match value {
            Value::Sequence(_) => as_list(value)
                .into_iter()
                .enumerate()
                .map(|(i, v)| (join_index(&at, i), v))
                .collect(),
            Value::Null => Vec::new(),
            other => vec![(at, other)],
        };
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

fn trigger_platform(trigger: &Value) -> Option<&str> {
    ["platform", "trigger"]
        .into_iter()
        .find_map(|key| get(trigger, key).and_then(Value::as_str))
}

/// `service` or the newer dotted `action` key.
fn action_service(action: &Value) -> Option<&str> {
    ["service", "action"]
        .into_iter()
        .filter_map(|key| get(action, key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| s.contains('.') && !s.contains("{{"))
}

/// Entity ids under `target.entity_id` and the older `data.entity_id`.
fn action_entity_ids(action: &Value) -> Vec<&str> {
    let mut ids = Vec::new();
    for holder in ["target", "data"] {
        let Some(node) = get(action, holder).and_then(|h| get(h, "entity_id")) else {
            continue;
        };
        for id in as_list(node) {
            if let Some(id) = id.as_str() {
                ids.extend(id.split(',').map(str::trim).filter(|s| !s.is_empty()));
            }
        }
    }
    ids
}

// ---------------------------------------------------------------------------
// Dashboards
// ---------------------------------------------------------------------------

/// An entity shown on a card, with the type of the card that shows it.
struct Placement<'a> {
    entity_id: &'a str,
    card_type: &'a str,
}

fn review_dashboard(doc: &Value, snapshot: &RegistrySnapshot) -> Vec<ReviewFinding> {
    let views: Vec<&Value> = get(doc, "views").map(as_list).unwrap_or_default();
    let mut placements = Vec::new();
    for &view in &views {
        collect_placements(&view_cards(view), &mut placements);
    }

    let mut findings = Vec::new();
    findings.extend(unused_entities(&placements, snapshot));
    findings.extend(inconsistent_cards(&placements));
    findings.extend(missing_area_coverage(&views, snapshot));
    findings.extend(card_type_recommendations(&placements));
    findings.extend(layout_optimization(&views));
    findings
}

/// Cards of a view, including those inside sections.
fn view_cards(view: &Value) -> Vec<&Value> {
    let mut cards: Vec<&Value> = get(view, "cards").map(as_list).unwrap_or_default();
    for section in get(view, "sections").map(as_list).unwrap_or_default() {
        cards.extend(get(section, "cards").map(as_list).unwrap_or_default());
    }
    cards
}

fn collect_placements<'a>(cards: &[&'a Value], out: &mut Vec<Placement<'a>>) {
    for &card in cards {
        let card_type = get(card, "type").and_then(Value::as_str).unwrap_or("");
        if STACK_CARDS.contains(&card_type) {
            let nested: Vec<&Value> = get(card, "cards").map(as_list).unwrap_or_default();
            collect_placements(&nested, out);
            continue;
        }
        if let Some(entity_id) = get(card, "entity").and_then(Value::as_str) {
            out.push(Placement { entity_id, card_type });
        }
        for row in get(card, "entities").map(as_list).unwrap_or_default() {
            let entity_id = match row {
                Value::String(s) => Some(s.as_str()),
                other => get(other, "entity").and_then(Value::as_str),
            };
            if let Some(entity_id) = entity_id {
                out.push(Placement { entity_id, card_type });
            }
        }
    }
}

/// Active entities of displayable domains that no card shows. One summary
/// finding for the whole dashboard.
fn unused_entities(placements: &[Placement<'_>], snapshot: &RegistrySnapshot) -> Option<ReviewFinding> {
    let shown: BTreeSet<&str> = placements.iter().map(|p| p.entity_id).collect();
    let mut by_domain: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for entity in snapshot.active_entities() {
        if DISPLAYABLE_DOMAINS.contains(&entity.domain()) && !shown.contains(entity.entity_id.as_str()) {
            by_domain
                .entry(entity.domain())
                .or_default()
                .push(&entity.entity_id);
        }
    }
    let total: usize = by_domain.values().map(Vec::len).sum();
    if total == 0 {
        return None;
    }

    let mut description = format!(
        "{total} entities across {} domain(s) are not on any card:",
        by_domain.len()
    );
    for (domain, ids) in &by_domain {
        description.push_str(&format!("\n  {domain}: {}", examples(ids)));
    }
    Some(ReviewFinding::new(
        ReviewSeverity::Suggestion,
        ReviewCategory::UnusedEntities,
        "views",
        format!("{total} entities not on any dashboard card"),
        description,
    ))
}

/// Domains whose entities are spread over different card types.
fn inconsistent_cards(placements: &[Placement<'_>]) -> Vec<ReviewFinding> {
    let mut by_domain: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for placement in placements {
        if let Some(domain) = domain_of(placement.entity_id) {
            by_domain.entry(domain).or_default().insert(placement.card_type);
        }
    }
    by_domain
        .into_iter()
        .filter(|(_, types)| types.len() > 1)
        .map(|(domain, types)| {
            let types: Vec<&str> = types.into_iter().collect();
            ReviewFinding::new(
                ReviewSeverity::Suggestion,
                ReviewCategory::InconsistentCards,
                "views",
                format!("Inconsistent card types for '{domain}' domain"),
                format!(
                    "Entities in the '{domain}' domain use several card types: {}.",
                    types.join(", ")
                ),
            )
        })
        .collect()
}

/// Areas holding active entities with no view titled (or pathed) after them.
fn missing_area_coverage(views: &[&Value], snapshot: &RegistrySnapshot) -> Vec<ReviewFinding> {
    let mut names = BTreeSet::new();
    for &view in views {
        for key in ["title", "path"] {
            if let Some(name) = get(view, key).and_then(Value::as_str) {
                names.insert(name.trim().to_lowercase());
            }
        }
    }
    let populated: BTreeSet<&str> = snapshot
        .active_entities()
        .filter_map(|e| e.area_id.as_deref())
        .collect();

    snapshot
        .areas()
        .filter(|area| populated.contains(area.area_id.as_str()))
        .filter(|area| {
            !names.contains(&area.name.trim().to_lowercase()) && !names.contains(&area.area_id)
        })
        .map(|area| {
            ReviewFinding::new(
                ReviewSeverity::Suggestion,
                ReviewCategory::MissingAreaCoverage,
                "views",
                format!("No dashboard view for area: {}", area.name),
                format!(
                    "The area '{}' has entities but no matching dashboard view.",
                    area.name
                ),
            )
            .about(&area.name)
        })
        .collect()
}

/// Entities shown on a generic card where a domain-specific one exists.
fn card_type_recommendations(placements: &[Placement<'_>]) -> Vec<ReviewFinding> {
    let recommended: BTreeMap<&str, &str> = RECOMMENDED_CARDS.into_iter().collect();
    let mut groups: BTreeMap<(&str, &str, &str), Vec<&str>> = BTreeMap::new();
    for placement in placements {
        let Some(domain) = domain_of(placement.entity_id) else { continue };
        let Some(&wanted) = recommended.get(domain) else { continue };
        if placement.card_type.is_empty() || placement.card_type == wanted {
            continue;
        }
        groups
            .entry((domain, placement.card_type, wanted))
            .or_default()
            .push(placement.entity_id);
    }
    groups
        .into_iter()
        .map(|((domain, current, wanted), ids)| {
            ReviewFinding::new(
                ReviewSeverity::Info,
                ReviewCategory::CardTypeRecommendation,
                "views",
                format!("Consider '{wanted}' card for {domain} entities"),
                format!(
                    "{} {domain} entities use '{current}' cards; the '{wanted}' card is built \
                     for them. Entities: {}",
                    ids.len(),
                    examples(&ids)
                ),
            )
        })
        .collect()
}

/// Long single-column views without any stack grouping.
fn layout_optimization(views: &[&Value]) -> Vec<ReviewFinding> {
    let mut findings = Vec::new();
    for (i, view) in views.iter().enumerate() {
        let cards: Vec<&Value> = get(view, "cards").map(as_list).unwrap_or_default();
        if cards.len() <= MAX_UNGROUPED_CARDS {
            continue;
        }
        let grouped = cards.iter().any(|card| {
            get(card, "type")
                .and_then(Value::as_str)
                .is_some_and(|t| STACK_CARDS.contains(&t))
        });
        if grouped {
            continue;
        }
        let title = get(view, "title")
            .and_then(Value::as_str)
            .unwrap_or("Unnamed")
            .to_string();
        findings.push(
            ReviewFinding::new(
                ReviewSeverity::Suggestion,
                ReviewCategory::LayoutOptimization,
                join_key(&join_index("views", i), "cards"),
                format!("Long single-column layout in '{title}'"),
                format!(
                    "The '{title}' view has {} top-level cards and no stacks. Grouping related \
                     cards in horizontal-stack or vertical-stack cards cuts scrolling.",
                    cards.len()
                ),
            )
            .about(title),
        );
    }
    findings
}

fn examples(ids: &[&str]) -> String {
    let mut listed = ids
        .iter()
        .take(MAX_EXAMPLES)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > MAX_EXAMPLES {
        listed.push_str(&format!(" (+{} more)", ids.len() - MAX_EXAMPLES));
    }
    listed
}

/// Parse and review an existing document; unparseable text yields nothing.
pub fn review_text(
    rules: &ReviewRules,
    text: &str,
    kind: DocumentKind,
    snapshot: &RegistrySnapshot,
) -> Vec<ReviewFinding> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(doc) => rules.review(untag(&doc), kind, snapshot),
        Err(e) => {
            tracing::debug!(error = %e, "existing document is not YAML; skipping review rules");
            Vec::new()
        }
    }
}
