//! Relevance filter: score registry items against a request.
//!
//! Scores are weighted sums of token matches against an item's identifier
//! parts, display name, area name and free-text attributes, plus a domain
//! bonus. Items that score zero are left out. Ordering is by score
//! descending, then by item reference, so identical inputs always produce
//! identical output.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use autogen_registry::{RegistryItem, RegistrySnapshot};

/// Tokens shorter than this only match exactly.
const MIN_SUBSTRING_LEN: usize = 3;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Per-field match weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceWeights {
    /// Token equals a part of the object id (`kitchen` in `light.kitchen`).
    pub id: f64,
    /// Token equals a word of the display name.
    pub name: f64,
    /// Token equals a word of the area name or an area alias.
    pub area: f64,
    /// Request names the item's domain. Applied at most once per item.
    pub domain: f64,
    /// Token equals a word of a free-text attribute.
    pub attribute: f64,
    /// Multiplier for substring instead of whole-word matches.
    pub substring_factor: f64,
    /// Score given to unmatched entities sharing an area with a strong match.
    pub room_sibling: f64,
    /// Non-domain score an entity must exceed before its area is expanded.
    /// With the defaults a single id hit (2.0) does not expand a room.
    pub room_expansion_threshold: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            id: 2.0,
            name: 1.5,
            area: 1.0,
            domain: 3.0,
            attribute: 0.5,
            substring_factor: 0.5,
            room_sibling: 0.25,
            room_expansion_threshold: 2.0,
        }
    }
}

/// Tunable scoring policy. Every field has a serde default so partial
/// config files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevancePolicy {
    pub weights: RelevanceWeights,
    pub stopwords: BTreeSet<String>,
    /// Extra terms a request token implies (`lamp` → `light`).
    pub synonyms: BTreeMap<String, Vec<String>>,
    /// Upper bound on returned candidates regardless of score.
    pub max_candidates: usize,
    pub expand_rooms: bool,
    pub include_automations: bool,
}

impl Default for RelevancePolicy {
    fn default() -> Self {
        Self {
            weights: RelevanceWeights::default(),
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            synonyms: DEFAULT_SYNONYMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
            max_candidates: 200,
            expand_rooms: true,
            include_automations: true,
        }
    }
}

const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "at", "be", "by", "can", "create", "do", "for",
    "from", "i", "if", "in", "into", "is", "it", "its", "make", "me", "my", "of", "off", "on",
    "or", "please", "set", "should", "so", "than", "that", "the", "then", "there", "this", "to",
    "turn", "up", "want", "when", "whenever", "while", "with", "you",
];

const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    ("lamp", &["light"]),
    ("lamps", &["light"]),
    ("lights", &["light"]),
    ("bulb", &["light"]),
    ("temp", &["temperature"]),
    ("thermostat", &["climate"]),
    ("heating", &["climate"]),
    ("ac", &["climate"]),
    ("blind", &["cover"]),
    ("blinds", &["cover"]),
    ("shade", &["cover"]),
    ("shades", &["cover"]),
    ("curtain", &["cover"]),
    ("garage", &["cover"]),
    ("door", &["lock", "binary_sensor"]),
    ("motion", &["binary_sensor", "occupancy"]),
    ("presence", &["person", "occupancy"]),
    ("tv", &["media_player"]),
    ("speaker", &["media_player"]),
    ("music", &["media_player"]),
    ("plug", &["switch"]),
    ("outlet", &["switch"]),
    ("alarm", &["alarm_control_panel"]),
    ("humidity", &["humidity"]),
];

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Reference to a rankable registry item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Entity(String),
    Automation(String),
}

impl ItemRef {
    pub fn id(&self) -> &str {
        match self {
            ItemRef::Entity(id) | ItemRef::Automation(id) => id,
        }
    }
}

/// A scored item; `matched_terms` lists request terms that contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceCandidate {
    pub item: ItemRef,
    pub score: f64,
    pub matched_terms: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tokenisation
// ---------------------------------------------------------------------------

/// Lowercase, split on anything that is not alphanumeric, drop stopwords
/// and duplicates. Order of first occurrence is kept.
pub fn tokenize(text: &str, stopwords: &BTreeSet<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !stopwords.contains(*t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Request tokens plus synonym expansions, each expansion listed once.
fn expand_terms(tokens: &[String], synonyms: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let mut terms: Vec<String> = tokens.to_vec();
    for token in tokens {
        if let Some(extra) = synonyms.get(token) {
            for term in extra {
                if !terms.contains(term) {
                    terms.push(term.clone());
                }
            }
        }
    }
    terms
}

/// Weight of `term` against a field's words: full weight for a whole-word
/// match, reduced for a substring match in either direction.
fn field_match(term: &str, field_words: &[String], weight: f64, substring_factor: f64) -> f64 {
    let mut best = 0.0_f64;
    for word in field_words {
        if word == term {
            return weight;
        }
        let shorter = term.len().min(word.len());
        if shorter >= MIN_SUBSTRING_LEN && (word.contains(term) || term.contains(word.as_str())) {
            best = best.max(weight * substring_factor);
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

struct Scored {
    item: ItemRef,
    area: Option<String>,
    score: f64,
    keyword_score: f64,
    matched_terms: Vec<String>,
}

fn score_item<T: RegistryItem>(
    item: &T,
    item_ref: ItemRef,
    terms: &[String],
    joined_request: &str,
    snapshot: &RegistrySnapshot,
    policy: &RelevancePolicy,
) -> Scored {
    let w = &policy.weights;
    let object_id = item.item_id().split_once('.').map_or(item.item_id(), |(_, o)| o);
    let id_words = words(object_id);
    let name_words = words(item.display_name());
    let mut area_words = Vec::new();
    if let Some(area) = item.area_ref().and_then(|id| snapshot.area(id)) {
        area_words.extend(words(&area.name));
        for alias in &area.aliases {
            area_words.extend(words(alias));
        }
    }
    let attribute_words: Vec<String> = item
        .attribute_text()
        .iter()
        .flat_map(|t| words(t))
        .collect();

    let mut keyword_score = 0.0;
    let mut matched_terms = Vec::new();
    for term in terms {
        let contribution = field_match(term, &id_words, w.id, w.substring_factor)
            + field_match(term, &name_words, w.name, w.substring_factor)
            + field_match(term, &area_words, w.area, w.substring_factor)
            + field_match(term, &attribute_words, w.attribute, w.substring_factor);
        if contribution > 0.0 {
            keyword_score += contribution;
            matched_terms.push(term.clone());
        }
    }

    let kind = item.kind();
    let kind_phrase = kind.replace('_', " ");
    let mut score = keyword_score;
    let domain_hit = terms.iter().any(|t| t == kind)
        || (kind_phrase.contains(' ') && format!(" {joined_request} ").contains(&format!(" {kind_phrase} ")));
    if domain_hit {
        score += w.domain;
        if !matched_terms.iter().any(|t| t == kind) {
            matched_terms.push(kind.to_string());
        }
    }

    Scored {
        item: item_ref,
        area: item.area_ref().map(str::to_string),
        score,
        keyword_score,
        matched_terms,
    }
}

fn order(a: &RelevanceCandidate, b: &RelevanceCandidate) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.item.id().cmp(b.item.id()))
        .then_with(|| a.item.cmp(&b.item))
}

/// Rank active entities (and existing automations, when enabled) against
/// `request_text`. Zero-score items are excluded.
pub fn rank(
    request_text: &str,
    snapshot: &RegistrySnapshot,
    policy: &RelevancePolicy,
) -> Vec<RelevanceCandidate> {
    let tokens = tokenize(request_text, &policy.stopwords);
    if tokens.is_empty() {
        return Vec::new();
    }
    let terms = expand_terms(&tokens, &policy.synonyms);
    let joined = tokens.join(" ");

    let mut scored: Vec<Scored> = snapshot
        .active_entities()
        .map(|e| {
            score_item(
                e,
                ItemRef::Entity(e.entity_id.clone()),
                &terms,
                &joined,
                snapshot,
                policy,
            )
        })
        .collect();

    if policy.expand_rooms {
        let strong_areas: BTreeSet<String> = scored
            .iter()
            .filter(|s| s.keyword_score > policy.weights.room_expansion_threshold)
            .filter_map(|s| s.area.clone())
            .collect();
        for s in scored.iter_mut() {
            if s.score > 0.0 {
                continue;
            }
            if let Some(area) = s.area.as_ref().filter(|a| strong_areas.contains(*a)) {
                s.score = policy.weights.room_sibling;
                let label = snapshot.area_name(area).unwrap_or(area).to_lowercase();
                s.matched_terms.push(format!("room:{label}"));
            }
        }
    }

    if policy.include_automations {
        scored.extend(snapshot.automations().map(|a| {
            score_item(
                a,
                ItemRef::Automation(a.id.clone()),
                &terms,
                &joined,
                snapshot,
                policy,
            )
        }));
    }

    let mut candidates: Vec<RelevanceCandidate> = scored
        .into_iter()
        .filter(|s| s.score > 0.0)
        .map(|s| RelevanceCandidate {
            item: s.item,
            score: s.score,
            matched_terms: s.matched_terms,
        })
        .collect();
    candidates.sort_by(order);
    candidates.truncate(policy.max_candidates);
    candidates
}

/// Every active entity, matched ones first in [`rank`] order, the rest
/// grouped by area then id with score zero.
///
/// Used for dashboards, which lay out the whole inventory, and as the
/// fallback when a request matches nothing.
pub fn rank_inventory(
    request_text: &str,
    snapshot: &RegistrySnapshot,
    policy: &RelevancePolicy,
) -> Vec<RelevanceCandidate> {
    let entity_policy = RelevancePolicy {
        include_automations: false,
        max_candidates: usize::MAX,
        ..policy.clone()
    };
    let mut ranked = rank(request_text, snapshot, &entity_policy);
    let matched: BTreeSet<String> = ranked.iter().map(|c| c.item.id().to_string()).collect();

    let mut rest: Vec<(&str, &str)> = snapshot
        .active_entities()
        .filter(|e| !matched.contains(&e.entity_id))
        .map(|e| (e.area_id.as_deref().unwrap_or("\u{10FFFF}"), e.entity_id.as_str()))
        .collect();
    rest.sort();

    ranked.extend(rest.into_iter().map(|(_, id)| RelevanceCandidate {
        item: ItemRef::Entity(id.to_string()),
        score: 0.0,
        matched_terms: Vec::new(),
    }));
    ranked.truncate(policy.max_candidates);
    ranked
}
