//! Budget packer: fit ranked candidates into a size ceiling.
//!
//! Candidates are taken strictly in rank order. The highest-ranked ones are
//! rendered in full detail until either the full-detail cap or the budget
//! is hit; the following ones get a one-line summary; whatever still does
//! not fit is dropped and counted per domain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use autogen_registry::{AutomationEntry, EntityEntry, RegistryItem, RegistrySnapshot};

use super::budget::TokenEstimator;
use super::relevance::{ItemRef, RelevanceCandidate};

/// Domains named individually in the dropped-items line.
const DROPPED_DOMAINS_SHOWN: usize = 6;

/// Entity attributes worth spending budget on in full-detail lines.
const DETAIL_ATTRIBUTES: [&str; 3] = ["device_class", "unit_of_measurement", "state_class"];

/// Rendered form of a packed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detail {
    Full,
    Summary,
}

/// One line of packed context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedItem {
    pub item: ItemRef,
    pub score: f64,
    pub detail: Detail,
    pub line: String,
    /// Estimated size of `line` plus its newline.
    pub size: usize,
}

/// Candidates that did not fit, by domain (`automation` for automations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedItems {
    pub count: usize,
    pub by_domain: BTreeMap<String, usize>,
}

impl DroppedItems {
    fn record(&mut self, domain: &str) {
        self.count += 1;
        *self.by_domain.entry(domain.to_string()).or_default() += 1;
    }
}

/// Result of packing. `estimated_size <= budget_ceiling` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedContext {
    pub full_detail_items: Vec<PackedItem>,
    pub summary_items: Vec<PackedItem>,
    pub dropped: DroppedItems,
    pub estimated_size: usize,
    pub budget_ceiling: usize,
    /// Some candidates were dropped; the prompt must say context is incomplete.
    pub truncated: bool,
}

impl PackedContext {
    pub fn is_empty(&self) -> bool {
        self.full_detail_items.is_empty() && self.summary_items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.full_detail_items.len() + self.summary_items.len()
    }

    /// Every packed item, full detail first.
    pub fn items(&self) -> impl Iterator<Item = &PackedItem> {
        self.full_detail_items.iter().chain(self.summary_items.iter())
    }

    /// Context block: one line per item, full detail first.
    pub fn render(&self) -> String {
        self.items()
            .map(|item| item.line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `+ 45 sensor, 12 binary_sensor entities not listed`, or `None` when
    /// nothing was dropped.
    pub fn dropped_summary_line(&self) -> Option<String> {
        if self.dropped.count == 0 {
            return None;
        }
        Some(dropped_line(&self.dropped))
    }
}

fn dropped_line(dropped: &DroppedItems) -> String {
    let mut domains: Vec<(&String, &usize)> = dropped.by_domain.iter().collect();
    domains.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut parts: Vec<String> = domains
        .iter()
        .take(DROPPED_DOMAINS_SHOWN)
        .map(|(domain, count)| format!("{count} {domain}"))
        .collect();
    if domains.len() > DROPPED_DOMAINS_SHOWN {
        let rest: usize = domains[DROPPED_DOMAINS_SHOWN..].iter().map(|(_, c)| **c).sum();
        parts.push(format!("{rest} other"));
    }
    format!("+ {} entities not listed", parts.join(", "))
}

/// Worst-case length of [`PackedContext::dropped_summary_line`], for budget
/// reservation before packing.
pub fn dropped_line_reserve() -> usize {
    let worst = DroppedItems {
        count: usize::MAX,
        by_domain: (0..=DROPPED_DOMAINS_SHOWN)
            .map(|i| (format!("alarm_control_panel_{i}"), 99_999))
            .collect(),
    };
    dropped_line(&worst).len()
}

// ---------------------------------------------------------------------------
// Packer
// ---------------------------------------------------------------------------

/// Packs ranked candidates under a size ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetPacker {
    estimator: TokenEstimator,
}

struct Rendered {
    domain: String,
    full: String,
    summary: String,
}

impl BudgetPacker {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Pack `candidates` (already in rank order) into at most
    /// `budget_ceiling` estimated tokens, with at most `full_detail_floor`
    /// full-detail items.
    pub fn pack(
        &self,
        snapshot: &RegistrySnapshot,
        candidates: &[RelevanceCandidate],
        budget_ceiling: usize,
        full_detail_floor: usize,
    ) -> PackedContext {
        let mut packed = PackedContext {
            full_detail_items: Vec::new(),
            summary_items: Vec::new(),
            dropped: DroppedItems::default(),
            estimated_size: 0,
            budget_ceiling,
            truncated: false,
        };

        let mut full_phase = full_detail_floor > 0;
        let mut summary_phase = true;
        for candidate in candidates {
            let Some(rendered) = render(snapshot, &candidate.item) else {
                debug!(item = %candidate.item.id(), "candidate not in snapshot; skipped");
                continue;
            };

            if full_phase {
                let size = self.line_size(&rendered.full);
                if packed.full_detail_items.len() < full_detail_floor
                    && packed.estimated_size + size <= budget_ceiling
                {
                    packed.estimated_size += size;
                    packed.full_detail_items.push(PackedItem {
                        item: candidate.item.clone(),
                        score: candidate.score,
                        detail: Detail::Full,
                        line: rendered.full,
                        size,
                    });
                    continue;
                }
                full_phase = false;
            }

            if summary_phase {
                let size = self.line_size(&rendered.summary);
                if packed.estimated_size + size <= budget_ceiling {
                    packed.estimated_size += size;
                    packed.summary_items.push(PackedItem {
                        item: candidate.item.clone(),
                        score: candidate.score,
                        detail: Detail::Summary,
                        line: rendered.summary,
                        size,
                    });
                    continue;
                }
                summary_phase = false;
            }

            packed.dropped.record(&rendered.domain);
        }

        packed.truncated = packed.dropped.count > 0;
        packed
    }

    fn line_size(&self, line: &str) -> usize {
        // The joining newline is counted against every line.
        self.estimator.estimate(line) + self.estimator.estimate("\n")
    }
}

fn render(snapshot: &RegistrySnapshot, item: &ItemRef) -> Option<Rendered> {
    match item {
        ItemRef::Entity(id) => snapshot.entity(id).map(|e| render_entity(snapshot, e)),
        ItemRef::Automation(id) => snapshot.automation(id).map(render_automation),
    }
}

fn render_entity(snapshot: &RegistrySnapshot, entity: &EntityEntry) -> Rendered {
    let area = entity
        .area_id
        .as_deref()
        .map(|id| snapshot.area_name(id).unwrap_or(id));
    let area_suffix = area.map(|a| format!(" [{a}]")).unwrap_or_default();

    let mut full = format!("- `{}`", entity.entity_id);
    let name = entity.name.as_deref().or(entity.original_name.as_deref());
    if let Some(name) = name {
        full.push_str(&format!(" ({name})"));
    }
    full.push_str(&area_suffix);
    let details: Vec<String> = DETAIL_ATTRIBUTES
        .iter()
        .filter_map(|key| {
            entity
                .attributes
                .get(*key)
                .and_then(|v| v.as_str())
                .map(|v| format!("{key}: {v}"))
        })
        .collect();
    if !details.is_empty() {
        full.push_str(&format!(" {{{}}}", details.join(", ")));
    }

    Rendered {
        domain: entity.domain().to_string(),
        full,
        summary: format!("- `{}`{area_suffix}", entity.entity_id),
    }
}

fn render_automation(automation: &AutomationEntry) -> Rendered {
    let summary = format!(
        "- automation `{}` ({})",
        automation.id,
        automation.display_name()
    );
    let full = match automation.description.as_deref().filter(|d| !d.is_empty()) {
        Some(description) => format!("{summary}: {description}"),
        None => summary.clone(),
    };
    Rendered {
        domain: "automation".to_string(),
        full,
        summary,
    }
}
