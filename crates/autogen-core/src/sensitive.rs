//! Sensitive-domain gate.
//!
//! Flags documents that act on or react to high-risk domains. The flag
//! never stops generation; it only requires confirmation before apply.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::document::{
    domain_of, entity_references, get, join_key, service_calls, top_level_items, walk_mappings,
    DocumentKind,
};

/// Domains that always require confirmation.
pub const DEFAULT_SENSITIVE_DOMAINS: [&str; 5] =
    ["lock", "alarm_control_panel", "cover", "camera", "siren"];

/// Automation sections inspected; conditions only read state.
const AUTOMATION_SECTIONS: [&str; 4] = ["trigger", "triggers", "action", "actions"];

/// Which domains are sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivePolicy {
    domains: BTreeSet<String>,
}

impl Default for SensitivePolicy {
    fn default() -> Self {
        Self {
            domains: DEFAULT_SENSITIVE_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Why a document was (or was not) flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub sensitive: bool,
    /// Sensitive domains touched, sorted.
    pub domains: Vec<String>,
    /// Entity ids and services that touched them, in document order.
    pub refs: Vec<String>,
}

impl SensitivePolicy {
    /// Defaults plus caller-configured domains. Additions never remove a default.
    pub fn with_additional<I, S>(additional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::default();
        for domain in additional {
            let domain: String = domain.into();
            policy.domains.insert(domain.trim().to_lowercase());
        }
        policy.domains.retain(|d| !d.is_empty());
        policy
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    pub fn is_sensitive_domain(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// `true` when any trigger or action (automations) or any card
    /// (dashboards) touches a sensitive domain.
    pub fn classify(&self, doc: &Value, kind: DocumentKind) -> bool {
        self.inspect(doc, kind).sensitive
    }

    pub fn inspect(&self, doc: &Value, kind: DocumentKind) -> SensitivityReport {
        let mut domains = BTreeSet::new();
        let mut refs = Vec::new();
        let mut note = |domain: &str, reference: String| {
            if self.is_sensitive_domain(domain) {
                domains.insert(domain.to_string());
                if !refs.contains(&reference) {
                    refs.push(reference);
                }
            }
        };

        let mut scan = |node: &Value, path: &str| {
            for r in entity_references(node, path) {
                if let Some(domain) = domain_of(&r.entity_id) {
                    note(domain, r.entity_id.clone());
                }
            }
            for call in service_calls(node, path) {
                if let Some((domain, _)) = call.split() {
                    note(domain, call.target.clone());
                }
            }
            // Device triggers and actions name the domain directly.
            walk_mappings(node, path, &mut |at, map| {
                if let Some(Value::String(domain)) = map.get("domain") {
                    note(domain.as_str(), join_key(at, "domain"));
                }
            });
        };

        match kind {
            DocumentKind::Automation => {
                for (path, item) in top_level_items(doc) {
                    for section in AUTOMATION_SECTIONS {
                        if let Some(node) = get(item, section) {
                            scan(node, &join_key(&path, section));
                        }
                    }
                }
            }
            DocumentKind::Dashboard => scan(doc, ""),
        }

        SensitivityReport {
            sensitive: !domains.is_empty(),
            domains: domains.into_iter().collect(),
            refs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).expect("yaml")
    }

    #[test]
    fn test_lock_action_is_sensitive() {
        let doc = yaml(
            "alias: Lock up\ntrigger:\n  - platform: time\n    at: '23:00:00'\naction:\n  - service: lock.lock\n    target:\n      entity_id: lock.front_door\n",
        );
        let report = SensitivePolicy::default().inspect(&doc, DocumentKind::Automation);
        assert!(report.sensitive);
        assert_eq!(report.domains, vec!["lock"]);
        assert_eq!(report.refs, vec!["lock.front_door", "lock.lock"]);
    }

    #[test]
    fn test_kitchen_light_is_not_sensitive() {
        let doc = yaml(
            "trigger:\n  - platform: numeric_state\n    entity_id: sensor.temp\n    above: 25\naction:\n  - service: light.turn_on\n    target:\n      entity_id: light.kitchen\n",
        );
        assert!(!SensitivePolicy::default().classify(&doc, DocumentKind::Automation));
    }

    #[test]
    fn test_conditions_are_not_inspected() {
        let doc = yaml(
            "trigger:\n  - platform: sun\n    event: sunset\ncondition:\n  - condition: state\n    entity_id: lock.front_door\n    state: locked\naction:\n  - service: light.turn_on\n",
        );
        assert!(!SensitivePolicy::default().classify(&doc, DocumentKind::Automation));
    }

    #[test]
    fn test_device_trigger_domain_key() {
        let doc = yaml(
            "trigger:\n  - platform: device\n    domain: alarm_control_panel\n    device_id: abc\n    type: triggered\naction: []\n",
        );
        let report = SensitivePolicy::default().inspect(&doc, DocumentKind::Automation);
        assert_eq!(report.domains, vec!["alarm_control_panel"]);
        assert_eq!(report.refs, vec!["trigger[0].domain"]);
    }

    #[test]
    fn test_additional_domains() {
        let doc = yaml("action:\n  - service: valve.open_valve\n");
        let policy = SensitivePolicy::with_additional([" Valve "]);
        assert!(policy.classify(&doc, DocumentKind::Automation));
        assert!(policy.is_sensitive_domain("lock"));
    }

    #[test]
    fn test_dashboard_camera_card() {
        let doc = yaml(
            "views:\n  - title: Door\n    cards:\n      - type: picture-entity\n        entity: camera.porch\n",
        );
        assert!(SensitivePolicy::default().classify(&doc, DocumentKind::Dashboard));
    }

    #[test]
    fn test_automation_list_documents() {
        let doc = yaml(
            "- alias: a\n  trigger: []\n  action: []\n- alias: b\n  trigger: []\n  action:\n    - service: siren.turn_on\n",
        );
        assert!(SensitivePolicy::default().classify(&doc, DocumentKind::Automation));
    }
}
