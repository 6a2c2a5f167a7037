//! Stage 2: referenced entity ids must exist in the snapshot.

use autogen_core::document::entity_references;
use autogen_core::{ValidationFinding, ValidationStage};
use autogen_registry::RegistrySnapshot;
use serde_yaml::Value;

use super::closest;

pub fn check(doc: &Value, snapshot: &RegistrySnapshot) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    for reference in entity_references(doc, "") {
        let id = reference.entity_id.as_str();
        match snapshot.entity(id) {
            Some(entry) if !entry.is_active() => {
                let state = if entry.disabled_by.is_some() {
                    "disabled"
                } else {
                    "hidden"
                };
                findings.push(
                    ValidationFinding::advisory(
                        ValidationStage::EntityReferences,
                        &reference.location,
                        format!("entity '{id}' is {state}"),
                    )
                    .with_ref(id),
                );
            }
            Some(_) => {}
            None => {
                let mut finding = ValidationFinding::advisory(
                    ValidationStage::EntityReferences,
                    &reference.location,
                    format!("unknown entity '{id}'"),
                )
                .with_ref(id);
                if let Some(known) = closest(id, snapshot.entity_ids()) {
                    finding = finding.with_suggestion(format!("did you mean {known}?"));
                }
                findings.push(finding);
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use autogen_registry::{EntityEntry, RegistryData};

    fn snapshot() -> RegistrySnapshot {
        let mut disabled = EntityEntry::new("switch.old_heater");
        disabled.disabled_by = Some("user".to_string());
        let mut hidden = EntityEntry::new("sensor.battery_raw");
        hidden.hidden_by = Some("integration".to_string());
        let data = RegistryData {
            entities: vec![EntityEntry::new("light.kitchen"), disabled, hidden],
            ..Default::default()
        };
        RegistrySnapshot::build(data, 1).expect("snapshot")
    }

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).expect("yaml")
    }

    #[test]
    fn test_known_reference_is_clean() {
        let doc = yaml("action:\n  - service: light.turn_on\n    target:\n      entity_id: light.kitchen\n");
        assert!(check(&doc, &snapshot()).is_empty());
    }

    #[test]
    fn test_unknown_reference_suggests_close_match() {
        let doc = yaml("action:\n  - target:\n      entity_id: light.kitchn\n");
        let findings = check(&doc, &snapshot());
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert!(!f.is_blocking());
        assert_eq!(f.location, "action[0].target.entity_id");
        assert_eq!(f.affected_ref.as_deref(), Some("light.kitchn"));
        assert_eq!(f.suggestion.as_deref(), Some("did you mean light.kitchen?"));
    }

    #[test]
    fn test_disabled_entity_is_advisory() {
        let doc = yaml("entity_id: switch.old_heater\n");
        let findings = check(&doc, &snapshot());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("disabled"));
    }

    #[test]
    fn test_hidden_entity_is_advisory() {
        let doc = yaml("entity_id: sensor.battery_raw
");
        let findings = check(&doc, &snapshot());
        assert_eq!(findings.len(), 1);
        assert!(!findings[0].is_blocking());
        assert_eq!(findings[0].message, "entity 'sensor.battery_raw' is hidden");
    }
}
