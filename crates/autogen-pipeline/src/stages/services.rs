//! Stage 3: service calls must name a real service with its required fields.

use autogen_core::document::{service_calls, untag, ServiceCall};
use autogen_core::{ValidationFinding, ValidationStage};
use autogen_registry::RegistrySnapshot;
use serde_yaml::{Mapping, Value};

use super::closest;

/// Domains checked when the snapshot carries no service catalog for them.
pub const KNOWN_DOMAINS: [&str; 32] = [
    "alarm_control_panel",
    "automation",
    "button",
    "camera",
    "climate",
    "counter",
    "cover",
    "fan",
    "homeassistant",
    "humidifier",
    "input_boolean",
    "input_button",
    "input_datetime",
    "input_number",
    "input_select",
    "input_text",
    "light",
    "lock",
    "media_player",
    "notify",
    "number",
    "remote",
    "scene",
    "script",
    "select",
    "siren",
    "switch",
    "timer",
    "tts",
    "vacuum",
    "water_heater",
    "zone",
];

/// Target keys that select entities without naming them.
const TARGET_SELECTORS: [&str; 5] = ["entity_id", "device_id", "area_id", "floor_id", "label_id"];

pub fn check(doc: &Value, snapshot: &RegistrySnapshot) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    for call in service_calls(doc, "") {
        check_call(&call, snapshot, &mut findings);
    }
    findings
}

fn check_call(call: &ServiceCall<'_>, snapshot: &RegistrySnapshot, findings: &mut Vec<ValidationFinding>) {
    let Some((domain, service)) = call.split() else {
        findings.push(
            ValidationFinding::advisory(
                ValidationStage::ServiceCalls,
                &call.location,
                format!("malformed service call '{}'", call.target),
            )
            .with_ref(&call.target)
            .with_suggestion("use the form domain.service, e.g. light.turn_on"),
        );
        return;
    };

    if !snapshot.has_service_domain(domain) {
        if !KNOWN_DOMAINS.contains(&domain) {
            let mut finding = ValidationFinding::advisory(
                ValidationStage::ServiceCalls,
                &call.location,
                format!("unknown service domain '{domain}'"),
            )
            .with_ref(&call.target);
            if let Some(known) = closest(domain, KNOWN_DOMAINS) {
                finding = finding.with_suggestion(format!("did you mean {known}?"));
            }
            findings.push(finding);
        }
        return;
    }

    let Some(entry) = snapshot.service(domain, service) else {
        let siblings: Vec<&str> = snapshot
            .services()
            .filter(|s| s.domain == domain)
            .map(|s| s.service.as_str())
            .collect();
        let mut finding = ValidationFinding::advisory(
            ValidationStage::ServiceCalls,
            &call.location,
            format!("unknown service '{}'", call.target),
        )
        .with_ref(&call.target);
        if let Some(known) = closest(service, siblings) {
            finding = finding.with_suggestion(format!("did you mean {domain}.{known}?"));
        }
        findings.push(finding);
        return;
    };

    for field in entry.required_fields() {
        if !has_field(call.call, field) {
            findings.push(
                ValidationFinding::advisory(
                    ValidationStage::ServiceCalls,
                    &call.location,
                    format!("'{}' is missing required field '{field}'", call.target),
                )
                .with_ref(&call.target),
            );
        }
    }
}

/// A field counts as supplied under `data`, inline on the call, or, for
/// `entity_id`, through any `target` selector.
fn has_field(call: &Mapping, field: &str) -> bool {
    if call.contains_key(field) {
        return true;
    }
    let in_mapping = |key: &str| match call.get(key).map(untag) {
        Some(Value::Mapping(map)) => map.contains_key(field),
        _ => false,
    };
    if in_mapping("data") || in_mapping("data_template") {
        return true;
    }
    if field == "entity_id" {
        if let Some(Value::Mapping(target)) = call.get("target").map(untag) {
            return TARGET_SELECTORS.iter().any(|key| target.contains_key(*key));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use autogen_registry::{RegistryData, ServiceEntry};

    fn snapshot() -> RegistrySnapshot {
        let data = RegistryData {
            services: vec![
                ServiceEntry::new("light", "turn_on"),
                ServiceEntry::new("light", "turn_off"),
                ServiceEntry::new("notify", "mobile_app_phone").with_field("message", true),
            ],
            ..Default::default()
        };
        RegistrySnapshot::build(data, 1).expect("snapshot")
    }

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).expect("yaml")
    }

    #[test]
    fn test_malformed_call_is_advisory() {
        let findings = check(&yaml("action:\n  - service: turn_on\n"), &snapshot());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.starts_with("malformed service call"));
        assert!(!findings[0].is_blocking());
    }

    #[test]
    fn test_unknown_service_in_catalogued_domain() {
        let findings = check(&yaml("action:\n  - service: light.turn_onn\n"), &snapshot());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "unknown service 'light.turn_onn'");
        assert_eq!(
            findings[0].suggestion.as_deref(),
            Some("did you mean light.turn_on?")
        );
    }

    #[test]
    fn test_required_field_from_data() {
        let missing = check(&yaml("action:\n  - service: notify.mobile_app_phone\n"), &snapshot());
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.contains("'message'"));

        let present = check(
            &yaml("action:\n  - service: notify.mobile_app_phone\n    data:\n      message: hi\n"),
            &snapshot(),
        );
        assert!(present.is_empty());
    }

    #[test]
    fn test_uncatalogued_domain_falls_back_to_known_list() {
        let known = check(&yaml("action:\n  - service: lock.lock\n"), &snapshot());
        assert!(known.is_empty());

        let unknown = check(&yaml("action:\n  - service: lihgt.turn_on\n"), &snapshot());
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].message, "unknown service domain 'lihgt'");
    }

    #[test]
    fn test_entity_id_satisfied_by_target_area() {
        let call = yaml("service: light.turn_on\ntarget:\n  area_id: kitchen\n");
        let Value::Mapping(map) = call else { panic!("mapping") };
        assert!(has_field(&map, "entity_id"));
        assert!(!has_field(&map, "brightness"));
    }
}
