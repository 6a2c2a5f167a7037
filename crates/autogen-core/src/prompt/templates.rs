//! Fixed instruction text per document kind and request kind.

use crate::document::{DocumentKind, RequestKind};

pub(crate) const AUTOMATION_ROLE: &str = "\
You write Home Assistant automations. Given a request in plain language, you \
produce one automation configuration in YAML that uses only the entity ids and \
services listed in the context below.";

pub(crate) const AUTOMATION_OUTPUT_RULES: &str = "\
1. Reply with the YAML inside a single ```yaml code fence and nothing else.
2. The document must be a valid Home Assistant automation.
3. Always include `alias`, `description`, `trigger` and `action`. Add `condition` \
only when the request implies one.
4. Comment non-obvious logic inline with `#`.";

pub(crate) const AUTOMATION_CONVENTIONS: &str = "\
```yaml
alias: \"Descriptive name\"
description: \"What the automation does\"
trigger:
  - platform: state          # or time, sun, numeric_state, template, event, zone
    entity_id: sensor.example
condition:                   # optional
  - condition: state
    entity_id: binary_sensor.example
    state: \"on\"
action:
  - service: light.turn_on   # domain.service
    target:
      entity_id: light.example
mode: single                 # single, restart, queued or parallel
```
- Never invent entity ids; use ids from \"Available Entities\" verbatim.
- Use the service that matches the entity's domain (`light.turn_on`, \
`climate.set_temperature`).
- Times use 24-hour `HH:MM:SS`.
- Sun conditions use `condition: sun` with `after: sunset` or `before: sunrise`.
- Use `mode: single` unless the request needs concurrent runs.";

pub(crate) const DASHBOARD_ROLE: &str = "\
You write Home Assistant Lovelace dashboards. Given a request in plain language, \
you produce one dashboard configuration in YAML that shows only entities listed \
in the context below.";

pub(crate) const DASHBOARD_OUTPUT_RULES: &str = "\
1. Reply with the YAML inside a single ```yaml code fence and nothing else.
2. The document must be a Lovelace configuration with a top-level `views` list.
3. Organise views by area when the request mentions rooms.
4. Comment non-obvious groupings inline with `#`.";

pub(crate) const DASHBOARD_CONVENTIONS: &str = "\
```yaml
views:
  - title: \"Kitchen\"
    path: kitchen
    cards:
      - type: entities
        title: \"Lights\"
        entities:
          - entity: light.kitchen
      - type: gauge
        entity: sensor.kitchen_temperature
        min: 0
        max: 40
```
Card types and their required keys:
- `entities`, `glance`: an `entities` list.
- `gauge`: `entity`, plus `min`/`max`. Suits numeric sensors.
- `history-graph`: an `entities` list. Suits sensors trended over time.
- `thermostat` (climate), `media-control` (media_player), `weather-forecast` \
(weather), `picture-entity` (camera): `entity`.
- `horizontal-stack`, `vertical-stack`, `grid`: a nested `cards` list.
- Never invent entity ids; use ids from \"Available Entities\" verbatim.
- View titles are human-readable area names, not ids.";

/// Closing instruction placed after the user's request text.
pub(crate) fn request_instruction(kind: RequestKind, document: DocumentKind) -> &'static str {
    match (kind, document) {
        (RequestKind::Generate, DocumentKind::Automation) => {
            "Generate a Home Assistant automation YAML for this request."
        }
        (RequestKind::Generate, DocumentKind::Dashboard) => {
            "Generate a Home Assistant Lovelace dashboard YAML for this request. \
             The output must be a valid Lovelace config with a `views` list."
        }
        (RequestKind::Review, DocumentKind::Automation) => {
            "Review the automation above for wrong entity ids, wrong services, missing \
             guards and deprecated syntax. Return the complete corrected automation YAML. \
             Return it unchanged if nothing needs fixing."
        }
        (RequestKind::Review, DocumentKind::Dashboard) => {
            "Review the dashboard above for unknown entities, unsuitable card types and \
             missing required card keys. Return the complete corrected dashboard YAML. \
             Return it unchanged if nothing needs fixing."
        }
        (RequestKind::Modify, DocumentKind::Automation) => {
            "Apply the requested change to the automation above. Keep everything the \
             request does not mention and return the complete automation YAML."
        }
        (RequestKind::Modify, DocumentKind::Dashboard) => {
            "Apply the requested change to the dashboard above. Keep every view and card \
             the request does not mention and return the complete dashboard YAML."
        }
    }
}

pub(crate) const REPAIR_INSTRUCTION: &str = "\
Correct only these problems and return the complete document in a single \
```yaml code fence. Do not rewrite parts that were not reported.";

pub(crate) const TRUNCATION_NOTICE: &str = "\
The entity list above is incomplete because of size limits. Use only the \
listed ids; do not guess ids for unlisted entities.";

pub(crate) const EMPTY_CONTEXT: &str = "(no matching entities in the inventory)";
