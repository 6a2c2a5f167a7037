//! Live registry provider over Home Assistant's REST API.
//!
//! Entities come from `/api/states`, area membership from one rendered
//! template, the service catalog from `/api/services` and automation
//! configs from `/api/config/automation/config/<id>`. The REST API exposes
//! neither the device registry nor Lovelace, so those collections stay empty.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::provider::{parse_services, RegistryProvider};
use crate::snapshot::{AreaEntry, AutomationEntry, EntityEntry, RegistryData};

/// Renders every area with its entities as a JSON list.
const AREA_TEMPLATE: &str = "[{% for a in areas() %}{{ {'area_id': a, 'name': area_name(a), \
     'entities': area_entities(a)} | to_json }}{% if not loop.last %},{% endif %}{% endfor %}]";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct RawState {
    entity_id: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawArea {
    area_id: String,
    name: String,
    #[serde(default)]
    entities: Vec<String>,
}

/// Fetches the inventory from a running Home Assistant instance.
#[derive(Clone)]
pub struct HomeAssistantRegistryProvider {
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for HomeAssistantRegistryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeAssistantRegistryProvider")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl HomeAssistantRegistryProvider {
    /// Provider for `base_url` (e.g. `http://homeassistant.local:8123`)
    /// authenticating with a long-lived access token.
    pub fn new(base_url: impl Into<String>, token: &str) -> RegistryResult<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, token: &str, timeout: Duration) -> RegistryResult<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
            RegistryError::Unavailable("access token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);

        let client = reqwest::Client::builder()
            .user_agent(concat!("ha-autogen/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unavailable(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, what: &str, request: RequestBuilder) -> RegistryResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{what}: {}", e.without_url())))?;
        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(RegistryError::Unavailable(format!(
                "{what}: access token rejected ({status})"
            )));
        }
        if !status.is_success() {
            return Err(RegistryError::Unavailable(format!("{what}: status {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{what}: {}", e.without_url())))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> RegistryResult<T> {
        let body = self.send(path, self.client.get(self.url(path))).await?;
        serde_json::from_str(&body).map_err(|e| RegistryError::Malformed {
            source_name: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_areas(&self) -> RegistryResult<Vec<RawArea>> {
        let request = self
            .client
            .post(self.url("/api/template"))
            .json(&json!({ "template": AREA_TEMPLATE }));
        let body = self.send("/api/template", request).await?;
        serde_json::from_str(&body).map_err(|e| RegistryError::Malformed {
            source_name: "/api/template".to_string(),
            reason: e.to_string(),
        })
    }

    /// Stored config of one UI-managed automation. Automations defined in
    /// YAML packages have no stored config and fall back to their state.
    async fn fetch_automation(&self, index: usize, state: &RawState) -> AutomationEntry {
        let id = state.attributes.get("id").and_then(Value::as_str);
        if let Some(id) = id {
            let path = format!("/api/config/automation/config/{id}");
            match self.get_json::<Value>(&path).await {
                Ok(config) if config.is_object() => return AutomationEntry::from_config(index, config),
                Ok(_) => debug!(automation = %id, "automation config is not an object"),
                Err(e) => debug!(automation = %id, error = %e, "automation config unavailable"),
            }
        }
        let mut config = json!({});
        if let Some(id) = id {
            config["id"] = json!(id);
        }
        if let Some(alias) = state.attributes.get("friendly_name") {
            config["alias"] = alias.clone();
        }
        AutomationEntry::from_config(index, config)
    }
}

fn entity_from_state(state: &RawState) -> EntityEntry {
    let mut entity = EntityEntry::new(&state.entity_id);
    for (key, value) in &state.attributes {
        match (key.as_str(), value) {
            ("friendly_name", Value::String(name)) => entity.name = Some(name.clone()),
            ("friendly_name", _) => {}
            _ => {
                entity.attributes.insert(key.clone(), value.clone());
            }
        }
    }
    entity
}

#[async_trait]
impl RegistryProvider for HomeAssistantRegistryProvider {
    async fn fetch_snapshot(&self) -> RegistryResult<RegistryData> {
        let states: Vec<RawState> = self.get_json("/api/states").await?;
        let raw_areas = self.fetch_areas().await?;
        let catalog = self
            .send("/api/services", self.client.get(self.url("/api/services")))
            .await?;
        let services = parse_services("/api/services", &catalog)?;

        let area_of: BTreeMap<&str, &str> = raw_areas
            .iter()
            .flat_map(|area| area.entities.iter().map(move |e| (e.as_str(), area.area_id.as_str())))
            .collect();
        let entities: Vec<EntityEntry> = states
            .iter()
            .map(|state| {
                let mut entity = entity_from_state(state);
                entity.area_id = area_of.get(state.entity_id.as_str()).map(|a| a.to_string());
                entity
            })
            .collect();

        let mut automations = Vec::new();
        for state in states.iter().filter(|s| s.entity_id.starts_with("automation.")) {
            automations.push(self.fetch_automation(automations.len(), state).await);
        }

        let areas: Vec<AreaEntry> = raw_areas
            .into_iter()
            .map(|a| AreaEntry::new(a.area_id, a.name))
            .collect();
        if areas.is_empty() && !entities.is_empty() {
            warn!(url = %self.base_url, "home assistant reported no areas");
        }
        debug!(
            url = %self.base_url,
            entities = entities.len(),
            areas = areas.len(),
            services = services.len(),
            automations = automations.len(),
            "home assistant registry loaded"
        );

        Ok(RegistryData {
            entities,
            areas,
            devices: Vec::new(),
            services,
            automations,
            dashboard_views: Vec::new(),
        })
    }

    fn describe(&self) -> String {
        format!("home-assistant:{}", self.base_url)
    }
}
