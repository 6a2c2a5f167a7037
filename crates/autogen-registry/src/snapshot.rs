//! Registry records and the immutable, versioned snapshot built from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::digest::ContentDigest;
use crate::error::RegistryResult;

// ---------------------------------------------------------------------------
// RegistryItem: common view over rankable inventory items
// ---------------------------------------------------------------------------

/// Uniform read-only view used by relevance scoring.
pub trait RegistryItem {
    /// Identifier, unique within the item's collection.
    fn item_id(&self) -> &str;

    /// Human-facing name, falling back to the identifier.
    fn display_name(&self) -> &str;

    /// Domain for entities (`light`, `sensor`), `automation` for automations.
    fn kind(&self) -> &str;

    /// Area the item belongs to, if any.
    fn area_ref(&self) -> Option<&str>;

    /// Free-text attribute values.
    fn attribute_text(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One entry of the entity registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub entity_id: String,
    pub name: Option<String>,
    pub original_name: Option<String>,
    #[serde(default)]
    pub platform: String,
    pub device_id: Option<String>,
    pub area_id: Option<String>,
    pub disabled_by: Option<String>,
    pub hidden_by: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl EntityEntry {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: None,
            original_name: None,
            platform: String::new(),
            device_id: None,
            area_id: None,
            disabled_by: None,
            hidden_by: None,
            labels: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_area(mut self, area_id: impl Into<String>) -> Self {
        self.area_id = Some(area_id.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// `light` for `light.kitchen`.
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    /// `kitchen` for `light.kitchen`.
    pub fn object_id(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(_, object)| object)
            .unwrap_or(&self.entity_id)
    }

    /// Neither disabled nor hidden by the user or an integration.
    pub fn is_active(&self) -> bool {
        self.disabled_by.is_none() && self.hidden_by.is_none()
    }
}

impl RegistryItem for EntityEntry {
    fn item_id(&self) -> &str {
        &self.entity_id
    }

    fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.original_name.as_deref())
            .unwrap_or(&self.entity_id)
    }

    fn kind(&self) -> &str {
        self.domain()
    }

    fn area_ref(&self) -> Option<&str> {
        self.area_id.as_deref()
    }

    fn attribute_text(&self) -> Vec<String> {
        let mut text: Vec<String> = self
            .attributes
            .values()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        text.extend(self.labels.iter().cloned());
        if !self.platform.is_empty() {
            text.push(self.platform.clone());
        }
        text
    }
}

/// One entry of the area registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEntry {
    pub area_id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl AreaEntry {
    pub fn new(area_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            area_id: area_id.into(),
            name: name.into(),
            aliases: Vec::new(),
        }
    }
}

/// One entry of the device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    pub name: Option<String>,
    pub name_by_user: Option<String>,
    pub area_id: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl DeviceEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            name_by_user: None,
            area_id: None,
            manufacturer: None,
            model: None,
        }
    }

    pub fn with_area(mut self, area_id: impl Into<String>) -> Self {
        self.area_id = Some(area_id.into());
        self
    }

    /// User-assigned name wins over the integration's name.
    pub fn display_name(&self) -> &str {
        self.name_by_user
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A single field accepted by a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceField {
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

/// A callable service (`light.turn_on`) and its field schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub domain: String,
    pub service: String,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, ServiceField>,
}

impl ServiceEntry {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            description: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, required: bool) -> Self {
        self.fields.insert(
            name.into(),
            ServiceField {
                required,
                description: None,
            },
        );
        self
    }

    /// `domain.service`
    pub fn id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.required)
            .map(|(name, _)| name.as_str())
    }
}

/// An automation already configured on the instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationEntry {
    pub id: String,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub config: Value,
}

impl AutomationEntry {
    /// Wrap a raw automation config. Configs without an `id` get a positional one.
    pub fn from_config(index: usize, config: Value) -> Self {
        let id = match config.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("automation_{index}"),
        };
        let alias = config
            .get("alias")
            .and_then(Value::as_str)
            .map(str::to_string);
        let description = config
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            id,
            alias,
            description,
            config,
        }
    }
}

impl RegistryItem for AutomationEntry {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }

    fn kind(&self) -> &str {
        "automation"
    }

    fn area_ref(&self) -> Option<&str> {
        None
    }

    fn attribute_text(&self) -> Vec<String> {
        self.description.iter().cloned().collect()
    }
}

/// A view of an existing Lovelace dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub dashboard: String,
    pub index: usize,
    pub title: Option<String>,
    pub path: Option<String>,
    pub config: Value,
}

impl DashboardView {
    /// `<dashboard>/<path>`, or `<dashboard>/<index>` for views without a path.
    pub fn id(&self) -> String {
        match &self.path {
            Some(path) => format!("{}/{}", self.dashboard, path),
            None => format!("{}/{}", self.dashboard, self.index),
        }
    }

    /// Extract views from a Lovelace config (`{"views": [...]}`).
    pub fn from_lovelace(dashboard: &str, config: &Value) -> Vec<Self> {
        let Some(views) = config.get("views").and_then(Value::as_array) else {
            return Vec::new();
        };
        views
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_object())
            .map(|(index, view)| Self {
                dashboard: dashboard.to_string(),
                index,
                title: view.get("title").and_then(Value::as_str).map(str::to_string),
                path: view.get("path").and_then(Value::as_str).map(str::to_string),
                config: view.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RegistryData: raw provider output
// ---------------------------------------------------------------------------

/// Raw registry collections as returned by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryData {
    pub entities: Vec<EntityEntry>,
    pub areas: Vec<AreaEntry>,
    pub devices: Vec<DeviceEntry>,
    pub services: Vec<ServiceEntry>,
    pub automations: Vec<AutomationEntry>,
    pub dashboard_views: Vec<DashboardView>,
}

// ---------------------------------------------------------------------------
// RegistrySnapshot
// ---------------------------------------------------------------------------

/// Immutable inventory published under a single version.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    version: u64,
    fetched_at: DateTime<Utc>,
    digest: ContentDigest,
    entities: BTreeMap<String, EntityEntry>,
    areas: BTreeMap<String, AreaEntry>,
    devices: BTreeMap<String, DeviceEntry>,
    services: BTreeMap<String, ServiceEntry>,
    automations: BTreeMap<String, AutomationEntry>,
    dashboard_views: BTreeMap<String, DashboardView>,
}

/// Counts and identity of a snapshot, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub digest: String,
    pub fetched_at: DateTime<Utc>,
    pub entities: usize,
    pub active_entities: usize,
    pub areas: usize,
    pub devices: usize,
    pub services: usize,
    pub automations: usize,
    pub dashboard_views: usize,
}

impl RegistrySnapshot {
    /// Index raw provider data under `version`.
    ///
    /// Duplicate identifiers keep their first occurrence. Entities without an
    /// area inherit the area of their device.
    pub fn build(data: RegistryData, version: u64) -> RegistryResult<Self> {
        let areas = index_unique("areas", data.areas, |a| a.area_id.clone());
        let devices = index_unique("devices", data.devices, |d| d.id.clone());
        let mut entities = index_unique("entities", data.entities, |e| e.entity_id.clone());

        for entity in entities.values_mut() {
            if entity.area_id.is_some() {
                continue;
            }
            entity.area_id = entity
                .device_id
                .as_ref()
                .and_then(|id| devices.get(id))
                .and_then(|device| device.area_id.clone());
        }

        let services = index_unique("services", data.services, ServiceEntry::id);
        let automations = index_unique("automations", data.automations, |a| a.id.clone());
        let dashboard_views = index_unique("dashboard_views", data.dashboard_views, DashboardView::id);

        let body = serde_json::to_vec(&(
            &entities,
            &areas,
            &devices,
            &services,
            &automations,
            &dashboard_views,
        ))?;

        Ok(Self {
            version,
            fetched_at: Utc::now(),
            digest: ContentDigest::from_bytes(&body),
            entities,
            areas,
            devices,
            services,
            automations,
            dashboard_views,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Digest over the snapshot's collections; equal data yields equal digests.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    pub fn entity(&self, entity_id: &str) -> Option<&EntityEntry> {
        self.entities.get(entity_id)
    }

    pub fn contains_entity(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    /// All entities in identifier order, including disabled and hidden ones.
    pub fn entities(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entities.values()
    }

    pub fn active_entities(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entities.values().filter(|e| e.is_active())
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn area(&self, area_id: &str) -> Option<&AreaEntry> {
        self.areas.get(area_id)
    }

    pub fn area_name(&self, area_id: &str) -> Option<&str> {
        self.areas.get(area_id).map(|a| a.name.as_str())
    }

    pub fn areas(&self) -> impl Iterator<Item = &AreaEntry> {
        self.areas.values()
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceEntry> {
        self.devices.get(device_id)
    }

    pub fn service(&self, domain: &str, service: &str) -> Option<&ServiceEntry> {
        self.services.get(&format!("{domain}.{service}"))
    }

    /// Whether the service catalog has any service for `domain`.
    pub fn has_service_domain(&self, domain: &str) -> bool {
        self.services.values().any(|s| s.domain == domain)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.services.values()
    }

    pub fn automation(&self, id: &str) -> Option<&AutomationEntry> {
        self.automations.get(id)
    }

    pub fn automations(&self) -> impl Iterator<Item = &AutomationEntry> {
        self.automations.values()
    }

    pub fn dashboard_views(&self) -> impl Iterator<Item = &DashboardView> {
        self.dashboard_views.values()
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            version: self.version,
            digest: self.digest.short().to_string(),
            fetched_at: self.fetched_at,
            entities: self.entities.len(),
            active_entities: self.active_entities().count(),
            areas: self.areas.len(),
            devices: self.devices.len(),
            services: self.services.len(),
            automations: self.automations.len(),
            dashboard_views: self.dashboard_views.len(),
        }
    }
}

fn index_unique<T, F>(collection: &str, items: Vec<T>, key: F) -> BTreeMap<String, T>
where
    F: Fn(&T) -> String,
{
    let mut index = BTreeMap::new();
    for item in items {
        let id = key(&item);
        if index.contains_key(&id) {
            warn!(collection = collection, id = %id, "duplicate registry identifier dropped");
            continue;
        }
        index.insert(id, item);
    }
    index
}
