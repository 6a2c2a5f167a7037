//! Registry providers: the narrow contract for fetching raw inventory data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::snapshot::{
    AreaEntry, AutomationEntry, DashboardView, DeviceEntry, EntityEntry, RegistryData,
    ServiceEntry, ServiceField,
};

/// Source of raw registry data.
///
/// Transport and auth failures must surface as `RegistryError::Unavailable`
/// so the snapshot store can fall back to its last good snapshot.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    /// Fetch every registry collection in one pass.
    async fn fetch_snapshot(&self) -> RegistryResult<RegistryData>;

    /// Short description used in log lines.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// FixtureRegistryProvider
// ---------------------------------------------------------------------------

const ENTITY_FILE: &str = "entity_registry.json";
const AREA_FILE: &str = "area_registry.json";
const DEVICE_FILE: &str = "device_registry.json";
const SERVICE_FILE: &str = "services.json";
const AUTOMATION_FILE: &str = "automations.yaml";
const LOVELACE_FILE: &str = "lovelace.json";

/// Default dashboard name for views read from `lovelace.json`.
const DEFAULT_DASHBOARD: &str = "lovelace";

/// Reads registry exports from a directory.
///
/// Registry files may be a bare JSON list or Home Assistant's `.storage`
/// layout (`{"data": {"entities": [...]}}`). Only the entity registry is
/// mandatory; the other files are treated as empty when absent.
#[derive(Debug, Clone)]
pub struct FixtureRegistryProvider {
    root: PathBuf,
}

impl FixtureRegistryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_optional(&self, name: &str) -> RegistryResult<Option<String>> {
        let path = self.root.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "optional registry file missing");
                Ok(None)
            }
            Err(e) => Err(RegistryError::Unavailable(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn read_list<T: DeserializeOwned>(&self, name: &str) -> RegistryResult<Vec<T>> {
        match self.read_optional(name).await? {
            Some(content) => parse_registry_list(name, &content),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl RegistryProvider for FixtureRegistryProvider {
    async fn fetch_snapshot(&self) -> RegistryResult<RegistryData> {
        let entity_content = self.read_optional(ENTITY_FILE).await?.ok_or_else(|| {
            RegistryError::Unavailable(format!(
                "{} not found under {}",
                ENTITY_FILE,
                self.root.display()
            ))
        })?;
        let entities: Vec<EntityEntry> = parse_registry_list(ENTITY_FILE, &entity_content)?;
        let areas: Vec<AreaEntry> = self.read_list(AREA_FILE).await?;
        let devices: Vec<DeviceEntry> = self.read_list(DEVICE_FILE).await?;

        let services = match self.read_optional(SERVICE_FILE).await? {
            Some(content) => parse_services(SERVICE_FILE, &content)?,
            None => Vec::new(),
        };

        let automations = match self.read_optional(AUTOMATION_FILE).await? {
            Some(content) => parse_automations(&content)?,
            None => Vec::new(),
        };

        let dashboard_views = match self.read_optional(LOVELACE_FILE).await? {
            Some(content) => parse_lovelace(&content)?,
            None => Vec::new(),
        };

        debug!(
            root = %self.root.display(),
            entities = entities.len(),
            areas = areas.len(),
            devices = devices.len(),
            services = services.len(),
            automations = automations.len(),
            dashboard_views = dashboard_views.len(),
            "fixture registry loaded"
        );

        Ok(RegistryData {
            entities,
            areas,
            devices,
            services,
            automations,
            dashboard_views,
        })
    }

    fn describe(&self) -> String {
        format!("fixtures:{}", self.root.display())
    }
}

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryFile<T> {
    Bare(Vec<T>),
    Storage { data: BTreeMap<String, Vec<T>> },
}

fn parse_registry_list<T: DeserializeOwned>(name: &str, content: &str) -> RegistryResult<Vec<T>> {
    let file: RegistryFile<T> =
        serde_json::from_str(content).map_err(|e| RegistryError::Malformed {
            source_name: name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(match file {
        RegistryFile::Bare(items) => items,
        RegistryFile::Storage { data } => data.into_values().flatten().collect(),
    })
}

#[derive(Deserialize)]
struct RawServiceDomain {
    domain: String,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, ServiceField>,
}

/// Parse the `/api/services` shape: a list of domains, each with a map of services.
pub(crate) fn parse_services(source: &str, content: &str) -> RegistryResult<Vec<ServiceEntry>> {
    let domains: Vec<RawServiceDomain> =
        serde_json::from_str(content).map_err(|e| RegistryError::Malformed {
            source_name: source.to_string(),
            reason: e.to_string(),
        })?;
    Ok(domains
        .into_iter()
        .flat_map(|d| {
            let domain = d.domain;
            d.services.into_iter().map(move |(service, raw)| ServiceEntry {
                domain: domain.clone(),
                service,
                description: raw.description,
                fields: raw.fields,
            })
        })
        .collect())
}

/// Parse `automations.yaml`: a list of automation configs or a single mapping.
fn parse_automations(content: &str) -> RegistryResult<Vec<AutomationEntry>> {
    let parsed: Value = serde_yaml::from_str(content)?;
    let configs = match parsed {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(_) => vec![parsed],
        other => {
            return Err(RegistryError::Malformed {
                source_name: AUTOMATION_FILE.to_string(),
                reason: format!("expected a list of automations, found {}", json_kind(&other)),
            })
        }
    };
    Ok(configs
        .into_iter()
        .enumerate()
        .filter(|(_, c)| c.is_object())
        .map(|(i, c)| AutomationEntry::from_config(i, c))
        .collect())
}

/// Parse a Lovelace export, either bare (`{"views": ...}`) or in `.storage` layout.
fn parse_lovelace(content: &str) -> RegistryResult<Vec<DashboardView>> {
    let parsed: Value = serde_json::from_str(content).map_err(|e| RegistryError::Malformed {
        source_name: LOVELACE_FILE.to_string(),
        reason: e.to_string(),
    })?;
    let config = parsed
        .get("data")
        .and_then(|d| d.get("config"))
        .unwrap_or(&parsed);
    Ok(DashboardView::from_lovelace(DEFAULT_DASHBOARD, config))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
