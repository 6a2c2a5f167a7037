//! Autogen-Registry: versioned inventory snapshots for HA AutoGen
//!
//! This crate owns the in-memory view of the Home Assistant registries
//! (entities, areas, devices, services, existing automations and dashboard
//! views) that every generation request reads from.
//!
//! ## Layer 0 - Inventory
//!
//! Focus: immutable snapshots, atomic publication, graceful degradation when
//! the upstream registry is unreachable.
//!
//! ## Key Components
//!
//! - `RegistrySnapshot`: one immutable, versioned copy of the inventory
//! - `RegistryProvider`: narrow contract for fetching raw registry data
//! - `HomeAssistantRegistryProvider`: live fetch over the Home Assistant REST API
//! - `SnapshotStore`: publishes snapshots atomically and pins readers to one version

mod digest;
mod error;
pub mod fakes;
pub mod home_assistant;
pub mod provider;
pub mod snapshot;
pub mod store;

pub use digest::ContentDigest;
pub use error::{RegistryError, RegistryResult};
pub use home_assistant::HomeAssistantRegistryProvider;
pub use provider::{FixtureRegistryProvider, RegistryProvider};
pub use snapshot::{
    AreaEntry, AutomationEntry, DashboardView, DeviceEntry, EntityEntry, RegistryData,
    RegistryItem, RegistrySnapshot, ServiceEntry, ServiceField, SnapshotSummary,
};
pub use store::{spawn_refresher, RefreshHandle, SnapshotStore};
