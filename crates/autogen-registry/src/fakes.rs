//! In-memory registry provider (testing and dry runs)
//!
//! `StaticRegistryProvider` serves a fixed `RegistryData` and can be switched
//! into a failing mode to exercise last-good-snapshot degradation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{RegistryError, RegistryResult};
use crate::provider::RegistryProvider;
use crate::snapshot::RegistryData;

/// Provider backed by an in-memory `RegistryData`.
#[derive(Debug, Default)]
pub struct StaticRegistryProvider {
    data: Mutex<RegistryData>,
    failing: AtomicBool,
    fetches: AtomicU64,
}

impl StaticRegistryProvider {
    pub fn new(data: RegistryData) -> Self {
        Self {
            data: Mutex::new(data),
            failing: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    /// Replace the data served by subsequent fetches.
    pub fn set_data(&self, data: RegistryData) {
        *self.data.lock().unwrap() = data;
    }

    /// When `true`, fetches fail with `RegistryError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetch attempts so far, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryProvider for StaticRegistryProvider {
    async fn fetch_snapshot(&self) -> RegistryResult<RegistryData> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable(
                "static provider set to fail".to_string(),
            ));
        }
        Ok(self.data.lock().unwrap().clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
