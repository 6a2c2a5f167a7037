//! Global atomic counters for generation activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, e.g. when the CLI exits.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    generations_requested: AtomicU64,
    generation_attempts: AtomicU64,
    repairs: AtomicU64,
    repairs_exhausted: AtomicU64,
    backend_timeouts: AtomicU64,
    sensitive_flagged: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            generations_requested: AtomicU64::new(0),
            generation_attempts: AtomicU64::new(0),
            repairs: AtomicU64::new(0),
            repairs_exhausted: AtomicU64::new(0),
            backend_timeouts: AtomicU64::new(0),
            sensitive_flagged: AtomicU64::new(0),
        }
    }

    pub fn inc_generations(&self) {
        self.generations_requested.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_requested", "counter incremented");
    }

    /// One call to the generation backend.
    pub fn inc_attempts(&self) {
        self.generation_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generation_attempts", "counter incremented");
    }

    pub fn inc_repairs(&self) {
        self.repairs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "repairs", "counter incremented");
    }

    pub fn inc_repairs_exhausted(&self) {
        self.repairs_exhausted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "repairs_exhausted", "counter incremented");
    }

    pub fn inc_backend_timeouts(&self) {
        self.backend_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "backend_timeouts", "counter incremented");
    }

    pub fn inc_sensitive(&self) {
        self.sensitive_flagged.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sensitive_flagged", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            generations_requested = self.generations_requested(),
            generation_attempts = self.generation_attempts(),
            repairs = self.repairs(),
            repairs_exhausted = self.repairs_exhausted(),
            backend_timeouts = self.backend_timeouts(),
            sensitive_flagged = self.sensitive_flagged(),
        );
    }

    pub fn generations_requested(&self) -> u64 {
        self.generations_requested.load(Ordering::Relaxed)
    }

    pub fn generation_attempts(&self) -> u64 {
        self.generation_attempts.load(Ordering::Relaxed)
    }

    pub fn repairs(&self) -> u64 {
        self.repairs.load(Ordering::Relaxed)
    }

    pub fn repairs_exhausted(&self) -> u64 {
        self.repairs_exhausted.load(Ordering::Relaxed)
    }

    pub fn backend_timeouts(&self) -> u64 {
        self.backend_timeouts.load(Ordering::Relaxed)
    }

    pub fn sensitive_flagged(&self) -> u64 {
        self.sensitive_flagged.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.generations_requested.store(0, Ordering::Relaxed);
        self.generation_attempts.store(0, Ordering::Relaxed);
        self.repairs.store(0, Ordering::Relaxed);
        self.repairs_exhausted.store(0, Ordering::Relaxed);
        self.backend_timeouts.store(0, Ordering::Relaxed);
        self.sensitive_flagged.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_generations();
        m.inc_attempts();
        m.inc_attempts();
        m.inc_repairs();
        assert_eq!(m.generations_requested(), 1);
        assert_eq!(m.generation_attempts(), 2);
        assert_eq!(m.repairs(), 1);
        assert_eq!(m.repairs_exhausted(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_generations();
        m.inc_repairs_exhausted();
        m.inc_backend_timeouts();
        m.inc_sensitive();
        m.reset();
        assert_eq!(m.generations_requested(), 0);
        assert_eq!(m.repairs_exhausted(), 0);
        assert_eq!(m.backend_timeouts(), 0);
        assert_eq!(m.sensitive_flagged(), 0);
    }
}
