//! Global atomic counters for beatcut observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a service shuts down).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    syntheses: AtomicU64,
    adapter_retries: AtomicU64,
    refinements: AtomicU64,
    accepted: AtomicU64,
    exhausted: AtomicU64,
    degraded: AtomicU64,
    cancelled: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            syntheses: AtomicU64::new(0),
            adapter_retries: AtomicU64::new(0),
            refinements: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    pub fn inc_syntheses(&self) {
        self.syntheses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "syntheses", "counter incremented");
    }

    pub fn inc_adapter_retries(&self) {
        self.adapter_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "adapter_retries", "counter incremented");
    }

    pub fn inc_refinements(&self) {
        self.refinements.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "refinements", "counter incremented");
    }

    pub fn inc_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            syntheses = self.syntheses(),
            adapter_retries = self.adapter_retries(),
            refinements = self.refinements(),
            accepted = self.accepted(),
            exhausted = self.exhausted(),
            degraded = self.degraded(),
            cancelled = self.cancelled(),
        );
    }

    pub fn syntheses(&self) -> u64 {
        self.syntheses.load(Ordering::Relaxed)
    }

    pub fn adapter_retries(&self) -> u64 {
        self.adapter_retries.load(Ordering::Relaxed)
    }

    pub fn refinements(&self) -> u64 {
        self.refinements.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.syntheses,
            &self.adapter_retries,
            &self.refinements,
            &self.accepted,
            &self.exhausted,
            &self.degraded,
            &self.cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
