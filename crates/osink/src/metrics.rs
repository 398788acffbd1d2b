// AI
//! 📊 metrics.rs: "how many did we drop?", asked by every dedup incident review, ever.
//!
//! The write path does not own a metrics backend. It reports counters and gauges by
//! name into whatever [`MetricsSink`] the embedding pipeline hands it.
//!
//! - [`TracingMetrics`]: the default. Every update becomes a `trace!` event, so the
//!   numbers are at least greppable when nobody wired a real backend.
//! - [`InMemoryMetrics`]: keeps the latest values in a map. Tests read it, dry runs print it.
//!
//! 🦆 The duck counted. The duck was off by one. The duck is a duck.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use tracing::trace;

/// 📈 Counters go up, gauges go wherever they want.
pub trait MetricsSink: Debug + Send + Sync {
    fn increment_counter(&self, name: &str, by: u64);
    fn set_gauge(&self, name: &str, value: i64);
}

/// 🍞 Metrics as breadcrumbs. Cheap, always on, never the bottleneck.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn increment_counter(&self, name: &str, by: u64) {
        trace!(metric = name, by, "📈 counter incremented");
    }

    fn set_gauge(&self, name: &str, value: i64) {
        trace!(metric = name, value, "📏 gauge set");
    }
}

/// 🗃️ A metrics sink that remembers. Counters accumulate, gauges keep their latest value.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    gauges: Mutex<HashMap<String, i64>>,
}

impl InMemoryMetrics {
    /// 🔢 Current counter value, zero if it was never touched.
    pub fn counter(&self, name: &str) -> u64 {
        // 🔒 a poisoned lock here means a panic elsewhere already ruined the day; report zero
        self.counters
            .lock()
            .map(|counters| counters.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// 📏 Latest gauge value, if it was ever set.
    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .lock()
            .ok()
            .and_then(|gauges| gauges.get(name).copied())
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment_counter(&self, name: &str, by: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += by;
        }
    }

    fn set_gauge(&self, name: &str, value: i64) {
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.insert(name.to_string(), value);
        }
    }
}
