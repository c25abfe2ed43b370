//! Prometheus metrics.
//
//! Metrics organization:
//! - Registry, scheduler, lifecycle and prober counters and gauges: metrics::meter
//! - Exposition: controller::metrics renders the recorder handle at GET /metrics

pub mod meter;

// Re-export commonly used items
pub use meter::*;
