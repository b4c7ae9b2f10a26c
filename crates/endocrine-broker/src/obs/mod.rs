//! Lightweight in-process observability.
//!
//! Decision counters and latency histograms (Prometheus text rendering) plus
//! the traffic counters reported through the `stats` event.

pub mod metrics;
pub mod stats;

pub use metrics::BrokerMetrics;
pub use stats::{StatsSnapshot, TrafficStats};
