//! Observability for POI Service.
//!
//! - `metrics` - Prometheus metric definitions and recorder setup

pub mod metrics;
