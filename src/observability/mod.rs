//! Structured logging and Prometheus metrics.

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, TracingConfig, init_tracing};
pub use metrics::AuthMetrics;
