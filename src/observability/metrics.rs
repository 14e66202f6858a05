//! Prometheus metrics for auth decisions and SPOE traffic.

use std::time::Duration;

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "spoe_auth";

/// Decision, verification and frame metrics.
#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    /// Decisions by front end and outcome
    pub decisions: CounterVec,
    /// Time spent in signature and claim checks
    pub verify_duration: Histogram,
    /// SPOE frames by type
    pub frames: CounterVec,
}

impl AuthMetrics {
    /// Creates metrics on a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let decisions = CounterVec::new(
            Opts::new("decisions_total", "Total auth decisions").namespace(NAMESPACE),
            &["frontend", "outcome"],
        )?;
        registry.register(Box::new(decisions.clone()))?;

        let verify_duration = Histogram::with_opts(
            HistogramOpts::new("verify_duration_seconds", "Token verification latency")
                .namespace(NAMESPACE)
                .buckets(vec![0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005]),
        )?;
        registry.register(Box::new(verify_duration.clone()))?;

        let frames = CounterVec::new(
            Opts::new("frames_total", "Total SPOE frames handled").namespace(NAMESPACE),
            &["frame_type"],
        )?;
        registry.register(Box::new(frames.clone()))?;

        Ok(Self {
            registry,
            decisions,
            verify_duration,
            frames,
        })
    }

    pub fn record_decision(&self, frontend: &str, outcome: &str) {
        self.decisions.with_label_values(&[frontend, outcome]).inc();
    }

    pub fn observe_verify(&self, elapsed: Duration) {
        self.verify_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_frame(&self, frame_type: &str) {
        self.frames.with_label_values(&[frame_type]).inc();
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for AuthMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMetrics").finish_non_exhaustive()
    }
}
