//! Prometheus metrics for the relay.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::server::streaming::Outcome;

pub struct RelayMetrics {
    registry: Registry,
    streams: IntCounterVec,
    upstream_errors: IntCounterVec,
    rejected: IntCounter,
    cancels: IntCounterVec,
    active_sessions: IntGauge,
}

/// Where an upstream failure was observed.
#[derive(Debug, Clone, Copy)]
pub enum UpstreamPhase {
    Setup,
    Stream,
    Buffered,
}

impl UpstreamPhase {
    fn label(self) -> &'static str {
        match self {
            UpstreamPhase::Setup => "setup",
            UpstreamPhase::Stream => "stream",
            UpstreamPhase::Buffered => "buffered",
        }
    }
}

impl RelayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let streams = IntCounterVec::new(
            Opts::new("relay_streams_total", "Streams finished, by terminal outcome"),
            &["outcome"],
        )?;
        let upstream_errors = IntCounterVec::new(
            Opts::new("relay_upstream_errors_total", "Upstream failures, by phase"),
            &["phase"],
        )?;
        let rejected = IntCounter::new(
            "relay_rejected_requests_total",
            "Requests rejected before contacting upstream",
        )?;
        let cancels = IntCounterVec::new(
            Opts::new("relay_cancel_requests_total", "Cancel requests, by result"),
            &["result"],
        )?;
        let active_sessions =
            IntGauge::new("relay_active_sessions", "Streaming sessions currently registered")?;

        registry.register(Box::new(streams.clone()))?;
        registry.register(Box::new(upstream_errors.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(cancels.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;

        Ok(Self {
            registry,
            streams,
            upstream_errors,
            rejected,
            cancels,
            active_sessions,
        })
    }

    pub fn stream_finished(&self, outcome: Outcome) {
        self.streams.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn upstream_error(&self, phase: UpstreamPhase) {
        self.upstream_errors.with_label_values(&[phase.label()]).inc();
    }

    pub fn request_rejected(&self) {
        self.rejected.inc();
    }

    pub fn cancel_requested(&self, found: bool) {
        let result = if found { "found" } else { "not_found" };
        self.cancels.with_label_values(&[result]).inc();
    }

    /// Render the text exposition, sampling the active session count first.
    pub fn render(&self, active_sessions: usize) -> Result<String, prometheus::Error> {
        self.active_sessions.set(active_sessions as i64);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.stream_finished(Outcome::Stopped);
        metrics.stream_finished(Outcome::Complete);
        metrics.stream_finished(Outcome::Complete);
        metrics.cancel_requested(false);
        metrics.upstream_error(UpstreamPhase::Setup);

        let text = metrics.render(3).unwrap();
        assert!(text.contains(r#"relay_streams_total{outcome="complete"} 2"#));
        assert!(text.contains(r#"relay_streams_total{outcome="stopped"} 1"#));
        assert!(text.contains(r#"relay_cancel_requests_total{result="not_found"} 1"#));
        assert!(text.contains(r#"relay_upstream_errors_total{phase="setup"} 1"#));
        assert!(text.contains("relay_active_sessions 3"));
    }
}
