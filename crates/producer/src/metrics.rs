use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Metrics for the `courier_producer` component.
/// Conventions:
/// - Durations are recorded in seconds (histograms).
/// - Counters are monotonic event counts.
#[derive(Metrics, Clone)]
#[metrics(scope = "courier_producer")]
pub struct Metrics {
    #[metric(describe = "Number of messages handed to the transport")]
    pub messages_submitted: Counter,

    #[metric(describe = "Number of messages acknowledged by the broker")]
    pub messages_acknowledged: Counter,

    #[metric(describe = "Number of messages whose send failed")]
    pub messages_failed: Counter,

    #[metric(describe = "Number of flush barriers that waited on outstanding messages")]
    pub flushes: Counter,

    #[metric(describe = "Number of failed flush barriers")]
    pub flush_failures: Counter,

    #[metric(describe = "Time from submission to acknowledgement")]
    pub acknowledgement_latency: Histogram,
}

/// Initialize Prometheus metrics exporter
pub fn init_prometheus_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}
