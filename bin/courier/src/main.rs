//! Courier producer
//!
//! Authenticates against the broker, produces a fixed batch of messages to the
//! configured topic and reports how many were acknowledged.

use clap::Parser;
use courier_core::logger::init_logger;
use courier_producer::metrics::init_prometheus_exporter;
use courier_producer::{Config, InMemoryBroker, KafkaConnector, produce};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::parse();
    init_logger(&config.log_level);

    if let Some(metrics_addr) = config.metrics_addr {
        init_prometheus_exporter(metrics_addr)?;
        info!(metrics_address = %metrics_addr, "Prometheus exporter listening");
    }

    let producer_config = config.producer_config()?;

    info!(
        message = "Starting courier producer",
        broker_uri = %config.broker_uri,
        topic = %config.topic,
        message_count = config.message_count,
        dry_run = config.dry_run,
    );

    let report = if config.dry_run {
        produce(&InMemoryBroker::new(), &producer_config).await?
    } else {
        let connector = KafkaConnector::new()
            .with_properties(config.kafka_properties()?)
            .with_token_endpoint(config.token_endpoint.clone());
        produce(&connector, &producer_config).await?
    };

    for (sequence_index, error) in report.failures() {
        warn!(sequence_index, error = %error, "Message was not delivered");
    }

    info!(
        submitted = report.submitted(),
        acknowledged = report.acknowledged(),
        failed = report.failures().count(),
        "Courier producer finished"
    );

    Ok(())
}
