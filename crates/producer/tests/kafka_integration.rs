use courier_core::{AuthMode, ConnectionDescriptor};
use courier_producer::{KafkaConnector, ProducerConfig, produce};
use rdkafka::ClientConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::{kafka, kafka::Kafka};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_produce_to_kafka_container() -> Result<(), Box<dyn std::error::Error>> {
    let kafka_container = Kafka::default().start().await?;
    let bootstrap_servers = format!(
        "127.0.0.1:{}",
        kafka_container
            .get_host_port_ipv4(kafka::KAFKA_PORT)
            .await?
    );

    let topic = "courier-integration";

    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", &bootstrap_servers)
        .create()?;
    admin
        .create_topics(
            &[NewTopic::new(topic, 1, TopicReplication::Fixed(1))],
            &AdminOptions::new().operation_timeout(Some(Duration::from_secs(10))),
        )
        .await?;

    let descriptor = ConnectionDescriptor::new(
        format!("kafka://{bootstrap_servers}"),
        AuthMode::Anonymous,
    )?
    .with_operation_timeout(Duration::from_secs(10))
    .with_connection_timeout(Duration::from_secs(10));
    let config = ProducerConfig::new(descriptor, topic, 25, "Test Message")?;

    let report = produce(&KafkaConnector::new(), &config).await?;

    assert_eq!(report.submitted(), 25);
    assert_eq!(report.acknowledged(), 25);
    assert!(report.is_complete());

    Ok(())
}
