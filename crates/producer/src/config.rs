//! Configuration for the courier producer

use crate::kafka::BrokerEndpoint;
use courier_core::kafka::load_kafka_config_from_file;
use courier_core::{AuthMode, ConnectionDescriptor, IdentityParams, Result};
use clap::Parser;
use std::net::SocketAddr;

/// Command line and environment surface of the producer binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Broker to connect to (`kafka://`, `kafka+ssl://` or a `host:port` list)
    #[arg(long, env = "COURIER_BROKER_URI", default_value = "localhost:9092")]
    pub broker_uri: String,

    /// Topic to produce to
    #[arg(long, env = "COURIER_TOPIC")]
    pub topic: String,

    /// OAuth2 client id; together with the client secret it enables OAuth2
    #[arg(long, env = "COURIER_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, env = "COURIER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth2 issuer URL, required in OAuth2 mode
    #[arg(long, env = "COURIER_ISSUER_URL")]
    pub issuer_url: Option<String>,

    /// OAuth2 audience
    #[arg(long, env = "COURIER_AUDIENCE")]
    pub audience: Option<String>,

    /// OAuth2 scope
    #[arg(long, env = "COURIER_SCOPE")]
    pub scope: Option<String>,

    /// OAuth2 token endpoint, defaults to `<issuer>/oauth/token`
    #[arg(long, env = "COURIER_TOKEN_ENDPOINT")]
    pub token_endpoint: Option<String>,

    /// Number of messages to produce
    #[arg(long, env = "COURIER_MESSAGE_COUNT", default_value = "50")]
    pub message_count: u64,

    /// Payload prefix, messages are `<prefix>: <index>`
    #[arg(long, env = "COURIER_PAYLOAD_PREFIX", default_value = "Test Message")]
    pub payload_prefix: String,

    /// Extra Kafka client properties file
    #[arg(long, env = "COURIER_KAFKA_PROPERTIES_FILE")]
    pub kafka_properties: Option<String>,

    /// Flush retry attempts before the run fails
    #[arg(long, env = "COURIER_FLUSH_RETRIES", default_value = "0")]
    pub flush_retries: usize,

    /// Address for the Prometheus metrics listener
    #[arg(long, env = "COURIER_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Produce against an in-process broker instead of Kafka
    #[arg(long, env = "COURIER_DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COURIER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Identity parameters collected from the OAuth2 options.
    pub fn identity(&self) -> IdentityParams {
        IdentityParams {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            issuer_url: self.issuer_url.clone(),
            audience: self.audience.clone(),
            scope: self.scope.clone(),
        }
    }

    /// Builds the immutable run configuration. Credential problems surface
    /// here, before any connection attempt.
    pub fn producer_config(&self) -> Result<ProducerConfig> {
        let auth = AuthMode::from_identity(&self.identity())?;
        let descriptor = ConnectionDescriptor::new(&self.broker_uri, auth)?;
        ProducerConfig::new(
            descriptor,
            &self.topic,
            self.message_count,
            &self.payload_prefix,
        )
        .map(|config| config.with_flush_retries(self.flush_retries))
    }

    /// Extra client properties, empty when no file is configured.
    pub fn kafka_properties(&self) -> Result<Vec<(String, String)>> {
        self.kafka_properties
            .as_deref()
            .map_or_else(|| Ok(Vec::new()), load_kafka_config_from_file)
    }
}

/// Immutable settings for one producer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    descriptor: ConnectionDescriptor,
    topic: String,
    message_count: u64,
    payload_prefix: String,
    flush_retries: usize,
}

impl ProducerConfig {
    /// Validates and assembles a run configuration. The broker URI must be a
    /// supported endpoint.
    pub fn new(
        descriptor: ConnectionDescriptor,
        topic: &str,
        message_count: u64,
        payload_prefix: &str,
    ) -> Result<Self> {
        BrokerEndpoint::parse(descriptor.broker_uri())?;

        let topic = topic.trim();
        if topic.is_empty() {
            return Err(courier_core::Error::config("topic must not be empty"));
        }

        Ok(Self {
            descriptor,
            topic: topic.to_string(),
            message_count,
            payload_prefix: payload_prefix.to_string(),
            flush_retries: 0,
        })
    }

    /// Sets the number of flush retries.
    pub fn with_flush_retries(mut self, flush_retries: usize) -> Self {
        self.flush_retries = flush_retries;
        self
    }

    /// Connection descriptor.
    pub const fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Target topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages per run.
    pub const fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Payload prefix.
    pub fn payload_prefix(&self) -> &str {
        &self.payload_prefix
    }

    /// Flush retry attempts.
    pub const fn flush_retries(&self) -> usize {
        self.flush_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Error;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("courier").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--topic", "events"]);
        let producer = config.producer_config().unwrap();

        assert_eq!(producer.topic(), "events");
        assert_eq!(producer.message_count(), 50);
        assert_eq!(producer.payload_prefix(), "Test Message");
        assert_eq!(producer.flush_retries(), 0);
        assert_eq!(producer.descriptor().broker_uri(), "localhost:9092");
        assert_eq!(producer.descriptor().auth(), &AuthMode::Anonymous);
        assert!(config.kafka_properties().unwrap().is_empty());
    }

    #[test]
    fn test_oauth2_from_flags() {
        let config = parse(&[
            "--topic",
            "events",
            "--client-id",
            "client",
            "--client-secret",
            "secret",
            "--issuer-url",
            "https://auth.example.com",
            "--scope",
            "produce",
        ]);

        let producer = config.producer_config().unwrap();
        assert!(matches!(
            producer.descriptor().auth(),
            AuthMode::OAuth2ClientCredentials(_)
        ));
    }

    #[test]
    fn test_missing_issuer_fails_before_connect() {
        let config = parse(&[
            "--topic",
            "events",
            "--client-id",
            "client",
            "--client-secret",
            "secret",
        ]);

        assert!(matches!(config.producer_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unsupported_broker_scheme_fails_before_connect() {
        let config = parse(&["--topic", "events", "--broker-uri", "pulsar://localhost:6650"]);
        assert!(matches!(config.producer_config(), Err(Error::Config(_))));

        let config = parse(&["--topic", "events", "--broker-uri", "kafka://"]);
        assert!(matches!(config.producer_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_topic_is_rejected() {
        let config = parse(&["--topic", " "]);
        assert!(matches!(config.producer_config(), Err(Error::Config(_))));
    }
}
