use crate::transport::{Acknowledgement, BrokerConnection, BrokerConnector, ProducerTransport};
use async_trait::async_trait;
use courier_core::{
    AuthMode, ConnectionDescriptor, Error, MessageId, OutboundMessage, Result, SendError,
};
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;
use tracing::{debug, info, warn};

const OAUTHBEARER_EXTENSIONS: &str = "sasl.oauthbearer.extensions";

/// Bootstrap servers and transport security derived from a broker URI.
///
/// Accepts `kafka://`, `kafka+ssl://` (alias `kafka+tls://`) or a bare
/// comma separated `host:port` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BrokerEndpoint {
    bootstrap_servers: String,
    tls: bool,
}

impl BrokerEndpoint {
    pub(crate) fn parse(uri: &str) -> Result<Self> {
        let (tls, servers) = match uri.split_once("://") {
            Some(("kafka", rest)) => (false, rest),
            Some(("kafka+ssl" | "kafka+tls", rest)) => (true, rest),
            Some((scheme, _)) => {
                return Err(Error::config(format!("unsupported broker URI scheme {scheme:?}")));
            }
            None => (false, uri),
        };

        let bootstrap_servers = servers
            .split(',')
            .map(|server| server.trim().trim_end_matches('/'))
            .filter(|server| !server.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        if bootstrap_servers.is_empty() {
            return Err(Error::config(format!("broker URI {uri:?} names no servers")));
        }

        Ok(Self { bootstrap_servers, tls })
    }

    const fn security_protocol(&self, sasl: bool) -> &'static str {
        match (self.tls, sasl) {
            (false, false) => "plaintext",
            (true, false) => "ssl",
            (false, true) => "sasl_plaintext",
            (true, true) => "sasl_ssl",
        }
    }
}

fn millis(duration: Duration) -> String {
    duration.as_millis().to_string()
}

/// Connection factory backed by librdkafka.
///
/// OAuth2 client credentials are mapped onto SASL/OAUTHBEARER with the OIDC
/// token retriever: client id, secret, issuer and scope come from the key
/// material embedded in the descriptor, the audience travels as a SASL
/// extension.
#[derive(Debug, Clone, Default)]
pub struct KafkaConnector {
    properties: Vec<(String, String)>,
    token_endpoint: Option<String>,
}

impl KafkaConnector {
    /// Connector with no extra client properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra client properties, applied before the connector's own settings.
    pub fn with_properties(mut self, properties: Vec<(String, String)>) -> Self {
        self.properties = properties;
        self
    }

    /// Explicit OAuth2 token endpoint. When unset it is derived from the
    /// issuer as `<issuer>/oauth/token`.
    pub fn with_token_endpoint(mut self, token_endpoint: Option<String>) -> Self {
        self.token_endpoint = token_endpoint.filter(|endpoint| !endpoint.trim().is_empty());
        self
    }

    /// Builds the librdkafka client configuration for `descriptor`.
    pub fn client_config(&self, descriptor: &ConnectionDescriptor) -> Result<ClientConfig> {
        let endpoint = BrokerEndpoint::parse(descriptor.broker_uri())?;

        let mut config = ClientConfig::new();
        for (key, value) in &self.properties {
            config.set(key, value);
        }

        config
            .set("bootstrap.servers", &endpoint.bootstrap_servers)
            .set(
                "socket.connection.setup.timeout.ms",
                millis(descriptor.connection_timeout()),
            )
            .set("message.timeout.ms", millis(descriptor.operation_timeout()))
            .set("request.timeout.ms", millis(descriptor.operation_timeout()));

        match descriptor.auth() {
            AuthMode::Anonymous => {
                config.set("security.protocol", endpoint.security_protocol(false));
            }
            AuthMode::OAuth2ClientCredentials(credentials) => {
                let provider = credentials.auth_provider();
                let key_material = provider.key_material()?;
                let token_endpoint = self.token_endpoint.clone().unwrap_or_else(|| {
                    format!("{}/oauth/token", key_material.issuer_url.trim_end_matches('/'))
                });

                config
                    .set("security.protocol", endpoint.security_protocol(true))
                    .set("sasl.mechanism", "OAUTHBEARER")
                    .set("sasl.oauthbearer.method", "oidc")
                    .set("sasl.oauthbearer.client.id", &key_material.client_id)
                    .set("sasl.oauthbearer.client.secret", &key_material.client_secret)
                    .set("sasl.oauthbearer.token.endpoint.url", token_endpoint);

                if !key_material.scope.is_empty() {
                    config.set("sasl.oauthbearer.scope", &key_material.scope);
                }

                if !provider.audience.is_empty() {
                    let audience = format!("audience={}", provider.audience);
                    let extensions = match config.get(OAUTHBEARER_EXTENSIONS) {
                        Some(existing) if !existing.is_empty() => format!("{existing},{audience}"),
                        _ => audience,
                    };
                    config.set(OAUTHBEARER_EXTENSIONS, extensions);
                }
            }
        }

        Ok(config)
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    type Connection = KafkaConnection;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<KafkaConnection> {
        let broker_uri = descriptor.broker_uri().to_string();
        let connection_error = |reason: String| Error::Connection {
            uri: broker_uri.clone(),
            reason,
        };

        let producer: FutureProducer = self
            .client_config(descriptor)?
            .create()
            .map_err(|e| connection_error(e.to_string()))?;

        // librdkafka connects lazily, a metadata round trip proves the session is usable
        let probe = producer.clone();
        let timeout = descriptor.connection_timeout();
        let brokers = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| connection_error(e.to_string()))?
        .map_err(|e| connection_error(e.to_string()))?;

        info!(
            broker_uri = %broker_uri,
            brokers = brokers,
            auth = descriptor.auth().kind(),
            "Connected to broker"
        );

        Ok(KafkaConnection {
            producer,
            broker_uri,
            operation_timeout: descriptor.operation_timeout(),
        })
    }
}

/// Live librdkafka client shared by the producers opened on it.
#[derive(Clone)]
pub struct KafkaConnection {
    producer: FutureProducer,
    broker_uri: String,
    operation_timeout: Duration,
}

impl std::fmt::Debug for KafkaConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConnection")
            .field("broker_uri", &self.broker_uri)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

fn resolve_topic(
    producer: &FutureProducer,
    topic: &str,
    timeout: Duration,
) -> std::result::Result<usize, String> {
    let metadata = producer
        .client()
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| e.to_string())?;

    let entry = metadata
        .topics()
        .iter()
        .find(|entry| entry.name() == topic)
        .ok_or_else(|| "topic missing from broker metadata".to_string())?;

    if let Some(err) = entry.error() {
        return Err(format!("broker reported {err:?}"));
    }

    Ok(entry.partitions().len())
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    type Producer = KafkaProducer;

    async fn open_producer(&self, topic: &str) -> Result<KafkaProducer> {
        let open_error = |reason: String| Error::ProducerOpen {
            topic: topic.to_string(),
            reason,
        };

        if topic.trim().is_empty() {
            return Err(open_error("topic must not be empty".to_string()));
        }

        let probe = self.producer.clone();
        let name = topic.to_string();
        let timeout = self.operation_timeout;
        let partitions = tokio::task::spawn_blocking(move || resolve_topic(&probe, &name, timeout))
            .await
            .map_err(|e| open_error(e.to_string()))?
            .map_err(open_error)?;

        info!(topic = %topic, partitions = partitions, "Producer opened");

        Ok(KafkaProducer {
            producer: self.producer.clone(),
            topic: topic.to_string(),
            operation_timeout: self.operation_timeout,
        })
    }

    async fn close(self) {
        let in_flight = self.producer.in_flight_count();
        if in_flight > 0 {
            warn!(
                broker_uri = %self.broker_uri,
                in_flight = in_flight,
                "Closing broker connection with messages in flight"
            );
        }
        info!(broker_uri = %self.broker_uri, "Broker connection closed");
    }
}

/// Producer bound to one topic on a [`KafkaConnection`].
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    operation_timeout: Duration,
}

impl std::fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("topic", &self.topic)
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProducerTransport for KafkaProducer {
    fn send_async(&self, message: &OutboundMessage) -> Acknowledgement {
        let key = message.sequence_index().to_string();
        let record = FutureRecord::to(&self.topic)
            .key(key.as_str())
            .payload(message.payload().as_ref());

        match self.producer.send_result(record) {
            Ok(delivery) => Box::pin(async move {
                match delivery.await {
                    Ok(Ok((partition, offset))) => Ok(MessageId::new(partition, offset)),
                    Ok(Err((err, _))) => Err(SendError::Delivery(err.to_string())),
                    Err(_) => Err(SendError::Abandoned),
                }
            }),
            Err((err, _)) => Box::pin(std::future::ready(Err(SendError::Enqueue(err.to_string())))),
        }
    }

    async fn flush(&self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = self.operation_timeout;

        tokio::task::spawn_blocking(move || {
            producer.flush(timeout).map_err(|e| Error::Flush {
                outstanding: usize::try_from(producer.in_flight_count()).unwrap_or_default(),
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| Error::Flush {
            outstanding: 0,
            reason: e.to_string(),
        })?
    }

    async fn close(self) {
        // drops this handle's reference to the client; the connection holds the last one
        debug!(topic = %self.topic, "Kafka producer released");
    }

    fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::test_utils::oauth2_identity;

    fn oauth2_descriptor() -> ConnectionDescriptor {
        let auth = AuthMode::from_identity(&oauth2_identity()).unwrap();
        ConnectionDescriptor::new("kafka+ssl://broker-1:9093,broker-2:9093", auth).unwrap()
    }

    #[test]
    fn test_broker_endpoint_parsing() {
        assert_eq!(
            BrokerEndpoint::parse("localhost:9092").unwrap(),
            BrokerEndpoint {
                bootstrap_servers: "localhost:9092".to_string(),
                tls: false
            }
        );
        assert_eq!(
            BrokerEndpoint::parse("kafka+ssl://a:9093, b:9093/").unwrap(),
            BrokerEndpoint {
                bootstrap_servers: "a:9093,b:9093".to_string(),
                tls: true
            }
        );
        assert!(!BrokerEndpoint::parse("kafka://a:9092").unwrap().tls);
        assert!(BrokerEndpoint::parse("pulsar://a:6650").is_err());
        assert!(BrokerEndpoint::parse("kafka://").is_err());
    }

    #[test]
    fn test_anonymous_client_config() {
        let descriptor = ConnectionDescriptor::new("kafka://localhost:9092", AuthMode::Anonymous)
            .unwrap()
            .with_connection_timeout(Duration::from_secs(2));
        let config = KafkaConnector::new().client_config(&descriptor).unwrap();

        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(config.get("security.protocol"), Some("plaintext"));
        assert_eq!(config.get("socket.connection.setup.timeout.ms"), Some("2000"));
        assert_eq!(config.get("message.timeout.ms"), Some("30000"));
        assert_eq!(config.get("sasl.mechanism"), None);
    }

    #[test]
    fn test_oauth2_client_config() {
        let config = KafkaConnector::new()
            .client_config(&oauth2_descriptor())
            .unwrap();

        assert_eq!(config.get("bootstrap.servers"), Some("broker-1:9093,broker-2:9093"));
        assert_eq!(config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(config.get("sasl.mechanism"), Some("OAUTHBEARER"));
        assert_eq!(config.get("sasl.oauthbearer.method"), Some("oidc"));
        assert_eq!(config.get("sasl.oauthbearer.client.id"), Some("courier-test-client"));
        assert_eq!(
            config.get("sasl.oauthbearer.client.secret"),
            Some("courier-test-secret")
        );
        assert_eq!(
            config.get("sasl.oauthbearer.token.endpoint.url"),
            Some("https://auth.courier.test/oauth/token")
        );
        assert_eq!(config.get("sasl.oauthbearer.scope"), Some("produce"));
        assert_eq!(
            config.get(OAUTHBEARER_EXTENSIONS),
            Some("audience=urn:courier:cluster")
        );
    }

    #[test]
    fn test_properties_and_token_endpoint_override() {
        let connector = KafkaConnector::new()
            .with_properties(vec![
                ("linger.ms".to_string(), "5".to_string()),
                ("bootstrap.servers".to_string(), "ignored:1".to_string()),
                (OAUTHBEARER_EXTENSIONS.to_string(), "logicalCluster=lkc-1".to_string()),
            ])
            .with_token_endpoint(Some("https://idp.example.com/token".to_string()));
        let config = connector.client_config(&oauth2_descriptor()).unwrap();

        assert_eq!(config.get("linger.ms"), Some("5"));
        assert_eq!(config.get("bootstrap.servers"), Some("broker-1:9093,broker-2:9093"));
        assert_eq!(
            config.get("sasl.oauthbearer.token.endpoint.url"),
            Some("https://idp.example.com/token")
        );
        assert_eq!(
            config.get(OAUTHBEARER_EXTENSIONS),
            Some("logicalCluster=lkc-1,audience=urn:courier:cluster")
        );
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_connection_error() {
        // nothing listens on this port, the metadata probe times out
        let descriptor = ConnectionDescriptor::new("localhost:9999", AuthMode::Anonymous)
            .unwrap()
            .with_connection_timeout(Duration::from_secs(1))
            .with_operation_timeout(Duration::from_secs(1));

        let err = KafkaConnector::new().connect(&descriptor).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }), "unexpected error: {err}");
    }
}
