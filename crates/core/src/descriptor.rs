use crate::auth::AuthMode;
use crate::error::{Error, Result};
use std::time::Duration;

/// Default bound for broker operations.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for establishing the broker session.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the connection layer needs to open a broker session.
///
/// Built once at startup and never mutated; the `with_*` methods consume the
/// descriptor and return a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    broker_uri: String,
    operation_timeout: Duration,
    connection_timeout: Duration,
    auth: AuthMode,
}

impl ConnectionDescriptor {
    /// Creates a descriptor with the default 30 second timeouts.
    pub fn new(broker_uri: impl Into<String>, auth: AuthMode) -> Result<Self> {
        let broker_uri = broker_uri.into().trim().to_string();
        if broker_uri.is_empty() {
            return Err(Error::config("broker URI must not be empty"));
        }

        Ok(Self {
            broker_uri,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            auth,
        })
    }

    /// Overrides the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Overrides the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Target broker endpoint.
    pub fn broker_uri(&self) -> &str {
        &self.broker_uri
    }

    /// Bound applied to broker operations such as delivery and flush.
    pub const fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Bound applied while establishing the session.
    pub const fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Authentication presented on connect.
    pub const fn auth(&self) -> &AuthMode {
        &self.auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_thirty_second_timeouts() {
        let descriptor = ConnectionDescriptor::new("localhost:9092", AuthMode::Anonymous).unwrap();

        assert_eq!(descriptor.broker_uri(), "localhost:9092");
        assert_eq!(descriptor.operation_timeout(), Duration::from_secs(30));
        assert_eq!(descriptor.connection_timeout(), Duration::from_secs(30));
        assert_eq!(descriptor.auth(), &AuthMode::Anonymous);
    }

    #[test]
    fn test_blank_uri_is_rejected() {
        assert!(matches!(
            ConnectionDescriptor::new("  ", AuthMode::Anonymous),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_timeout_overrides() {
        let descriptor = ConnectionDescriptor::new("localhost:9092", AuthMode::Anonymous)
            .unwrap()
            .with_operation_timeout(Duration::from_secs(5))
            .with_connection_timeout(Duration::from_secs(1));

        assert_eq!(descriptor.operation_timeout(), Duration::from_secs(5));
        assert_eq!(descriptor.connection_timeout(), Duration::from_secs(1));
    }
}
