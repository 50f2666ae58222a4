//! Boundary to the broker client library.
//!
//! The session and dispatcher only talk to these traits. [`crate::kafka`]
//! implements them on top of `rdkafka`, [`crate::in_memory`] provides a
//! scriptable broker for tests and dry runs.

use async_trait::async_trait;
use courier_core::{
    ConnectionDescriptor, DEFAULT_OPERATION_TIMEOUT, MessageId, OutboundMessage, Result,
    SendError,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Completion of one send: resolves once the broker acknowledged or rejected
/// the message.
pub type Acknowledgement = Pin<Box<dyn Future<Output = Result<MessageId, SendError>> + Send>>;

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Connection handle produced by this connector.
    type Connection: BrokerConnection;

    /// Establishes a session described by `descriptor`.
    ///
    /// Fails with [`courier_core::Error::Connection`]; never retried here.
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Connection>;
}

/// A live broker session.
#[async_trait]
pub trait BrokerConnection: Send + Sync + Sized {
    /// Producer handle opened on this connection.
    type Producer: ProducerTransport;

    /// Registers a producer on `topic`.
    ///
    /// Fails with [`courier_core::Error::ProducerOpen`].
    async fn open_producer(&self, topic: &str) -> Result<Self::Producer>;

    /// Releases the session. Every producer opened on it must be closed first.
    async fn close(self);
}

/// A producer registered on one topic.
#[async_trait]
pub trait ProducerTransport: Send + Sync + Sized + 'static {
    /// Hands `message` to the transport without waiting for the broker.
    ///
    /// Enqueue failures are reported through the returned acknowledgement, so
    /// every call resolves exactly once.
    fn send_async(&self, message: &OutboundMessage) -> Acknowledgement;

    /// Waits until every queued message has been delivered or failed.
    ///
    /// Fails with [`courier_core::Error::Flush`].
    async fn flush(&self) -> Result<()>;

    /// Releases the broker-side producer registration and the handle itself.
    async fn close(self);

    /// Upper bound on how long an acknowledgement may trail a successful flush.
    fn operation_timeout(&self) -> Duration {
        DEFAULT_OPERATION_TIMEOUT
    }
}
