use crate::config::ProducerConfig;
use crate::dispatcher::{DispatchReport, Dispatcher, prefixed_payloads};
use crate::session::ProducerSession;
use crate::transport::{BrokerConnection, BrokerConnector};
use courier_core::Result;
use tracing::{error, info};

/// Runs one batch end to end: connect, open, dispatch, then close the producer
/// and the connection in that order.
///
/// Connection and producer-open failures abort before any message is
/// submitted. Once the producer is open it is closed on every path, and the
/// connection is always closed after it.
pub async fn produce<C>(connector: &C, config: &ProducerConfig) -> Result<DispatchReport>
where
    C: BrokerConnector,
{
    let descriptor = config.descriptor();
    info!(
        broker_uri = %descriptor.broker_uri(),
        auth = descriptor.auth().kind(),
        topic = %config.topic(),
        message_count = config.message_count(),
        "Connecting to broker"
    );

    let connection = connector.connect(descriptor).await.inspect_err(|e| {
        error!(error = %e, "Failed to connect to broker");
    })?;

    let mut session = match ProducerSession::open(&connection, config.topic()).await {
        Ok(session) => session.with_flush_retries(config.flush_retries()),
        Err(err) => {
            error!(error = %err, topic = %config.topic(), "Failed to open producer");
            connection.close().await;
            return Err(err);
        }
    };

    let dispatcher = Dispatcher::new(
        config.message_count(),
        prefixed_payloads(config.payload_prefix()),
    );
    let result = dispatcher.run(&mut session).await;

    session.close().await;
    connection.close().await;

    result
}
