//! Scriptable in-process broker.
//!
//! Used by the tests and by `--dry-run`. Failures can be injected at every
//! stage of the pipeline and acknowledgements can be held back until flush,
//! where they are released in reverse submission order.

use crate::transport::{Acknowledgement, BrokerConnection, BrokerConnector, ProducerTransport};
use async_trait::async_trait;
use courier_core::{
    ConnectionDescriptor, Error, MessageId, OutboundMessage, Result, SendError,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

/// Lifecycle events observed by the broker, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A connection was established.
    Connected,
    /// A producer was opened on the topic.
    ProducerOpened(String),
    /// The producer on the topic was closed.
    ProducerClosed(String),
    /// The connection was closed.
    ConnectionClosed,
}

type PendingAck = (MessageId, bool, oneshot::Sender<Result<MessageId, SendError>>);

#[derive(Debug, Default)]
struct BrokerState {
    unreachable: bool,
    rejected_topics: HashSet<String>,
    failing_sequences: HashSet<u64>,
    defer_acknowledgements: bool,
    flush_failures_remaining: Option<usize>,
    flush_count: usize,
    live_producers: usize,
    next_offset: i64,
    events: Vec<BrokerEvent>,
    messages: Vec<(String, OutboundMessage)>,
    pending: Vec<PendingAck>,
}

/// Broker that keeps everything in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// An empty, reachable broker that acknowledges immediately.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent connect fail.
    pub fn set_unreachable(&self) {
        self.state().unreachable = true;
    }

    /// Refuses producer registration on `topic`.
    pub fn reject_topic(&self, topic: &str) {
        self.state().rejected_topics.insert(topic.to_string());
    }

    /// Fails delivery of the message with `sequence_index`.
    pub fn fail_message(&self, sequence_index: u64) {
        self.state().failing_sequences.insert(sequence_index);
    }

    /// Holds acknowledgements until the next flush.
    pub fn defer_acknowledgements(&self) {
        self.state().defer_acknowledgements = true;
    }

    /// Makes every flush fail.
    pub fn fail_flush(&self) {
        self.state().flush_failures_remaining = Some(usize::MAX);
    }

    /// Makes the next `times` flushes fail.
    pub fn fail_flush_times(&self, times: usize) {
        self.state().flush_failures_remaining = Some(times);
    }

    /// Lifecycle events recorded so far.
    pub fn events(&self) -> Vec<BrokerEvent> {
        self.state().events.clone()
    }

    /// Messages accepted so far, in submission order.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.state().messages.iter().map(|(_, message)| message.clone()).collect()
    }

    /// Messages accepted on `topic`, in submission order.
    pub fn messages_for(&self, topic: &str) -> Vec<OutboundMessage> {
        self.state()
            .messages
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Number of transport flush attempts.
    pub fn flush_count(&self) -> usize {
        self.state().flush_count
    }

    /// Producer handles that have been opened and not yet dropped.
    pub fn live_producers(&self) -> usize {
        self.state().live_producers
    }

    fn record(&self, event: BrokerEvent) {
        self.state().events.push(event);
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    type Connection = InMemoryConnection;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<InMemoryConnection> {
        if self.state().unreachable {
            return Err(Error::Connection {
                uri: descriptor.broker_uri().to_string(),
                reason: "broker unreachable".to_string(),
            });
        }

        self.record(BrokerEvent::Connected);
        Ok(InMemoryConnection { broker: self.clone() })
    }
}

/// Connection to an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryConnection {
    broker: InMemoryBroker,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    type Producer = InMemoryProducer;

    async fn open_producer(&self, topic: &str) -> Result<InMemoryProducer> {
        if topic.trim().is_empty() || self.broker.state().rejected_topics.contains(topic) {
            return Err(Error::ProducerOpen {
                topic: topic.to_string(),
                reason: "topic rejected by broker".to_string(),
            });
        }

        self.broker.record(BrokerEvent::ProducerOpened(topic.to_string()));
        self.broker.state().live_producers += 1;
        Ok(InMemoryProducer {
            broker: self.broker.clone(),
            topic: topic.to_string(),
        })
    }

    async fn close(self) {
        self.broker.record(BrokerEvent::ConnectionClosed);
    }
}

/// Producer on an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    topic: String,
}

fn resolve(id: MessageId, fail: bool) -> Result<MessageId, SendError> {
    if fail {
        Err(SendError::Delivery(format!("injected failure at offset {}", id.offset())))
    } else {
        Ok(id)
    }
}

#[async_trait]
impl ProducerTransport for InMemoryProducer {
    fn send_async(&self, message: &OutboundMessage) -> Acknowledgement {
        let mut state = self.broker.state();
        let id = MessageId::new(0, state.next_offset);
        state.next_offset += 1;
        state.messages.push((self.topic.clone(), message.clone()));
        let fail = state.failing_sequences.contains(&message.sequence_index());

        if !state.defer_acknowledgements {
            return Box::pin(std::future::ready(resolve(id, fail)));
        }

        let (tx, rx) = oneshot::channel();
        state.pending.push((id, fail, tx));
        Box::pin(async move { rx.await.unwrap_or(Err(SendError::Abandoned)) })
    }

    async fn flush(&self) -> Result<()> {
        let mut guard = self.broker.state();
        let state = &mut *guard;
        state.flush_count += 1;

        if let Some(remaining) = state.flush_failures_remaining.as_mut()
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::Flush {
                outstanding: state.pending.len(),
                reason: "injected flush failure".to_string(),
            });
        }

        let pending = std::mem::take(&mut state.pending);
        drop(guard);

        debug!(topic = %self.topic, released = pending.len(), "Releasing acknowledgements");
        for (id, fail, tx) in pending.into_iter().rev() {
            let _ = tx.send(resolve(id, fail));
        }
        Ok(())
    }

    async fn close(self) {
        self.broker.record(BrokerEvent::ProducerClosed(self.topic.clone()));
    }
}

impl Drop for InMemoryProducer {
    fn drop(&mut self) {
        let mut state = self.broker.state();
        state.live_producers = state.live_producers.saturating_sub(1);
    }
}
