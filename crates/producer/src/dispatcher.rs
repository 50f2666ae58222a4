use crate::session::ProducerSession;
use crate::transport::ProducerTransport;
use bytes::Bytes;
use courier_core::{OutboundMessage, Result, SendError, SendOutcome};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct LedgerState {
    outcomes: BTreeMap<u64, SendOutcome>,
    duplicates: u64,
}

/// Collects completions from concurrently running callbacks.
#[derive(Debug, Clone, Default)]
pub struct OutcomeLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl OutcomeLedger {
    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `outcome`, logging failures. Never blocks on I/O.
    pub fn record(&self, outcome: SendOutcome) {
        let sequence_index = outcome.sequence_index();
        match outcome.result() {
            Ok(message_id) => {
                debug!(sequence_index, message_id = %message_id, "Message acknowledged");
            }
            Err(err) => {
                warn!(sequence_index, error = %err, "Failed to produce message");
            }
        }

        let mut state = self.state();
        if state.outcomes.insert(sequence_index, outcome).is_some() {
            state.duplicates += 1;
            error!(sequence_index, "Duplicate completion recorded");
        }
    }

    /// Number of distinct messages with a recorded outcome.
    pub fn completed(&self) -> usize {
        self.state().outcomes.len()
    }

    /// Snapshot of the ledger for `submitted` messages.
    pub fn report(&self, submitted: u64) -> DispatchReport {
        let state = self.state();
        DispatchReport {
            submitted,
            outcomes: state.outcomes.values().cloned().collect(),
            duplicates: state.duplicates,
        }
    }
}

/// Aggregated result of one dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    submitted: u64,
    outcomes: Vec<SendOutcome>,
    duplicates: u64,
}

impl DispatchReport {
    /// Number of messages handed to the producer.
    pub const fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Outcomes ordered by sequence index.
    pub fn outcomes(&self) -> &[SendOutcome] {
        &self.outcomes
    }

    /// Number of messages with a recorded outcome.
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of acknowledged messages.
    pub fn acknowledged(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    /// Failed messages with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (u64, &SendError)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.error().map(|err| (outcome.sequence_index(), err)))
    }

    /// Completions that arrived more than once for the same message.
    pub const fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Every submitted message completed exactly once.
    pub fn is_complete(&self) -> bool {
        self.duplicates == 0 && self.outcomes.len() as u64 == self.submitted
    }
}

/// Drives a bounded batch of messages through a producer.
pub struct Dispatcher<G> {
    count: u64,
    payload_generator: G,
}

impl<G> std::fmt::Debug for Dispatcher<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("count", &self.count).finish_non_exhaustive()
    }
}

impl<G> Dispatcher<G>
where
    G: Fn(u64) -> Bytes,
{
    /// Dispatches `count` messages whose payloads come from `payload_generator`.
    pub const fn new(count: u64, payload_generator: G) -> Self {
        Self { count, payload_generator }
    }

    /// Submits every message, then flushes once.
    ///
    /// Individual send failures are logged and counted; only a failed flush
    /// fails the run.
    pub async fn run<P: ProducerTransport>(
        &self,
        session: &mut ProducerSession<P>,
    ) -> Result<DispatchReport> {
        let ledger = OutcomeLedger::default();

        for sequence_index in 0..self.count {
            let message = OutboundMessage::new((self.payload_generator)(sequence_index), sequence_index);
            let recorder = ledger.clone();
            session.send_async(message, move |outcome| recorder.record(outcome))?;
        }

        info!(
            topic = %session.topic(),
            submitted = self.count,
            "All messages submitted, waiting for acknowledgements"
        );

        if let Err(err) = session.flush().await {
            error!(
                topic = %session.topic(),
                submitted = self.count,
                completed = ledger.completed(),
                error = %err,
                "Dispatch failed at flush"
            );
            return Err(err);
        }

        let report = ledger.report(self.count);
        info!(
            topic = %session.topic(),
            submitted = report.submitted(),
            acknowledged = report.acknowledged(),
            failed = report.failures().count(),
            "Dispatch complete"
        );
        Ok(report)
    }
}

/// Payload generator producing `"<prefix>: <index>"`.
pub fn prefixed_payloads(prefix: impl Into<String>) -> impl Fn(u64) -> Bytes {
    let prefix = prefix.into();
    move |index| Bytes::from(format!("{prefix}: {index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryBroker;
    use crate::transport::{BrokerConnection, BrokerConnector};
    use courier_core::{AuthMode, ConnectionDescriptor};

    #[test]
    fn test_prefixed_payloads() {
        let generator = prefixed_payloads("Test Message");
        assert_eq!(generator(7), Bytes::from_static(b"Test Message: 7"));
    }

    #[tokio::test]
    async fn test_zero_messages_flushes_immediately() {
        let broker = InMemoryBroker::new();
        let descriptor = ConnectionDescriptor::new("memory://", AuthMode::Anonymous).unwrap();
        let connection = broker.connect(&descriptor).await.unwrap();
        let mut session = ProducerSession::open(&connection, "empty").await.unwrap();

        let report = Dispatcher::new(0, prefixed_payloads("unused"))
            .run(&mut session)
            .await
            .unwrap();

        assert_eq!(report.submitted(), 0);
        assert!(report.is_complete());
        assert_eq!(broker.flush_count(), 0);

        session.close().await;
        connection.close().await;
    }

    #[test]
    fn test_ledger_counts_duplicates() {
        use courier_core::MessageId;

        let ledger = OutcomeLedger::default();
        let message = Arc::new(OutboundMessage::new("m", 0));
        ledger.record(SendOutcome::new(message.clone(), Ok(MessageId::new(0, 0))));
        ledger.record(SendOutcome::new(message, Ok(MessageId::new(0, 0))));

        let report = ledger.report(1);
        assert_eq!(report.completed(), 1);
        assert_eq!(report.duplicates(), 1);
        assert!(!report.is_complete());
    }
}
