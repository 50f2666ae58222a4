use crate::metrics::Metrics;
use crate::transport::{BrokerConnection, ProducerTransport};
use backon::{ExponentialBuilder, Retryable};
use courier_core::{Error, OutboundMessage, ProducerState, Result, SendError, SendOutcome};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// A producer opened on one topic, tracking every completion it has spawned.
///
/// Lifecycle is `Open -> Flushing -> Closed`. Sends are only accepted while
/// open, [`flush`](Self::flush) may be repeated until the producer is closed,
/// and `Closed` is terminal.
pub struct ProducerSession<P: ProducerTransport> {
    transport: Option<P>,
    topic: String,
    state: ProducerState,
    operation_timeout: Duration,
    completions: JoinSet<()>,
    abandon: watch::Sender<bool>,
    submitted: u64,
    flush_retries: usize,
    metrics: Metrics,
}

impl<P: ProducerTransport> std::fmt::Debug for ProducerSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerSession")
            .field("topic", &self.topic)
            .field("state", &self.state)
            .field("outstanding", &self.completions.len())
            .field("submitted", &self.submitted)
            .finish_non_exhaustive()
    }
}

impl<P: ProducerTransport> Drop for ProducerSession<P> {
    fn drop(&mut self) {
        if self.state != ProducerState::Closed {
            warn!(topic = %self.topic, state = %self.state, "Producer session dropped without close");
        }
    }
}

impl<P: ProducerTransport> ProducerSession<P> {
    /// Registers a producer for `topic` on `connection`.
    pub async fn open<C>(connection: &C, topic: &str) -> Result<Self>
    where
        C: BrokerConnection<Producer = P>,
    {
        let transport = connection.open_producer(topic).await?;
        Ok(Self::from_transport(transport, topic))
    }

    /// Wraps an already registered transport.
    pub fn from_transport(transport: P, topic: &str) -> Self {
        let (abandon, _) = watch::channel(false);
        Self {
            operation_timeout: transport.operation_timeout(),
            transport: Some(transport),
            topic: topic.to_string(),
            state: ProducerState::Open,
            completions: JoinSet::new(),
            abandon,
            submitted: 0,
            flush_retries: 0,
            metrics: Metrics::default(),
        }
    }

    /// Retries a failed transport flush up to `retries` times with exponential
    /// backoff before giving up.
    pub fn with_flush_retries(mut self, retries: usize) -> Self {
        self.flush_retries = retries;
        self
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ProducerState {
        self.state
    }

    /// Topic this producer writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of messages accepted so far.
    pub const fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Number of submitted messages whose completion has not run yet.
    pub fn outstanding(&mut self) -> usize {
        self.reap_completed();
        self.completions.len()
    }

    /// Submits `message` without waiting for the broker.
    ///
    /// `on_complete` runs exactly once on a runtime task with the outcome.
    /// Completions of different messages may run concurrently and in any order.
    /// A message abandoned by a failed flush or by close completes with
    /// [`SendError::Abandoned`].
    pub fn send_async<F>(&mut self, message: OutboundMessage, on_complete: F) -> Result<()>
    where
        F: FnOnce(SendOutcome) + Send + 'static,
    {
        if !self.state.accepts_sends() {
            return Err(Error::InvalidState {
                operation: "send to",
                state: self.state,
            });
        }
        self.reap_completed();

        let message = Arc::new(message);
        let acknowledgement = self.transport("send to")?.send_async(&message);
        let mut abandoned = self.abandon.subscribe();
        let metrics = self.metrics.clone();
        let submitted_at = Instant::now();

        self.completions.spawn(async move {
            let result = tokio::select! {
                result = acknowledgement => result,
                _ = abandoned.wait_for(|abandoned| *abandoned) => Err(SendError::Abandoned),
            };
            metrics
                .acknowledgement_latency
                .record(submitted_at.elapsed().as_secs_f64());
            if result.is_ok() {
                metrics.messages_acknowledged.increment(1);
            } else {
                metrics.messages_failed.increment(1);
            }
            on_complete(SendOutcome::new(message, result));
        });

        self.submitted += 1;
        self.metrics.messages_submitted.increment(1);
        Ok(())
    }

    /// Blocks until every submitted message has completed.
    ///
    /// Returns immediately when nothing is outstanding. If the transport cannot
    /// confirm the outstanding messages, their completions run with
    /// [`SendError::Abandoned`] and [`Error::Flush`] reports how many were
    /// abandoned.
    pub async fn flush(&mut self) -> Result<()> {
        if self.state == ProducerState::Closed {
            return Err(Error::InvalidState {
                operation: "flush",
                state: self.state,
            });
        }
        self.state = ProducerState::Flushing;

        let outstanding = self.outstanding();
        if outstanding == 0 {
            debug!(topic = %self.topic, "Nothing outstanding, flush is a no-op");
            return Ok(());
        }

        debug!(topic = %self.topic, outstanding = outstanding, "Flushing producer");
        self.metrics.flushes.increment(1);

        if let Err(err) = self.flush_transport().await {
            let abandoned = self.abandon_outstanding().await;
            self.metrics.flush_failures.increment(1);
            error!(
                topic = %self.topic,
                abandoned = abandoned,
                error = %err,
                "Flush failed"
            );
            let reason = match err {
                Error::Flush { reason, .. } => reason,
                other => other.to_string(),
            };
            return Err(Error::Flush {
                outstanding: abandoned,
                reason,
            });
        }

        let drain_timeout = self.operation_timeout;
        let completions = &mut self.completions;
        let drained = tokio::time::timeout(drain_timeout, async {
            while let Some(joined) = completions.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Completion task failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            let abandoned = self.abandon_outstanding().await;
            self.metrics.flush_failures.increment(1);
            return Err(Error::Flush {
                outstanding: abandoned,
                reason: format!("acknowledgements still pending {drain_timeout:?} after flush"),
            });
        }

        info!(topic = %self.topic, submitted = self.submitted, "Producer flushed");
        Ok(())
    }

    /// Releases the producer. Completions still pending run with
    /// [`SendError::Abandoned`] before the transport is released.
    ///
    /// Must run on every exit path after a successful open. Closing twice only
    /// releases the transport once.
    pub async fn close(&mut self) {
        if self.state == ProducerState::Closed {
            debug!(topic = %self.topic, "Producer already closed");
            return;
        }

        let abandoned = self.abandon_outstanding().await;
        if abandoned > 0 {
            warn!(
                topic = %self.topic,
                abandoned = abandoned,
                "Closing producer with unconfirmed messages"
            );
        }

        self.state = ProducerState::Closed;
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        info!(topic = %self.topic, submitted = self.submitted, "Producer closed");
    }

    fn transport(&self, operation: &'static str) -> Result<&P> {
        self.transport.as_ref().ok_or(Error::InvalidState {
            operation,
            state: self.state,
        })
    }

    async fn flush_transport(&self) -> Result<()> {
        let transport = self.transport("flush")?;
        if self.flush_retries == 0 {
            return transport.flush().await;
        }

        (|| transport.flush())
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(100))
                    .with_max_delay(Duration::from_secs(5))
                    .with_max_times(self.flush_retries),
            )
            .notify(|err: &Error, dur: Duration| {
                warn!("Retrying producer flush {:?} after {:?}", err, dur);
            })
            .await
    }

    fn reap_completed(&mut self) {
        while let Some(joined) = self.completions.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Completion task failed");
            }
        }
    }

    /// Signals every pending completion to finish with [`SendError::Abandoned`]
    /// and waits for their callbacks. Returns how many were pending.
    async fn abandon_outstanding(&mut self) -> usize {
        self.reap_completed();
        let pending = self.completions.len();
        if pending == 0 {
            return 0;
        }

        self.abandon.send_replace(true);
        while let Some(joined) = self.completions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Completion task failed");
            }
        }
        pending
    }
}
