use crate::error::SendError;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A message produced by the dispatcher. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    payload: Bytes,
    sequence_index: u64,
}

impl OutboundMessage {
    /// Creates a message with the given payload and position in the batch.
    pub fn new(payload: impl Into<Bytes>, sequence_index: u64) -> Self {
        Self { payload: payload.into(), sequence_index }
    }

    /// Message body.
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Zero-based position of the message in its batch.
    pub const fn sequence_index(&self) -> u64 {
        self.sequence_index
    }
}

/// Broker-assigned identifier of an acknowledged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    partition: i32,
    offset: i64,
}

impl MessageId {
    /// Creates an identifier from a partition and offset.
    pub const fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }

    /// Partition the message was written to.
    pub const fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset of the message within its partition.
    pub const fn offset(&self) -> i64 {
        self.offset
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.offset)
    }
}

/// Result of one submitted message, produced exactly once per submission.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    message: Arc<OutboundMessage>,
    result: Result<MessageId, SendError>,
}

impl SendOutcome {
    /// Pairs a submitted message with its acknowledgement result.
    pub const fn new(message: Arc<OutboundMessage>, result: Result<MessageId, SendError>) -> Self {
        Self { message, result }
    }

    /// The message this outcome belongs to.
    pub fn message(&self) -> &OutboundMessage {
        &self.message
    }

    /// Sequence index of the originating message.
    pub fn sequence_index(&self) -> u64 {
        self.message.sequence_index()
    }

    /// Identifier assigned by the broker, if the message was acknowledged.
    pub fn message_id(&self) -> Option<MessageId> {
        self.result.as_ref().ok().copied()
    }

    /// Failure reported for the message, if any.
    pub fn error(&self) -> Option<&SendError> {
        self.result.as_ref().err()
    }

    /// Whether the broker acknowledged the message.
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The raw acknowledgement result.
    pub const fn result(&self) -> &Result<MessageId, SendError> {
        &self.result
    }
}
