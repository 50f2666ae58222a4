use crate::state::ProducerState;
use thiserror::Error;

/// Result alias used across the courier crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal errors raised while building credentials, connecting, opening a
/// producer or flushing it.
///
/// Per-message failures are not represented here: they travel inside
/// [`SendOutcome`](crate::SendOutcome) as a [`SendError`] and never abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete configuration, detected before any connection attempt.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The OAuth2 key material could not be serialized.
    #[error("failed to serialize key material: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The broker session could not be established.
    #[error("failed to connect to {uri}: {reason}")]
    Connection {
        /// Broker URI the connection was attempted against.
        uri: String,
        /// Transport supplied description of the failure.
        reason: String,
    },

    /// The broker refused producer registration or the topic does not resolve.
    #[error("failed to open producer for topic {topic}: {reason}")]
    ProducerOpen {
        /// Topic the producer was opened on.
        topic: String,
        /// Transport supplied description of the failure.
        reason: String,
    },

    /// Outstanding messages could not be confirmed by the flush barrier.
    #[error("flush failed with {outstanding} unconfirmed message(s): {reason}")]
    Flush {
        /// Number of messages whose acknowledgement was abandoned.
        outstanding: usize,
        /// Transport supplied description of the failure.
        reason: String,
    },

    /// An operation was attempted in a producer state that does not permit it.
    #[error("cannot {operation} a producer that is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State the producer was in.
        state: ProducerState,
    },
}

impl Error {
    /// Builds a [`Error::Config`] from anything displayable.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

/// Failure of a single message, delivered through its completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport refused to queue the message (for example when its local
    /// queue is full).
    #[error("message could not be enqueued: {0}")]
    Enqueue(String),

    /// The broker reported a delivery failure.
    #[error("broker rejected message: {0}")]
    Delivery(String),

    /// The acknowledgement was dropped before the broker answered.
    #[error("acknowledgement abandoned before delivery")]
    Abandoned,
}
