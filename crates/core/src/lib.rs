//! Core primitives for courier: authentication modes, connection descriptors,
//! outbound messages and their outcomes, and the shared error taxonomy.

pub mod auth;
pub mod descriptor;
pub mod error;
pub mod kafka;
pub mod logger;
pub mod message;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use auth::{AuthMode, AuthProvider, IdentityParams, KeyMaterial, OAuth2Credentials};
pub use descriptor::{ConnectionDescriptor, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_OPERATION_TIMEOUT};
pub use error::{Error, Result, SendError};
pub use message::{MessageId, OutboundMessage, SendOutcome};
pub use state::ProducerState;
