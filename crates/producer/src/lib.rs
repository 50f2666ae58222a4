//! Producer side of courier: the connection factory, the producer session with
//! its flush barrier, and the dispatcher that drives a batch through it.

pub mod config;
pub mod dispatcher;
pub mod in_memory;
pub mod kafka;
pub mod metrics;
pub mod runner;
pub mod session;
pub mod transport;

pub use config::{Config, ProducerConfig};
pub use dispatcher::{DispatchReport, Dispatcher, OutcomeLedger, prefixed_payloads};
pub use in_memory::{BrokerEvent, InMemoryBroker};
pub use kafka::{KafkaConnection, KafkaConnector, KafkaProducer};
pub use runner::produce;
pub use session::ProducerSession;
pub use transport::{Acknowledgement, BrokerConnection, BrokerConnector, ProducerTransport};
