//! Persistence and Arbitration Boundary
//!
//! This module holds everything the editor needs from the outside world:
//!
//! - [`NeuronPort`] - async load/create/save/delete plus ownership requests
//! - [`IdGenerator`] - source of fresh identifiers for `IdSource`
//! - [`DomainEvent`] - change notifications published by the editor
//! - [`InMemoryNeuronPort`] - process-local port implementation
//!
//! How bytes reach a database, and how updates travel to other clients, is
//! owned by the `NeuronPort` implementation.

pub mod events;
mod id_generator;
mod memory_port;
mod port;

pub use events::{DomainEvent, PersistenceOperation};
pub use id_generator::{IdGenerator, TimeBasedIdGenerator};
pub use memory_port::{InMemoryNeuronPort, OwnershipRequestRecord, PortCallCounts};
pub use port::NeuronPort;
