//! Editing Services
//!
//! This module contains the stateful services behind neuron editing:
//!
//! - `TreeEditor` - Entry point for all edits, ownership and remote updates
//! - `NeuronCollection` - Concurrent registry of the neurons being edited
//! - `TagIndex` - Two-way tag membership index
//! - `IdSource` - Block-based id allocation
//! - `OwnershipBroker` - Outstanding ownership requests, keyed by neuron
//! - `PersistenceWorker` - Background task forwarding saves to the port
//!
//! Services coordinate between the pure algorithms in `operations` and the
//! port in `db`.

pub mod id_source;
pub mod neuron_collection;
pub mod ownership;
pub mod persistence_worker;
pub mod tag_index;
pub mod tree_editor;

pub use id_source::{IdSource, IdSourceError};
pub use neuron_collection::{NeuronCollection, SharedNeuron};
pub use ownership::{OwnershipBroker, OwnershipRequestKind, PendingRequest, Registration};
pub use persistence_worker::{
    CreationCompletion, PendingCreation, PersistenceHandle, PersistenceRequest, PersistenceWorker,
};
pub use tag_index::TagIndex;
pub use tree_editor::TreeEditor;
