//! Domain Events for the neuron editor
//!
//! The editor emits a domain event after every successful mutation, and the
//! persistence worker emits one when a port call fails. Subscribers (the
//! application shell, a change feed to other clients, tests) receive them
//! through a tokio broadcast channel without coupling to the editor.
//!
//! # Event Flow
//!
//! 1. `TreeEditor` applies an edit under the neuron's lock
//! 2. The lock is released and the event is sent on the broadcast channel
//! 3. Every subscriber receives the event asynchronously
//!
//! Sending never fails the edit; events are simply dropped when nobody is
//! listening.

use crate::models::Id;
use serde::{Deserialize, Serialize};

/// Port call a persistence request maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersistenceOperation {
    Create,
    Save,
    Delete,
}

impl PersistenceOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceOperation::Create => "create",
            PersistenceOperation::Save => "save",
            PersistenceOperation::Delete => "delete",
        }
    }
}

/// Domain events emitted by the editor
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A neuron was created locally
    NeuronCreated { neuron_id: Id },

    /// A neuron's nodes, annotations or metadata changed
    NeuronUpdated { neuron_id: Id },

    /// A neuron was removed from the working set
    NeuronDeleted { neuron_id: Id },

    /// A node was added to a neuron
    NodeCreated { neuron_id: Id, node_id: Id },

    /// Nodes were removed from a neuron
    NodesDeleted { neuron_id: Id, node_ids: Vec<Id> },

    /// A whole neurite moved between neurons
    SubtreeMoved {
        source_neuron_id: Id,
        target_neuron_id: Id,
        root_id: Id,
        node_count: usize,
    },

    /// Tag membership of a neuron changed
    TagsChanged { neuron_id: Id },

    /// The ownership broker answered a request
    OwnershipResolved { neuron_id: Id, granted: bool },

    /// A neuron was replaced by a notification from another client
    RemoteUpdateApplied { neuron_id: Id },

    /// A fire-and-forget port call failed
    PersistenceFailed {
        neuron_id: Id,
        operation: PersistenceOperation,
        message: String,
    },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NeuronCreated { .. } => "neuron:created",
            DomainEvent::NeuronUpdated { .. } => "neuron:updated",
            DomainEvent::NeuronDeleted { .. } => "neuron:deleted",
            DomainEvent::NodeCreated { .. } => "node:created",
            DomainEvent::NodesDeleted { .. } => "node:deleted",
            DomainEvent::SubtreeMoved { .. } => "subtree:moved",
            DomainEvent::TagsChanged { .. } => "tags:changed",
            DomainEvent::OwnershipResolved { .. } => "ownership:resolved",
            DomainEvent::RemoteUpdateApplied { .. } => "remote:applied",
            DomainEvent::PersistenceFailed { .. } => "persistence:failed",
        }
    }

    /// Neuron the event is about; moves report their target neuron
    pub fn neuron_id(&self) -> Id {
        match self {
            DomainEvent::NeuronCreated { neuron_id }
            | DomainEvent::NeuronUpdated { neuron_id }
            | DomainEvent::NeuronDeleted { neuron_id }
            | DomainEvent::NodeCreated { neuron_id, .. }
            | DomainEvent::NodesDeleted { neuron_id, .. }
            | DomainEvent::TagsChanged { neuron_id }
            | DomainEvent::OwnershipResolved { neuron_id, .. }
            | DomainEvent::RemoteUpdateApplied { neuron_id }
            | DomainEvent::PersistenceFailed { neuron_id, .. } => *neuron_id,
            DomainEvent::SubtreeMoved {
                target_neuron_id, ..
            } => *target_neuron_id,
        }
    }
}
