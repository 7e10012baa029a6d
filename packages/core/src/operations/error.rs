//! Error types for neuron edit operations
//!
//! Every structural edit either succeeds or returns one of these errors with
//! the neuron left exactly as it was. Cycle-creating reparents and redundant
//! root operations are not errors; they are absorbed as no-ops.

use crate::models::{Id, ModelError};
use thiserror::Error;

/// Errors that can occur during neuron edit operations
///
/// # Examples
///
/// ```rust
/// use tmneuron_core::operations::EditError;
/// use tmneuron_core::models::Id;
///
/// let err = EditError::node_not_found(Id(7), Id(42));
/// assert_eq!(err.to_string(), "Node 42 does not exist in neuron 7");
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    /// Referenced node is absent from the addressed neuron
    #[error("Node {node_id} does not exist in neuron {neuron_id}")]
    NodeNotFound { neuron_id: Id, node_id: Id },

    /// Referenced neuron is not part of the working set
    #[error("Neuron {neuron_id} is not loaded in this workspace")]
    NeuronNotFound { neuron_id: Id },

    /// Endpoint missing from the neuron, or malformed path geometry
    #[error("Invalid reference: {reason}")]
    InvalidReference { reason: String },

    /// Structured text already exists for the node; use update instead
    #[error("Node {node_id} in neuron {neuron_id} already has a structured text annotation")]
    DuplicateAnnotation { neuron_id: Id, node_id: Id },

    /// Neuron data has not been loaded yet
    #[error("Illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("Ownership request for neuron {neuron_id} timed out after {timeout_ms} ms")]
    OwnershipTimeout { neuron_id: Id, timeout_ms: u64 },

    /// Request was withdrawn or could not be delivered to the broker
    #[error("Ownership request for neuron {neuron_id} was cancelled before an answer arrived")]
    OwnershipCancelled { neuron_id: Id },

    /// Awaited port call failed (workspace load)
    #[error("Port operation failed: {0}")]
    PortFailure(String),
}

impl EditError {
    pub fn node_not_found(neuron_id: Id, node_id: Id) -> Self {
        Self::NodeNotFound { neuron_id, node_id }
    }

    pub fn neuron_not_found(neuron_id: Id) -> Self {
        Self::NeuronNotFound { neuron_id }
    }

    pub fn invalid_reference(reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reason: reason.into(),
        }
    }

    pub fn duplicate_annotation(neuron_id: Id, node_id: Id) -> Self {
        Self::DuplicateAnnotation { neuron_id, node_id }
    }

    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState {
            reason: reason.into(),
        }
    }

    pub fn port_failure(message: impl Into<String>) -> Self {
        Self::PortFailure(message.into())
    }
}

impl From<ModelError> for EditError {
    fn from(err: ModelError) -> Self {
        Self::invalid_reference(err.to_string())
    }
}
