//! NeuronPort Trait - Persistence and Arbitration Boundary
//!
//! This module defines the `NeuronPort` trait that the editing engine uses
//! to reach the shared backing store and the remote ownership broker. The
//! engine never depends on how neurons are stored or how requests travel;
//! implementations own that.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: every method is async so both embedded and networked
//!    backends fit behind the same trait
//! 2. **Ownership Semantics**: neurons are passed by value; the editor hands
//!    over a snapshot taken under the neuron's lock
//! 3. **Error Handling**: `anyhow::Result` for flexible error context; the
//!    editor reports failures out of band, never through edit results
//! 4. **Answers Arrive Separately**: `request_ownership` only delivers the
//!    request; the broker's answer comes back through
//!    [`TreeEditor::resolve_ownership`](crate::services::TreeEditor::resolve_ownership)

use crate::models::{Id, NeuronTree};
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over the shared store and the ownership broker
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; calls arrive from the editor's
/// background persistence task as well as from interactive callers.
///
/// # Backpressure
///
/// There is none at this layer. Callers that create nodes faster than the
/// port persists them build an unbounded backlog in front of the port.
#[async_trait]
pub trait NeuronPort: Send + Sync {
    /// Load every neuron of a workspace when it is opened
    async fn load_neurons(&self, workspace_id: Id) -> Result<Vec<NeuronTree>>;

    /// Persist a neuron created locally
    async fn create_neuron(&self, neuron: NeuronTree) -> Result<()>;

    /// Persist the current state of an existing neuron
    async fn save_neuron(&self, neuron: NeuronTree) -> Result<()>;

    /// Remove a neuron from the store
    async fn delete_neuron(&self, neuron: NeuronTree) -> Result<()>;

    /// Ask the broker for exclusive edit rights on a neuron
    async fn request_ownership(&self, neuron_id: Id) -> Result<()>;

    /// Ask the broker to hand a neuron to another collaborator
    async fn request_assignment(&self, neuron_id: Id, target_user: &str) -> Result<()>;
}
