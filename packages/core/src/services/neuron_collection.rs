//! The set of neurons currently known to an editor

use crate::models::{Id, NeuronTree};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One neuron behind its own lock, so edits to different neurons never
/// contend
pub type SharedNeuron = Arc<RwLock<NeuronTree>>;

/// Concurrent `Id → NeuronTree` registry
///
/// The outer lock only guards membership and is never held while waiting on
/// a tree lock. Callers clone the [`SharedNeuron`] handle out and lock the
/// tree itself.
#[derive(Debug, Default)]
pub struct NeuronCollection {
    neurons: RwLock<HashMap<Id, SharedNeuron>>,
}

impl NeuronCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a neuron, returning the handle it replaced
    pub async fn insert(&self, tree: NeuronTree) -> Option<SharedNeuron> {
        let id = tree.id();
        self.neurons
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(tree)))
    }

    pub async fn get(&self, neuron_id: Id) -> Option<SharedNeuron> {
        self.neurons.read().await.get(&neuron_id).cloned()
    }

    pub async fn remove(&self, neuron_id: Id) -> Option<SharedNeuron> {
        self.neurons.write().await.remove(&neuron_id)
    }

    pub async fn contains(&self, neuron_id: Id) -> bool {
        self.neurons.read().await.contains_key(&neuron_id)
    }

    pub async fn len(&self) -> usize {
        self.neurons.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.neurons.read().await.is_empty()
    }

    /// Neuron ids in ascending order
    pub async fn ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.neurons.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Whether `handle` is still the entry registered for `neuron_id`.
    ///
    /// Entries can be swapped or dropped while a caller waits on a tree lock.
    pub async fn is_current(&self, neuron_id: Id, handle: &SharedNeuron) -> bool {
        self.neurons
            .read()
            .await
            .get(&neuron_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Clone of a neuron's current state
    pub async fn snapshot(&self, neuron_id: Id) -> Option<NeuronTree> {
        let handle = self.get(neuron_id).await?;
        let tree = handle.read().await;
        Some(tree.clone())
    }
}
