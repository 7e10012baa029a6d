//! In-memory NeuronPort
//!
//! A complete, process-local implementation of [`NeuronPort`]: neurons are
//! kept per workspace in a map and ownership requests are forwarded on an
//! optional channel so the embedding application (or a test) can play the
//! broker and answer them through `TreeEditor::resolve_ownership`.

use super::NeuronPort;
use crate::models::{Id, NeuronTree};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, RwLock};

/// An ownership or assignment request as seen by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRequestRecord {
    pub neuron_id: Id,
    /// `None` for ownership requests, the assignee for assignments
    pub target_user: Option<String>,
}

/// Number of calls received per port method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortCallCounts {
    pub loads: usize,
    pub creates: usize,
    pub saves: usize,
    pub deletes: usize,
    pub ownership_requests: usize,
}

#[derive(Default)]
struct CallCounters {
    loads: AtomicUsize,
    creates: AtomicUsize,
    saves: AtomicUsize,
    deletes: AtomicUsize,
    ownership_requests: AtomicUsize,
}

#[derive(Default)]
pub struct InMemoryNeuronPort {
    /// workspace id -> neuron id -> stored neuron
    workspaces: RwLock<HashMap<Id, HashMap<Id, NeuronTree>>>,
    request_tx: Option<mpsc::UnboundedSender<OwnershipRequestRecord>>,
    counters: CallCounters,
    fail_writes: AtomicBool,
}

impl InMemoryNeuronPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Port that forwards every ownership/assignment request to the
    /// returned receiver.
    pub fn with_ownership_channel() -> (Self, mpsc::UnboundedReceiver<OwnershipRequestRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let port = Self {
            request_tx: Some(tx),
            ..Self::default()
        };
        (port, rx)
    }

    /// Put a neuron straight into the store, bypassing any editor
    pub async fn seed(&self, neuron: NeuronTree) {
        let mut workspaces = self.workspaces.write().await;
        workspaces
            .entry(neuron.metadata().workspace_id)
            .or_default()
            .insert(neuron.id(), neuron);
    }

    /// Stored copy of a neuron, from whichever workspace holds it
    pub async fn stored(&self, neuron_id: Id) -> Option<NeuronTree> {
        let workspaces = self.workspaces.read().await;
        workspaces
            .values()
            .find_map(|neurons| neurons.get(&neuron_id).cloned())
    }

    pub async fn stored_count(&self, workspace_id: Id) -> usize {
        let workspaces = self.workspaces.read().await;
        workspaces.get(&workspace_id).map_or(0, HashMap::len)
    }

    /// Make every create/save/delete fail until switched off again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    pub fn call_counts(&self) -> PortCallCounts {
        PortCallCounts {
            loads: self.counters.loads.load(Ordering::Acquire),
            creates: self.counters.creates.load(Ordering::Acquire),
            saves: self.counters.saves.load(Ordering::Acquire),
            deletes: self.counters.deletes.load(Ordering::Acquire),
            ownership_requests: self.counters.ownership_requests.load(Ordering::Acquire),
        }
    }

    fn check_writable(&self, operation: &str, neuron_id: Id) -> Result<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            bail!("store rejected {} of neuron {}", operation, neuron_id);
        }
        Ok(())
    }

    async fn upsert(&self, neuron: NeuronTree) {
        let mut workspaces = self.workspaces.write().await;
        workspaces
            .entry(neuron.metadata().workspace_id)
            .or_default()
            .insert(neuron.id(), neuron);
    }

    fn forward(&self, record: OwnershipRequestRecord) -> Result<()> {
        self.counters
            .ownership_requests
            .fetch_add(1, Ordering::AcqRel);
        if let Some(tx) = &self.request_tx {
            if tx.send(record).is_err() {
                bail!("ownership broker is not listening");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NeuronPort for InMemoryNeuronPort {
    async fn load_neurons(&self, workspace_id: Id) -> Result<Vec<NeuronTree>> {
        self.counters.loads.fetch_add(1, Ordering::AcqRel);
        let workspaces = self.workspaces.read().await;
        let mut neurons: Vec<NeuronTree> = workspaces
            .get(&workspace_id)
            .map(|n| n.values().cloned().collect())
            .unwrap_or_default();
        neurons.sort_by_key(|n| n.id());
        Ok(neurons)
    }

    async fn create_neuron(&self, neuron: NeuronTree) -> Result<()> {
        self.counters.creates.fetch_add(1, Ordering::AcqRel);
        self.check_writable("create", neuron.id())?;
        self.upsert(neuron).await;
        Ok(())
    }

    async fn save_neuron(&self, neuron: NeuronTree) -> Result<()> {
        self.counters.saves.fetch_add(1, Ordering::AcqRel);
        self.check_writable("save", neuron.id())?;
        self.upsert(neuron).await;
        Ok(())
    }

    async fn delete_neuron(&self, neuron: NeuronTree) -> Result<()> {
        self.counters.deletes.fetch_add(1, Ordering::AcqRel);
        self.check_writable("delete", neuron.id())?;
        let mut workspaces = self.workspaces.write().await;
        if let Some(neurons) = workspaces.get_mut(&neuron.metadata().workspace_id) {
            neurons.remove(&neuron.id());
        }
        Ok(())
    }

    async fn request_ownership(&self, neuron_id: Id) -> Result<()> {
        self.forward(OwnershipRequestRecord {
            neuron_id,
            target_user: None,
        })
    }

    async fn request_assignment(&self, neuron_id: Id, target_user: &str) -> Result<()> {
        self.forward(OwnershipRequestRecord {
            neuron_id,
            target_user: Some(target_user.to_string()),
        })
    }
}
