//! Background persistence
//!
//! Structural edits are local-first: the editor marks the changed neuron as
//! dirty and returns immediately. A single background task drains the queue
//! in submission order and calls the port. Failures cannot reach the caller
//! any more, so they are logged and broadcast as
//! [`DomainEvent::PersistenceFailed`].
//!
//! A save carries only the neuron id. The worker snapshots the tree from the
//! working set when it reaches the request, and a neuron already waiting for
//! a save is not queued again, so a burst of edits costs one snapshot.
//!
//! The queue is unbounded. A caller that edits faster than the port can
//! store will grow it without limit.

use crate::db::{DomainEvent, NeuronPort, PersistenceOperation};
use crate::models::{Id, NeuronTree};
use crate::services::neuron_collection::NeuronCollection;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

/// Runs once the port has acknowledged a creation
pub type CreationCompletion = Box<dyn FnOnce(&NeuronTree) + Send + 'static>;

/// A neuron waiting for the port to acknowledge its creation
pub struct PendingCreation {
    pub neuron: NeuronTree,
    pub completion: Option<CreationCompletion>,
}

impl PendingCreation {
    pub fn new(neuron: NeuronTree) -> Self {
        Self {
            neuron,
            completion: None,
        }
    }

    pub fn with_completion<F>(neuron: NeuronTree, completion: F) -> Self
    where
        F: FnOnce(&NeuronTree) + Send + 'static,
    {
        Self {
            neuron,
            completion: Some(Box::new(completion)),
        }
    }
}

impl fmt::Debug for PendingCreation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCreation")
            .field("neuron_id", &self.neuron.id())
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub enum PersistenceRequest {
    Create(PendingCreation),
    /// Store the neuron's state as of when the worker handles the request
    Save(Id),
    Delete(NeuronTree),
    /// Acknowledged once every earlier request has been handled
    Flush(oneshot::Sender<()>),
    /// Like `Flush`, then the worker stops
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable sender side of the persistence queue
#[derive(Clone, Debug)]
pub struct PersistenceHandle {
    request_tx: mpsc::UnboundedSender<PersistenceRequest>,
    /// Neurons with a `Save` still in the queue
    pending_saves: Arc<Mutex<HashSet<Id>>>,
}

impl PersistenceHandle {
    pub fn create(&self, creation: PendingCreation) -> bool {
        self.submit(PersistenceRequest::Create(creation))
    }

    /// Queue a save unless one is already waiting for this neuron.
    pub async fn save(&self, neuron_id: Id) -> bool {
        let mut pending = self.pending_saves.lock().await;
        if pending.contains(&neuron_id) && !self.is_closed() {
            return true;
        }

        let queued = self.submit(PersistenceRequest::Save(neuron_id));
        if queued {
            pending.insert(neuron_id);
        }
        queued
    }

    pub fn delete(&self, neuron: NeuronTree) -> bool {
        self.submit(PersistenceRequest::Delete(neuron))
    }

    /// Wait until everything queued so far has reached the port
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.submit(PersistenceRequest::Flush(tx)) {
            let _ = rx.await;
        }
    }

    /// Drain the queue and stop the worker
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.submit(PersistenceRequest::Shutdown(tx)) {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.request_tx.is_closed()
    }

    fn submit(&self, request: PersistenceRequest) -> bool {
        match self.request_tx.send(request) {
            Ok(()) => true,
            Err(mpsc::error::SendError(request)) => {
                tracing::warn!("Persistence worker has shut down, dropping {:?}", request);
                false
            }
        }
    }
}

/// Background task that forwards queued requests to the port
pub struct PersistenceWorker {
    port: Arc<dyn NeuronPort>,
    neurons: Arc<NeuronCollection>,
    event_tx: broadcast::Sender<DomainEvent>,
    request_rx: mpsc::UnboundedReceiver<PersistenceRequest>,
    pending_saves: Arc<Mutex<HashSet<Id>>>,
}

impl PersistenceWorker {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn(
        port: Arc<dyn NeuronPort>,
        neurons: Arc<NeuronCollection>,
        event_tx: broadcast::Sender<DomainEvent>,
    ) -> PersistenceHandle {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let pending_saves = Arc::new(Mutex::new(HashSet::new()));
        let worker = Self {
            port,
            neurons,
            event_tx,
            request_rx,
            pending_saves: pending_saves.clone(),
        };
        tokio::spawn(worker.run());
        PersistenceHandle {
            request_tx,
            pending_saves,
        }
    }

    async fn run(mut self) {
        tracing::debug!("Persistence worker started");

        while let Some(request) = self.request_rx.recv().await {
            match request {
                PersistenceRequest::Shutdown(ack) => {
                    self.request_rx.close();
                    // Requests that raced in before close still get handled
                    while let Ok(request) = self.request_rx.try_recv() {
                        self.handle(request).await;
                    }
                    let _ = ack.send(());
                    break;
                }
                request => self.handle(request).await,
            }
        }

        tracing::debug!("Persistence worker stopped");
    }

    async fn handle(&self, request: PersistenceRequest) {
        match request {
            PersistenceRequest::Create(creation) => self.create(creation).await,
            PersistenceRequest::Save(neuron_id) => self.save(neuron_id).await,
            PersistenceRequest::Delete(neuron) => {
                let neuron_id = neuron.id();
                let result = self.port.delete_neuron(neuron).await;
                self.report(neuron_id, PersistenceOperation::Delete, result);
            }
            PersistenceRequest::Flush(ack) | PersistenceRequest::Shutdown(ack) => {
                let _ = ack.send(());
            }
        }
    }

    async fn save(&self, neuron_id: Id) {
        // Edits landing after this point queue a fresh save
        self.pending_saves.lock().await.remove(&neuron_id);

        let Some(handle) = self.neurons.get(neuron_id).await else {
            tracing::debug!("Neuron {} left the working set before its save", neuron_id);
            return;
        };
        let snapshot = handle.read().await.clone();
        let result = self.port.save_neuron(snapshot).await;
        self.report(neuron_id, PersistenceOperation::Save, result);
    }

    async fn create(&self, creation: PendingCreation) {
        let PendingCreation { neuron, completion } = creation;
        let result = self.port.create_neuron(neuron.clone()).await;
        let created = result.is_ok();
        self.report(neuron.id(), PersistenceOperation::Create, result);

        if created {
            if let Some(completion) = completion {
                completion(&neuron);
            }
        }
    }

    fn report(&self, neuron_id: Id, operation: PersistenceOperation, result: anyhow::Result<()>) {
        match result {
            Ok(()) => {
                tracing::debug!("Persisted {} of neuron {}", operation.as_str(), neuron_id);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to {} neuron {}: {}",
                    operation.as_str(),
                    neuron_id,
                    e
                );
                let _ = self.event_tx.send(DomainEvent::PersistenceFailed {
                    neuron_id,
                    operation,
                    message: e.to_string(),
                });
            }
        }
    }
}
