//! Tree Editor - Entry point for every neuron edit
//!
//! Owns the working set of neurons and applies structural edits to it. Each
//! edit:
//!
//! 1. Takes the addressed neuron's write lock (both locks, in ascending id
//!    order, for edits spanning two neurons) and checks that the locked tree
//!    is still the one registered in the working set
//! 2. Runs one of the pure algorithms in [`crate::operations`]
//! 3. Queues a save of every changed neuron on the persistence worker while
//!    still holding the lock, so saves reach the port in edit order
//! 4. Releases the lock and broadcasts a [`DomainEvent`]
//!
//! Edits never wait for the port. The one exception is ownership
//! negotiation, which suspends the caller until the arbitration service
//! answers or the configured timeout passes.

use crate::config::{ConfigError, EditorConfig};
use crate::db::{DomainEvent, IdGenerator, NeuronPort};
use crate::models::{
    AnchoredPath, GeoAnnotation, Id, NeuronMetadata, NeuronTree, StructuredTextAnnotation,
};
use crate::operations::{annotations, structure, EditError, MovedSubtree};
use crate::services::id_source::IdSource;
use crate::services::neuron_collection::{NeuronCollection, SharedNeuron};
use crate::services::ownership::{OwnershipBroker, OwnershipRequestKind};
use crate::services::persistence_worker::{PendingCreation, PersistenceHandle, PersistenceWorker};
use crate::services::tag_index::TagIndex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedRwLockWriteGuard};

/// Editing session over the neurons of one or more workspaces
pub struct TreeEditor {
    port: Arc<dyn NeuronPort>,
    config: EditorConfig,
    ids: Mutex<IdSource>,
    neurons: Arc<NeuronCollection>,
    tags: TagIndex,
    ownership: OwnershipBroker,
    persistence: PersistenceHandle,

    /// Broadcast channel for domain events
    event_tx: broadcast::Sender<DomainEvent>,
}

impl TreeEditor {
    /// Create an editor and start its persistence worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        port: Arc<dyn NeuronPort>,
        generator: Arc<dyn IdGenerator>,
        config: EditorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let neurons = Arc::new(NeuronCollection::new());
        let persistence = PersistenceWorker::spawn(port.clone(), neurons.clone(), event_tx.clone());

        tracing::debug!(
            "TreeEditor initialized for client {} (id block size {})",
            config.client_id,
            config.id_block_size
        );

        Ok(Self {
            ids: Mutex::new(IdSource::with_block_size(generator, config.id_block_size)),
            tags: TagIndex::new(config.predefined_tags.iter().cloned()),
            neurons,
            ownership: OwnershipBroker::new(),
            persistence,
            event_tx,
            port,
            config,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn neurons(&self) -> &NeuronCollection {
        &self.neurons
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    /// Subscribe to domain events
    ///
    /// Receivers lagging more than `event_channel_capacity` events behind
    /// miss the oldest ones.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Allocate a fresh id from the shared block
    pub async fn next_id(&self) -> Id {
        self.ids.lock().await.next_id()
    }

    // =========================================================================
    // Neurons
    // =========================================================================

    /// Add every neuron stored for `workspace_id` to the working set,
    /// replacing local copies with the same id.
    ///
    /// Returns the number of neurons loaded.
    pub async fn load_workspace(&self, workspace_id: Id) -> Result<usize, EditError> {
        let neurons = self
            .port
            .load_neurons(workspace_id)
            .await
            .map_err(|e| EditError::port_failure(e.to_string()))?;

        let count = neurons.len();
        for mut tree in neurons {
            tree.initialize();
            let violations = tree.validate();
            if !violations.is_empty() {
                tracing::warn!(
                    "Neuron {} loaded with {} invariant violations: {:?}",
                    tree.id(),
                    violations.len(),
                    violations
                );
            }
            self.tags.set_tags(tree.id(), &tree.metadata().tags).await;
            self.neurons.insert(tree).await;
        }

        tracing::info!("Loaded {} neurons from workspace {}", count, workspace_id);
        Ok(count)
    }

    /// Create an empty neuron and queue it for creation through the port.
    pub async fn create_neuron(&self, workspace_id: Id, name: impl Into<String>) -> NeuronTree {
        let tree = self.new_neuron(workspace_id, name).await;
        self.register_created(PendingCreation::new(tree.clone())).await;
        tree
    }

    /// Like [`create_neuron`](Self::create_neuron), running `completion` once
    /// the port has acknowledged the creation.
    pub async fn create_neuron_with_completion<F>(
        &self,
        workspace_id: Id,
        name: impl Into<String>,
        completion: F,
    ) -> NeuronTree
    where
        F: FnOnce(&NeuronTree) + Send + 'static,
    {
        let tree = self.new_neuron(workspace_id, name).await;
        self.register_created(PendingCreation::with_completion(tree.clone(), completion))
            .await;
        tree
    }

    async fn new_neuron(&self, workspace_id: Id, name: impl Into<String>) -> NeuronTree {
        let mut metadata = NeuronMetadata::new(self.next_id().await, workspace_id, name);
        metadata.owner_key = self.config.user_key.clone();
        NeuronTree::new(metadata)
    }

    async fn register_created(&self, creation: PendingCreation) {
        let neuron_id = creation.neuron.id();
        let tree = creation.neuron.clone();
        // Queued before the neuron is visible, so its saves follow the create
        self.persistence.create(creation);
        self.neurons.insert(tree).await;

        tracing::info!("Created neuron {}", neuron_id);
        self.emit_event(DomainEvent::NeuronCreated { neuron_id });
    }

    /// Remove a neuron locally and queue its deletion.
    ///
    /// Deleting a neuron that is already gone is logged and ignored; returns
    /// whether anything was removed.
    pub async fn delete_neuron(&self, neuron_id: Id) -> bool {
        match self.remove_local(neuron_id).await {
            Some(tree) => {
                self.persistence.delete(tree);
                true
            }
            None => false,
        }
    }

    async fn remove_local(&self, neuron_id: Id) -> Option<NeuronTree> {
        let Some(handle) = self.neurons.remove(neuron_id).await else {
            tracing::info!("Neuron {} already removed, nothing to delete", neuron_id);
            return None;
        };

        let tree = handle.read().await.clone();
        self.tags.clear_tags(neuron_id).await;
        if self.ownership.cancel(neuron_id).await > 0 {
            tracing::debug!("Cancelled ownership request for deleted neuron {}", neuron_id);
        }

        tracing::info!("Deleted neuron {}", neuron_id);
        self.emit_event(DomainEvent::NeuronDeleted { neuron_id });
        Some(tree)
    }

    /// Snapshot of a neuron's current state
    pub async fn neuron(&self, neuron_id: Id) -> Option<NeuronTree> {
        self.neurons.snapshot(neuron_id).await
    }

    pub async fn neuron_ids(&self) -> Vec<Id> {
        self.neurons.ids().await
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Add a node under `parent_id`, or as a new root when `parent_id` is the
    /// neuron's own id.
    pub async fn add_node(
        &self,
        neuron_id: Id,
        parent_id: Id,
        x: f64,
        y: f64,
        z: f64,
    ) -> Result<GeoAnnotation, EditError> {
        let node_id = self.next_id().await;
        let node = self
            .edit_neuron(neuron_id, |tree| {
                structure::ensure_loaded(tree)?;
                let node = GeoAnnotation::new(node_id, parent_id, tree.id(), x, y, z)?;
                structure::attach_node(tree, node)?;
                let stored = tree
                    .node(node_id)
                    .cloned()
                    .ok_or_else(|| EditError::node_not_found(tree.id(), node_id))?;
                Ok((stored, true))
            })
            .await?;

        self.emit_event(DomainEvent::NodeCreated { neuron_id, node_id });
        Ok(node)
    }

    pub async fn update_node_location(
        &self,
        neuron_id: Id,
        node_id: Id,
        x: f64,
        y: f64,
        z: f64,
    ) -> Result<GeoAnnotation, EditError> {
        self.edit_node(neuron_id, node_id, |node| node.set_location(x, y, z))
            .await
    }

    pub async fn update_node_radius(
        &self,
        neuron_id: Id,
        node_id: Id,
        radius: f64,
    ) -> Result<GeoAnnotation, EditError> {
        self.edit_node(neuron_id, node_id, |node| node.set_radius(radius))
            .await
    }

    /// Attach a free-form note to a node, or clear it with `None`
    pub async fn set_node_comment(
        &self,
        neuron_id: Id,
        node_id: Id,
        comment: Option<String>,
    ) -> Result<GeoAnnotation, EditError> {
        self.edit_node(neuron_id, node_id, |node| {
            node.set_comment(comment);
            Ok(())
        })
        .await
    }

    async fn edit_node<F>(&self, neuron_id: Id, node_id: Id, update: F) -> Result<GeoAnnotation, EditError>
    where
        F: FnOnce(&mut GeoAnnotation) -> Result<(), crate::models::ModelError>,
    {
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let node = tree
                .node_mut(node_id)
                .ok_or_else(|| EditError::node_not_found(neuron_id, node_id))?;
            update(node)?;
            Ok((node.clone(), true))
        })
        .await
    }

    /// Attach `node_id` under `new_parent_id`; cycle-creating requests are
    /// ignored and return `Ok(false)`.
    pub async fn reparent(&self, neuron_id: Id, node_id: Id, new_parent_id: Id) -> Result<bool, EditError> {
        self.edit_structure(neuron_id, |tree| structure::reparent(tree, node_id, new_parent_id))
            .await
    }

    pub async fn reroot(&self, neuron_id: Id, new_root: Id) -> Result<bool, EditError> {
        self.edit_structure(neuron_id, |tree| structure::reroot(tree, new_root))
            .await
    }

    pub async fn split(&self, neuron_id: Id, new_root: Id) -> Result<bool, EditError> {
        self.edit_structure(neuron_id, |tree| structure::split(tree, new_root))
            .await
    }

    /// Move the neurite containing `node_id` into another neuron.
    ///
    /// Returns `None` when both ids name the same neuron.
    pub async fn move_subtree(
        &self,
        source_neuron_id: Id,
        target_neuron_id: Id,
        node_id: Id,
    ) -> Result<Option<MovedSubtree>, EditError> {
        if source_neuron_id == target_neuron_id {
            self.shared(source_neuron_id).await?;
            return Ok(None);
        }

        let moved = self
            .edit_pair(source_neuron_id, target_neuron_id, |source, target| {
                structure::move_subtree(source, target, node_id)
            })
            .await?;

        if let Some(moved) = &moved {
            self.emit_moved(source_neuron_id, target_neuron_id, moved);
        }
        Ok(moved)
    }

    /// Join the neurite holding `source_node` onto `target_node`, moving it
    /// into the target neuron first when needed.
    ///
    /// Returns whether anything changed.
    pub async fn merge_neurite(
        &self,
        source_neuron_id: Id,
        source_node: Id,
        target_neuron_id: Id,
        target_node: Id,
    ) -> Result<bool, EditError> {
        if source_neuron_id == target_neuron_id {
            return self
                .edit_structure(source_neuron_id, |tree| {
                    structure::merge_neurite(tree, source_node, target_node)
                })
                .await;
        }

        let moved = self
            .edit_pair(source_neuron_id, target_neuron_id, |source, target| {
                structure::merge_neurite_into(source, target, source_node, target_node)
            })
            .await?;

        match moved {
            Some(moved) => {
                self.emit_moved(source_neuron_id, target_neuron_id, &moved);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove one node, reattaching its children to its parent.
    pub async fn delete_link(&self, neuron_id: Id, node_id: Id) -> Result<GeoAnnotation, EditError> {
        let removed = self
            .edit_neuron(neuron_id, |tree| {
                structure::ensure_loaded(tree)?;
                Ok((structure::delete_link(tree, node_id)?, true))
            })
            .await?;

        self.emit_event(DomainEvent::NodesDeleted {
            neuron_id,
            node_ids: vec![node_id],
        });
        Ok(removed)
    }

    /// Remove a node and everything below it; returns the removed ids.
    pub async fn delete_subtree(&self, neuron_id: Id, node_id: Id) -> Result<Vec<Id>, EditError> {
        let removed = self
            .edit_neuron(neuron_id, |tree| {
                structure::ensure_loaded(tree)?;
                let removed = structure::delete_subtree(tree, node_id)?;
                Ok((removed.iter().map(GeoAnnotation::id).collect::<Vec<_>>(), true))
            })
            .await?;

        self.emit_event(DomainEvent::NodesDeleted {
            neuron_id,
            node_ids: removed.clone(),
        });
        Ok(removed)
    }

    // =========================================================================
    // Annotations
    // =========================================================================

    pub async fn add_anchored_path(
        &self,
        neuron_id: Id,
        id1: Id,
        id2: Id,
        points: Vec<Vec<i32>>,
    ) -> Result<AnchoredPath, EditError> {
        let path_id = self.next_id().await;
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let path = annotations::add_anchored_path(tree, path_id, id1, id2, points)?;
            Ok((path, true))
        })
        .await
    }

    pub async fn remove_anchored_path(
        &self,
        neuron_id: Id,
        id1: Id,
        id2: Id,
    ) -> Result<Option<AnchoredPath>, EditError> {
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let removed = annotations::remove_anchored_path(tree, id1, id2);
            let changed = removed.is_some();
            Ok((removed, changed))
        })
        .await
    }

    /// Attach text to a node, or to the neuron when `node_id` is its id.
    pub async fn add_structured_text(
        &self,
        neuron_id: Id,
        node_id: Id,
        data: impl Into<String>,
    ) -> Result<StructuredTextAnnotation, EditError> {
        let text_id = self.next_id().await;
        let data = data.into();
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let text = annotations::add_structured_text(tree, text_id, node_id, data)?;
            Ok((text, true))
        })
        .await
    }

    pub async fn update_structured_text(
        &self,
        neuron_id: Id,
        node_id: Id,
        data: impl Into<String>,
    ) -> Result<Option<StructuredTextAnnotation>, EditError> {
        let data = data.into();
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let updated = annotations::update_structured_text(tree, node_id, data);
            let changed = updated.is_some();
            Ok((updated, changed))
        })
        .await
    }

    pub async fn delete_structured_text(
        &self,
        neuron_id: Id,
        node_id: Id,
    ) -> Result<Option<StructuredTextAnnotation>, EditError> {
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let removed = annotations::delete_structured_text(tree, node_id);
            let changed = removed.is_some();
            Ok((removed, changed))
        })
        .await
    }

    // =========================================================================
    // Metadata and tags
    // =========================================================================

    pub async fn rename_neuron(&self, neuron_id: Id, name: impl Into<String>) -> Result<(), EditError> {
        let name = name.into();
        self.edit_neuron(neuron_id, |tree| {
            let changed = tree.metadata().name != name;
            tree.metadata_mut().name = name;
            Ok(((), changed))
        })
        .await
    }

    pub async fn set_neuron_visibility(&self, neuron_id: Id, visible: bool) -> Result<(), EditError> {
        self.edit_neuron(neuron_id, |tree| {
            let changed = tree.metadata().visible != visible;
            tree.metadata_mut().visible = visible;
            Ok(((), changed))
        })
        .await
    }

    pub async fn set_neuron_color(&self, neuron_id: Id, color: Option<[f32; 3]>) -> Result<(), EditError> {
        self.edit_neuron(neuron_id, |tree| {
            let changed = tree.metadata().color != color;
            tree.metadata_mut().color = color;
            Ok(((), changed))
        })
        .await
    }

    /// Returns true if the neuron did not already carry the tag.
    pub async fn add_tag(&self, neuron_id: Id, tag: &str) -> Result<bool, EditError> {
        let added = {
            let mut tree = self.lock_current(neuron_id).await?;
            let added = tree.metadata_mut().tags.insert(tag.to_string());
            self.tags.add_tag(tag, neuron_id).await;
            if added {
                self.persistence.save(neuron_id).await;
            }
            added
        };

        if added {
            self.emit_event(DomainEvent::TagsChanged { neuron_id });
        }
        Ok(added)
    }

    /// Returns true if the neuron carried the tag.
    pub async fn remove_tag(&self, neuron_id: Id, tag: &str) -> Result<bool, EditError> {
        let removed = {
            let mut tree = self.lock_current(neuron_id).await?;
            let removed = tree.metadata_mut().tags.remove(tag);
            self.tags.remove_tag(tag, neuron_id).await;
            if removed {
                self.persistence.save(neuron_id).await;
            }
            removed
        };

        if removed {
            self.emit_event(DomainEvent::TagsChanged { neuron_id });
        }
        Ok(removed)
    }

    /// Drop every tag of a neuron, returning the tags it had
    pub async fn clear_tags(&self, neuron_id: Id) -> Result<BTreeSet<String>, EditError> {
        let cleared = {
            let mut tree = self.lock_current(neuron_id).await?;
            let cleared = std::mem::take(&mut tree.metadata_mut().tags);
            self.tags.clear_tags(neuron_id).await;
            if !cleared.is_empty() {
                self.persistence.save(neuron_id).await;
            }
            cleared
        };

        if !cleared.is_empty() {
            self.emit_event(DomainEvent::TagsChanged { neuron_id });
        }
        Ok(cleared)
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Ask the arbitration service for permission to edit a neuron.
    ///
    /// Suspends until [`resolve_ownership`](Self::resolve_ownership) is called
    /// for the neuron or the configured timeout passes.
    pub async fn request_ownership(&self, neuron_id: Id) -> Result<bool, EditError> {
        self.negotiate(neuron_id, OwnershipRequestKind::Ownership)
            .await
    }

    /// Ask the arbitration service to hand a neuron to `target_user`.
    pub async fn request_assignment(&self, neuron_id: Id, target_user: &str) -> Result<bool, EditError> {
        self.negotiate(
            neuron_id,
            OwnershipRequestKind::Assignment {
                target_user: target_user.to_string(),
            },
        )
        .await
    }

    async fn negotiate(&self, neuron_id: Id, kind: OwnershipRequestKind) -> Result<bool, EditError> {
        self.shared(neuron_id).await?;

        let registration = self.ownership.register(neuron_id, kind.clone()).await;
        if registration.is_new {
            let sent = match &kind {
                OwnershipRequestKind::Ownership => self.port.request_ownership(neuron_id).await,
                OwnershipRequestKind::Assignment { target_user } => {
                    self.port.request_assignment(neuron_id, target_user).await
                }
            };
            if let Err(e) = sent {
                tracing::warn!("Failed to send ownership request for neuron {}: {}", neuron_id, e);
                self.ownership.cancel(neuron_id).await;
                return Err(EditError::port_failure(e.to_string()));
            }
        }

        self.ownership
            .wait(neuron_id, registration.receiver, self.config.ownership_timeout)
            .await
    }

    /// Deliver the arbitration service's answer for a neuron.
    ///
    /// Returns how many waiting callers were woken. Answers for neurons with
    /// no outstanding request are logged and ignored.
    pub async fn resolve_ownership(&self, neuron_id: Id, granted: bool) -> usize {
        let Some(request) = self.ownership.take(neuron_id).await else {
            tracing::warn!(
                "Ownership answer for neuron {} with no outstanding request",
                neuron_id
            );
            return 0;
        };

        if granted {
            let owner = match request.kind() {
                OwnershipRequestKind::Ownership => self.config.user_key.clone(),
                OwnershipRequestKind::Assignment { target_user } => Some(target_user.clone()),
            };
            if let (Some(owner), Ok(mut tree)) = (owner, self.lock_current(neuron_id).await) {
                tree.metadata_mut().owner_key = Some(owner);
            }
        }

        let woken = request.answer(granted);
        self.emit_event(DomainEvent::OwnershipResolved { neuron_id, granted });
        woken
    }

    pub async fn has_pending_ownership(&self, neuron_id: Id) -> bool {
        self.ownership.is_pending(neuron_id).await
    }

    // =========================================================================
    // Remote notifications
    // =========================================================================

    /// Adopt a neuron changed by another client, without persisting it.
    pub async fn apply_remote_update(&self, mut tree: NeuronTree) {
        let neuron_id = tree.id();
        if tree.is_loaded() {
            tree.initialize();
            let violations = tree.validate();
            if !violations.is_empty() {
                tracing::warn!(
                    "Remote update for neuron {} has {} invariant violations: {:?}",
                    neuron_id,
                    violations.len(),
                    violations
                );
            }
        }

        self.tags.set_tags(neuron_id, &tree.metadata().tags).await;
        self.neurons.insert(tree).await;

        tracing::debug!("Applied remote update for neuron {}", neuron_id);
        self.emit_event(DomainEvent::RemoteUpdateApplied { neuron_id });
    }

    /// Drop a neuron deleted by another client. Tolerates neurons that are
    /// already gone.
    pub async fn apply_remote_delete(&self, neuron_id: Id) -> bool {
        self.remove_local(neuron_id).await.is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Wait until every queued persistence request has reached the port
    pub async fn flush(&self) {
        self.persistence.flush().await;
    }

    /// Drain the persistence queue and stop the worker. Later edits still
    /// apply locally but are no longer persisted.
    pub async fn shutdown(&self) {
        self.persistence.shutdown().await;
        tracing::debug!("TreeEditor for client {} shut down", self.config.client_id);
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn shared(&self, neuron_id: Id) -> Result<SharedNeuron, EditError> {
        self.neurons
            .get(neuron_id)
            .await
            .ok_or_else(|| EditError::neuron_not_found(neuron_id))
    }

    /// Write-lock the tree registered under `neuron_id`.
    ///
    /// A remote update or delete can swap the entry out while we wait for
    /// the lock. The wait is then repeated on the new entry, or ends in
    /// `NeuronNotFound` once the neuron is gone.
    async fn lock_current(&self, neuron_id: Id) -> Result<OwnedRwLockWriteGuard<NeuronTree>, EditError> {
        loop {
            let handle = self.shared(neuron_id).await?;
            let tree = handle.clone().write_owned().await;
            if self.neurons.is_current(neuron_id, &handle).await {
                return Ok(tree);
            }
            tracing::debug!("Neuron {} was replaced while waiting for its lock", neuron_id);
        }
    }

    /// Run `edit` under the neuron's write lock.
    ///
    /// `edit` returns its value and whether the neuron changed; a change
    /// queues a save and emits `NeuronUpdated`.
    async fn edit_neuron<T, F>(&self, neuron_id: Id, edit: F) -> Result<T, EditError>
    where
        F: FnOnce(&mut NeuronTree) -> Result<(T, bool), EditError>,
    {
        let (value, changed) = {
            let mut tree = self.lock_current(neuron_id).await?;
            let (value, changed) = edit(&mut tree)?;
            if changed {
                self.persistence.save(neuron_id).await;
            }
            (value, changed)
        };

        if changed {
            self.emit_event(DomainEvent::NeuronUpdated { neuron_id });
        }
        Ok(value)
    }

    /// `edit_neuron` for the structural algorithms that report a no-op as
    /// `Ok(false)`
    async fn edit_structure<F>(&self, neuron_id: Id, edit: F) -> Result<bool, EditError>
    where
        F: FnOnce(&mut NeuronTree) -> Result<bool, EditError>,
    {
        self.edit_neuron(neuron_id, |tree| {
            structure::ensure_loaded(tree)?;
            let changed = edit(tree)?;
            Ok((changed, changed))
        })
        .await
    }

    /// Run `edit` over two distinct neurons, locking them in ascending id
    /// order. A `Some` result queues saves for both.
    async fn edit_pair<F>(
        &self,
        source_id: Id,
        target_id: Id,
        edit: F,
    ) -> Result<Option<MovedSubtree>, EditError>
    where
        F: FnOnce(&mut NeuronTree, &mut NeuronTree) -> Result<Option<MovedSubtree>, EditError>,
    {
        let moved = {
            let (mut source_tree, mut target_tree) = self.lock_current_pair(source_id, target_id).await?;
            let moved = edit(&mut source_tree, &mut target_tree)?;
            if moved.is_some() {
                self.persistence.save(source_id).await;
                self.persistence.save(target_id).await;
            }
            moved
        };

        if moved.is_some() {
            self.emit_event(DomainEvent::NeuronUpdated {
                neuron_id: source_id,
            });
            self.emit_event(DomainEvent::NeuronUpdated {
                neuron_id: target_id,
            });
        }
        Ok(moved)
    }

    /// [`lock_current`](Self::lock_current) for two distinct neurons
    async fn lock_current_pair(
        &self,
        source_id: Id,
        target_id: Id,
    ) -> Result<(OwnedRwLockWriteGuard<NeuronTree>, OwnedRwLockWriteGuard<NeuronTree>), EditError> {
        loop {
            let source = self.shared(source_id).await?;
            let target = self.shared(target_id).await?;
            let trees = lock_pair(&source, &target, source_id < target_id).await;
            if self.neurons.is_current(source_id, &source).await
                && self.neurons.is_current(target_id, &target).await
            {
                return Ok(trees);
            }
            tracing::debug!(
                "Neuron {} or {} was replaced while waiting for its lock",
                source_id,
                target_id
            );
        }
    }

    fn emit_moved(&self, source_neuron_id: Id, target_neuron_id: Id, moved: &MovedSubtree) {
        tracing::debug!(
            "Moved {} nodes rooted at {} from neuron {} to {}",
            moved.node_ids.len(),
            moved.root_id,
            source_neuron_id,
            target_neuron_id
        );
        self.emit_event(DomainEvent::SubtreeMoved {
            source_neuron_id,
            target_neuron_id,
            root_id: moved.root_id,
            node_count: moved.node_ids.len(),
        });
    }
}

/// Write-lock two neurons, taking `first`'s lock before the other's when
/// `first_is_lower` holds.
async fn lock_pair(
    first: &SharedNeuron,
    second: &SharedNeuron,
    first_is_lower: bool,
) -> (OwnedRwLockWriteGuard<NeuronTree>, OwnedRwLockWriteGuard<NeuronTree>) {
    if first_is_lower {
        let a = first.clone().write_owned().await;
        let b = second.clone().write_owned().await;
        (a, b)
    } else {
        let b = second.clone().write_owned().await;
        let a = first.clone().write_owned().await;
        (a, b)
    }
}

#[cfg(test)]
#[path = "tree_editor_test.rs"]
mod tree_editor_test;
