//! Neuron container
//!
//! [`NeuronTree`] exclusively owns every node of one neuron and enforces the
//! single-owner invariants over its maps:
//!
//! - every id reachable from `root_ids` through `child_ids` is in `node_map`
//!   exactly once
//! - every non-root node's parent is a key of `node_map`
//! - `node_map` holds no node unreachable from `root_ids`
//!
//! Graph algorithms (reparent, reroot, split, move) live in
//! [`operations::structure`](crate::operations::structure); this type only
//! exposes map-like accessors and root management.

use super::{AnchoredPath, AnchoredPathEndpoints, GeoAnnotation, Id, StructuredTextAnnotation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Neuron-level attributes carried alongside the node graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuronMetadata {
    pub id: Id,
    pub name: String,
    pub workspace_id: Id,

    /// Subject key of the collaborator currently allowed to edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,

    #[serde(default = "default_visible")]
    pub visible: bool,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    pub created_at: DateTime<Utc>,
}

fn default_visible() -> bool {
    true
}

impl NeuronMetadata {
    pub fn new(id: Id, workspace_id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            workspace_id,
            owner_key: None,
            color: None,
            visible: true,
            tags: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// A broken tree invariant found by [`NeuronTree::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("root {0} is not in the node map")]
    MissingRoot(Id),

    #[error("root {0} does not have the neuron as parent")]
    RootWithParent(Id),

    #[error("node {parent} lists missing child {child}")]
    MissingChild { parent: Id, child: Id },

    #[error("node {child} is listed by {listed_by} but has parent {actual}")]
    ParentMismatch { child: Id, listed_by: Id, actual: Id },

    #[error("node {0} is reachable more than once")]
    ReachedTwice(Id),

    #[error("node {0} is not reachable from any root")]
    Unreachable(Id),

    #[error("node {0} has the same id as its neuron")]
    NodeIdIsNeuronId(Id),

    #[error("node {node} is stamped with neuron {stamped}")]
    WrongNeuron { node: Id, stamped: Id },

    #[error("anchored path {path} references missing node {node}")]
    DanglingPath { path: Id, node: Id },

    #[error("structured text {text} references missing node {node}")]
    DanglingText { text: Id, node: Id },
}

/// Node graph of one neuron plus its path and text annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuronTree {
    metadata: NeuronMetadata,

    #[serde(default)]
    node_map: HashMap<Id, GeoAnnotation>,

    #[serde(default)]
    root_ids: Vec<Id>,

    #[serde(default, with = "path_list")]
    path_map: HashMap<AnchoredPathEndpoints, AnchoredPath>,

    #[serde(default)]
    text_map: HashMap<Id, StructuredTextAnnotation>,

    /// False while only the metadata is known
    #[serde(skip)]
    loaded: bool,
}

impl NeuronTree {
    /// Empty, fully loaded neuron
    pub fn new(metadata: NeuronMetadata) -> Self {
        Self {
            metadata,
            node_map: HashMap::new(),
            root_ids: Vec::new(),
            path_map: HashMap::new(),
            text_map: HashMap::new(),
            loaded: true,
        }
    }

    /// Neuron whose node data has not been fetched yet
    pub fn unloaded(metadata: NeuronMetadata) -> Self {
        Self {
            loaded: false,
            ..Self::new(metadata)
        }
    }

    pub fn id(&self) -> Id {
        self.metadata.id
    }

    pub fn metadata(&self) -> &NeuronMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut NeuronMetadata {
        &mut self.metadata
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    //
    // NODES
    //

    pub fn node(&self, id: Id) -> Option<&GeoAnnotation> {
        self.node_map.get(&id)
    }

    /// Mutable node access for value edits (location, radius, comment)
    pub fn node_mut(&mut self, id: Id) -> Option<&mut GeoAnnotation> {
        self.node_map.get_mut(&id)
    }

    pub fn contains_node(&self, id: Id) -> bool {
        self.node_map.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GeoAnnotation> {
        self.node_map.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.node_map.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.node_map.len()
    }

    /// Insert a node, stamping it with this neuron's id.
    ///
    /// Links are not touched; callers keep the tree invariants.
    pub fn insert_node(&mut self, mut node: GeoAnnotation) -> Option<GeoAnnotation> {
        node.set_neuron_id(self.id());
        self.node_map.insert(node.id(), node)
    }

    pub fn remove_node(&mut self, id: Id) -> Option<GeoAnnotation> {
        self.node_map.remove(&id)
    }

    //
    // ROOTS
    //

    /// Read-only view of the root list
    pub fn root_ids(&self) -> &[Id] {
        &self.root_ids
    }

    pub fn add_root(&mut self, id: Id) -> bool {
        if self.root_ids.contains(&id) {
            return false;
        }
        self.root_ids.push(id);
        true
    }

    pub fn remove_root(&mut self, id: Id) -> bool {
        match self.root_ids.iter().position(|root| *root == id) {
            Some(index) => {
                self.root_ids.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains_root(&self, id: Id) -> bool {
        self.root_ids.contains(&id)
    }

    pub fn count_roots(&self) -> usize {
        self.root_ids.len()
    }

    pub fn first_root(&self) -> Option<Id> {
        self.root_ids.first().copied()
    }

    //
    // ANCHORED PATHS
    //

    pub fn path(&self, endpoints: &AnchoredPathEndpoints) -> Option<&AnchoredPath> {
        self.path_map.get(endpoints)
    }

    pub fn paths(&self) -> impl Iterator<Item = &AnchoredPath> {
        self.path_map.values()
    }

    pub fn path_count(&self) -> usize {
        self.path_map.len()
    }

    pub fn insert_path(&mut self, path: AnchoredPath) -> Option<AnchoredPath> {
        self.path_map.insert(path.endpoints(), path)
    }

    pub fn remove_path(&mut self, endpoints: &AnchoredPathEndpoints) -> Option<AnchoredPath> {
        self.path_map.remove(endpoints)
    }

    //
    // STRUCTURED TEXT
    //

    pub fn text(&self, node_id: Id) -> Option<&StructuredTextAnnotation> {
        self.text_map.get(&node_id)
    }

    pub fn text_mut(&mut self, node_id: Id) -> Option<&mut StructuredTextAnnotation> {
        self.text_map.get_mut(&node_id)
    }

    pub fn texts(&self) -> impl Iterator<Item = &StructuredTextAnnotation> {
        self.text_map.values()
    }

    pub fn insert_text(&mut self, text: StructuredTextAnnotation) -> Option<StructuredTextAnnotation> {
        self.text_map.insert(text.parent_id(), text)
    }

    pub fn remove_text(&mut self, node_id: Id) -> Option<StructuredTextAnnotation> {
        self.text_map.remove(&node_id)
    }

    //
    // LOAD + VALIDATION
    //

    /// Prepare a freshly loaded neuron for editing.
    ///
    /// Re-stamps every node with this neuron's id, restores child links and
    /// root entries implied by `parent_id`, drops stale root entries, and
    /// marks the neuron loaded.
    pub fn initialize(&mut self) {
        let neuron_id = self.id();
        for node in self.node_map.values_mut() {
            node.set_neuron_id(neuron_id);
        }

        let mut ids: Vec<Id> = self.node_map.keys().copied().collect();
        ids.sort();

        for id in &ids {
            let parent_id = self.node_map[id].parent_id();
            if parent_id == neuron_id {
                self.add_root(*id);
            } else if let Some(parent) = self.node_map.get_mut(&parent_id) {
                parent.add_child(*id);
            }
        }

        let node_map = &self.node_map;
        self.root_ids
            .retain(|id| node_map.get(id).is_some_and(|n| n.parent_id() == neuron_id));

        self.loaded = true;
    }

    /// Check every tree invariant; empty means the neuron is consistent.
    pub fn validate(&self) -> Vec<InvariantViolation> {
        let neuron_id = self.id();
        let mut violations = Vec::new();
        let mut reached: HashSet<Id> = HashSet::with_capacity(self.node_map.len());
        let mut stack: Vec<Id> = Vec::new();

        for root in &self.root_ids {
            match self.node_map.get(root) {
                None => violations.push(InvariantViolation::MissingRoot(*root)),
                Some(node) => {
                    if node.parent_id() != neuron_id {
                        violations.push(InvariantViolation::RootWithParent(*root));
                    }
                    stack.push(*root);
                }
            }
        }

        while let Some(id) = stack.pop() {
            if !reached.insert(id) {
                violations.push(InvariantViolation::ReachedTwice(id));
                continue;
            }
            let node = &self.node_map[&id];
            for child in node.child_ids() {
                match self.node_map.get(child) {
                    None => violations.push(InvariantViolation::MissingChild {
                        parent: id,
                        child: *child,
                    }),
                    Some(c) => {
                        if c.parent_id() != id {
                            violations.push(InvariantViolation::ParentMismatch {
                                child: *child,
                                listed_by: id,
                                actual: c.parent_id(),
                            });
                        }
                        stack.push(*child);
                    }
                }
            }
        }

        if self.node_map.contains_key(&neuron_id) {
            violations.push(InvariantViolation::NodeIdIsNeuronId(neuron_id));
        }

        let mut ids: Vec<Id> = self.node_map.keys().copied().collect();
        ids.sort();
        for id in ids {
            let node = &self.node_map[&id];
            if !reached.contains(&id) {
                violations.push(InvariantViolation::Unreachable(id));
            }
            if node.neuron_id() != neuron_id {
                violations.push(InvariantViolation::WrongNeuron {
                    node: id,
                    stamped: node.neuron_id(),
                });
            }
        }

        for path in self.path_map.values() {
            let endpoints = path.endpoints();
            for node in [endpoints.first(), endpoints.second()] {
                if !self.node_map.contains_key(&node) {
                    violations.push(InvariantViolation::DanglingPath {
                        path: path.id(),
                        node,
                    });
                }
            }
        }

        for text in self.text_map.values() {
            let parent = text.parent_id();
            if parent != neuron_id && !self.node_map.contains_key(&parent) {
                violations.push(InvariantViolation::DanglingText {
                    text: text.id(),
                    node: parent,
                });
            }
        }

        violations
    }

    pub fn is_consistent(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Paths are keyed by a struct, which JSON objects cannot express; they are
/// written as a plain list and re-keyed on read.
mod path_list {
    use super::{AnchoredPath, AnchoredPathEndpoints};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S>(
        map: &HashMap<AnchoredPathEndpoints, AnchoredPath>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut paths: Vec<&AnchoredPath> = map.values().collect();
        paths.sort_by_key(|p| p.endpoints());
        serializer.collect_seq(paths)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<AnchoredPathEndpoints, AnchoredPath>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let paths = Vec::<AnchoredPath>::deserialize(deserializer)?;
        Ok(paths.into_iter().map(|p| (p.endpoints(), p)).collect())
    }
}
