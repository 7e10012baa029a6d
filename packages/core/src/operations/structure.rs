//! Structural edits over neuron trees
//!
//! Pure, synchronous algorithms over `&mut NeuronTree`. Each function either
//! validates everything it needs before touching the tree or makes no change
//! at all, so a returned error always means "nothing happened". Functions
//! that can be absorbed as no-ops return `Ok(false)` in that case.
//!
//! Locking is the caller's concern; [`TreeEditor`](crate::services::TreeEditor)
//! holds the neuron's write lock for the duration of each call.

use super::EditError;
use crate::models::{AnchoredPathEndpoints, GeoAnnotation, Id, NeuronTree};
use std::collections::HashSet;

/// Fail with `IllegalState` when only the neuron's metadata is known.
pub fn ensure_loaded(tree: &NeuronTree) -> Result<(), EditError> {
    if tree.is_loaded() {
        Ok(())
    } else {
        Err(EditError::illegal_state(format!(
            "neuron {} has not been loaded",
            tree.id()
        )))
    }
}

pub fn require_node(tree: &NeuronTree, node_id: Id) -> Result<(), EditError> {
    if tree.contains_node(node_id) {
        Ok(())
    } else {
        Err(EditError::node_not_found(tree.id(), node_id))
    }
}

/// All node ids in the subtree rooted at `root`, in pre-order.
///
/// Iterative so that very deep neurites cannot overflow the stack. Child ids
/// missing from the node map are skipped.
pub fn subtree_ids(tree: &NeuronTree, root: Id) -> Vec<Id> {
    let mut result = Vec::new();
    if !tree.contains_node(root) {
        return result;
    }

    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        result.push(id);
        // Reverse so children come out in their stored order
        stack.extend(node.child_ids().iter().rev().copied());
    }
    result
}

/// Walk parent links from `node_id` up to its root.
pub fn find_root(tree: &NeuronTree, node_id: Id) -> Result<Id, EditError> {
    let chain = parent_chain(tree, node_id)?;
    Ok(chain.last().copied().unwrap_or(node_id))
}

/// `node_id` followed by each ancestor, ending at the root
fn parent_chain(tree: &NeuronTree, node_id: Id) -> Result<Vec<Id>, EditError> {
    require_node(tree, node_id)?;

    let mut chain = vec![node_id];
    let mut current = node_id;
    loop {
        let node = tree
            .node(current)
            .ok_or_else(|| EditError::node_not_found(tree.id(), current))?;
        if node.is_root() {
            return Ok(chain);
        }
        current = node.parent_id();
        if !tree.contains_node(current) {
            return Err(EditError::illegal_state(format!(
                "node {} in neuron {} has dangling parent {}",
                node.id(),
                tree.id(),
                current
            )));
        }
        if chain.len() > tree.node_count() {
            return Err(EditError::illegal_state(format!(
                "parent links of neuron {} contain a cycle",
                tree.id()
            )));
        }
        chain.push(current);
    }
}

/// Insert a new node and link it under its parent.
///
/// A node whose parent is the neuron itself becomes a root. A node may not
/// share the neuron's id, since its children would then read as roots.
pub fn attach_node(tree: &mut NeuronTree, node: GeoAnnotation) -> Result<(), EditError> {
    let node_id = node.id();
    let parent_id = node.parent_id();

    if node_id == tree.id() {
        return Err(EditError::invalid_reference(format!(
            "node id {} collides with its neuron's id",
            node_id
        )));
    }

    if tree.contains_node(node_id) {
        return Err(EditError::illegal_state(format!(
            "node {} already exists in neuron {}",
            node_id,
            tree.id()
        )));
    }
    if parent_id != tree.id() {
        require_node(tree, parent_id)?;
    }

    tree.insert_node(node);
    if parent_id == tree.id() {
        tree.add_root(node_id);
    } else if let Some(parent) = tree.node_mut(parent_id) {
        parent.add_child(node_id);
    }
    Ok(())
}

/// Attach `node_id` under `new_parent_id`.
///
/// Passing the neuron's own id as the new parent turns the node into a root.
/// Requests that would create a cycle are ignored.
pub fn reparent(tree: &mut NeuronTree, node_id: Id, new_parent_id: Id) -> Result<bool, EditError> {
    require_node(tree, node_id)?;
    let neuron_id = tree.id();
    if new_parent_id != neuron_id {
        require_node(tree, new_parent_id)?;
    }

    let old_parent_id = tree
        .node(node_id)
        .map(|n| n.parent_id())
        .ok_or_else(|| EditError::node_not_found(neuron_id, node_id))?;
    if old_parent_id == new_parent_id {
        return Ok(false);
    }

    if new_parent_id != neuron_id && subtree_ids(tree, node_id).contains(&new_parent_id) {
        tracing::debug!(
            "Ignoring reparent of {} under its descendant {} in neuron {}",
            node_id,
            new_parent_id,
            neuron_id
        );
        return Ok(false);
    }

    detach_from_parent(tree, node_id, old_parent_id);

    if let Some(node) = tree.node_mut(node_id) {
        node.set_parent_id(new_parent_id);
    }
    if new_parent_id == neuron_id {
        tree.add_root(node_id);
    } else if let Some(parent) = tree.node_mut(new_parent_id) {
        parent.add_child(node_id);
    }
    Ok(true)
}

/// Make `new_root` the root of its neurite by inverting the parent chain
/// between it and the current root. O(depth).
pub fn reroot(tree: &mut NeuronTree, new_root: Id) -> Result<bool, EditError> {
    let chain = parent_chain(tree, new_root)?;
    if chain.len() == 1 {
        return Ok(false);
    }

    let neuron_id = tree.id();
    let old_root = chain[chain.len() - 1];

    for pair in chain.windows(2) {
        let (child, parent) = (pair[0], pair[1]);
        if let Some(p) = tree.node_mut(parent) {
            p.remove_child(child);
            p.set_parent_id(child);
        }
        if let Some(c) = tree.node_mut(child) {
            c.add_child(parent);
        }
    }

    if let Some(node) = tree.node_mut(new_root) {
        node.set_parent_id(neuron_id);
    }
    tree.remove_root(old_root);
    tree.add_root(new_root);
    Ok(true)
}

/// Promote `new_root` to an extra root of the same neuron. Its subtree goes
/// with it; no node below it is touched.
pub fn split(tree: &mut NeuronTree, new_root: Id) -> Result<bool, EditError> {
    require_node(tree, new_root)?;
    let neuron_id = tree.id();

    let parent_id = tree
        .node(new_root)
        .map(|n| n.parent_id())
        .ok_or_else(|| EditError::node_not_found(neuron_id, new_root))?;
    if parent_id == neuron_id {
        return Ok(false);
    }

    if let Some(parent) = tree.node_mut(parent_id) {
        parent.remove_child(new_root);
    }
    if let Some(node) = tree.node_mut(new_root) {
        node.set_parent_id(neuron_id);
    }
    tree.add_root(new_root);
    Ok(true)
}

/// Outcome of [`move_subtree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedSubtree {
    pub root_id: Id,
    pub node_ids: Vec<Id>,
    pub paths_moved: usize,
    pub texts_moved: usize,
}

/// Relocate the whole neurite containing `node_id` from `source` to `dest`.
///
/// The neurite's root becomes a root of `dest`. Paths with both endpoints in
/// the neurite and text attached to its nodes travel along; paths that would
/// straddle the two neurons are dropped.
pub fn move_subtree(
    source: &mut NeuronTree,
    dest: &mut NeuronTree,
    node_id: Id,
) -> Result<Option<MovedSubtree>, EditError> {
    if source.id() == dest.id() {
        return Ok(None);
    }
    ensure_loaded(source)?;
    ensure_loaded(dest)?;

    let root_id = find_root(source, node_id)?;
    let node_ids = subtree_ids(source, root_id);
    let moved: HashSet<Id> = node_ids.iter().copied().collect();

    source.remove_root(root_id);
    for id in &node_ids {
        if let Some(node) = source.remove_node(*id) {
            dest.insert_node(node);
        }
    }
    let dest_id = dest.id();
    if let Some(root) = dest.node_mut(root_id) {
        root.set_parent_id(dest_id);
    }
    dest.add_root(root_id);

    let touching: Vec<AnchoredPathEndpoints> = source
        .paths()
        .map(|p| p.endpoints())
        .filter(|e| moved.contains(&e.first()) || moved.contains(&e.second()))
        .collect();
    let mut paths_moved = 0;
    for endpoints in touching {
        let Some(path) = source.remove_path(&endpoints) else {
            continue;
        };
        if moved.contains(&endpoints.first()) && moved.contains(&endpoints.second()) {
            dest.insert_path(path);
            paths_moved += 1;
        } else {
            tracing::debug!(
                "Dropping anchored path {} that would straddle neurons {} and {}",
                path.id(),
                source.id(),
                dest.id()
            );
        }
    }

    let mut texts_moved = 0;
    for id in &node_ids {
        if let Some(text) = source.remove_text(*id) {
            dest.insert_text(text);
            texts_moved += 1;
        }
    }

    Ok(Some(MovedSubtree {
        root_id,
        node_ids,
        paths_moved,
        texts_moved,
    }))
}

/// Join the neurite holding `source_node` onto `target_node` within one
/// neuron: reroot at `source_node`, then hang it under `target_node`.
///
/// Ignored when both nodes already share a neurite.
pub fn merge_neurite(tree: &mut NeuronTree, source_node: Id, target_node: Id) -> Result<bool, EditError> {
    ensure_loaded(tree)?;
    require_node(tree, target_node)?;
    if find_root(tree, source_node)? == find_root(tree, target_node)? {
        tracing::debug!(
            "Ignoring merge of {} onto {}: same neurite in neuron {}",
            source_node,
            target_node,
            tree.id()
        );
        return Ok(false);
    }

    reroot(tree, source_node)?;
    reparent(tree, source_node, target_node)
}

/// Move the neurite holding `source_node` from `source` into `dest` and
/// join it onto `target_node` there.
pub fn merge_neurite_into(
    source: &mut NeuronTree,
    dest: &mut NeuronTree,
    source_node: Id,
    target_node: Id,
) -> Result<Option<MovedSubtree>, EditError> {
    ensure_loaded(source)?;
    ensure_loaded(dest)?;
    require_node(source, source_node)?;
    require_node(dest, target_node)?;

    let moved = move_subtree(source, dest, source_node)?;
    reroot(dest, source_node)?;
    reparent(dest, source_node, target_node)?;
    Ok(moved)
}

/// Remove a single node. Its children are reattached to its parent, or
/// become roots when the removed node was a root.
pub fn delete_link(tree: &mut NeuronTree, node_id: Id) -> Result<GeoAnnotation, EditError> {
    require_node(tree, node_id)?;
    let neuron_id = tree.id();

    let (parent_id, children) = tree
        .node(node_id)
        .map(|n| (n.parent_id(), n.child_ids().to_vec()))
        .ok_or_else(|| EditError::node_not_found(neuron_id, node_id))?;

    detach_from_parent(tree, node_id, parent_id);
    for child in &children {
        if let Some(c) = tree.node_mut(*child) {
            c.set_parent_id(parent_id);
        }
        if parent_id == neuron_id {
            tree.add_root(*child);
        } else if let Some(parent) = tree.node_mut(parent_id) {
            parent.add_child(*child);
        }
    }

    remove_annotations_for(tree, &HashSet::from([node_id]));
    tree.remove_node(node_id)
        .ok_or_else(|| EditError::node_not_found(neuron_id, node_id))
}

/// Remove `node_id` and every node below it.
pub fn delete_subtree(tree: &mut NeuronTree, node_id: Id) -> Result<Vec<GeoAnnotation>, EditError> {
    require_node(tree, node_id)?;
    let parent_id = tree
        .node(node_id)
        .map(|n| n.parent_id())
        .ok_or_else(|| EditError::node_not_found(tree.id(), node_id))?;

    let ids = subtree_ids(tree, node_id);
    detach_from_parent(tree, node_id, parent_id);
    remove_annotations_for(tree, &ids.iter().copied().collect());

    Ok(ids.into_iter().filter_map(|id| tree.remove_node(id)).collect())
}

/// Unlink `node_id` from its parent's child list, or from the root list.
fn detach_from_parent(tree: &mut NeuronTree, node_id: Id, parent_id: Id) {
    if parent_id == tree.id() {
        tree.remove_root(node_id);
    } else if let Some(parent) = tree.node_mut(parent_id) {
        parent.remove_child(node_id);
    }
}

fn remove_annotations_for(tree: &mut NeuronTree, ids: &HashSet<Id>) {
    let paths: Vec<AnchoredPathEndpoints> = tree
        .paths()
        .map(|p| p.endpoints())
        .filter(|e| ids.contains(&e.first()) || ids.contains(&e.second()))
        .collect();
    for endpoints in paths {
        tree.remove_path(&endpoints);
    }
    for id in ids {
        tree.remove_text(*id);
    }
}

#[cfg(test)]
#[path = "structure_test.rs"]
mod structure_test;
