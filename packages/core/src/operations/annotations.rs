//! Anchored path and structured text edits

use super::structure::require_node;
use super::EditError;
use crate::models::{AnchoredPath, AnchoredPathEndpoints, Id, NeuronTree, StructuredTextAnnotation};

/// Store a path between two existing nodes, replacing any previous path for
/// the same (unordered) pair.
pub fn add_anchored_path(
    tree: &mut NeuronTree,
    path_id: Id,
    id1: Id,
    id2: Id,
    points: Vec<Vec<i32>>,
) -> Result<AnchoredPath, EditError> {
    for endpoint in [id1, id2] {
        if !tree.contains_node(endpoint) {
            return Err(EditError::invalid_reference(format!(
                "anchored path endpoint {} is not in neuron {}",
                endpoint,
                tree.id()
            )));
        }
    }

    let path = AnchoredPath::new(path_id, AnchoredPathEndpoints::new(id1, id2), points)?;
    if let Some(previous) = tree.insert_path(path.clone()) {
        tracing::debug!(
            "Replaced anchored path {} between {} and {}",
            previous.id(),
            id1,
            id2
        );
    }
    Ok(path)
}

pub fn remove_anchored_path(tree: &mut NeuronTree, id1: Id, id2: Id) -> Option<AnchoredPath> {
    tree.remove_path(&AnchoredPathEndpoints::new(id1, id2))
}

/// Attach text to a node, or to the neuron itself when `node_id` is the
/// neuron's id. Fails if the node already carries text.
pub fn add_structured_text(
    tree: &mut NeuronTree,
    text_id: Id,
    node_id: Id,
    data: impl Into<String>,
) -> Result<StructuredTextAnnotation, EditError> {
    if node_id != tree.id() {
        require_node(tree, node_id)?;
    }
    if tree.text(node_id).is_some() {
        return Err(EditError::duplicate_annotation(tree.id(), node_id));
    }

    let text = StructuredTextAnnotation::new(text_id, node_id, data);
    tree.insert_text(text.clone());
    Ok(text)
}

/// Replace the text of an existing annotation; `None` when there is none.
pub fn update_structured_text(
    tree: &mut NeuronTree,
    node_id: Id,
    data: impl Into<String>,
) -> Option<StructuredTextAnnotation> {
    let text = tree.text_mut(node_id)?;
    text.set_data(data);
    Some(text.clone())
}

pub fn delete_structured_text(tree: &mut NeuronTree, node_id: Id) -> Option<StructuredTextAnnotation> {
    tree.remove_text(node_id)
}
