//! Point annotations
//!
//! A [`GeoAnnotation`] is a single 3-D sample of a traced neurite. Nodes are
//! linked into a tree by `parent_id` / `child_ids`; a node whose parent is
//! the owning neuron itself is a root. Child ids are kept in ascending order,
//! which for time-derived ids is creation order.
//!
//! Only coordinate and radius changes bump `modified_at`. Connectivity edits
//! (reparent, reroot, split, move) and comment changes leave it untouched.

use super::{Id, ModelError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Radius assigned to nodes created without an explicit radius
pub const DEFAULT_RADIUS: f64 = 1.0;

/// A single traced point with radius, timestamps and tree links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoAnnotation {
    id: Id,

    /// Another node id, or the owning neuron's id for roots
    parent_id: Id,

    /// Derived after load, never persisted
    #[serde(skip)]
    neuron_id: Id,

    x: f64,
    y: f64,
    z: f64,
    radius: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,

    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,

    #[serde(default)]
    child_ids: Vec<Id>,
}

impl GeoAnnotation {
    /// Build a node at the given location with [`DEFAULT_RADIUS`].
    ///
    /// Rejects non-finite coordinates.
    pub fn new(
        id: Id,
        parent_id: Id,
        neuron_id: Id,
        x: f64,
        y: f64,
        z: f64,
    ) -> Result<Self, ModelError> {
        Self::with_radius(id, parent_id, neuron_id, [x, y, z], DEFAULT_RADIUS)
    }

    pub fn with_radius(
        id: Id,
        parent_id: Id,
        neuron_id: Id,
        location: [f64; 3],
        radius: f64,
    ) -> Result<Self, ModelError> {
        check_location(id, location)?;
        check_radius(id, radius)?;

        let now = Utc::now();
        Ok(Self {
            id,
            parent_id,
            neuron_id,
            x: location[0],
            y: location[1],
            z: location[2],
            radius,
            comment: None,
            created_at: now,
            modified_at: now,
            child_ids: Vec::new(),
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn parent_id(&self) -> Id {
        self.parent_id
    }

    pub fn neuron_id(&self) -> Id {
        self.neuron_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == self.neuron_id
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn location(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn child_ids(&self) -> &[Id] {
        &self.child_ids
    }

    /// Move the point. Bumps `modified_at`.
    pub fn set_location(&mut self, x: f64, y: f64, z: f64) -> Result<(), ModelError> {
        check_location(self.id, [x, y, z])?;
        self.x = x;
        self.y = y;
        self.z = z;
        self.touch();
        Ok(())
    }

    /// Change the radius. Bumps `modified_at`.
    pub fn set_radius(&mut self, radius: f64) -> Result<(), ModelError> {
        check_radius(self.id, radius)?;
        self.radius = radius;
        self.touch();
        Ok(())
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub(crate) fn set_parent_id(&mut self, parent_id: Id) {
        self.parent_id = parent_id;
    }

    pub(crate) fn set_neuron_id(&mut self, neuron_id: Id) {
        self.neuron_id = neuron_id;
    }

    /// Link a child, keeping `child_ids` in ascending id order. Duplicates
    /// are ignored.
    pub(crate) fn add_child(&mut self, child_id: Id) -> bool {
        if self.child_ids.contains(&child_id) {
            return false;
        }
        let index = self.child_ids.partition_point(|id| *id < child_id);
        self.child_ids.insert(index, child_id);
        true
    }

    pub(crate) fn remove_child(&mut self, child_id: Id) -> bool {
        match self.child_ids.iter().position(|id| *id == child_id) {
            Some(index) => {
                self.child_ids.remove(index);
                true
            }
            None => false,
        }
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

fn check_location(id: Id, location: [f64; 3]) -> Result<(), ModelError> {
    if location.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NonFiniteLocation { node_id: id })
    }
}

fn check_radius(id: Id, radius: f64) -> Result<(), ModelError> {
    if radius.is_finite() && radius >= 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidRadius {
            node_id: id,
            radius,
        })
    }
}
