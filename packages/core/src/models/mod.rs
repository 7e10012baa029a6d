//! Data Models
//!
//! This module contains the data structures of a neuron reconstruction:
//!
//! - `Id` - Shared identifier space for neurons and annotations
//! - `GeoAnnotation` - A traced 3-D point with radius and tree links
//! - `AnchoredPath` - Voxel polyline between two neighbouring points
//! - `StructuredTextAnnotation` - Free-form text attached to a point
//! - `NeuronTree` - The per-neuron container that owns all of the above
//!
//! Annotations refer to each other by id only. The owning `NeuronTree` is
//! the single place a node lives, so moving a subtree between neurons is a
//! transfer between two maps.

mod anchored_path;
mod error;
mod geo_annotation;
mod id;
mod neuron;
mod structured_text;

pub use anchored_path::{AnchoredPath, AnchoredPathEndpoints};
pub use error::ModelError;
pub use geo_annotation::{GeoAnnotation, DEFAULT_RADIUS};
pub use id::Id;
pub use neuron::{InvariantViolation, NeuronMetadata, NeuronTree};
pub use structured_text::{StructuredTextAnnotation, STRUCTURED_TEXT_FORMAT_VERSION};
