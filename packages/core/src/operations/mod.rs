//! Neuron Edit Operations
//!
//! Synchronous algorithms that reshape a neuron's node graph and manage its
//! path and text annotations. They operate on `&mut NeuronTree` and know
//! nothing about locking, id allocation or persistence; the
//! [`TreeEditor`](crate::services::TreeEditor) orchestrates those around them.

pub mod annotations;
mod error;
pub mod structure;

pub use error::EditError;
pub use structure::MovedSubtree;
