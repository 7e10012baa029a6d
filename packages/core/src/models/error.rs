use super::Id;
use thiserror::Error;

/// Construction-time validation failures for model types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Path point {index} has {dimension} coordinates, expected 3")]
    InvalidPointDimension { index: usize, dimension: usize },

    #[error("Node {node_id} has a non-finite coordinate")]
    NonFiniteLocation { node_id: Id },

    #[error("Node {node_id} has invalid radius {radius}")]
    InvalidRadius { node_id: Id, radius: f64 },
}
