//! Anchored paths
//!
//! An anchored path is the voxel polyline generated between two neighbouring
//! nodes. Paths refer to their endpoint nodes by id only, so relocating a
//! subtree between neurons is a plain map transfer.

use super::{Id, ModelError};
use serde::{Deserialize, Serialize};

/// Unordered pair of node ids, stored lesser id first
///
/// Equality and hashing do not depend on the order the ids were given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredPathEndpoints {
    first: Id,
    second: Id,
}

impl AnchoredPathEndpoints {
    pub fn new(a: Id, b: Id) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    pub fn first(&self) -> Id {
        self.first
    }

    pub fn second(&self) -> Id {
        self.second
    }

    pub fn contains(&self, id: Id) -> bool {
        self.first == id || self.second == id
    }
}

/// Voxel path between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredPath {
    id: Id,
    endpoints: AnchoredPathEndpoints,
    points: Vec<[i32; 3]>,
}

impl AnchoredPath {
    /// Build a path from raw point lists.
    ///
    /// Every point must have exactly three coordinates.
    pub fn new(
        id: Id,
        endpoints: AnchoredPathEndpoints,
        points: Vec<Vec<i32>>,
    ) -> Result<Self, ModelError> {
        let points = points
            .into_iter()
            .enumerate()
            .map(|(index, point)| {
                <[i32; 3]>::try_from(point.as_slice()).map_err(|_| {
                    ModelError::InvalidPointDimension {
                        index,
                        dimension: point.len(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_points(id, endpoints, points))
    }

    pub fn from_points(id: Id, endpoints: AnchoredPathEndpoints, points: Vec<[i32; 3]>) -> Self {
        Self {
            id,
            endpoints,
            points,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn endpoints(&self) -> AnchoredPathEndpoints {
        self.endpoints
    }

    pub fn points(&self) -> &[[i32; 3]] {
        &self.points
    }
}
