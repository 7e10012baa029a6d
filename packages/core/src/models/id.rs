//! Annotation identifiers
//!
//! Neurons, nodes, anchored paths and structured text annotations all draw
//! their identifiers from the same id space, handed out by
//! [`IdSource`](crate::services::IdSource).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique, time-derived identifier.
///
/// Serialized transparently as a bare integer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id(pub i64);

impl Id {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Id> for i64 {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
