//! Free-form text attached to a node (or to the neuron itself)

use super::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current layout version of `data`
pub const STRUCTURED_TEXT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredTextAnnotation {
    id: Id,

    /// Node the text is attached to (weak reference by id)
    parent_id: Id,

    format_version: u32,
    data: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl StructuredTextAnnotation {
    pub fn new(id: Id, parent_id: Id, data: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            parent_id,
            format_version: STRUCTURED_TEXT_FORMAT_VERSION,
            data: data.into(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn parent_id(&self) -> Id {
        self.parent_id
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
        self.modified_at = Utc::now();
    }
}
