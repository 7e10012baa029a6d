//! Block-based identifier allocation
//!
//! Fetching ids one at a time from a remote, time-based generator would add
//! a round trip per annotation while a user sketches thousands of points.
//! [`IdSource`] instead pulls `block_size` ids at once and hands them out
//! locally, refilling synchronously when the block is used up.
//!
//! Unused ids in a block are abandoned when the process exits. The id space
//! is time-based and effectively unbounded, so nothing is persisted.

use crate::config::DEFAULT_ID_BLOCK_SIZE;
use crate::db::IdGenerator;
use crate::models::Id;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdSourceError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

/// Infinite, never-repeating stream of ids
///
/// Implements [`Iterator`]; `next()` always returns `Some`.
pub struct IdSource {
    generator: Arc<dyn IdGenerator>,
    block: Vec<Id>,
    cursor: usize,
    block_size: usize,
    refills: u64,
    last_issued: Option<Id>,
}

impl IdSource {
    pub fn new(generator: Arc<dyn IdGenerator>) -> Self {
        Self::with_block_size(generator, DEFAULT_ID_BLOCK_SIZE)
    }

    /// A `block_size` of 0 is treated as 1.
    pub fn with_block_size(generator: Arc<dyn IdGenerator>, block_size: usize) -> Self {
        Self {
            generator,
            block: Vec::new(),
            cursor: 0,
            block_size: block_size.max(1),
            refills: 0,
            last_issued: None,
        }
    }

    /// Next unused id, refilling the block first if it is exhausted
    pub fn next_id(&mut self) -> Id {
        while self.cursor == self.block.len() {
            self.refill();
        }
        let id = self.block[self.cursor];
        self.cursor += 1;
        self.last_issued = Some(id);
        id
    }

    /// Ids cannot be handed back.
    pub fn remove(&mut self) -> Result<(), IdSourceError> {
        Err(IdSourceError::UnsupportedOperation(
            "ids cannot be removed from an IdSource",
        ))
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Ids left before the next refill
    pub fn remaining_in_block(&self) -> usize {
        self.block.len() - self.cursor
    }

    /// Number of times the external generator has been called
    pub fn refill_count(&self) -> u64 {
        self.refills
    }

    fn refill(&mut self) {
        let block = self.generator.generate_ids(self.block_size);
        self.refills += 1;

        if block.len() != self.block_size {
            tracing::warn!(
                "Id generator returned {} ids, expected {}",
                block.len(),
                self.block_size
            );
        }
        if let (Some(last), Some(first)) = (self.last_issued, block.first()) {
            if *first <= last {
                tracing::warn!(
                    "Id generator went backwards: block starts at {} after {}",
                    first,
                    last
                );
            }
        }

        tracing::debug!("Fetched id block #{} ({} ids)", self.refills, block.len());
        self.block = block;
        self.cursor = 0;
    }
}

impl Iterator for IdSource {
    type Item = Id;

    fn next(&mut self) -> Option<Id> {
        Some(self.next_id())
    }
}
