//! External identifier generation
//!
//! [`IdSource`](crate::services::IdSource) pulls blocks of ids from an
//! [`IdGenerator`]. The only contract is that ids are globally unique and
//! increase monotonically.

use crate::models::Id;
use chrono::Utc;
use std::sync::Mutex;

/// Source of fresh, monotonically increasing, globally unique ids
pub trait IdGenerator: Send + Sync {
    /// Return exactly `count` new ids in increasing order
    fn generate_ids(&self, count: usize) -> Vec<Id>;
}

const SEQUENCE_BITS: u32 = 18;
const CONTEXT_BITS: u32 = 4;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// 2020-01-01T00:00:00Z; keeps `millis << 22` inside 63 bits until ~2089
const EPOCH_MILLIS: i64 = 1_577_836_800_000;

/// Time-based generator
///
/// Layout: `millis_since_2020 << 22 | deployment_context << 18 | sequence`. When the
/// sequence space of a millisecond runs out the logical clock advances by
/// one millisecond, so output stays strictly increasing within a process.
#[derive(Debug)]
pub struct TimeBasedIdGenerator {
    deployment_context: i64,
    state: Mutex<ClockState>,
}

#[derive(Debug, Default)]
struct ClockState {
    last_millis: i64,
    sequence: i64,
}

impl TimeBasedIdGenerator {
    /// `deployment_context` distinguishes concurrently running deployments;
    /// only its low 4 bits are used.
    pub fn new(deployment_context: u8) -> Self {
        Self {
            deployment_context: i64::from(deployment_context) & ((1 << CONTEXT_BITS) - 1),
            state: Mutex::new(ClockState::default()),
        }
    }
}

impl Default for TimeBasedIdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl IdGenerator for TimeBasedIdGenerator {
    fn generate_ids(&self, count: usize) -> Vec<Id> {
        let mut ids = Vec::with_capacity(count);
        // A poisoned lock still holds a valid clock; keep counting from it
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for _ in 0..count {
            let now = Utc::now().timestamp_millis() - EPOCH_MILLIS;
            if now > state.last_millis {
                state.last_millis = now;
                state.sequence = 0;
            } else if state.sequence == MAX_SEQUENCE {
                state.last_millis += 1;
                state.sequence = 0;
            } else {
                state.sequence += 1;
            }

            ids.push(Id(
                (state.last_millis << (SEQUENCE_BITS + CONTEXT_BITS))
                    | (self.deployment_context << SEQUENCE_BITS)
                    | state.sequence,
            ));
        }
        ids
    }
}
