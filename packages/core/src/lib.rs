//! TmNeuron Core - In-memory editing engine for traced neuron skeletons
//!
//! This crate holds the working set of neuron reconstructions for an
//! editing session and applies structural edits to them, while a pluggable
//! port persists changes and arbitrates ownership between collaborators.
//!
//! # Architecture
//!
//! - **Local-first**: edits apply to in-memory trees immediately; persistence
//!   is queued on a background worker and never awaited by an edit
//! - **Per-neuron locking**: each neuron sits behind its own lock, so edits to
//!   different neurons run concurrently
//! - **Ids by block**: node and neuron ids come from pre-fetched blocks of a
//!   time-based generator
//!
//! # Modules
//!
//! - [`models`] - Neurons, nodes, anchored paths and text annotations
//! - [`operations`] - Pure structural algorithms (reparent, reroot, split, move)
//! - [`services`] - `TreeEditor` and the services it coordinates
//! - [`db`] - Persistence/arbitration port, id generation and domain events
//! - [`config`] - Editor configuration
//! - [`telemetry`] - Tracing subscriber setup

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, EditorConfig, LoggingConfig};
pub use db::{DomainEvent, IdGenerator, InMemoryNeuronPort, NeuronPort, TimeBasedIdGenerator};
pub use models::*;
pub use operations::{EditError, MovedSubtree};
pub use services::*;
