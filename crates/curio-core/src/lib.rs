//! # curio-core
//!
//! Core types, traits, and abstractions for the curio enrichment pipeline.
//!
//! This crate provides the domain model (cards, stage status, retry
//! policies) and the collaborator trait definitions that the other curio
//! crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod memory;
pub mod models;
pub mod retry;
pub mod stage;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use memory::{InMemoryCardStore, InstantScheduler, TokioScheduler};
pub use models::*;
pub use retry::RetryPolicy;
pub use stage::{Stage, StageRecord, StageState, StageStatus};
pub use traits::*;
