//! Budget-constrained pruning
//!
//! Strategies define the budget, the engine partitions scored messages and
//! summarizes the admitted pool, and the undo buffer keeps the most recent
//! operations recoverable.

pub mod engine;
pub mod strategy;
pub mod undo;

pub use engine::{is_summarizable, PruneMetrics, PruneResult, PruningEngine};
pub use strategy::{recommend_strategy, PruningStrategy};
pub use undo::{UndoBuffer, UndoRecord, DEFAULT_UNDO_CAPACITY};
