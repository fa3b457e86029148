//! Budget-constrained conversation pruning
//!
//! Scores every message of a conversation for importance, decides which to
//! keep verbatim, which to replace with hierarchical summaries and which to
//! drop, and keeps the last few decisions recoverable.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pruning;
pub mod scoring;

pub use crate::config::Config;
pub use context::{
    AnalysisReport, CodeFragment, ContextOptimizer, ConversationContext, ExternalContext,
    HierarchicalSummarizer, ImportanceScore, Message, MessageRole, MessageType, Summarizer,
    Summary, SummaryLevel, TiktokenEstimator, TokenEstimator, WordBasedEstimator,
};
pub use error::{ContextError, Result};
pub use pruning::{PruneMetrics, PruneResult, PruningEngine, PruningStrategy, UndoRecord};
pub use scoring::{ImportanceScorer, ScoringProfile};
