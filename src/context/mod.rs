//! Conversation model, token estimation, summarization and the optimizer
//! façade that ties scoring and pruning together.

pub mod manager;
pub mod models;
pub mod summarizer;
pub mod token_estimator;

pub use manager::{AnalysisReport, ContextOptimizer, ExternalContext};
pub use models::{
    CodeFragment, ConversationContext, ImportanceScore, Message, MessageMetadata, MessageRole,
    MessageType, ScoreBreakdown, Summary, SummaryLevel,
};
pub use summarizer::{HierarchicalSummarizer, Summarizer, SummarizerConfig};
pub use token_estimator::{TiktokenEstimator, TokenEstimator, WordBasedEstimator};
