//! Importance scoring pipeline
//!
//! Lexical (BM25) and vector similarity feed the coherence analyzer and the
//! importance scorer. Redundancy is measured separately and consumed by the
//! analysis report and strategy recommendation.

pub mod bm25;
pub mod coherence;
pub mod importance;
pub mod profile;
pub mod redundancy;
pub mod text;
pub mod vector;

pub use bm25::{Bm25Index, Bm25Params};
pub use coherence::{CoherenceAnalyzer, CoherenceConfig, CoherenceMetrics};
pub use importance::{ImportanceConfig, ImportanceScorer, ScoringCorpus};
pub use profile::{recommend_profile, HybridWeights, ScoringProfile, ScoringWeights};
pub use redundancy::{analyze_redundancy, RedundancyReport};
pub use vector::{TermVector, VectorScorer};
