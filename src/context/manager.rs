//! Context optimizer
//!
//! Entry point for callers: analysis, scoring, pruning, summarization and
//! undo over a conversation snapshot. Holds the active scoring profile,
//! which can be swapped between calls, and the pruning engine whose undo
//! history spans operations.

use super::models::{ConversationContext, Message, Summary, SummaryLevel};
use super::summarizer::{HierarchicalSummarizer, Summarizer, SummarizerConfig};
use super::token_estimator::{TokenEstimator, WordBasedEstimator};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::pruning::{recommend_strategy, PruneResult, PruningEngine, PruningStrategy, UndoBuffer, UndoRecord};
use crate::scoring::{analyze_redundancy, recommend_profile, ImportanceConfig, ImportanceScorer, RedundancyReport, ScoringProfile};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Instant;
use tracing::{debug, info};

/// Token totals and suggestions from outside the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalContext {
    /// Extra tokens per source (system instructions, tool output history...)
    pub token_sources: IndexMap<String, usize>,
    /// Passed through to the report unchanged
    pub suggestions: Vec<String>,
}

impl ExternalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(mut self, source: impl Into<String>, tokens: usize) -> Self {
        *self.token_sources.entry(source.into()).or_insert(0) += tokens;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn extra_tokens(&self) -> usize {
        self.token_sources.values().sum()
    }
}

/// Result of analyzing a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub message_count: usize,
    pub conversation_tokens: usize,
    pub extra_tokens: IndexMap<String, usize>,
    /// Conversation plus external tokens
    pub total_tokens: usize,
    pub average_importance: f64,
    pub redundancy: RedundancyReport,
    pub recommended_strategy: String,
    pub recommended_profile: String,
    /// Share of conversation tokens the recommended strategy would cut
    pub estimated_reduction_percent: f64,
    pub suggestions: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Conversation optimizer
pub struct ContextOptimizer {
    profile: RwLock<ScoringProfile>,
    scorer: ImportanceScorer,
    engine: PruningEngine,
    summarizer: Arc<HierarchicalSummarizer>,
    estimator: Arc<dyn TokenEstimator>,
    default_strategy: PruningStrategy,
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::new(
            ScoringProfile::default(),
            ImportanceConfig::default(),
            Arc::new(WordBasedEstimator::default()),
            PruningStrategy::default(),
            SummaryLevel::Session,
            UndoBuffer::default(),
        )
    }
}

impl ContextOptimizer {
    pub fn new(
        profile: ScoringProfile,
        importance: ImportanceConfig,
        estimator: Arc<dyn TokenEstimator>,
        default_strategy: PruningStrategy,
        summary_level: SummaryLevel,
        undo: UndoBuffer,
    ) -> Self {
        let summarizer = Arc::new(HierarchicalSummarizer::new(
            estimator.clone(),
            SummarizerConfig::default(),
        ));
        let engine = PruningEngine::new(summarizer.clone(), summary_level, undo);

        Self {
            profile: RwLock::new(profile),
            scorer: ImportanceScorer::new(importance),
            engine,
            summarizer,
            estimator,
            default_strategy,
        }
    }

    /// Build an optimizer from loaded configuration
    pub fn from_config(config: &Config, estimator: Arc<dyn TokenEstimator>) -> Result<Self> {
        config.validate()?;
        info!(
            "Context optimizer using profile '{}' and strategy '{}'",
            config.scoring.profile, config.pruning.strategy
        );
        Ok(Self::new(
            config.scoring_profile()?,
            config.importance_config(),
            estimator,
            config.strategy()?,
            config.pruning.summary_level,
            UndoBuffer::new(config.pruning.undo_capacity),
        ))
    }

    fn read_profile(&self) -> RwLockReadGuard<'_, ScoringProfile> {
        self.profile.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Active scoring profile
    pub fn profile(&self) -> ScoringProfile {
        self.read_profile().clone()
    }

    /// Swap the active profile; later scoring calls use it
    pub fn set_profile(&self, profile: ScoringProfile) {
        debug!("Switching scoring profile to '{}'", profile.name);
        *self.profile.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = profile;
    }

    pub fn set_profile_by_name(&self, name: &str) -> Result<()> {
        self.set_profile(ScoringProfile::by_name(name)?);
        Ok(())
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    pub fn default_strategy(&self) -> &PruningStrategy {
        &self.default_strategy
    }

    /// Score every message, returning annotated copies in conversation order
    pub fn score(&self, context: &ConversationContext, now: DateTime<Utc>) -> Vec<Message> {
        let started = Instant::now();
        let scored = {
            let profile = self.read_profile();
            self.scorer.score_context(context, &profile, now)
        };
        METRICS.record_scoring(scored.len(), started.elapsed().as_secs_f64());
        scored
    }

    /// Analyze a conversation and recommend a strategy
    pub fn analyze(
        &self,
        context: &ConversationContext,
        external: &ExternalContext,
        now: DateTime<Utc>,
    ) -> AnalysisReport {
        let scored = self.score(context, now);
        let average_importance = if scored.is_empty() {
            0.0
        } else {
            scored.iter().map(Message::importance_total).sum::<f64>() / scored.len() as f64
        };

        let redundancy = analyze_redundancy(&context.messages);
        let total_tokens = context.total_tokens + external.extra_tokens();
        let strategy = recommend_strategy(total_tokens, redundancy.overall, average_importance);
        let estimated_reduction_percent = PruningStrategy::by_name(strategy)
            .map(|s| estimate_reduction(context.total_tokens, s.max_tokens))
            .unwrap_or(0.0);

        info!(
            "Analyzed {} messages ({} tokens, {} with external context): recommending '{}'",
            context.len(),
            context.total_tokens,
            total_tokens,
            strategy
        );

        AnalysisReport {
            message_count: context.len(),
            conversation_tokens: context.total_tokens,
            extra_tokens: external.token_sources.clone(),
            total_tokens,
            average_importance,
            redundancy,
            recommended_strategy: strategy.to_string(),
            recommended_profile: recommend_profile(&context.messages).to_string(),
            estimated_reduction_percent,
            suggestions: external.suggestions.clone(),
            analyzed_at: now,
        }
    }

    /// Score and prune, using the configured strategy when none is given
    pub fn prune(
        &self,
        context: &ConversationContext,
        strategy: Option<&PruningStrategy>,
        now: DateTime<Utc>,
    ) -> Result<PruneResult> {
        let strategy = strategy.unwrap_or(&self.default_strategy);
        let scored = self.score(context, now);
        crate::time_operation!(
            METRICS.operation_duration,
            "prune",
            self.engine.prune(&scored, strategy)
        )
    }

    /// Summarize messages at the requested level
    pub fn summarize(&self, messages: &[Message], level: SummaryLevel) -> Vec<Summary> {
        let summaries = self.summarizer.summarize(messages, level);
        METRICS.record_summaries(level.as_str(), summaries.len());
        summaries
    }

    /// Invalidate the undo record of an operation
    pub fn undo(&self, operation_id: &str) -> bool {
        self.engine.undo(operation_id)
    }

    pub fn undo_record(&self, operation_id: &str) -> Option<UndoRecord> {
        self.engine.undo_record(operation_id)
    }

    /// Consume the undo record of an operation for reconstruction
    pub fn take_undo_record(&self, operation_id: &str) -> Option<UndoRecord> {
        self.engine.take_undo_record(operation_id)
    }

    pub fn undo_history(&self) -> Vec<String> {
        self.engine.undo_history()
    }
}

/// Share of `tokens` above `max_tokens`, as a percentage
fn estimate_reduction(tokens: usize, max_tokens: usize) -> f64 {
    if tokens == 0 || tokens <= max_tokens {
        return 0.0;
    }
    (tokens - max_tokens) as f64 / tokens as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::{MessageRole, MessageType};
    use chrono::Duration;

    fn conversation(now: DateTime<Utc>) -> ConversationContext {
        let messages = vec![
            Message::new("m1", MessageRole::User, MessageType::Query, "Fix the parser error in lexer.rs")
                .with_timestamp(now - Duration::minutes(10))
                .with_files(["src/lexer.rs"])
                .with_tokens(12),
            Message::new("m2", MessageRole::Assistant, MessageType::CodeChange, "Updated function next_token in src/lexer.rs")
                .with_timestamp(now - Duration::minutes(8))
                .with_files(["src/lexer.rs"])
                .with_tokens(40),
            Message::new("m3", MessageRole::Assistant, MessageType::Success, "All tests pass, see m2")
                .with_timestamp(now - Duration::minutes(5))
                .with_tokens(8),
        ];
        ConversationContext::new(messages).with_active_files(["src/lexer.rs"])
    }

    #[test]
    fn test_empty_analysis() {
        let optimizer = ContextOptimizer::default();
        let report = optimizer.analyze(
            &ConversationContext::new(Vec::new()),
            &ExternalContext::default(),
            Utc::now(),
        );
        assert_eq!(report.message_count, 0);
        assert_eq!(report.conversation_tokens, 0);
        assert_eq!(report.total_tokens, 0);
        assert_eq!(report.average_importance, 0.0);
        assert_eq!(report.estimated_reduction_percent, 0.0);
        assert_eq!(report.recommended_profile, "default");
    }

    #[test]
    fn test_external_tokens_inflate_total() {
        let now = Utc::now();
        let optimizer = ContextOptimizer::default();
        let external = ExternalContext::new()
            .with_tokens("system_instructions", 120_000)
            .with_tokens("tool_results", 40_000)
            .with_suggestion("Trim the tool output history");

        let report = optimizer.analyze(&conversation(now), &external, now);
        assert_eq!(report.conversation_tokens, 60);
        assert_eq!(report.total_tokens, 160_060);
        assert_eq!(report.recommended_strategy, "aggressive");
        assert_eq!(report.suggestions, vec!["Trim the tool output history"]);
        assert_eq!(report.extra_tokens["tool_results"], 40_000);
        // Conversation itself fits any strategy
        assert_eq!(report.estimated_reduction_percent, 0.0);
    }

    #[test]
    fn test_score_annotates_in_order() {
        let now = Utc::now();
        let optimizer = ContextOptimizer::default();
        let scored = optimizer.score(&conversation(now), now);
        let ids: Vec<&str> = scored.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert!(scored.iter().all(|m| m.importance.is_some()));
    }

    #[test]
    fn test_profile_swap() {
        let optimizer = ContextOptimizer::default();
        optimizer.set_profile_by_name("refactoring").unwrap();
        assert_eq!(optimizer.profile().name, "refactoring");
        assert!(optimizer.set_profile_by_name("unknown").is_err());
        assert_eq!(optimizer.profile().name, "refactoring");
    }

    #[test]
    fn test_prune_and_undo() {
        let now = Utc::now();
        let optimizer = ContextOptimizer::default();
        let strategy = PruningStrategy::balanced().with_max_tokens(45);

        let result = optimizer.prune(&conversation(now), Some(&strategy), now).unwrap();
        let total = result.preserved.len() + result.summarized.len() + result.removed.len();
        assert_eq!(total, 3);
        assert!(result.preserved.iter().any(|m| m.id == "m2"));

        assert_eq!(optimizer.undo_history(), vec![result.operation_id.clone()]);
        let record = optimizer.take_undo_record(&result.operation_id).unwrap();
        assert_eq!(record.original_order, vec!["m1", "m2", "m3"]);
        assert!(!optimizer.undo(&result.operation_id));
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_toml_str(
            "[scoring]\nprofile = \"debugging\"\n[pruning]\nstrategy = \"conservative\"\nundo_capacity = 1",
        )
        .unwrap();
        let optimizer = ContextOptimizer::from_config(&config, Arc::new(WordBasedEstimator::default())).unwrap();
        assert_eq!(optimizer.profile().name, "debugging");
        assert_eq!(optimizer.default_strategy().name, "conservative");
    }

    #[test]
    fn test_estimate_reduction() {
        assert_eq!(estimate_reduction(0, 100), 0.0);
        assert_eq!(estimate_reduction(100, 100), 0.0);
        assert_eq!(estimate_reduction(200, 50), 75.0);
    }
}
