//! Importance scoring
//!
//! Fuses recency, hybrid semantic relevance, inbound references, file
//! relevance and coherence into one total per message. Corpus statistics
//! (BM25 tables, term vectors, topic clusters, mention counts) are computed
//! once in [`ScoringCorpus::build`]; per-message scoring then runs in
//! parallel and only reads them.

use super::bm25::Bm25Index;
use super::coherence::{CoherenceAnalyzer, CoherenceConfig, CoherenceMetrics};
use super::profile::ScoringProfile;
use super::vector::VectorScorer;
use crate::context::models::{ConversationContext, ImportanceScore, Message, ScoreBreakdown};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::debug;

/// Importance scorer configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceConfig {
    /// Per-minute recency decay
    pub decay_factor: f64,
    /// Neighbours on each side used for lexical and contextual scoring
    pub context_window: usize,
    pub coherence: CoherenceConfig,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.95,
            context_window: 5,
            coherence: CoherenceConfig::default(),
        }
    }
}

/// Corpus-wide statistics shared by every message of one scoring pass
pub struct ScoringCorpus<'a> {
    messages: &'a [Message],
    positions: HashMap<&'a str, usize>,
    bm25: Bm25Index,
    vector: VectorScorer,
    coherence: CoherenceAnalyzer<'a>,
    active_files: &'a BTreeSet<String>,
    now: DateTime<Utc>,
}

impl<'a> ScoringCorpus<'a> {
    pub fn build(
        context: &'a ConversationContext,
        profile: &ScoringProfile,
        config: &ImportanceConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let messages = context.messages.as_slice();
        let positions = messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.as_str(), i))
            .collect();

        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        let bm25 = Bm25Index::build(&contents, profile.bm25);

        let vector = VectorScorer::with_keywords(&profile.domain_keywords);
        let vectors = messages.iter().map(|m| vector.vectorize(&m.content)).collect();
        let coherence = CoherenceAnalyzer::with_vectors(messages, vectors, config.coherence);

        Self {
            messages,
            positions,
            bm25,
            vector,
            coherence,
            active_files: &context.active_files,
            now,
        }
    }

    /// Position of a message in this corpus, matched by id and content
    pub fn locate(&self, message: &Message) -> Option<usize> {
        self.positions
            .get(message.id.as_str())
            .copied()
            .filter(|&i| self.messages[i].content == message.content)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn window(&self, index: usize, radius: usize) -> impl Iterator<Item = usize> {
        let start = index.saturating_sub(radius);
        let end = (index + radius).min(self.messages.len().saturating_sub(1));
        (start..=end).filter(move |&j| j != index)
    }
}

/// Importance scorer
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    config: ImportanceConfig,
}

impl ImportanceScorer {
    pub fn new(config: ImportanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImportanceConfig {
        &self.config
    }

    /// Score every message of a context, returning annotated copies in order
    pub fn score_context(
        &self,
        context: &ConversationContext,
        profile: &ScoringProfile,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        if context.is_empty() {
            return Vec::new();
        }

        let started = Instant::now();
        let corpus = ScoringCorpus::build(context, profile, &self.config, now);

        let scored: Vec<Message> = context
            .messages
            .par_iter()
            .map(|message| {
                let score = self.score_message(message, &corpus, profile);
                message.clone().with_importance(score)
            })
            .collect();

        debug!(
            "Scored {} messages with profile '{}' in {:?}",
            scored.len(),
            profile.name,
            started.elapsed()
        );
        scored
    }

    /// Score one message against a prepared corpus.
    ///
    /// A message that cannot be located in the corpus gets the legacy
    /// semantic score and neutral coherence instead of window-based values.
    pub fn score_message(
        &self,
        message: &Message,
        corpus: &ScoringCorpus<'_>,
        profile: &ScoringProfile,
    ) -> ImportanceScore {
        let recency = self.recency_score(message.timestamp, corpus.now);
        let file_relevance = file_relevance_score(message, corpus.active_files);

        let (semantic, references, coherence_metrics, breakdown) = match corpus.locate(message) {
            Some(index) => {
                let lexical = self.lexical_score(index, corpus, profile);
                let vector = self.vector_score(message, index, corpus, profile);
                let contextual = self.contextual_score(index, corpus);
                let hybrid = profile.hybrid;
                let semantic = (lexical * hybrid.lexical
                    + vector * hybrid.vector
                    + contextual * hybrid.contextual)
                    .min(1.0);

                let metrics = corpus.coherence.analyze(index);
                let breakdown = ScoreBreakdown {
                    lexical,
                    vector,
                    contextual,
                    thread_continuity: metrics.thread_continuity,
                    reference_chain: metrics.reference_chain,
                    information_density: metrics.information_density,
                };
                let references = reference_score(corpus.coherence.reference_count(index));
                (semantic, references, metrics, Some(breakdown))
            }
            None => {
                debug!("Message {} not found in scoring corpus, using fallback", message.id);
                (
                    legacy_semantic_score(message, profile),
                    0.0,
                    CoherenceMetrics::neutral(),
                    None,
                )
            }
        };

        let coherence = coherence_metrics.combined();
        let weights = profile.weights;
        let total = recency * weights.recency
            + semantic * weights.semantic
            + references * weights.references
            + file_relevance * weights.file_relevance
            + coherence * weights.coherence;

        ImportanceScore {
            total,
            recency,
            semantic,
            references,
            file_relevance,
            coherence,
            computed_at: corpus.now,
            breakdown,
        }
    }

    /// `decay_factor ^ age_in_minutes`; future timestamps count as age zero
    pub fn recency_score(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_ms = (now - timestamp).num_milliseconds().max(0) as f64;
        self.config.decay_factor.powf(age_ms / 60_000.0)
    }

    /// BM25 against profile keywords plus surrounding contents, relative to the self-score
    fn lexical_score(&self, index: usize, corpus: &ScoringCorpus<'_>, profile: &ScoringProfile) -> f64 {
        let mut query = profile.domain_keywords.join(" ");
        for j in corpus.window(index, self.config.context_window) {
            query.push(' ');
            query.push_str(&corpus.messages[j].content);
        }

        let raw = corpus.bm25.score(&query, index);
        let self_score = corpus.bm25.score(&corpus.messages[index].content, index);
        if self_score <= 0.0 {
            return 0.0;
        }
        (raw / self_score).min(1.0)
    }

    fn vector_score(
        &self,
        message: &Message,
        index: usize,
        corpus: &ScoringCorpus<'_>,
        profile: &ScoringProfile,
    ) -> f64 {
        let density = corpus
            .coherence
            .vector(index)
            .map(VectorScorer::density_of)
            .unwrap_or(0.0);
        let relevance = corpus
            .vector
            .domain_relevance(&message.content, &profile.domain_keywords);
        let type_weight = profile.type_weight(message.message_type);

        (density * 0.3 + relevance * 0.3 + type_weight * 0.3 + content_bonus(message) * 0.1).min(1.0)
    }

    fn contextual_score(&self, index: usize, corpus: &ScoringCorpus<'_>) -> f64 {
        let Some(target) = corpus.coherence.vector(index) else {
            return 0.5;
        };
        let sims: Vec<f64> = corpus
            .window(index, self.config.context_window)
            .filter_map(|j| corpus.coherence.vector(j))
            .map(|v| target.cosine(v))
            .collect();
        VectorScorer::contextual_from_similarities(&sims)
    }
}

/// `min(count * 0.1, 1.0)`
pub fn reference_score(reference_count: usize) -> f64 {
    (reference_count as f64 * 0.1).min(1.0)
}

/// Share of referenced files that are active; 0.5 with nothing active, 0.3 with no references
pub fn file_relevance_score(message: &Message, active_files: &BTreeSet<String>) -> f64 {
    if active_files.is_empty() {
        return 0.5;
    }
    let files = &message.metadata.files;
    if files.is_empty() {
        return 0.3;
    }
    let active = files.iter().filter(|f| active_files.contains(*f)).count();
    active as f64 / files.len() as f64
}

fn content_bonus(message: &Message) -> f64 {
    let mut bonus: f64 = 0.0;
    if message.has_code() {
        bonus += 0.5;
    }
    if message.metadata.has_error {
        bonus += 0.3;
    }
    if !message.metadata.tools.is_empty() {
        bonus += 0.2;
    }
    bonus.min(1.0)
}

/// Type weight, keyword hits and flat content bonuses
fn legacy_semantic_score(message: &Message, profile: &ScoringProfile) -> f64 {
    let lower = message.content.to_lowercase();
    let keyword_ratio = if profile.domain_keywords.is_empty() {
        0.0
    } else {
        let hits = profile
            .domain_keywords
            .iter()
            .filter(|k| lower.contains(&k.to_lowercase()))
            .count();
        hits as f64 / profile.domain_keywords.len() as f64
    };

    let mut score = profile.type_weight(message.message_type) * 0.5 + keyword_ratio * 0.3;
    if message.has_code() {
        score += 0.1;
    }
    if message.metadata.has_error {
        score += 0.1;
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::{CodeFragment, MessageRole, MessageType};
    use chrono::Duration;

    fn conversation(now: DateTime<Utc>) -> ConversationContext {
        let messages = vec![
            Message::new("m1", MessageRole::User, MessageType::Query, "The config parser fails on nested tables")
                .with_tokens(12)
                .with_timestamp(now - Duration::minutes(30)),
            Message::new(
                "m2",
                MessageRole::Assistant,
                MessageType::CodeChange,
                "Fixed the config parser in src/config.rs to handle nested tables",
            )
            .with_tokens(40)
            .with_files(["src/config.rs"])
            .with_code_fragment(CodeFragment::new("rust").with_file("src/config.rs"))
            .with_timestamp(now - Duration::minutes(20)),
            Message::new("m3", MessageRole::User, MessageType::Query, "Great, m2 works. Now run the tests")
                .with_tokens(10)
                .with_timestamp(now - Duration::minutes(10)),
            Message::new("m4", MessageRole::Assistant, MessageType::Success, "All tests pass")
                .with_tokens(5)
                .with_tools(["cargo"])
                .with_timestamp(now),
        ];
        ConversationContext::new(messages).with_active_files(["src/config.rs"])
    }

    #[test]
    fn test_recency_decreases_with_age() {
        let scorer = ImportanceScorer::default();
        let now = Utc::now();
        assert_eq!(scorer.recency_score(now, now), 1.0);

        let mut previous = 1.0;
        for minutes in [1, 5, 30, 120] {
            let score = scorer.recency_score(now - Duration::minutes(minutes), now);
            assert!(score < previous);
            previous = score;
        }
        assert!((scorer.recency_score(now - Duration::minutes(1), now) - 0.95).abs() < 1e-9);
        assert_eq!(scorer.recency_score(now + Duration::minutes(5), now), 1.0);
    }

    #[test]
    fn test_reference_score_caps() {
        let mut previous = 0.0;
        for count in 0..15 {
            let score = reference_score(count);
            assert!(score >= previous);
            previous = score;
        }
        assert_eq!(reference_score(10), 1.0);
        assert_eq!(reference_score(25), 1.0);
    }

    #[test]
    fn test_file_relevance_defaults() {
        let msg = Message::new("a", MessageRole::User, MessageType::Query, "x");
        let with_files = msg.clone().with_files(["a.rs", "b.rs"]);
        let none = BTreeSet::new();
        let active: BTreeSet<String> = ["a.rs".to_string()].into_iter().collect();

        assert_eq!(file_relevance_score(&with_files, &none), 0.5);
        assert_eq!(file_relevance_score(&msg, &active), 0.3);
        assert_eq!(file_relevance_score(&with_files, &active), 0.5);
    }

    #[test]
    fn test_score_context_annotates_in_order() {
        let now = Utc::now();
        let ctx = conversation(now);
        let scorer = ImportanceScorer::default();
        let profile = ScoringProfile::default();
        let scored = scorer.score_context(&ctx, &profile, now);

        assert_eq!(scored.len(), 4);
        for (original, scored) in ctx.messages.iter().zip(&scored) {
            assert_eq!(original.id, scored.id);
            let score = scored.importance.as_ref().unwrap();
            assert!(score.breakdown.is_some());
            for component in [score.recency, score.semantic, score.references, score.file_relevance, score.coherence] {
                assert!((0.0..=1.0).contains(&component));
            }
        }

        // m3 mentions m2
        let m2 = scored[1].importance.as_ref().unwrap();
        assert!((m2.references - 0.1).abs() < 1e-9);
        assert_eq!(m2.file_relevance, 1.0);
    }

    #[test]
    fn test_total_is_weighted_sum() {
        let now = Utc::now();
        let ctx = conversation(now);
        let profile = ScoringProfile::debugging();
        let scored = ImportanceScorer::default().score_context(&ctx, &profile, now);
        let w = profile.weights;
        for message in &scored {
            let s = message.importance.as_ref().unwrap();
            let expected = s.recency * w.recency
                + s.semantic * w.semantic
                + s.references * w.references
                + s.file_relevance * w.file_relevance
                + s.coherence * w.coherence;
            assert!((s.total - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_repeated_mentions_raise_references() {
        let now = Utc::now();
        let ctx = ConversationContext::new(vec![
            Message::new("m1", MessageRole::User, MessageType::Query, "cache keys collide").with_timestamp(now),
            Message::new("m2", MessageRole::User, MessageType::Query, "see m1, m1 and m1 again").with_timestamp(now),
        ]);
        let scored = ImportanceScorer::default().score_context(&ctx, &ScoringProfile::default(), now);
        let m1 = scored[0].importance.as_ref().unwrap();
        assert!((m1.references - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let now = Utc::now();
        let ctx = conversation(now);
        let scorer = ImportanceScorer::default();
        let profile = ScoringProfile::default();
        let a = scorer.score_context(&ctx, &profile, now);
        let b = scorer.score_context(&ctx, &profile, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unlocated_message_falls_back() {
        let now = Utc::now();
        let ctx = conversation(now);
        let scorer = ImportanceScorer::default();
        let profile = ScoringProfile::default();
        let corpus = ScoringCorpus::build(&ctx, &profile, scorer.config(), now);

        let stranger = Message::new("zz", MessageRole::User, MessageType::Error, "config error")
            .with_timestamp(now);
        assert!(corpus.locate(&stranger).is_none());

        let score = scorer.score_message(&stranger, &corpus, &profile);
        assert!(score.breakdown.is_none());
        assert_eq!(score.references, 0.0);
        assert!((score.coherence - 0.5).abs() < 1e-9);
        assert!(score.semantic > 0.0);
    }

    #[test]
    fn test_empty_context() {
        let ctx = ConversationContext::new(vec![]);
        let scored = ImportanceScorer::default().score_context(&ctx, &ScoringProfile::default(), Utc::now());
        assert!(scored.is_empty());
    }
}
