//! Coherence analysis: how well a message fits the surrounding conversation
//!
//! Four independent sub-metrics per message:
//! - thread continuity (decayed similarity to a positional window)
//! - reference-chain strength (explicit mentions plus shared files/tools)
//! - information density (concept density, novelty, length, content bonuses)
//! - topic consistency (similarity to greedy topic-cluster centroids)
//!
//! Term vectors, the mention graph and the topic clusters are built once in
//! [`CoherenceAnalyzer::new`]; per-message analysis only reads them.

use super::vector::{TermVector, VectorScorer};
use crate::context::models::Message;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_\-]*").expect("valid identifier regex"));

/// Assumed maximum share of the conversation a message links to
const MAX_CONNECTION_RATE: f64 = 0.3;
const SHARED_FILE_WEIGHT: f64 = 1.0;
const SHARED_TOOL_WEIGHT: f64 = 0.3;

/// Coherence analysis parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoherenceConfig {
    /// Neighbours considered on each side for continuity
    pub window: usize,
    /// Minimum seed similarity to join a topic cluster
    pub cluster_threshold: f64,
    /// Key terms per member contributing to a centroid
    pub key_terms: usize,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            window: 5,
            cluster_threshold: 0.3,
            key_terms: 20,
        }
    }
}

/// Per-message coherence sub-metrics, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoherenceMetrics {
    pub thread_continuity: f64,
    pub reference_chain: f64,
    pub information_density: f64,
    pub topic_consistency: f64,
}

impl CoherenceMetrics {
    /// Neutral metrics used when a message cannot be placed in its corpus
    pub fn neutral() -> Self {
        Self {
            thread_continuity: 0.5,
            reference_chain: 0.5,
            information_density: 0.5,
            topic_consistency: 0.5,
        }
    }

    /// Weights: continuity (40%), references (30%), density (20%), topic (10%)
    pub fn combined(&self) -> f64 {
        self.thread_continuity * 0.4
            + self.reference_chain * 0.3
            + self.information_density * 0.2
            + self.topic_consistency * 0.1
    }
}

/// Group of topically similar messages
#[derive(Debug, Clone)]
pub struct TopicCluster {
    pub seed: usize,
    pub members: Vec<usize>,
    centroid: TermVector,
}

impl TopicCluster {
    pub fn centroid(&self) -> &TermVector {
        &self.centroid
    }
}

/// For every message, the indices of *other* messages whose id it mentions
pub fn mention_graph(messages: &[Message]) -> Vec<Vec<usize>> {
    let positions: HashMap<&str, usize> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let mentioned: BTreeSet<usize> = IDENTIFIER_RE
                .find_iter(&message.content)
                .filter_map(|token| positions.get(token.as_str()).copied())
                .filter(|&j| j != i)
                .collect();
            mentioned.into_iter().collect()
        })
        .collect()
}

/// Total mentions of each message's id across all other messages, repeats included
pub fn mention_counts(messages: &[Message]) -> Vec<usize> {
    let positions: HashMap<&str, usize> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    let mut counts = vec![0; messages.len()];
    for (i, message) in messages.iter().enumerate() {
        for token in IDENTIFIER_RE.find_iter(&message.content) {
            match positions.get(token.as_str()) {
                Some(&j) if j != i => counts[j] += 1,
                _ => {}
            }
        }
    }
    counts
}

/// Corpus-level coherence analyzer
pub struct CoherenceAnalyzer<'a> {
    messages: &'a [Message],
    vectors: Vec<TermVector>,
    mentions: Vec<Vec<usize>>,
    inbound: Vec<usize>,
    mention_totals: Vec<usize>,
    known_files: BTreeSet<&'a str>,
    clusters: Vec<TopicCluster>,
    config: CoherenceConfig,
}

impl<'a> CoherenceAnalyzer<'a> {
    /// Vectorize and analyze a message list
    pub fn new(messages: &'a [Message], scorer: &VectorScorer, config: CoherenceConfig) -> Self {
        let vectors = messages.iter().map(|m| scorer.vectorize(&m.content)).collect();
        Self::with_vectors(messages, vectors, config)
    }

    /// Build from term vectors already computed for `messages` (same order)
    pub fn with_vectors(
        messages: &'a [Message],
        vectors: Vec<TermVector>,
        config: CoherenceConfig,
    ) -> Self {
        let mentions = mention_graph(messages);
        let mut inbound = vec![0; messages.len()];
        for targets in &mentions {
            for &j in targets {
                inbound[j] += 1;
            }
        }

        let mention_totals = mention_counts(messages);

        let known_files = messages
            .iter()
            .flat_map(|m| m.metadata.files.iter().map(String::as_str))
            .collect();

        let clusters = build_clusters(&vectors, &config);

        Self {
            messages,
            vectors,
            mentions,
            inbound,
            mention_totals,
            known_files,
            clusters,
            config,
        }
    }

    pub fn clusters(&self) -> &[TopicCluster] {
        &self.clusters
    }

    pub fn vector(&self, index: usize) -> Option<&TermVector> {
        self.vectors.get(index)
    }

    /// How many other messages mention this message's id
    pub fn inbound_mentions(&self, index: usize) -> usize {
        self.inbound.get(index).copied().unwrap_or(0)
    }

    /// Every mention of this message's id elsewhere, repeats included
    pub fn reference_count(&self, index: usize) -> usize {
        self.mention_totals.get(index).copied().unwrap_or(0)
    }

    /// All four sub-metrics for the message at `index`
    pub fn analyze(&self, index: usize) -> CoherenceMetrics {
        if index >= self.messages.len() {
            return CoherenceMetrics::neutral();
        }
        CoherenceMetrics {
            thread_continuity: self.thread_continuity(index),
            reference_chain: self.reference_chain_strength(index),
            information_density: self.information_density(index),
            topic_consistency: self.topic_consistency(index),
        }
    }

    fn window_indices(&self, index: usize, radius: usize) -> impl Iterator<Item = usize> {
        let start = index.saturating_sub(radius);
        let end = (index + radius).min(self.messages.len().saturating_sub(1));
        (start..=end).filter(move |&j| j != index)
    }

    fn thread_continuity(&self, index: usize) -> f64 {
        let max_distance = self.config.window.max(1) as f64;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for j in self.window_indices(index, self.config.window) {
            let distance = index.abs_diff(j) as f64;
            let weight = (-2.0 * distance / max_distance).exp();
            weighted += self.vectors[index].cosine(&self.vectors[j]) * weight;
            total_weight += weight;
        }

        if total_weight == 0.0 {
            return 0.5;
        }
        let mean = weighted / total_weight;
        1.0 / (1.0 + (-6.0 * (mean - 0.4)).exp())
    }

    fn reference_chain_strength(&self, index: usize) -> f64 {
        let message = &self.messages[index];

        let outward_ids = self.mentions[index].len() as f64;
        let outward_files = self
            .known_files
            .iter()
            .filter(|path| message.content.contains(**path))
            .count() as f64;
        let inward = self.inbound[index] as f64;

        let files = &message.metadata.files;
        let tools = &message.metadata.tools;
        let mut shared = 0.0;
        for (j, other) in self.messages.iter().enumerate() {
            if j == index {
                continue;
            }
            if !files.is_empty() {
                let overlap = files.intersection(&other.metadata.files).count();
                shared += SHARED_FILE_WEIGHT * overlap as f64 / files.len() as f64;
            }
            if !tools.is_empty() {
                let overlap = tools.intersection(&other.metadata.tools).count();
                shared += SHARED_TOOL_WEIGHT * overlap as f64 / tools.len() as f64;
            }
        }

        let max_connections = (self.messages.len() as f64 * MAX_CONNECTION_RATE).max(1.0);
        ((outward_ids + outward_files + inward + shared) / max_connections).min(1.0)
    }

    fn information_density(&self, index: usize) -> f64 {
        let message = &self.messages[index];
        let vector = &self.vectors[index];

        let density = VectorScorer::density_of(vector);

        let max_similarity = self
            .window_indices(index, self.config.window * 2)
            .map(|j| vector.cosine(&self.vectors[j]))
            .fold(0.0_f64, f64::max);
        let novelty = 1.0 - max_similarity;

        let chars = message.content.chars().count() as f64;
        let length_factor = ((1.0 + chars).ln() / 1001f64.ln()).min(1.0);

        let mut score = density * 0.4 + novelty * 0.3 + length_factor * 0.1;
        if message.has_code() {
            score += 0.20;
        }
        if !message.metadata.tools.is_empty() {
            score += 0.15;
        }
        if message.metadata.has_error {
            score += 0.25;
        }
        score.min(1.0)
    }

    fn topic_consistency(&self, index: usize) -> f64 {
        let vector = &self.vectors[index];
        let best = self
            .clusters
            .iter()
            .map(|c| vector.cosine(&c.centroid))
            .fold(0.0_f64, f64::max);

        let n = self.messages.len();
        let recency_weight = if n > 1 {
            0.8 + 0.2 * index as f64 / (n - 1) as f64
        } else {
            1.0
        };
        (best * recency_weight).min(1.0)
    }
}

/// Single-pass greedy clustering against cluster seeds
fn build_clusters(vectors: &[TermVector], config: &CoherenceConfig) -> Vec<TopicCluster> {
    let mut clusters: Vec<TopicCluster> = Vec::new();

    for (i, vector) in vectors.iter().enumerate() {
        let best = clusters
            .iter()
            .enumerate()
            .map(|(c, cluster)| (c, vector.cosine(&vectors[cluster.seed])))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((c, sim)) if sim >= config.cluster_threshold => clusters[c].members.push(i),
            _ => clusters.push(TopicCluster {
                seed: i,
                members: vec![i],
                centroid: TermVector::default(),
            }),
        }
    }

    for cluster in &mut clusters {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for &member in &cluster.members {
            for (term, weight) in vectors[member].top_terms(config.key_terms) {
                *sums.entry(term.to_string()).or_insert(0.0) += weight;
            }
        }
        let size = cluster.members.len() as f64;
        for weight in sums.values_mut() {
            *weight /= size;
        }
        cluster.centroid = TermVector::from_weights(sums);
    }

    clusters
}
