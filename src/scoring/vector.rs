//! Bag-of-terms vector similarity
//!
//! Texts become log-dampened term-weight vectors; concept terms from the
//! development domain count double. Cosine similarity on those vectors drives
//! semantic density, domain relevance and contextual importance.

use super::text::{stem, tokenize};
use std::collections::{BTreeMap, HashSet};

const CONCEPT_WEIGHT: f64 = 2.0;

/// Development-domain vocabulary treated as concept terms
const DEFAULT_CONCEPT_TERMS: &[&str] = &[
    "function", "method", "class", "struct", "trait", "interface", "module", "package",
    "import", "variable", "type", "api", "endpoint", "database", "query", "schema", "config",
    "error", "exception", "bug", "fix", "debug", "test", "assert", "build", "compile",
    "deploy", "refactor", "implement", "performance", "memory", "thread", "async", "cache",
    "server", "client", "request", "response", "file", "directory", "commit", "branch",
    "merge", "dependency", "library", "parser", "token", "index", "algorithm",
];

/// Weighted term vector of a single text
#[derive(Debug, Clone, Default)]
pub struct TermVector {
    weights: BTreeMap<String, f64>,
    norm: f64,
    concept_weight: f64,
}

impl TermVector {
    pub fn from_weights(weights: BTreeMap<String, f64>) -> Self {
        let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
        Self {
            weights,
            norm,
            concept_weight: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Highest-weighted terms, ties broken alphabetically
    pub fn top_terms(&self, limit: usize) -> Vec<(&str, f64)> {
        let mut terms: Vec<(&str, f64)> = self
            .weights
            .iter()
            .map(|(t, w)| (t.as_str(), *w))
            .collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        terms.truncate(limit);
        terms
    }

    /// Cosine similarity, zero when either side is empty
    pub fn cosine(&self, other: &TermVector) -> f64 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.weights.len() <= other.weights.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f64 = small
            .weights
            .iter()
            .filter_map(|(term, w)| large.weights.get(term).map(|o| w * o))
            .sum();
        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}

/// Light-weight vector scorer
#[derive(Debug, Clone)]
pub struct VectorScorer {
    concept_terms: HashSet<String>,
}

impl Default for VectorScorer {
    fn default() -> Self {
        Self::new(DEFAULT_CONCEPT_TERMS.iter().copied())
    }
}

impl VectorScorer {
    /// Create a scorer with a custom concept vocabulary (stemmed on entry)
    pub fn new<'a, I>(concept_terms: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            concept_terms: concept_terms
                .into_iter()
                .map(|t| stem(&t.to_lowercase()))
                .collect(),
        }
    }

    /// Scorer whose concept vocabulary also includes profile keywords
    pub fn with_keywords<S: AsRef<str>>(keywords: &[S]) -> Self {
        let mut scorer = Self::default();
        scorer.concept_terms.extend(
            keywords
                .iter()
                .flat_map(|k| tokenize(k.as_ref())),
        );
        scorer
    }

    pub fn is_concept(&self, term: &str) -> bool {
        self.concept_terms.contains(term)
    }

    /// Build the term vector: `weight = base * (1 + ln(freq))`
    pub fn vectorize(&self, text: &str) -> TermVector {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for token in tokenize(text) {
            *counts.entry(token).or_insert(0) += 1;
        }

        let mut concept_weight = 0.0;
        let weights: BTreeMap<String, f64> = counts
            .into_iter()
            .map(|(term, freq)| {
                let base = if self.is_concept(&term) { CONCEPT_WEIGHT } else { 1.0 };
                let weight = base * (1.0 + (freq as f64).ln());
                if base > 1.0 {
                    concept_weight += weight;
                }
                (term, weight)
            })
            .collect();

        let mut vector = TermVector::from_weights(weights);
        vector.concept_weight = concept_weight;
        vector
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        self.vectorize(a).cosine(&self.vectorize(b))
    }

    /// Log-scaled share of concept weight, in [0, 1]
    pub fn semantic_density(&self, text: &str) -> f64 {
        Self::density_of(&self.vectorize(text))
    }

    pub fn density_of(vector: &TermVector) -> f64 {
        let total = vector.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        let ratio = vector.concept_weight / total;
        (1.0 + 9.0 * ratio).log10().min(1.0)
    }

    /// Keyword match ratio; substring near-matches earn half credit
    pub fn domain_relevance<S: AsRef<str>>(&self, text: &str, keywords: &[S]) -> f64 {
        let keyword_terms: Vec<String> = keywords
            .iter()
            .flat_map(|k| tokenize(k.as_ref()))
            .collect();
        if keyword_terms.is_empty() {
            return 0.0;
        }

        let terms: HashSet<String> = tokenize(text).into_iter().collect();
        if terms.is_empty() {
            return 0.0;
        }

        let credit: f64 = keyword_terms
            .iter()
            .map(|keyword| {
                if terms.contains(keyword) {
                    1.0
                } else if terms.iter().any(|t| {
                    t.len() >= 3 && keyword.len() >= 3 && (t.contains(keyword.as_str()) || keyword.contains(t.as_str()))
                }) {
                    0.5
                } else {
                    0.0
                }
            })
            .sum();

        (credit / keyword_terms.len() as f64).min(1.0)
    }

    /// Sigmoid-normalised mean similarity against surrounding texts.
    ///
    /// 0.5 with no context, 0.3 when nothing overlaps.
    pub fn contextual_importance<S: AsRef<str>>(&self, target: &str, context: &[S]) -> f64 {
        if context.is_empty() {
            return 0.5;
        }
        let target_vec = self.vectorize(target);
        let sims: Vec<f64> = context
            .iter()
            .map(|c| target_vec.cosine(&self.vectorize(c.as_ref())))
            .collect();
        Self::contextual_from_similarities(&sims)
    }

    /// Same as [`Self::contextual_importance`] over precomputed similarities
    pub fn contextual_from_similarities(sims: &[f64]) -> f64 {
        if sims.is_empty() {
            return 0.5;
        }
        if sims.iter().all(|s| *s == 0.0) {
            return 0.3;
        }
        let mean = sims.iter().sum::<f64>() / sims.len() as f64;
        1.0 / (1.0 + (-5.0 * (mean - 0.5)).exp())
    }
}
