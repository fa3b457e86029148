//! BM25 lexical ranking over message contents
//!
//! Corpus statistics live in an immutable [`Bm25Index`] built once per
//! analysis pass. Pairwise similarity builds its own throwaway two-document
//! index, so no shared statistics are ever mutated.

use super::text::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-term IDF floor for pairwise similarity. A two-document corpus only
/// produces non-positive IDF values, which would otherwise zero every score.
const PAIRWISE_MIN_IDF: f64 = 0.01;

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f64,
    /// Length normalisation
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Default)]
struct DocumentTerms {
    term_freq: HashMap<String, usize>,
    length: usize,
}

impl DocumentTerms {
    fn from_tokens(tokens: Vec<String>) -> Self {
        let length = tokens.len();
        let mut term_freq = HashMap::new();
        for token in tokens {
            *term_freq.entry(token).or_insert(0) += 1;
        }
        Self { term_freq, length }
    }
}

/// Indexed corpus with global document-frequency statistics
#[derive(Debug, Clone)]
pub struct Bm25Index {
    params: Bm25Params,
    documents: Vec<DocumentTerms>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
    /// Lower bound for each term's IDF while scoring
    idf_floor: f64,
}

impl Bm25Index {
    /// Index a corpus: term frequencies first, then corpus-wide statistics
    pub fn build<S: AsRef<str>>(corpus: &[S], params: Bm25Params) -> Self {
        let documents: Vec<DocumentTerms> = corpus
            .iter()
            .map(|doc| DocumentTerms::from_tokens(tokenize(doc.as_ref())))
            .collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in &documents {
            for term in doc.term_freq.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let total_len: usize = documents.iter().map(|d| d.length).sum();
        let avg_doc_len = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / documents.len() as f64
        };

        Self {
            params,
            documents,
            doc_freq,
            avg_doc_len,
            idf_floor: 0.0,
        }
    }

    fn with_idf_floor(mut self, floor: f64) -> Self {
        self.idf_floor = floor;
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    /// `ln((N - df + 0.5) / (df + 0.5))`, unclamped
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.doc_freq(term) as f64;
        ((n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score a query string against one indexed document
    pub fn score(&self, query: &str, doc_index: usize) -> f64 {
        self.score_terms(&tokenize(query), doc_index)
    }

    /// Score pre-tokenized query terms against one indexed document.
    ///
    /// Terms with negative IDF contribute nothing.
    pub fn score_terms(&self, query_terms: &[String], doc_index: usize) -> f64 {
        let Some(doc) = self.documents.get(doc_index) else {
            return 0.0;
        };
        if doc.length == 0 || self.avg_doc_len <= 0.0 {
            return 0.0;
        }

        let Bm25Params { k1, b } = self.params;
        let len_ratio = doc.length as f64 / self.avg_doc_len;

        let score: f64 = query_terms
            .iter()
            .filter_map(|term| {
                let tf = *doc.term_freq.get(term)? as f64;
                let idf = self.idf(term).max(self.idf_floor);
                Some(idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * len_ratio)))
            })
            .sum();

        score.max(0.0)
    }

    /// Score a query against every document in corpus order
    pub fn score_all(&self, query: &str) -> Vec<f64> {
        let terms = tokenize(query);
        (0..self.documents.len())
            .map(|i| self.score_terms(&terms, i))
            .collect()
    }

    /// Symmetric similarity of two standalone texts in [0, 1].
    ///
    /// Each text is scored against the other as query and the mean is
    /// normalised by the larger self-score.
    pub fn similarity(a: &str, b: &str, params: Bm25Params) -> f64 {
        let index = Self::build(&[a, b], params).with_idf_floor(PAIRWISE_MIN_IDF);
        let a_terms = tokenize(a);
        let b_terms = tokenize(b);

        let self_max = index
            .score_terms(&a_terms, 0)
            .max(index.score_terms(&b_terms, 1));
        if self_max <= 0.0 {
            return 0.0;
        }

        let forward = index.score_terms(&a_terms, 1);
        let backward = index.score_terms(&b_terms, 0);
        ((forward + backward) / 2.0 / self_max).clamp(0.0, 1.0)
    }
}
