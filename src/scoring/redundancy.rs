//! Redundancy analysis across a whole message set

use super::text::normalize_content;
use crate::context::models::{Message, MessageType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Redundancy components, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RedundancyReport {
    /// Share of messages whose normalized content appears more than once
    pub content: f64,
    /// Share of type 3-gram windows repeating an earlier window
    pub pattern: f64,
    /// Mean of the two
    pub overall: f64,
}

/// Fingerprint of the normalized content
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Analyze content duplication and repeated type patterns
pub fn analyze_redundancy(messages: &[Message]) -> RedundancyReport {
    let content = content_redundancy(messages);
    let pattern = pattern_redundancy(messages);
    RedundancyReport {
        content,
        pattern,
        overall: (content + pattern) / 2.0,
    }
}

fn content_redundancy(messages: &[Message]) -> f64 {
    if messages.is_empty() {
        return 0.0;
    }

    let fingerprints: Vec<String> = messages
        .iter()
        .map(|m| content_fingerprint(&m.content))
        .collect();
    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for fp in &fingerprints {
        *occurrences.entry(fp.as_str()).or_insert(0) += 1;
    }

    let duplicated = fingerprints
        .iter()
        .filter(|fp| occurrences[fp.as_str()] > 1)
        .count();
    duplicated as f64 / messages.len() as f64
}

fn pattern_redundancy(messages: &[Message]) -> f64 {
    if messages.len() < 3 {
        return 0.0;
    }

    let types: Vec<MessageType> = messages.iter().map(|m| m.message_type).collect();
    let mut seen: HashSet<&[MessageType]> = HashSet::new();
    let mut windows = 0usize;
    let mut repeated = 0usize;

    for window in types.windows(3) {
        windows += 1;
        if !seen.insert(window) {
            repeated += 1;
        }
    }

    repeated as f64 / windows as f64
}
