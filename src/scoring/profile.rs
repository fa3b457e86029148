//! Scoring profiles and content-based profile recommendation

use super::bm25::Bm25Params;
use crate::context::models::{Message, MessageType};
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Component weights of the total importance (need not sum to 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub recency: f64,
    pub semantic: f64,
    pub references: f64,
    pub file_relevance: f64,
    pub coherence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: 0.25,
            semantic: 0.30,
            references: 0.15,
            file_relevance: 0.15,
            coherence: 0.15,
        }
    }
}

/// How the semantic component is assembled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub lexical: f64,
    pub vector: f64,
    pub contextual: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            vector: 0.4,
            contextual: 0.2,
        }
    }
}

/// Immutable scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub name: String,
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub domain_keywords: Vec<String>,
    #[serde(default = "default_type_weights")]
    pub type_weights: HashMap<MessageType, f64>,
    /// Informational only
    #[serde(default = "default_coherence_threshold")]
    pub coherence_threshold: f64,
    #[serde(default)]
    pub bm25: Bm25Params,
    #[serde(default)]
    pub hybrid: HybridWeights,
}

fn default_type_weights() -> HashMap<MessageType, f64> {
    HashMap::from([
        (MessageType::Query, 0.7),
        (MessageType::CodeChange, 0.9),
        (MessageType::FileOperation, 0.6),
        (MessageType::Error, 0.85),
        (MessageType::Success, 0.5),
        (MessageType::ToolUse, 0.4),
        (MessageType::Summary, 0.6),
    ])
}

fn default_coherence_threshold() -> f64 {
    0.6
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            weights: ScoringWeights::default(),
            domain_keywords: keywords(&[
                "function", "class", "error", "fix", "implement", "test", "api", "config",
            ]),
            type_weights: default_type_weights(),
            coherence_threshold: default_coherence_threshold(),
            bm25: Bm25Params::default(),
            hybrid: HybridWeights::default(),
        }
    }
}

impl ScoringProfile {
    pub const PRESETS: [&'static str; 4] = ["default", "debugging", "development", "refactoring"];

    /// Error-heavy sessions: errors and references dominate
    pub fn debugging() -> Self {
        let mut type_weights = default_type_weights();
        type_weights.insert(MessageType::Error, 1.0);
        type_weights.insert(MessageType::Success, 0.7);
        Self {
            name: "debugging".to_string(),
            weights: ScoringWeights {
                recency: 0.30,
                semantic: 0.25,
                references: 0.20,
                file_relevance: 0.10,
                coherence: 0.15,
            },
            domain_keywords: keywords(&[
                "error", "bug", "fix", "exception", "stack", "trace", "panic", "debug", "fail",
            ]),
            type_weights,
            coherence_threshold: 0.5,
            bm25: Bm25Params::default(),
            hybrid: HybridWeights {
                lexical: 0.5,
                vector: 0.3,
                contextual: 0.2,
            },
        }
    }

    /// Feature work: code changes and active files dominate
    pub fn development() -> Self {
        let mut type_weights = default_type_weights();
        type_weights.insert(MessageType::CodeChange, 1.0);
        type_weights.insert(MessageType::FileOperation, 0.75);
        Self {
            name: "development".to_string(),
            weights: ScoringWeights {
                recency: 0.20,
                semantic: 0.30,
                references: 0.15,
                file_relevance: 0.25,
                coherence: 0.10,
            },
            domain_keywords: keywords(&[
                "implement", "feature", "function", "struct", "module", "api", "endpoint", "build",
            ]),
            type_weights,
            coherence_threshold: 0.6,
            bm25: Bm25Params::default(),
            hybrid: HybridWeights::default(),
        }
    }

    /// Restructuring work: coherence across the thread matters most
    pub fn refactoring() -> Self {
        let mut type_weights = default_type_weights();
        type_weights.insert(MessageType::CodeChange, 0.95);
        Self {
            name: "refactoring".to_string(),
            weights: ScoringWeights {
                recency: 0.15,
                semantic: 0.25,
                references: 0.20,
                file_relevance: 0.20,
                coherence: 0.20,
            },
            domain_keywords: keywords(&[
                "refactor", "rename", "extract", "restructure", "module", "interface", "cleanup",
            ]),
            type_weights,
            coherence_threshold: 0.7,
            bm25: Bm25Params { k1: 1.5, b: 0.75 },
            hybrid: HybridWeights {
                lexical: 0.3,
                vector: 0.4,
                contextual: 0.3,
            },
        }
    }

    /// Look up a built-in profile
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "default" => Ok(Self::default()),
            "debugging" => Ok(Self::debugging()),
            "development" => Ok(Self::development()),
            "refactoring" => Ok(Self::refactoring()),
            other => Err(ContextError::UnknownProfile(other.to_string())),
        }
    }

    /// Base weight of a message type, 0.5 when unlisted
    pub fn type_weight(&self, message_type: MessageType) -> f64 {
        self.type_weights.get(&message_type).copied().unwrap_or(0.5)
    }
}

const DEBUGGING_CUES: &[&str] = &["error", "bug", "fail", "exception", "traceback", "panic", "crash"];
const REFACTORING_CUES: &[&str] = &["refactor", "rename", "restructure", "clean up", "extract", "simplify"];
const DEVELOPMENT_CUES: &[&str] = &["implement", "add ", "create", "feature", "build", "new "];

/// Share of messages a cue family must reach before it wins
const MIN_CUE_SHARE: f64 = 0.2;

/// Recommend a built-in profile from conversation content.
///
/// Kept apart from the scoring math; the result is only a name.
pub fn recommend_profile(messages: &[Message]) -> &'static str {
    if messages.is_empty() {
        return "default";
    }

    let mut debugging = 0usize;
    let mut refactoring = 0usize;
    let mut development = 0usize;

    for message in messages {
        let lower = message.content.to_lowercase();
        let has = |cues: &[&str]| cues.iter().any(|cue| lower.contains(cue));

        if message.metadata.has_error || message.message_type == MessageType::Error || has(DEBUGGING_CUES) {
            debugging += 1;
        }
        if has(REFACTORING_CUES) {
            refactoring += 1;
        }
        if message.message_type == MessageType::CodeChange || has(DEVELOPMENT_CUES) {
            development += 1;
        }
    }

    let min_count = (messages.len() as f64 * MIN_CUE_SHARE).ceil() as usize;
    // Earlier entries win ties
    let ranked = [
        ("debugging", debugging),
        ("refactoring", refactoring),
        ("development", development),
    ];
    ranked
        .iter()
        .filter(|(_, count)| *count >= min_count.max(1))
        .fold(None::<(&'static str, usize)>, |best, &(name, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((name, count)),
        })
        .map(|(name, _)| name)
        .unwrap_or("default")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::MessageRole;

    fn msg(message_type: MessageType, content: &str) -> Message {
        Message::new("m", MessageRole::User, message_type, content)
    }

    #[test]
    fn test_presets_resolve() {
        for name in ScoringProfile::PRESETS {
            assert_eq!(ScoringProfile::by_name(name).unwrap().name, name);
        }
        assert!(matches!(
            ScoringProfile::by_name("nope"),
            Err(ContextError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_type_weight_fallback() {
        let mut profile = ScoringProfile::default();
        assert_eq!(profile.type_weight(MessageType::CodeChange), 0.9);
        profile.type_weights.clear();
        assert_eq!(profile.type_weight(MessageType::CodeChange), 0.5);
    }

    #[test]
    fn test_profile_deserializes_with_defaults() {
        let profile: ScoringProfile = serde_json::from_str(r#"{"name": "custom"}"#).unwrap();
        assert_eq!(profile.name, "custom");
        assert_eq!(profile.weights, ScoringWeights::default());
        assert_eq!(profile.type_weight(MessageType::Error), 0.85);
    }

    #[test]
    fn test_recommend_profile() {
        assert_eq!(recommend_profile(&[]), "default");

        let debugging = vec![
            msg(MessageType::Error, "thread 'main' panicked"),
            msg(MessageType::Query, "why does the test fail?"),
            msg(MessageType::Query, "hello"),
        ];
        assert_eq!(recommend_profile(&debugging), "debugging");

        let refactoring = vec![
            msg(MessageType::Query, "please refactor the parser"),
            msg(MessageType::Query, "rename the helper too"),
            msg(MessageType::Query, "thanks"),
        ];
        assert_eq!(recommend_profile(&refactoring), "refactoring");

        let development = vec![
            msg(MessageType::CodeChange, "wired up the handler"),
            msg(MessageType::Query, "implement pagination"),
        ];
        assert_eq!(recommend_profile(&development), "development");

        let chatter = vec![msg(MessageType::Query, "good morning"), msg(MessageType::Query, "ok")];
        assert_eq!(recommend_profile(&chatter), "default");
    }
}
