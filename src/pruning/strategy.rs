//! Pruning strategies
//!
//! A strategy fixes the retained-token budget and how it is split between
//! verbatim messages and summaries:
//! - aggressive: 50k tokens, 50% preserved, 20% summaries, threshold 0.7
//! - balanced: 100k tokens, 70% preserved, 20% summaries, threshold 0.5
//! - conservative: 150k tokens, 85% preserved, 10% summaries, threshold 0.3

use crate::context::models::MessageType;
use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Total tokens above which "aggressive" is recommended
pub const AGGRESSIVE_TOKEN_THRESHOLD: usize = 150_000;
/// Total tokens above which "balanced" is recommended
pub const BALANCED_TOKEN_THRESHOLD: usize = 100_000;
pub const AGGRESSIVE_REDUNDANCY_THRESHOLD: f64 = 0.4;
pub const LOW_IMPORTANCE_THRESHOLD: f64 = 0.4;

/// Budget and retention policy for one pruning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningStrategy {
    pub name: String,
    pub max_tokens: usize,
    /// Share of the budget for verbatim messages
    pub preserve_ratio: f64,
    /// Share of the budget for summaries
    pub summary_ratio: f64,
    /// Minimum importance to keep a message that is not force-preserved
    pub importance_threshold: f64,
    /// Types kept regardless of score or budget
    #[serde(default)]
    pub always_preserve: HashSet<MessageType>,
}

impl Default for PruningStrategy {
    fn default() -> Self {
        Self::balanced()
    }
}

impl PruningStrategy {
    pub const PRESETS: [&'static str; 3] = ["aggressive", "balanced", "conservative"];

    pub fn aggressive() -> Self {
        Self {
            name: "aggressive".to_string(),
            max_tokens: 50_000,
            preserve_ratio: 0.5,
            summary_ratio: 0.2,
            importance_threshold: 0.7,
            always_preserve: HashSet::from([MessageType::Error]),
        }
    }

    pub fn balanced() -> Self {
        Self {
            name: "balanced".to_string(),
            max_tokens: 100_000,
            preserve_ratio: 0.7,
            summary_ratio: 0.2,
            importance_threshold: 0.5,
            always_preserve: HashSet::from([MessageType::Error, MessageType::CodeChange]),
        }
    }

    pub fn conservative() -> Self {
        Self {
            name: "conservative".to_string(),
            max_tokens: 150_000,
            preserve_ratio: 0.85,
            summary_ratio: 0.1,
            importance_threshold: 0.3,
            always_preserve: HashSet::from([
                MessageType::Error,
                MessageType::CodeChange,
                MessageType::Query,
            ]),
        }
    }

    /// Look up a built-in strategy
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "aggressive" => Ok(Self::aggressive()),
            "balanced" => Ok(Self::balanced()),
            "conservative" => Ok(Self::conservative()),
            other => Err(ContextError::InvalidStrategy {
                name: other.to_string(),
                reason: format!("unknown strategy, expected one of {:?}", Self::PRESETS),
            }),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_always_preserve<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = MessageType>,
    {
        self.always_preserve = types.into_iter().collect();
        self
    }

    /// Validate that the ratios and threshold are consistent
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ContextError::InvalidStrategy {
            name: self.name.clone(),
            reason,
        };

        for (field, value) in [
            ("preserve_ratio", self.preserve_ratio),
            ("summary_ratio", self.summary_ratio),
            ("importance_threshold", self.importance_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} must be within [0, 1], got {}", field, value)));
            }
        }

        if self.preserve_ratio + self.summary_ratio > 1.0 {
            return Err(invalid(format!(
                "preserve_ratio + summary_ratio exceeds 1 ({} + {})",
                self.preserve_ratio, self.summary_ratio
            )));
        }

        Ok(())
    }

    /// Token cap for verbatim content before tail demotion kicks in
    pub fn preserve_budget(&self) -> f64 {
        self.max_tokens as f64 * self.preserve_ratio
    }

    /// Token cap for the admitted summarization pool
    pub fn summary_budget(&self) -> f64 {
        self.max_tokens as f64 * self.summary_ratio
    }

    pub fn is_always_preserved(&self, message_type: MessageType) -> bool {
        self.always_preserve.contains(&message_type)
    }
}

/// Recommend a built-in strategy name for a conversation
pub fn recommend_strategy(total_tokens: usize, redundancy: f64, average_importance: f64) -> &'static str {
    if total_tokens > AGGRESSIVE_TOKEN_THRESHOLD || redundancy > AGGRESSIVE_REDUNDANCY_THRESHOLD {
        "aggressive"
    } else if total_tokens > BALANCED_TOKEN_THRESHOLD || average_importance < LOW_IMPORTANCE_THRESHOLD {
        "balanced"
    } else {
        "conservative"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for name in PruningStrategy::PRESETS {
            let strategy = PruningStrategy::by_name(name).unwrap();
            assert_eq!(strategy.name, name);
            assert!(strategy.validate().is_ok());
        }
    }

    #[test]
    fn test_unknown_strategy() {
        let err = PruningStrategy::by_name("reckless").unwrap_err();
        assert!(matches!(err, ContextError::InvalidStrategy { ref name, .. } if name == "reckless"));
    }

    #[test]
    fn test_validate_rejects_bad_ratios() {
        let mut strategy = PruningStrategy::balanced();
        strategy.preserve_ratio = 1.2;
        assert!(strategy.validate().is_err());

        let mut strategy = PruningStrategy::balanced();
        strategy.preserve_ratio = 0.9;
        strategy.summary_ratio = 0.2;
        assert!(strategy.validate().is_err());

        let mut strategy = PruningStrategy::balanced();
        strategy.importance_threshold = -0.1;
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn test_budgets() {
        let strategy = PruningStrategy::aggressive();
        assert_eq!(strategy.preserve_budget(), 25_000.0);
        assert_eq!(strategy.summary_budget(), 10_000.0);
        assert!(strategy.is_always_preserved(MessageType::Error));
        assert!(!strategy.is_always_preserved(MessageType::CodeChange));
    }

    #[test]
    fn test_recommend_strategy() {
        assert_eq!(recommend_strategy(150_001, 0.0, 0.9), "aggressive");
        assert_eq!(recommend_strategy(1_000, 0.41, 0.9), "aggressive");
        assert_eq!(recommend_strategy(150_000, 0.4, 0.9), "balanced");
        assert_eq!(recommend_strategy(1_000, 0.0, 0.39), "balanced");
        assert_eq!(recommend_strategy(100_000, 0.0, 0.4), "conservative");
        assert_eq!(recommend_strategy(0, 0.0, 0.0), "balanced");
    }
}
