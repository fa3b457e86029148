//! Budget-constrained selection engine
//!
//! One pruning pass partitions scored messages into preserved, summarized
//! and removed sets:
//! 1. rank by importance, highest first
//! 2. force-preserve configured types, preserve above-threshold messages
//!    while the budget allows, pool summarizable ones, discard the rest
//! 3. demote the low-importance tail of the preserved set when it overruns
//!    the preserve share of the budget
//! 4. admit the summarization pool into the summary share of the budget
//! 5. restore conversation order, summarize, record undo state

use super::strategy::PruningStrategy;
use super::undo::{UndoBuffer, UndoRecord};
use crate::context::models::{Message, MessageType, Summary, SummaryLevel};
use crate::context::summarizer::{HierarchicalSummarizer, Summarizer};
use crate::error::Result;
use crate::metrics::METRICS;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Minimum size of a message worth summarizing
pub const MIN_SUMMARIZABLE_TOKENS: usize = 50;
/// Content length that makes a message without code summarizable
pub const MIN_SUMMARIZABLE_CHARS: usize = 200;

/// Aggregate figures of one pruning pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneMetrics {
    pub original_tokens: usize,
    /// Preserved message tokens plus summary tokens
    pub final_tokens: usize,
    pub reduction_percent: f64,
    pub messages_preserved: usize,
    pub messages_summarized: usize,
    pub messages_removed: usize,
    pub tokens_saved: usize,
    /// Force-preserved messages alone exceeded the strategy budget
    pub budget_exceeded: bool,
}

/// Outcome of one pruning pass. All three sets are in conversation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneResult {
    pub operation_id: String,
    pub strategy: String,
    pub preserved: Vec<Message>,
    /// Sources of `summaries`
    pub summarized: Vec<Message>,
    pub removed: Vec<Message>,
    pub summaries: Vec<Summary>,
    pub metrics: PruneMetrics,
}

impl PruneResult {
    /// Preserved messages with summaries spliced in at their first source position
    pub fn to_messages(&self, original_order: &[String]) -> Vec<Message> {
        let position: HashMap<&str, usize> = original_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let rank = |id: &str| position.get(id).copied().unwrap_or(usize::MAX);

        let mut keyed: Vec<(usize, Message)> = self
            .preserved
            .iter()
            .map(|m| (rank(m.id.as_str()), m.clone()))
            .collect();
        keyed.extend(self.summaries.iter().map(|s| {
            let first = s.source_ids.iter().map(|id| rank(id.as_str())).min().unwrap_or(usize::MAX);
            (first, s.to_message())
        }));
        keyed.sort_by_key(|(pos, _)| *pos);
        keyed.into_iter().map(|(_, m)| m).collect()
    }
}

/// Whether a message is worth replacing with a summary
pub fn is_summarizable(message: &Message) -> bool {
    message.token_count() >= MIN_SUMMARIZABLE_TOKENS
        && message.message_type != MessageType::Error
        && (message.has_code() || message.content.chars().count() > MIN_SUMMARIZABLE_CHARS)
}

/// Pruning engine. Owns the undo history shared by all its operations.
pub struct PruningEngine {
    summarizer: Arc<dyn Summarizer>,
    summary_level: SummaryLevel,
    undo: UndoBuffer,
    operation_lock: Mutex<()>,
}

impl Default for PruningEngine {
    fn default() -> Self {
        Self::new(
            Arc::new(HierarchicalSummarizer::default()),
            SummaryLevel::Session,
            UndoBuffer::default(),
        )
    }
}

/// Working partition, as indices into the input slice
#[derive(Default)]
struct Partition {
    forced: Vec<usize>,
    preserved: Vec<usize>,
    pool: Vec<usize>,
    removed: Vec<usize>,
    forced_tokens: usize,
}

impl PruningEngine {
    pub fn new(summarizer: Arc<dyn Summarizer>, summary_level: SummaryLevel, undo: UndoBuffer) -> Self {
        Self {
            summarizer,
            summary_level,
            undo,
            operation_lock: Mutex::new(()),
        }
    }

    pub fn summary_level(&self) -> SummaryLevel {
        self.summary_level
    }

    pub fn undo_buffer(&self) -> &UndoBuffer {
        &self.undo
    }

    /// Prune scored messages (in conversation order) under a strategy.
    ///
    /// Unscored messages rank with importance 0.
    pub fn prune(&self, messages: &[Message], strategy: &PruningStrategy) -> Result<PruneResult> {
        strategy.validate()?;

        // Undo insertion of one operation completes before the next starts
        let _guard = self.operation_lock.lock().unwrap_or_else(|p| p.into_inner());

        let operation_id = uuid::Uuid::new_v4().to_string();
        let original_tokens: usize = messages.iter().map(Message::token_count).sum();

        let partition = if original_tokens <= strategy.max_tokens {
            debug!(
                "Context of {} tokens fits budget {}, preserving everything",
                original_tokens, strategy.max_tokens
            );
            Partition {
                preserved: (0..messages.len()).collect(),
                ..Partition::default()
            }
        } else {
            self.partition(messages, strategy)
        };

        let budget_exceeded = partition.forced_tokens > strategy.max_tokens;
        if budget_exceeded {
            warn!(
                "Force-preserved messages use {} tokens, exceeding the {} token budget of strategy '{}'",
                partition.forced_tokens, strategy.max_tokens, strategy.name
            );
        }

        let Partition {
            mut forced,
            preserved,
            pool,
            removed,
            ..
        } = partition;
        forced.extend(preserved);

        let preserved = restore_order(messages, forced);
        let summarized = restore_order(messages, pool);
        let removed = restore_order(messages, removed);

        let summaries = if summarized.is_empty() {
            Vec::new()
        } else {
            self.summarizer.summarize(&summarized, self.summary_level)
        };

        if let Some(evicted) = self.undo.push(UndoRecord {
            operation_id: operation_id.clone(),
            removed_messages: removed.clone(),
            original_order: messages.iter().map(|m| m.id.clone()).collect(),
            timestamp: Utc::now(),
        }) {
            debug!("Undo buffer full, dropped operation {}", evicted);
            METRICS.record_undo_eviction();
        }

        let preserved_tokens: usize = preserved.iter().map(Message::token_count).sum();
        let summary_tokens: usize = summaries.iter().map(|s| s.estimated_tokens).sum();
        let final_tokens = preserved_tokens + summary_tokens;
        let tokens_saved = original_tokens.saturating_sub(final_tokens);
        let reduction_percent = if original_tokens == 0 {
            0.0
        } else {
            tokens_saved as f64 / original_tokens as f64 * 100.0
        };

        let metrics = PruneMetrics {
            original_tokens,
            final_tokens,
            reduction_percent,
            messages_preserved: preserved.len(),
            messages_summarized: summarized.len(),
            messages_removed: removed.len(),
            tokens_saved,
            budget_exceeded,
        };

        info!(
            "Pruning {} with strategy '{}': {} preserved, {} summarized, {} removed, {} -> {} tokens ({:.1}%)",
            operation_id,
            strategy.name,
            metrics.messages_preserved,
            metrics.messages_summarized,
            metrics.messages_removed,
            original_tokens,
            final_tokens,
            reduction_percent
        );

        METRICS.record_pruning(
            &strategy.name,
            metrics.messages_preserved,
            metrics.messages_summarized,
            metrics.messages_removed,
            tokens_saved,
            budget_exceeded,
        );
        METRICS.record_summaries(self.summary_level.as_str(), summaries.len());

        Ok(PruneResult {
            operation_id,
            strategy: strategy.name.clone(),
            preserved,
            summarized,
            removed,
            summaries,
            metrics,
        })
    }

    fn partition(&self, messages: &[Message], strategy: &PruningStrategy) -> Partition {
        let mut ranked: Vec<usize> = (0..messages.len()).collect();
        sort_by_importance(messages, &mut ranked);

        let mut partition = Partition::default();
        let mut preserved_tokens = 0usize;

        for index in ranked {
            let message = &messages[index];
            let tokens = message.token_count();

            if strategy.is_always_preserved(message.message_type) {
                partition.forced.push(index);
                partition.forced_tokens += tokens;
                preserved_tokens += tokens;
            } else if message.importance_total() >= strategy.importance_threshold
                && preserved_tokens + tokens <= strategy.max_tokens
            {
                partition.preserved.push(index);
                preserved_tokens += tokens;
            } else if is_summarizable(message) {
                partition.pool.push(index);
            } else {
                partition.removed.push(index);
            }
        }

        // Force-preserved messages are exempt from demotion
        if preserved_tokens as f64 > strategy.preserve_budget() {
            let keep = (partition.preserved.len() as f64 * strategy.preserve_ratio).floor() as usize;
            let demoted = partition.preserved.split_off(keep);
            debug!(
                "Preserved set of {} tokens exceeds {:.0}, demoting {} messages",
                preserved_tokens,
                strategy.preserve_budget(),
                demoted.len()
            );
            for index in demoted {
                if is_summarizable(&messages[index]) {
                    partition.pool.push(index);
                } else {
                    partition.removed.push(index);
                }
            }
        }

        // Skip-fit admission: a message that does not fit leaves room for smaller ones
        sort_by_importance(messages, &mut partition.pool);
        let summary_budget = strategy.summary_budget();
        let mut summary_tokens = 0usize;
        let mut admitted = Vec::with_capacity(partition.pool.len());
        for index in std::mem::take(&mut partition.pool) {
            let tokens = messages[index].token_count();
            if (summary_tokens + tokens) as f64 <= summary_budget {
                summary_tokens += tokens;
                admitted.push(index);
            } else {
                partition.removed.push(index);
            }
        }
        partition.pool = admitted;

        partition
    }

    /// Invalidate an undo record, reporting whether it existed
    pub fn undo(&self, operation_id: &str) -> bool {
        self.take_undo_record(operation_id).is_some()
    }

    /// Consume an undo record so the caller can rebuild the conversation
    pub fn take_undo_record(&self, operation_id: &str) -> Option<UndoRecord> {
        let record = self.undo.take(operation_id);
        METRICS.record_undo(record.is_some());
        match &record {
            Some(r) => info!(
                "Undo of {} released {} removed messages",
                operation_id,
                r.removed_messages.len()
            ),
            None => warn!("No undo record for operation {}", operation_id),
        }
        record
    }

    /// Inspect an undo record without consuming it
    pub fn undo_record(&self, operation_id: &str) -> Option<UndoRecord> {
        self.undo.peek(operation_id)
    }

    /// Undoable operation ids, oldest first
    pub fn undo_history(&self) -> Vec<String> {
        self.undo.history()
    }
}

/// Highest importance first, ties in conversation order
fn sort_by_importance(messages: &[Message], indices: &mut [usize]) {
    indices.sort_by(|&a, &b| {
        messages[b]
            .importance_total()
            .total_cmp(&messages[a].importance_total())
            .then(a.cmp(&b))
    });
}

fn restore_order(messages: &[Message], mut indices: Vec<usize>) -> Vec<Message> {
    indices.sort_unstable();
    indices.into_iter().map(|i| messages[i].clone()).collect()
}
