//! Hierarchical extractive summarization
//!
//! Messages are segmented by one of three level-specific policies and each
//! segment is condensed into activities, code changes, file operations,
//! errors and an outcome, truncated to the level's character budget.

use super::models::{Message, MessageRole, MessageType, Summary, SummaryLevel};
use super::token_estimator::{TokenEstimator, WordBasedEstimator};
use chrono::Utc;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Summarizer trait for different summarization strategies
pub trait Summarizer: Send + Sync {
    /// Summarize an ordered message list at the requested granularity
    fn summarize(&self, messages: &[Message], level: SummaryLevel) -> Vec<Summary>;
}

/// Segmentation and extraction limits
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Session segments cut below this file-set Jaccard similarity
    pub session_similarity_threshold: f64,
    pub max_session_segment: usize,
    pub max_code_changes: usize,
    pub max_file_operations: usize,
    pub max_errors: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            session_similarity_threshold: 0.3,
            max_session_segment: 10,
            max_code_changes: 5,
            max_file_operations: 3,
            max_errors: 2,
        }
    }
}

static CODE_CHANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(added|modified|updated|created|removed|deleted|implemented|refactored|renamed)\s+(?:the\s+)?(function|method|class|struct|enum|trait|module|test|field)\s+`?([A-Za-z_][A-Za-z0-9_:]*)",
    )
    .expect("valid code change regex")
});

static FILE_OP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(created|modified|deleted|wrote|read|updated|moved|renamed)\s+(?:file\s+)?`?([\w./-]+\.[A-Za-z0-9]+)")
        .expect("valid file operation regex")
});

static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(error|exception|failed|failure|panicked)\b[:\s]+([^\n.]{1,80})")
        .expect("valid error regex")
});

const ACTIVITY_BUCKETS: &[(&str, &[&str])] = &[
    ("implementation", &["implement", "add ", "added", "create", "build"]),
    ("debugging", &["debug", "fix", "error", "bug", "issue"]),
    ("refactoring", &["refactor", "restructure", "clean up", "rename", "extract"]),
    ("testing", &["test", "assert", "coverage"]),
];

const COMPLETION_CUES: &[&str] = &["completed", "complete", "done", "finished", "resolved", "all tests pass"];

/// Extractive summarizer with immediate/session/project levels
pub struct HierarchicalSummarizer {
    estimator: Arc<dyn TokenEstimator>,
    config: SummarizerConfig,
}

impl Default for HierarchicalSummarizer {
    fn default() -> Self {
        Self::new(Arc::new(WordBasedEstimator::default()), SummarizerConfig::default())
    }
}

impl HierarchicalSummarizer {
    pub fn new(estimator: Arc<dyn TokenEstimator>, config: SummarizerConfig) -> Self {
        Self { estimator, config }
    }

    /// Split messages into segments according to the level's policy
    pub fn segment<'m>(&self, messages: &'m [Message], level: SummaryLevel) -> Vec<Vec<&'m Message>> {
        match level {
            SummaryLevel::Immediate => segment_by_interaction(messages),
            SummaryLevel::Session => self.segment_by_topic(messages),
            SummaryLevel::Project => segment_by_file(messages),
        }
    }

    fn segment_by_topic<'m>(&self, messages: &'m [Message]) -> Vec<Vec<&'m Message>> {
        let mut segments = Vec::new();
        let mut current: Vec<&Message> = Vec::new();
        let mut seen_files: BTreeSet<&str> = BTreeSet::new();

        for message in messages {
            let files: BTreeSet<&str> = message.metadata.files.iter().map(String::as_str).collect();

            // Messages without files carry no evidence of a topic change
            if !current.is_empty()
                && !files.is_empty()
                && jaccard(&seen_files, &files) < self.config.session_similarity_threshold
            {
                segments.push(std::mem::take(&mut current));
            }

            current.push(message);
            seen_files.extend(files);

            if current.len() >= self.config.max_session_segment {
                segments.push(std::mem::take(&mut current));
                seen_files.clear();
            }
        }

        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }

    /// Condense one segment, `None` when nothing could be extracted
    pub fn summarize_segment(&self, segment: &[&Message], level: SummaryLevel) -> Option<Summary> {
        let last = segment.last()?;

        let mut sections = Vec::new();

        let activities = extract_activities(segment);
        if !activities.is_empty() {
            sections.push(format!("Activities: {}.", activities.join(", ")));
        }
        let code_changes = extract_code_changes(segment, self.config.max_code_changes);
        if !code_changes.is_empty() {
            sections.push(format!("Code changes: {}.", code_changes.join(", ")));
        }
        let file_ops = extract_file_operations(segment, self.config.max_file_operations);
        if !file_ops.is_empty() {
            sections.push(format!("Files: {}.", file_ops.join(", ")));
        }
        let errors = extract_errors(segment, self.config.max_errors);
        if !errors.is_empty() {
            sections.push(format!("Errors: {}.", errors.join("; ")));
        }
        sections.push(format!("Outcome: {}.", outcome_label(last)));

        let text = truncate_to_budget(&sections.join(" "), level.char_budget());
        if text.trim().is_empty() {
            return None;
        }

        let original_tokens: usize = segment.iter().map(|m| m.token_count()).sum();
        let estimated_tokens = self.estimator.estimate(&text);

        Some(Summary {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            text,
            source_ids: segment.iter().map(|m| m.id.clone()).collect(),
            tokens_saved: original_tokens.saturating_sub(estimated_tokens),
            estimated_tokens,
            created_at: Utc::now(),
        })
    }
}

impl Summarizer for HierarchicalSummarizer {
    fn summarize(&self, messages: &[Message], level: SummaryLevel) -> Vec<Summary> {
        let segments = self.segment(messages, level);
        let summaries: Vec<Summary> = segments
            .iter()
            .filter_map(|segment| self.summarize_segment(segment, level))
            .collect();

        debug!(
            "Summarized {} messages into {} {} summaries",
            messages.len(),
            summaries.len(),
            level.as_str()
        );
        summaries
    }
}

/// Cut after an assistant reply once the segment holds a user message
fn segment_by_interaction(messages: &[Message]) -> Vec<Vec<&Message>> {
    let mut segments = Vec::new();
    let mut current: Vec<&Message> = Vec::new();
    let mut has_user = false;

    for message in messages {
        current.push(message);
        has_user |= message.role == MessageRole::User;

        if message.role == MessageRole::Assistant && has_user {
            segments.push(std::mem::take(&mut current));
            has_user = false;
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// One segment per first-referenced file; file-less messages lead
fn segment_by_file(messages: &[Message]) -> Vec<Vec<&Message>> {
    let mut unfiled: Vec<&Message> = Vec::new();
    let mut by_file: IndexMap<&str, Vec<&Message>> = IndexMap::new();

    for message in messages {
        match message.primary_file() {
            Some(file) => by_file.entry(file).or_default().push(message),
            None => unfiled.push(message),
        }
    }

    let mut segments = Vec::with_capacity(by_file.len() + 1);
    if !unfiled.is_empty() {
        segments.push(unfiled);
    }
    segments.extend(by_file.into_values());
    segments
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

fn extract_activities(segment: &[&Message]) -> Vec<String> {
    let mut activities = Vec::new();
    for message in segment {
        let lower = message.content.to_lowercase();
        for (name, cues) in ACTIVITY_BUCKETS {
            if cues.iter().any(|cue| lower.contains(cue)) {
                push_unique(&mut activities, name.to_string());
            }
        }
        if !message.metadata.tools.is_empty() || message.message_type == MessageType::ToolUse {
            push_unique(&mut activities, "tool usage".to_string());
        }
    }
    activities
}

fn extract_code_changes(segment: &[&Message], limit: usize) -> Vec<String> {
    let mut changes = Vec::new();
    for message in segment {
        for caps in CODE_CHANGE_RE.captures_iter(&message.content) {
            push_unique(
                &mut changes,
                format!("{} {} {}", caps[1].to_lowercase(), caps[2].to_lowercase(), &caps[3]),
            );
        }
        for fragment in &message.metadata.code_fragments {
            let label = fragment
                .file_path
                .clone()
                .unwrap_or_else(|| format!("{} code", fragment.language));
            push_unique(&mut changes, label);
        }
    }
    changes.truncate(limit);
    changes
}

fn extract_file_operations(segment: &[&Message], limit: usize) -> Vec<String> {
    let mut operations = Vec::new();
    for message in segment {
        for caps in FILE_OP_RE.captures_iter(&message.content) {
            push_unique(&mut operations, format!("{} {}", caps[1].to_lowercase(), &caps[2]));
        }
        for file in &message.metadata.files {
            push_unique(&mut operations, format!("worked on {}", file));
        }
    }
    operations.truncate(limit);
    operations
}

fn extract_errors(segment: &[&Message], limit: usize) -> Vec<String> {
    let mut errors = Vec::new();
    for message in segment.iter().filter(|m| m.metadata.has_error) {
        for caps in ERROR_RE.captures_iter(&message.content) {
            push_unique(&mut errors, format!("{} {}", caps[1].to_lowercase(), caps[2].trim()));
        }
    }
    errors.truncate(limit);
    errors
}

fn outcome_label(message: &Message) -> &'static str {
    if message.metadata.has_error {
        return "unresolved error";
    }
    let lower = message.content.to_lowercase();
    if message.message_type == MessageType::Success || COMPLETION_CUES.iter().any(|c| lower.contains(c)) {
        return "completed successfully";
    }
    if message.message_type == MessageType::CodeChange {
        return "implemented changes";
    }
    "in progress"
}

/// Cut to `budget` characters, preferring a sentence end past 70% of the budget
fn truncate_to_budget(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let cut: Vec<char> = text.chars().take(budget).collect();
    let sentence_end = cut.iter().rposition(|c| matches!(c, '.' | '!' | '?'));
    match sentence_end {
        Some(pos) if pos as f64 > budget as f64 * 0.7 => cut[..=pos].iter().collect(),
        _ => {
            let keep = budget.saturating_sub(3);
            let mut truncated: String = cut[..keep].iter().collect();
            truncated.push_str("...");
            truncated
        }
    }
}
