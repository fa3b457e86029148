//! Data models for conversation pruning

use super::token_estimator::TokenEstimator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Closed vocabulary of message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Query,
    CodeChange,
    FileOperation,
    Error,
    Success,
    ToolUse,
    Summary,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::Query,
        MessageType::CodeChange,
        MessageType::FileOperation,
        MessageType::Error,
        MessageType::Success,
        MessageType::ToolUse,
        MessageType::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Query => "query",
            MessageType::CodeChange => "code_change",
            MessageType::FileOperation => "file_operation",
            MessageType::Error => "error",
            MessageType::Success => "success",
            MessageType::ToolUse => "tool_use",
            MessageType::Summary => "summary",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {}", s))
    }
}

/// Code embedded in a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFragment {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,
}

impl CodeFragment {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            file_path: None,
            line_range: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_lines(mut self, start: u32, end: u32) -> Self {
        self.line_range = Some((start, end));
        self
    }
}

/// Per-message metadata supplied by the upstream normalizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub token_count: usize,
    /// Referenced file paths (order carries no meaning)
    #[serde(default)]
    pub files: BTreeSet<String>,
    #[serde(default)]
    pub code_fragments: Vec<CodeFragment>,
    #[serde(default)]
    pub has_error: bool,
    #[serde(default)]
    pub tools: BTreeSet<String>,
}

/// Diagnostic sub-scores. Never read back by the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub lexical: f64,
    pub vector: f64,
    pub contextual: f64,
    pub thread_continuity: f64,
    pub reference_chain: f64,
    pub information_density: f64,
}

/// Fused retention priority of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceScore {
    /// Weighted sum of the components
    pub total: f64,
    pub recency: f64,
    /// Hybrid lexical + vector + contextual
    pub semantic: f64,
    pub references: f64,
    pub file_relevance: f64,
    pub coherence: f64,
    pub computed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

/// Immutable conversational unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
    /// Derived attribute, overwritten by every scoring pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<ImportanceScore>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(
        id: impl Into<String>,
        role: MessageRole,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            role,
            message_type,
            content: content.into(),
            metadata: MessageMetadata::default(),
            importance: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_tokens(mut self, token_count: usize) -> Self {
        self.metadata.token_count = token_count;
        self
    }

    /// Fill the token count from a pluggable estimator
    pub fn with_estimated_tokens(mut self, estimator: &dyn TokenEstimator) -> Self {
        self.metadata.token_count = estimator.estimate(&self.content);
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_code_fragment(mut self, fragment: CodeFragment) -> Self {
        self.metadata.code_fragments.push(fragment);
        self
    }

    pub fn with_error(mut self, has_error: bool) -> Self {
        self.metadata.has_error = has_error;
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Return a copy carrying the given score
    pub fn with_importance(mut self, score: ImportanceScore) -> Self {
        self.importance = Some(score);
        self
    }

    pub fn token_count(&self) -> usize {
        self.metadata.token_count
    }

    pub fn has_code(&self) -> bool {
        !self.metadata.code_fragments.is_empty()
    }

    /// Total importance, zero when unscored
    pub fn importance_total(&self) -> f64 {
        self.importance.as_ref().map(|s| s.total).unwrap_or(0.0)
    }

    /// First referenced file in path order
    pub fn primary_file(&self) -> Option<&str> {
        self.metadata.files.iter().next().map(String::as_str)
    }
}

/// Ordered conversation snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub messages: Vec<Message>,
    pub total_tokens: usize,
    #[serde(default)]
    pub active_files: BTreeSet<String>,
    pub start_time: DateTime<Utc>,
}

impl ConversationContext {
    /// Build a context, deriving the token total and start time
    pub fn new(messages: Vec<Message>) -> Self {
        let total_tokens = messages.iter().map(Message::token_count).sum();
        let start_time = messages
            .iter()
            .map(|m| m.timestamp)
            .min()
            .unwrap_or_else(Utc::now);

        Self {
            messages,
            total_tokens,
            active_files: BTreeSet::new(),
            start_time,
        }
    }

    pub fn with_active_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }
}

/// Summary granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryLevel {
    Immediate,
    Session,
    Project,
}

impl SummaryLevel {
    /// Character budget of a summary at this level
    pub fn char_budget(&self) -> usize {
        match self {
            SummaryLevel::Immediate => 200,
            SummaryLevel::Session => 500,
            SummaryLevel::Project => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Immediate => "immediate",
            SummaryLevel::Session => "session",
            SummaryLevel::Project => "project",
        }
    }
}

impl FromStr for SummaryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(SummaryLevel::Immediate),
            "session" => Ok(SummaryLevel::Session),
            "project" => Ok(SummaryLevel::Project),
            other => Err(format!("unknown summary level: {}", other)),
        }
    }
}

/// Compact replacement for a segment of messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub level: SummaryLevel,
    pub text: String,
    /// Replaced message ids, in conversation order
    pub source_ids: Vec<String>,
    pub tokens_saved: usize,
    /// Estimated size of `text` itself
    pub estimated_tokens: usize,
    pub created_at: DateTime<Utc>,
}

impl Summary {
    /// Stand-in message that can re-enter the conversation
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            timestamp: self.created_at,
            role: MessageRole::Assistant,
            message_type: MessageType::Summary,
            content: self.text.clone(),
            metadata: MessageMetadata {
                token_count: self.estimated_tokens,
                ..MessageMetadata::default()
            },
            importance: None,
        }
    }
}
