//! End-to-end tests for scoring, pruning, summarization and undo
//!
//! These exercise the public optimizer API the way a caller would: build a
//! conversation snapshot, analyze it, prune it, and reverse the decision.

use chrono::{DateTime, Duration, Utc};
use context_pruner::{
    context::ExternalContext,
    pruning::{PruningStrategy, UndoBuffer},
    scoring::{analyze_redundancy, importance::reference_score, Bm25Index, Bm25Params, ImportanceConfig},
    CodeFragment, ContextOptimizer, ConversationContext, ImportanceScorer, Message, MessageRole,
    MessageType, ScoringProfile, SummaryLevel, TokenEstimator, WordBasedEstimator,
};
use std::collections::HashSet;
use std::sync::Arc;

const TOPICS: &[&str] = &[
    "Refactor the lexer so that token spans are tracked in src/lexer.rs and update the tests",
    "The build failed with error: mismatched types in parser.rs when matching on Token::Ident",
    "Implemented function parse_expression with precedence climbing and added unit tests",
    "Read file docs/grammar.md to check the operator table before changing the parser",
    "Ran cargo test, all tests pass after the precedence fix in the expression parser",
];

/// Deterministic mixed conversation of `n` messages
fn build_conversation(n: usize, now: DateTime<Utc>) -> ConversationContext {
    let types = [
        MessageType::Query,
        MessageType::CodeChange,
        MessageType::Error,
        MessageType::FileOperation,
        MessageType::Success,
        MessageType::ToolUse,
    ];
    let files = ["src/lexer.rs", "src/parser.rs", "docs/grammar.md"];

    let messages = (0..n)
        .map(|i| {
            let message_type = types[(i * 7 + 3) % types.len()];
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            let body = TOPICS[(i * 3) % TOPICS.len()];
            let content = format!("{} (step {}). {}", body, i, body.repeat(1 + i % 3));
            let mut message = Message::new(format!("msg-{:03}", i), role, message_type, content)
                .with_timestamp(now - Duration::minutes((n - i) as i64))
                .with_tokens(40 + (i * 37) % 260)
                .with_files([files[i % files.len()]]);
            if message_type == MessageType::CodeChange {
                message = message.with_code_fragment(CodeFragment::new("rust").with_file(files[i % 2]));
            }
            if message_type == MessageType::Error {
                message = message.with_error(true);
            }
            if message_type == MessageType::ToolUse {
                message = message.with_tools(["cargo"]);
            }
            message
        })
        .collect();

    ConversationContext::new(messages).with_active_files(["src/parser.rs"])
}

fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.clone()).collect()
}

#[test]
fn test_partitions_are_disjoint_and_complete() {
    let now = Utc::now();
    let context = build_conversation(40, now);
    let optimizer = ContextOptimizer::default();

    for name in PruningStrategy::PRESETS {
        let strategy = PruningStrategy::by_name(name).unwrap().with_max_tokens(context.total_tokens / 3);
        let result = optimizer.prune(&context, Some(&strategy), now).unwrap();

        let mut seen = HashSet::new();
        for set in [&result.preserved, &result.summarized, &result.removed] {
            for message in set.iter() {
                assert!(seen.insert(message.id.clone()), "{} appears twice", message.id);
            }
        }
        let expected: HashSet<String> = context.message_ids().into_iter().collect();
        assert_eq!(seen, expected, "strategy {}", name);

        let summarized_sources: HashSet<&str> = result
            .summaries
            .iter()
            .flat_map(|s| s.source_ids.iter().map(String::as_str))
            .collect();
        let summarized: HashSet<&str> = result.summarized.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(summarized_sources, summarized);
    }
}

#[test]
fn test_partitions_keep_conversation_order() {
    let now = Utc::now();
    let context = build_conversation(30, now);
    let optimizer = ContextOptimizer::default();
    let strategy = PruningStrategy::aggressive().with_max_tokens(1_000);

    let result = optimizer.prune(&context, Some(&strategy), now).unwrap();

    for set in [&result.preserved, &result.summarized, &result.removed] {
        let members: HashSet<&str> = set.iter().map(|m| m.id.as_str()).collect();
        let expected: Vec<String> = context
            .messages
            .iter()
            .filter(|m| members.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect();
        assert_eq!(ids(set), expected);
    }
}

#[test]
fn test_force_preserved_types_survive() {
    let now = Utc::now();
    let context = build_conversation(30, now);
    let optimizer = ContextOptimizer::default();
    let strategy = PruningStrategy::balanced().with_max_tokens(500);

    let result = optimizer.prune(&context, Some(&strategy), now).unwrap();
    let preserved: HashSet<&str> = result.preserved.iter().map(|m| m.id.as_str()).collect();
    for message in &context.messages {
        if matches!(message.message_type, MessageType::Error | MessageType::CodeChange) {
            assert!(preserved.contains(message.id.as_str()), "{} was dropped", message.id);
        }
    }
    assert!(result.metrics.budget_exceeded);
}

#[test]
fn test_recency_decreases_with_age() {
    let now = Utc::now();
    let scorer = ImportanceScorer::new(ImportanceConfig::default());

    assert_eq!(scorer.recency_score(now, now), 1.0);
    let mut previous = 1.0;
    for minutes in [1, 2, 5, 30, 120] {
        let score = scorer.recency_score(now - Duration::minutes(minutes), now);
        assert!(score < previous);
        previous = score;
    }
}

#[test]
fn test_reference_score_caps_at_ten() {
    let mut previous = 0.0;
    for count in 0..20 {
        let score = reference_score(count);
        assert!(score >= previous);
        previous = score;
    }
    assert_eq!(reference_score(10), 1.0);
    assert_eq!(reference_score(25), 1.0);
}

#[test]
fn test_bm25_self_score_dominates() {
    let corpus = [
        "the parser rejects nested generic arguments",
        "lexer emits wrong spans for unicode identifiers",
        "parser recovers after a missing semicolon",
    ];
    let index = Bm25Index::build(&corpus, Bm25Params::default());

    for (i, text) in corpus.iter().enumerate() {
        let own = index.score(text, i);
        for j in (0..corpus.len()).filter(|&j| j != i) {
            assert!(own >= index.score(text, j));
        }
        for other in corpus.iter().filter(|o| *o != text) {
            let self_similarity = Bm25Index::similarity(text, text, Bm25Params::default());
            assert!(self_similarity >= Bm25Index::similarity(text, other, Bm25Params::default()));
        }
    }
}

#[test]
fn test_identical_content_is_fully_redundant() {
    let messages: Vec<Message> = (0..5)
        .map(|i| Message::new(format!("m{}", i), MessageRole::User, MessageType::Query, "please rerun the build"))
        .collect();
    assert_eq!(analyze_redundancy(&messages).content, 1.0);
}

#[test]
fn test_pruning_within_budget_is_noop() {
    let now = Utc::now();
    let context = build_conversation(12, now);
    let optimizer = ContextOptimizer::default();
    let strategy = PruningStrategy::conservative().with_max_tokens(context.total_tokens + 1);

    let result = optimizer.prune(&context, Some(&strategy), now).unwrap();
    assert_eq!(result.metrics.messages_removed, 0);
    assert_eq!(result.metrics.messages_summarized, 0);
    assert_eq!(result.metrics.reduction_percent, 0.0);
    assert_eq!(ids(&result.preserved), context.message_ids());
}

#[test]
fn test_empty_context_analysis() {
    let optimizer = ContextOptimizer::default();
    let report = optimizer.analyze(&ConversationContext::new(Vec::new()), &ExternalContext::default(), Utc::now());

    assert_eq!(report.message_count, 0);
    assert_eq!(report.conversation_tokens, 0);
    assert_eq!(report.average_importance, 0.0);
}

#[test]
fn test_undo_buffer_capacity() {
    let now = Utc::now();
    let context = build_conversation(8, now);
    let optimizer = ContextOptimizer::new(
        ScoringProfile::default(),
        ImportanceConfig::default(),
        Arc::new(WordBasedEstimator::default()),
        PruningStrategy::balanced(),
        SummaryLevel::Session,
        UndoBuffer::new(3),
    );

    let operations: Vec<String> = (0..4)
        .map(|_| optimizer.prune(&context, None, now).unwrap().operation_id)
        .collect();

    assert_eq!(optimizer.undo_history(), operations[1..].to_vec());
    assert!(optimizer.undo_record(&operations[0]).is_none());
    assert!(!optimizer.undo(&operations[0]));
    assert!(optimizer.undo(&operations[3]));
    assert!(!optimizer.undo(&operations[3]));
}

#[test]
fn test_undo_record_restores_conversation() {
    let now = Utc::now();
    let context = build_conversation(20, now);
    let optimizer = ContextOptimizer::default();
    let strategy = PruningStrategy::aggressive().with_max_tokens(800);

    let result = optimizer.prune(&context, Some(&strategy), now).unwrap();
    let record = optimizer.take_undo_record(&result.operation_id).unwrap();
    assert_eq!(ids(&record.removed_messages), ids(&result.removed));
    assert_eq!(record.original_order, context.message_ids());

    // Preserved, summary sources and removed messages rebuild the original
    let mut pool: Vec<Message> = result.preserved.clone();
    pool.extend(result.summarized.iter().cloned());
    pool.extend(record.removed_messages);
    let rebuilt: Vec<String> = record
        .original_order
        .iter()
        .filter_map(|id| pool.iter().find(|m| &m.id == id).map(|m| m.id.clone()))
        .collect();
    assert_eq!(rebuilt, context.message_ids());
}

#[test]
fn test_three_message_scenario() {
    let now = Utc::now();
    let messages = vec![
        Message::new("query", MessageRole::User, MessageType::Query, "Can you add input validation?")
            .with_timestamp(now - Duration::minutes(3))
            .with_tokens(40),
        Message::new(
            "change",
            MessageRole::Assistant,
            MessageType::CodeChange,
            "Added function validate_input to src/input.rs",
        )
        .with_timestamp(now - Duration::minutes(2))
        .with_tokens(200)
        .with_code_fragment(CodeFragment::new("rust").with_file("src/input.rs").with_lines(10, 42)),
        Message::new("error", MessageRole::Assistant, MessageType::Error, "error: unused variable `len`")
            .with_timestamp(now - Duration::minutes(1))
            .with_tokens(30)
            .with_error(true),
    ];
    let context = ConversationContext::new(messages);
    let strategy = PruningStrategy::balanced()
        .with_max_tokens(500)
        .with_always_preserve([MessageType::Error, MessageType::CodeChange]);

    let optimizer = ContextOptimizer::default();
    let result = optimizer.prune(&context, Some(&strategy), now).unwrap();

    let preserved: Vec<String> = ids(&result.preserved);
    assert!(preserved.contains(&"change".to_string()));
    assert!(preserved.contains(&"error".to_string()));
    assert!(result.metrics.messages_removed <= 1);
    assert_eq!(result.metrics.messages_summarized, 0);
    assert!(result.metrics.final_tokens >= 230);
}

#[test]
fn test_huge_single_message_recommends_aggressive() {
    let now = Utc::now();
    let estimator = WordBasedEstimator::default();
    let content = "word ".repeat(120_000);
    assert_eq!(content.len(), 600_000);

    let message = Message::new("huge", MessageRole::User, MessageType::Query, content)
        .with_timestamp(now)
        .with_estimated_tokens(&estimator);
    assert!(message.token_count() > 150_000);

    let optimizer = ContextOptimizer::default();
    let report = optimizer.analyze(&ConversationContext::new(vec![message]), &ExternalContext::default(), now);
    assert_eq!(report.recommended_strategy, "aggressive");
    assert!(report.estimated_reduction_percent > 0.0);
}

#[test]
fn test_summaries_at_every_level() {
    let now = Utc::now();
    let context = build_conversation(25, now);
    let optimizer = ContextOptimizer::default();
    let estimator = optimizer.estimator().clone();

    for level in [SummaryLevel::Immediate, SummaryLevel::Session, SummaryLevel::Project] {
        let summaries = optimizer.summarize(&context.messages, level);
        assert!(!summaries.is_empty());

        let covered: usize = summaries.iter().map(|s| s.source_ids.len()).sum();
        assert_eq!(covered, context.len());
        for summary in &summaries {
            assert!(summary.text.chars().count() <= level.char_budget());
            assert_eq!(summary.estimated_tokens, estimator.estimate(&summary.text));
        }
    }
}

#[test]
fn test_profile_swap_changes_scores() {
    let now = Utc::now();
    let context = build_conversation(15, now);
    let optimizer = ContextOptimizer::default();

    let before = optimizer.score(&context, now);
    optimizer.set_profile_by_name("debugging").unwrap();
    let after = optimizer.score(&context, now);

    assert_eq!(ids(&before), ids(&after));
    assert!(before
        .iter()
        .zip(&after)
        .any(|(a, b)| a.importance_total() != b.importance_total()));
}

#[test]
fn test_scoring_is_deterministic() {
    let now = Utc::now();
    let context = build_conversation(20, now);
    let optimizer = ContextOptimizer::default();

    let first: Vec<f64> = optimizer.score(&context, now).iter().map(Message::importance_total).collect();
    let second: Vec<f64> = optimizer.score(&context, now).iter().map(Message::importance_total).collect();
    assert_eq!(first, second);
    assert!(first.iter().all(|s| s.is_finite() && *s >= 0.0));
}
