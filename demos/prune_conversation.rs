//! Example: analyze, prune and undo a short coding session
//!
//! Run with `cargo run --example prune_conversation`. Set
//! `CONTEXT_PRUNER_PRUNING__STRATEGY=aggressive` to change the default
//! strategy, or `RUST_LOG=context_pruner=debug` for scoring detail.

use chrono::{Duration, Utc};
use context_pruner::{
    context::ExternalContext, logging::init_tracing, metrics::METRICS, CodeFragment, Config,
    ContextOptimizer, ConversationContext, Message, MessageRole, MessageType, PruningStrategy,
    SummaryLevel, WordBasedEstimator,
};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = Config::load(None)?;
    init_tracing(&config.logging);

    let estimator = Arc::new(WordBasedEstimator::default());
    let optimizer = ContextOptimizer::from_config(&config, estimator.clone())?;

    let now = Utc::now();
    let transcript = [
        (MessageRole::User, MessageType::Query, "The session store loses entries under load, can you look at src/store.rs?"),
        (MessageRole::Assistant, MessageType::FileOperation, "Read file src/store.rs. The eviction path drops the write lock before reinserting the entry, which races with concurrent readers that expect the entry to still be present."),
        (MessageRole::Assistant, MessageType::Error, "error: test store::tests::concurrent_insert failed: expected 100 entries, found 97"),
        (MessageRole::Assistant, MessageType::CodeChange, "Modified function evict_oldest in src/store.rs to hold the lock across removal and reinsertion."),
        (MessageRole::User, MessageType::Query, "Does the benchmark still look fine after that change?"),
        (MessageRole::Assistant, MessageType::ToolUse, "Ran cargo bench for the store group. Throughput dropped by two percent, which is within noise for this machine and acceptable for the correctness fix."),
        (MessageRole::Assistant, MessageType::Success, "All tests pass and the concurrent insert test is stable across 50 runs, so the fix is complete."),
    ];

    let messages: Vec<Message> = transcript
        .iter()
        .enumerate()
        .map(|(i, (role, message_type, content))| {
            let mut message = Message::new(format!("m{}", i + 1), *role, *message_type, *content)
                .with_timestamp(now - Duration::minutes((transcript.len() - i) as i64 * 4))
                .with_estimated_tokens(estimator.as_ref())
                .with_files(["src/store.rs"]);
            if *message_type == MessageType::CodeChange {
                message = message.with_code_fragment(CodeFragment::new("rust").with_file("src/store.rs"));
            }
            if *message_type == MessageType::Error {
                message = message.with_error(true);
            }
            message
        })
        .collect();
    let context = ConversationContext::new(messages).with_active_files(["src/store.rs"]);

    let external = ExternalContext::new()
        .with_tokens("system_instructions", 1_800)
        .with_suggestion("Project instructions repeat the build steps twice");

    let report = optimizer.analyze(&context, &external, now);
    println!("Analysis:\n{}", serde_json::to_string_pretty(&report)?);

    // Tight budget so the demo shows every outcome
    let strategy = PruningStrategy::balanced().with_max_tokens(context.total_tokens / 2);
    let result = optimizer.prune(&context, Some(&strategy), now)?;
    println!(
        "\nPruned with '{}': {} preserved, {} summarized, {} removed ({:.1}% reduction)",
        result.strategy,
        result.metrics.messages_preserved,
        result.metrics.messages_summarized,
        result.metrics.messages_removed,
        result.metrics.reduction_percent
    );
    for summary in &result.summaries {
        println!("  [{}] {}", summary.level.as_str(), summary.text);
    }

    for summary in optimizer.summarize(&context.messages, SummaryLevel::Project) {
        println!("\nProject summary of {:?}:\n  {}", summary.source_ids, summary.text);
    }

    if let Some(record) = optimizer.take_undo_record(&result.operation_id) {
        println!(
            "\nUndo released {} removed messages; original order {:?}",
            record.removed_messages.len(),
            record.original_order
        );
    }

    println!("\n{}", METRICS.render());
    Ok(())
}
