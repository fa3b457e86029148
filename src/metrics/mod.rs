//! Metrics collection for observability

use prometheus::{
    exponential_buckets, register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Encoder, Histogram, HistogramVec, Opts, Registry, TextEncoder,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Scoring metrics
    pub scoring_passes: Counter,
    pub messages_scored: Counter,
    pub scoring_duration: Histogram,

    // Pruning metrics
    pub pruning_operations: CounterVec,
    pub pruned_messages: CounterVec,
    pub tokens_saved: Histogram,
    pub budget_overrides: Counter,
    pub summaries_generated: CounterVec,
    pub operation_duration: HistogramVec,

    // Undo metrics
    pub undo_requests: CounterVec,
    pub undo_evictions: Counter,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Scoring metrics
        let scoring_passes = register_counter_with_registry!(
            Opts::new("context_scoring_passes_total", "Total importance scoring passes"),
            registry
        )?;

        let messages_scored = register_counter_with_registry!(
            Opts::new("context_messages_scored_total", "Total messages scored"),
            registry
        )?;

        let scoring_duration = register_histogram_with_registry!(
            "context_scoring_duration_seconds",
            "Importance scoring pass duration in seconds",
            registry
        )?;

        // Pruning metrics
        let pruning_operations = register_counter_vec_with_registry!(
            Opts::new("context_pruning_operations_total", "Total pruning operations"),
            &["strategy"],
            registry
        )?;

        let pruned_messages = register_counter_vec_with_registry!(
            Opts::new("context_pruned_messages_total", "Messages by pruning outcome"),
            &["outcome"],
            registry
        )?;

        let tokens_saved = register_histogram_with_registry!(
            "context_tokens_saved",
            "Tokens reclaimed per pruning operation",
            exponential_buckets(100.0, 4.0, 8)?,
            registry
        )?;

        let budget_overrides = register_counter_with_registry!(
            Opts::new(
                "context_budget_overrides_total",
                "Pruning operations where force-preserved messages exceeded the budget"
            ),
            registry
        )?;

        let summaries_generated = register_counter_vec_with_registry!(
            Opts::new("context_summaries_generated_total", "Summaries generated"),
            &["level"],
            registry
        )?;

        let operation_duration = register_histogram_vec_with_registry!(
            "context_operation_duration_seconds",
            "Optimizer operation duration in seconds",
            &["operation"],
            registry
        )?;

        // Undo metrics
        let undo_requests = register_counter_vec_with_registry!(
            Opts::new("context_undo_requests_total", "Total undo requests"),
            &["status"],
            registry
        )?;

        let undo_evictions = register_counter_with_registry!(
            Opts::new("context_undo_evictions_total", "Undo records evicted at capacity"),
            registry
        )?;

        Ok(Self {
            registry,
            scoring_passes,
            messages_scored,
            scoring_duration,
            pruning_operations,
            pruned_messages,
            tokens_saved,
            budget_overrides,
            summaries_generated,
            operation_duration,
            undo_requests,
            undo_evictions,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a completed scoring pass
    pub fn record_scoring(&self, messages: usize, seconds: f64) {
        self.scoring_passes.inc();
        self.messages_scored.inc_by(messages as f64);
        self.scoring_duration.observe(seconds);
    }

    /// Record the outcome of a pruning operation
    pub fn record_pruning(
        &self,
        strategy: &str,
        preserved: usize,
        summarized: usize,
        removed: usize,
        tokens_saved: usize,
        budget_exceeded: bool,
    ) {
        self.pruning_operations.with_label_values(&[strategy]).inc();
        self.pruned_messages
            .with_label_values(&["preserved"])
            .inc_by(preserved as f64);
        self.pruned_messages
            .with_label_values(&["summarized"])
            .inc_by(summarized as f64);
        self.pruned_messages
            .with_label_values(&["removed"])
            .inc_by(removed as f64);
        self.tokens_saved.observe(tokens_saved as f64);
        if budget_exceeded {
            self.budget_overrides.inc();
        }
    }

    /// Record generated summaries for a level
    pub fn record_summaries(&self, level: &str, count: usize) {
        self.summaries_generated
            .with_label_values(&[level])
            .inc_by(count as f64);
    }

    /// Record an undo request
    pub fn record_undo(&self, found: bool) {
        let status = if found { "hit" } else { "miss" };
        self.undo_requests.with_label_values(&[status]).inc();
    }

    pub fn record_undo_eviction(&self) {
        self.undo_evictions.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Helper macro to time operations
#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $label:expr, $operation:expr) => {{
        let timer = $histogram.with_label_values(&[$label]).start_timer();
        let result = $operation;
        timer.observe_duration();
        result
    }};
}
