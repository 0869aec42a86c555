// Prometheus metrics for the execution endpoint

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use scriptorium_common::types::ExecutionOutcome;

lazy_static! {
    pub static ref EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "scriptorium_executions_total",
        "Executions by language and classification",
        &["language", "classification"]
    )
    .expect("metric registration");
    pub static ref EXECUTION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "scriptorium_execution_duration_seconds",
        "Container run time per execution",
        &["language"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]
    )
    .expect("metric registration");
    pub static ref REJECTED_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "scriptorium_rejected_requests_total",
        "Execute requests refused before running anything",
        &["reason"]
    )
    .expect("metric registration");
    pub static ref INTERNAL_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "scriptorium_internal_failures_total",
        "Workspace or container runtime failures"
    )
    .expect("metric registration");
}

/// Register every metric so the first scrape lists them at zero
pub fn init() {
    lazy_static::initialize(&EXECUTIONS_TOTAL);
    lazy_static::initialize(&EXECUTION_DURATION_SECONDS);
    lazy_static::initialize(&REJECTED_REQUESTS_TOTAL);
    lazy_static::initialize(&INTERNAL_FAILURES_TOTAL);
}

pub fn record_outcome(language: &str, outcome: &ExecutionOutcome) {
    EXECUTIONS_TOTAL
        .with_label_values(&[language, outcome.classification.as_str()])
        .inc();
    EXECUTION_DURATION_SECONDS
        .with_label_values(&[language])
        .observe(outcome.execution_time_ms as f64 / 1000.0);
}

pub fn record_rejection(reason: &str) {
    REJECTED_REQUESTS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_internal_failure() {
    INTERNAL_FAILURES_TOTAL.inc();
}

/// Text exposition of the default registry
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
