//! Prometheus metrics for subscription-service.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter_vec,
    CounterVec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Store query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "subscription_db_query_duration_seconds",
            "Document store query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Engine operations by name and outcome
pub static SUBSCRIPTION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payments recorded by method
pub static PAYMENTS_RECORDED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Sum of recorded payment amounts
pub static PAYMENT_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Sweeper outcomes (expired, grace_activated, grace_ended, failed)
pub static SWEEP_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Failed best-effort side effects (coverage, notifications)
pub static SIDE_EFFECT_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    SUBSCRIPTION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_operations_total",
                "Total subscription engine operations by operation and outcome"
            ),
            &["operation", "outcome"]
        )
        .expect("Failed to register SUBSCRIPTION_OPERATIONS_TOTAL")
    });

    PAYMENTS_RECORDED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_payments_recorded_total",
                "Total payments recorded by payment method"
            ),
            &["payment_method"]
        )
        .expect("Failed to register PAYMENTS_RECORDED_TOTAL")
    });

    PAYMENT_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "subscription_payment_amount_total",
                "Sum of recorded payment amounts"
            ),
            &["payment_method"]
        )
        .expect("Failed to register PAYMENT_AMOUNT_TOTAL")
    });

    SWEEP_OUTCOMES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_sweep_outcomes_total",
                "Expiry sweeper outcomes"
            ),
            &["outcome"]
        )
        .expect("Failed to register SWEEP_OUTCOMES_TOTAL")
    });

    SIDE_EFFECT_FAILURES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_side_effect_failures_total",
                "Best-effort side effects that failed"
            ),
            &["side_effect"]
        )
        .expect("Failed to register SIDE_EFFECT_FAILURES_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_operation(operation: &str, outcome: &str) {
    if let Some(counter) = SUBSCRIPTION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[operation, outcome]).inc();
    }
}

/// Record a payment and its amount.
pub fn record_payment(payment_method: &str, amount: f64) {
    if let Some(counter) = PAYMENTS_RECORDED_TOTAL.get() {
        counter.with_label_values(&[payment_method]).inc();
    }
    if let Some(counter) = PAYMENT_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[payment_method])
            .inc_by(amount.abs());
    }
}

pub fn record_sweep_outcome(outcome: &str, count: usize) {
    if let Some(counter) = SWEEP_OUTCOMES_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc_by(count as u64);
    }
}

pub fn record_side_effect_failure(side_effect: &str) {
    if let Some(counter) = SIDE_EFFECT_FAILURES_TOTAL.get() {
        counter.with_label_values(&[side_effect]).inc();
    }
}
