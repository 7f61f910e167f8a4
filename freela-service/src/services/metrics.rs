//! Prometheus metrics for the calculator and subscription pipelines.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec, TextEncoder,
};

pub static RATE_CALCULATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "freela_rate_calculations_total",
        "Rate calculations served, by tax regime",
        &["regime"]
    )
    .expect("metric can be registered")
});

pub static WEBHOOK_NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "freela_webhook_notifications_total",
        "Gateway webhook notifications received, by outcome",
        &["outcome"]
    )
    .expect("metric can be registered")
});

pub static SUBSCRIPTION_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "freela_subscription_operations_total",
        "Subscription API operations, by operation",
        &["operation"]
    )
    .expect("metric can be registered")
});

pub static DB_QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "freela_db_query_duration_seconds",
        "Database query latency in seconds"
    )
    .expect("metric can be registered")
});

/// Render all registered metrics in the Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    encoder.encode_to_string(&families).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_after_first_increment() {
        RATE_CALCULATIONS_TOTAL.with_label_values(&["MEI"]).inc();
        WEBHOOK_NOTIFICATIONS_TOTAL
            .with_label_values(&["ignored"])
            .inc();

        let rendered = get_metrics();
        assert!(rendered.contains("freela_rate_calculations_total"));
        assert!(rendered.contains("freela_webhook_notifications_total"));
    }
}
