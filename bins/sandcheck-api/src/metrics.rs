// Prometheus metrics exported at GET /metrics

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref VERIFICATIONS: IntCounterVec = register_int_counter_vec!(
        "sandcheck_verifications_total",
        "Completed verifications by challenge kind and outcome",
        &["kind", "outcome"]
    )
    .expect("metric registration");
    pub static ref VERIFY_DURATION: HistogramVec = register_histogram_vec!(
        "sandcheck_verify_duration_seconds",
        "Wall-clock time spent verifying one submission",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric registration");
    pub static ref REJECTED: IntCounterVec = register_int_counter_vec!(
        "sandcheck_rejected_requests_total",
        "Requests refused before verification",
        &["reason"]
    )
    .expect("metric registration");
}

pub fn record_verification(kind: &str, is_correct: bool, seconds: f64) {
    let outcome = if is_correct { "correct" } else { "incorrect" };
    VERIFICATIONS.with_label_values(&[kind, outcome]).inc();
    VERIFY_DURATION.with_label_values(&[kind]).observe(seconds);
}

pub fn record_rejection(reason: &str) {
    REJECTED.with_label_values(&[reason]).inc();
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<(String, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((
        encoder.format_type().to_string(),
        String::from_utf8_lossy(&buffer).into_owned(),
    ))
}
