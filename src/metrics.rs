/// Metrics and telemetry for CloudPocket
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Login outcomes and OTP traffic
/// - Document uploads
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Login attempts by outcome
    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Login attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Registrations completed
    pub static ref REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        "registrations_total",
        "Number of completed registrations"
    )
    .unwrap();

    // ========== OTP Metrics ==========

    /// Passcodes sent by purpose
    pub static ref OTP_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "otp_sent_total",
        "One-time passcodes sent",
        &["purpose"]
    )
    .unwrap();

    /// Passcode checks by verdict
    pub static ref OTP_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "otp_verifications_total",
        "One-time passcode checks by verdict",
        &["verdict"]
    )
    .unwrap();

    // ========== Document Metrics ==========

    /// Files uploaded, including replacements
    pub static ref DOCUMENTS_UPLOADED: IntCounter = register_int_counter!(
        "documents_uploaded_total",
        "Files uploaded to blob storage"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a login attempt (`success`, `wrong_password`, `locked`, `unknown_user`)
pub fn record_login(outcome: &str) {
    LOGINS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a passcode being sent
pub fn record_otp_sent(purpose: &str) {
    OTP_SENT_TOTAL.with_label_values(&[purpose]).inc();
}

/// Record a passcode check
pub fn record_otp_verification(verdict: &str) {
    OTP_VERIFICATIONS_TOTAL.with_label_values(&[verdict]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}
