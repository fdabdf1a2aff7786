//! Prometheus metrics for assistant-service.
//!
//! Recording helpers are no-ops until [`init_metrics`] has run, so library
//! code and tests can call them unconditionally.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Chat metrics
pub static CHAT_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Generation metrics
pub static GENERATION_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENERATION_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Calendar metrics
pub static CALENDAR_CACHE_LOOKUPS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static CALENDAR_FETCH_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

// Session metrics
pub static TOKEN_REFRESH_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup; later calls keep the first registry.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let chat_requests = IntCounterVec::new(
        Opts::new("chat_requests_total", "Total chat requests"),
        &["mode"], // mode: single, stream, summary
    )?;

    let generation_attempts = IntCounterVec::new(
        Opts::new(
            "genai_generation_attempts_total",
            "Language model generation attempts",
        ),
        &["outcome"], // outcome: success, timeout, error, exhausted
    )?;

    let generation_duration = HistogramVec::new(
        HistogramOpts::new(
            "genai_generation_duration_seconds",
            "Time from prompt submission to the end of the response",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["stream"],
    )?;

    let cache_lookups = IntCounterVec::new(
        Opts::new(
            "calendar_cache_lookups_total",
            "Calendar context cache lookups",
        ),
        &["result"], // result: hit, miss
    )?;

    let fetch_errors = IntCounterVec::new(
        Opts::new(
            "calendar_fetch_errors_total",
            "Calendar fetches that fell back to an empty context",
        ),
        &["error_type"],
    )?;

    let token_refresh = IntCounterVec::new(
        Opts::new("oauth_token_refresh_total", "Access token refresh outcomes"),
        &["outcome"],
    )?;

    registry.register(Box::new(chat_requests.clone()))?;
    registry.register(Box::new(generation_attempts.clone()))?;
    registry.register(Box::new(generation_duration.clone()))?;
    registry.register(Box::new(cache_lookups.clone()))?;
    registry.register(Box::new(fetch_errors.clone()))?;
    registry.register(Box::new(token_refresh.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = CHAT_REQUESTS_TOTAL.set(chat_requests);
    let _ = GENERATION_ATTEMPTS_TOTAL.set(generation_attempts);
    let _ = GENERATION_DURATION_SECONDS.set(generation_duration);
    let _ = CALENDAR_CACHE_LOOKUPS_TOTAL.set(cache_lookups);
    let _ = CALENDAR_FETCH_ERRORS_TOTAL.set(fetch_errors);
    let _ = TOKEN_REFRESH_TOTAL.set(token_refresh);

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

pub fn record_chat_request(mode: &str) {
    if let Some(counter) = CHAT_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[mode]).inc();
    }
}

pub fn record_generation_attempt(outcome: &str) {
    if let Some(counter) = GENERATION_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn observe_generation_duration(stream: bool, seconds: f64) {
    if let Some(histogram) = GENERATION_DURATION_SECONDS.get() {
        let label = if stream { "true" } else { "false" };
        histogram.with_label_values(&[label]).observe(seconds);
    }
}

pub fn record_cache_lookup(hit: bool) {
    if let Some(counter) = CALENDAR_CACHE_LOOKUPS_TOTAL.get() {
        counter
            .with_label_values(&[if hit { "hit" } else { "miss" }])
            .inc();
    }
}

pub fn record_calendar_fetch_error(error_type: &str) {
    if let Some(counter) = CALENDAR_FETCH_ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type]).inc();
    }
}

pub fn record_token_refresh(outcome: &str) {
    if let Some(counter) = TOKEN_REFRESH_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
        "# Error converting metrics to UTF-8\n".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render_after_init() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        record_chat_request("single");
        record_cache_lookup(true);
        record_token_refresh("success");

        let output = get_metrics();
        assert!(output.contains("chat_requests_total"));
        assert!(output.contains("calendar_cache_lookups_total"));
        assert!(output.contains("oauth_token_refresh_total"));
    }
}
