use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};
use tracing::warn;

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "devcamper_http_requests_total",
        "HTTP requests by route and status",
        &["method", "route", "status"]
    )
    .expect("register devcamper_http_requests_total")
});

pub static QUERY_DURATION_SEC: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "devcamper_query_duration_seconds",
        "Count + find time per list request",
        &["collection"],
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5]
    )
    .expect("register devcamper_query_duration_seconds")
});

pub static GEOCODE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "devcamper_geocode_total",
        "Geocode lookups by result",
        &["result"]
    )
    .expect("register devcamper_geocode_total")
});

pub static GEOCODE_DURATION_SEC: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "devcamper_geocode_duration_seconds",
        "Geocode lookup latency",
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("register devcamper_geocode_duration_seconds")
});

pub static SNAPSHOT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("devcamper_snapshot_total", "Snapshots by result", &["result"])
        .expect("register devcamper_snapshot_total")
});

pub static SNAPSHOT_DURATION_SEC: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("devcamper_snapshot_duration_seconds", "Snapshot duration")
        .expect("register devcamper_snapshot_duration_seconds")
});

/// Registers every metric so the first scrape already lists them.
pub fn init() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&QUERY_DURATION_SEC);
    Lazy::force(&GEOCODE_TOTAL);
    Lazy::force(&GEOCODE_DURATION_SEC);
    Lazy::force(&SNAPSHOT_TOTAL);
    Lazy::force(&SNAPSHOT_DURATION_SEC);
}

/// Counts every routed request by its route template.
pub async fn track(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let method = req.method().to_string();
    let res = next.run(req).await;
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), route.as_str(), res.status().as_str()])
        .inc();
    res
}

/// Prometheus text exposition of the default registry.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        warn!(error = %e, "metrics encoding failed");
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_exposes_registered_metrics() {
        init();
        GEOCODE_TOTAL.with_label_values(&["ok"]).inc();
        let text = render();
        assert!(text.contains(r#"devcamper_geocode_total{result="ok"}"#));
        assert!(text.contains("devcamper_snapshot_duration_seconds_count"));
    }
}
