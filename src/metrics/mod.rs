//! Prometheus metrics for the request pipeline.
//!
//! Recorded by the `Metrics` and `Panics` middleware and rendered in text
//! exposition format by `GET /metrics`. Route labels use the matched route
//! template, not the raw path, so label cardinality stays bounded.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_errors_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_requests_in_flight: IntGauge,
    http_panics_total: IntCounter,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .field("in_flight", &self.in_flight())
            .field("panics", &self.panics())
            .finish()
    }
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("sales_http_requests_total", "Total HTTP requests"),
            &["method", "route", "status"],
        )?;

        let http_errors_total = IntCounterVec::new(
            Opts::new("sales_http_errors_total", "Total HTTP errors (4xx and 5xx)"),
            &["method", "route", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sales_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method", "route"],
        )?;

        let http_requests_in_flight =
            IntGauge::new("sales_http_requests_in_flight", "Requests currently being handled")?;

        let http_panics_total =
            IntCounter::new("sales_http_panics_total", "Handler panics recovered")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_panics_total.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_errors_total,
                http_request_duration_seconds,
                http_requests_in_flight,
                http_panics_total,
            }),
        })
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        sum_counters(&self.inner.http_requests_total)
    }

    /// Total error count across all labels.
    pub fn errors(&self) -> u64 {
        sum_counters(&self.inner.http_errors_total)
    }

    pub fn in_flight(&self) -> i64 {
        self.inner.http_requests_in_flight.get()
    }

    pub fn panics(&self) -> u64 {
        self.inner.http_panics_total.get()
    }

    pub fn record_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, route, &status_str])
            .inc();

        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, route])
            .observe(duration_secs);

        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, route, &status_str])
                .inc();
        }
    }

    pub fn record_panic(&self) {
        self.inner.http_panics_total.inc();
    }

    /// Increment the in-flight gauge until the returned guard is dropped.
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.inner.http_requests_in_flight.inc();
        InFlightGuard {
            gauge: self.inner.http_requests_in_flight.clone(),
        }
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer)
            .map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

/// Decrements the in-flight gauge on drop, including when the request future
/// is cancelled or unwinds.
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

fn sum_counters(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_at_zero() {
        let m = ApiMetrics::new().unwrap();
        assert_eq!(m.requests(), 0);
        assert_eq!(m.errors(), 0);
        assert_eq!(m.in_flight(), 0);
        assert_eq!(m.panics(), 0);
    }

    #[test]
    fn test_errors_count_only_4xx_and_5xx() {
        let m = ApiMetrics::new().unwrap();
        m.record_request("GET", "/test", 200, 0.01);
        m.record_request("GET", "/test/auth", 401, 0.01);
        m.record_request("GET", "/test", 500, 0.2);

        assert_eq!(m.requests(), 3);
        assert_eq!(m.errors(), 2);
    }

    #[test]
    fn test_in_flight_guard_decrements_on_drop() {
        let m = ApiMetrics::new().unwrap();
        let a = m.track_in_flight();
        let b = m.track_in_flight();
        assert_eq!(m.in_flight(), 2);

        drop(a);
        assert_eq!(m.in_flight(), 1);
        drop(b);
        assert_eq!(m.in_flight(), 0);
    }

    #[test]
    fn test_encode_uses_route_labels() {
        let m = ApiMetrics::new().unwrap();
        m.record_request("GET", "/users/:user_id", 200, 0.01);
        m.record_panic();

        let text = m.gather_and_encode().unwrap();
        assert!(text.contains("sales_http_requests_total"));
        assert!(text.contains("route=\"/users/:user_id\""));
        assert!(text.contains("sales_http_panics_total 1"));
    }
}
