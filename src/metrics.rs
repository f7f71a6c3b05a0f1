//! Prometheus metrics for the HTTP surface and order placement.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Label attached by error responses so the middleware can count them by kind.
#[derive(Debug, Clone, Copy)]
pub struct ErrorKind(pub &'static str);

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// Method and route template, e.g. "GET /api/orders/{id}"
    pub route: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    pub route: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub route: String,
    pub kind: String,
}

pub struct MetricsCollector {
    registry: RwLock<Registry>,
    pub http_requests_total: Family<RequestLabels, Counter>,
    pub http_request_duration_seconds: Family<RouteLabels, Histogram>,
    pub http_active_requests: Gauge,
    pub errors_total: Family<ErrorLabels, Counter>,
    pub orders_created_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("forgeworks");

        let http_requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total number of HTTP requests by route and status",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<RouteLabels, Histogram>::new_with_constructor(|| {
                // 1ms .. ~16s
                Histogram::new(exponential_buckets(0.001, 2.5, 12))
            });
        registry.register(
            "http_request_duration_seconds",
            "Request latency histogram in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_active_requests = Gauge::default();
        registry.register(
            "http_active_requests",
            "Number of requests currently being processed",
            http_active_requests.clone(),
        );

        let errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "errors",
            "Total number of error responses by route and error kind",
            errors_total.clone(),
        );

        let orders_created_total = Counter::default();
        registry.register(
            "orders_created",
            "Total number of orders placed",
            orders_created_total.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            http_requests_total,
            http_request_duration_seconds,
            http_active_requests,
            errors_total,
            orders_created_total,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(err) = encode(&mut buffer, &registry) {
            tracing::error!(error = %err, "failed to encode metrics");
        }
        buffer
    }

    pub fn record_request(&self, route: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .get_or_create(&RequestLabels {
                route: route.to_string(),
                status: status.to_string(),
            })
            .inc();
        self.http_request_duration_seconds
            .get_or_create(&RouteLabels {
                route: route.to_string(),
            })
            .observe(duration.as_secs_f64());
    }

    pub fn record_error(&self, route: &str, kind: &str) {
        self.errors_total
            .get_or_create(&ErrorLabels {
                route: route.to_string(),
                kind: kind.to_string(),
            })
            .inc();
    }

    pub fn record_order_created(&self) {
        self.orders_created_total.inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of an in-flight gauge, released on drop even when the request
/// future is cancelled.
struct InFlight(Gauge);

impl InFlight {
    fn enter(gauge: &Gauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Axum middleware recording count, latency and error kind per route.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let route = format!(
        "{} {}",
        request.method(),
        request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or("unmatched")
    );

    let _in_flight = InFlight::enter(&METRICS.http_active_requests);
    let started = Instant::now();
    let response = next.run(request).await;

    METRICS.record_request(&route, response.status().as_u16(), started.elapsed());
    if let Some(ErrorKind(kind)) = response.extensions().get::<ErrorKind>() {
        METRICS.record_error(&route, kind);
    }
    response
}

pub async fn metrics_handler() -> (axum::http::StatusCode, String) {
    (axum::http::StatusCode::OK, METRICS.encode())
}
