//! Observability infrastructure - Prometheus metrics

mod metrics;

pub use self::metrics::{
    PrometheusMetrics, create_metrics_router, init_metrics, record_auth_outcome,
    record_http_request, record_usage_log_dropped,
};
