//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers descriptions for the metrics recorded by the pipeline.
pub fn describe() {
    metrics::describe_counter!("pipeline_submissions_total", "Orders submitted");
    metrics::describe_counter!("pipeline_confirmed_total", "Orders confirmed");
    metrics::describe_counter!("pipeline_failed_total", "Orders failed, by failure kind");
    metrics::describe_histogram!(
        "pipeline_duration_seconds",
        metrics::Unit::Seconds,
        "Time from acceptance to outcome"
    );
    metrics::describe_counter!(
        "downstream_calls_total",
        "Downstream calls, by dependency and outcome"
    );
    metrics::describe_histogram!(
        "downstream_call_duration_seconds",
        metrics::Unit::Seconds,
        "Downstream call latency including retries"
    );
    metrics::describe_counter!("circuit_transitions_total", "Circuit breaker state changes");
    metrics::describe_counter!("bulkhead_rejections_total", "Calls rejected by a full bulkhead");
    metrics::describe_counter!(
        "compensation_failures_total",
        "Compensating actions that failed"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
