//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::join_all;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::InMemoryOrderStore;
use pipeline::{InMemoryInventoryService, InMemoryPaymentService, PipelineConfig};
use resilience::{
    CircuitBreakerConfig, RateLimiterConfig, RemoteError, ResilienceConfig, RetryConfig,
};
use std::time::Duration;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    payment: InMemoryPaymentService,
}

fn setup() -> axum::Router {
    setup_with_config(PipelineConfig::default()).app
}

fn setup_with_config(config: PipelineConfig) -> TestApp {
    let payment = InMemoryPaymentService::new();
    let state = api::create_state(
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryInventoryService::new()),
        Arc::new(payment.clone()),
        config,
    );
    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        payment,
    }
}

fn order_body(order_id: &str, customer_id: &str) -> serde_json::Value {
    serde_json::json!({
        "order_id": order_id,
        "customer_id": customer_id,
        "items": [{ "item_id": "SKU1", "quantity": 2 }],
        "amount_cents": 2000
    })
}

fn post_order(body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_submit_order_confirms() {
    let app = setup();

    let response = app.oneshot(post_order(&order_body("O1", "C1"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["order_id"], "O1");
    assert_eq!(json["status"], "Confirmed");
    assert_eq!(json["amount_cents"], 2000);
    let statuses: Vec<_> = json["transitions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        statuses,
        vec!["Received", "InventoryReserved", "PaymentAuthorized", "Confirmed"]
    );
}

#[tokio::test]
async fn test_submit_without_order_id_generates_one() {
    let app = setup();
    let body = serde_json::json!({
        "customer_id": "C1",
        "items": [{ "item_id": "SKU1", "quantity": 1 }],
        "amount_cents": 500
    });

    let response = app.oneshot(post_order(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(!json["order_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_order_reports_compensations() {
    let t = setup_with_config(PipelineConfig::default());
    t.payment
        .set_fail_on_authorize(Some(RemoteError::rejected("insufficient funds")));

    let response = t
        .app
        .oneshot(post_order(&order_body("O1", "C1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "Failed");
    assert_eq!(json["failure"]["kind"], "RemoteError");
    assert_eq!(json["failure"]["step"], "payment.authorize");
    let compensations = json["compensations"].as_array().unwrap();
    assert_eq!(compensations.len(), 1);
    assert_eq!(compensations[0]["action"], "inventory.release");
    assert_eq!(compensations[0]["target"], "SKU1,2");
}

#[tokio::test]
async fn test_invalid_intent_is_bad_request() {
    let app = setup();
    let body = serde_json::json!({
        "order_id": "O1",
        "customer_id": "C1",
        "items": [],
        "amount_cents": 2000
    });

    let response = app.oneshot(post_order(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("no items"));
}

#[tokio::test]
async fn test_duplicate_order_is_conflict() {
    let app = setup();

    let first = app
        .clone()
        .oneshot(post_order(&order_body("O1", "C1")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_order(&order_body("O1", "C1")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_rate_limited_customer() {
    let t = setup_with_config(PipelineConfig::default().with_rate_limit(RateLimiterConfig {
        limit_for_period: 2,
        refresh_period: Duration::from_secs(3600),
    }));

    for id in ["O1", "O2"] {
        let response = t
            .app
            .clone()
            .oneshot(post_order(&order_body(id, "C1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let limited = t
        .app
        .oneshot(post_order(&order_body("O3", "C1")))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_get_order_after_submit() {
    let app = setup();
    app.clone()
        .oneshot(post_order(&order_body("O1", "C1")))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/orders/O1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "Confirmed");
    assert_eq!(json["items"][0]["item_id"], "SKU1");
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let app = setup();

    let response = app.oneshot(get_request("/orders/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_orders_for_customer() {
    let app = setup();
    let requests = [("O1", "C1"), ("O2", "C1"), ("O3", "C2")]
        .into_iter()
        .map(|(order, customer)| app.clone().oneshot(post_order(&order_body(order, customer))));
    for response in join_all(requests).await {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }

    let response = app
        .oneshot(get_request("/orders?customer_id=C1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let orders = json.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o["customer_id"] == "C1"));
}

#[tokio::test]
async fn test_list_orders_requires_customer() {
    let app = setup();

    let response = app.oneshot(get_request("/orders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_orders_rejects_blank_customer() {
    let app = setup();

    let response = app
        .oneshot(get_request("/orders?customer_id=%20"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "customer_id must not be empty");
}

#[tokio::test]
async fn test_open_circuit_is_reported() {
    let t = setup_with_config(PipelineConfig::default().with_payment(
        ResilienceConfig::default()
            .with_circuit_breaker(CircuitBreakerConfig::consecutive_failures(
                1,
                Duration::from_secs(600),
            ))
            .with_retry(RetryConfig::no_retry()),
    ));
    t.payment
        .set_fail_on_authorize(Some(RemoteError::unavailable("connection refused")));

    let response = t
        .app
        .clone()
        .oneshot(post_order(&order_body("O1", "C1")))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "Failed");

    let circuits = json_body(t.app.clone().oneshot(get_request("/circuits")).await.unwrap()).await;
    let payment = circuits
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["dependency"] == "payment")
        .unwrap();
    assert_eq!(payment["state"], "Open");

    let health = json_body(t.app.oneshot(get_request("/health")).await.unwrap()).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["open_circuits"][0], "payment");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    app.clone()
        .oneshot(post_order(&order_body("O1", "C1")))
        .await
        .unwrap();

    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("pipeline_submissions_total"));
}
