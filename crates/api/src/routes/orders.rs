//! Order submission and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{CustomerId, Money, OrderId};
use pipeline::{
    CompensationRecord, FailureRecord, OrderIntent, OrderOutcome, OrderPipeline, OrderState,
    Transition,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub pipeline: OrderPipeline,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    /// Generated when omitted.
    pub order_id: Option<String>,
    pub customer_id: String,
    pub items: Vec<LineItemRequest>,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub customer_id: String,
    pub status: String,
    pub items: Vec<LineItemResponse>,
    pub amount_cents: i64,
    pub transitions: Vec<Transition>,
    pub failure: Option<FailureRecord>,
    pub compensations: Vec<CompensationRecord>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub item_id: String,
    pub quantity: u32,
}

impl From<&OrderState> for OrderResponse {
    fn from(state: &OrderState) -> Self {
        let intent = state.intent();
        Self {
            order_id: intent.order_id.to_string(),
            customer_id: intent.customer_id.to_string(),
            status: state.status().to_string(),
            items: intent
                .items
                .iter()
                .map(|item| LineItemResponse {
                    item_id: item.item_id.to_string(),
                    quantity: item.quantity,
                })
                .collect(),
            amount_cents: intent.amount.cents(),
            transitions: state.transitions().to_vec(),
            failure: state.failure().cloned(),
            compensations: state.compensations().to_vec(),
        }
    }
}

impl From<&OrderOutcome> for OrderResponse {
    fn from(outcome: &OrderOutcome) -> Self {
        Self::from(&outcome.state)
    }
}

// -- Handlers --

/// POST /orders: submit an order and wait for its outcome.
///
/// A downstream failure still answers 200; the body carries status `Failed`.
#[tracing::instrument(skip(state, req))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = match req.order_id {
        Some(id) => OrderId::new(id),
        None => OrderId::generate(),
    };

    let mut intent = OrderIntent::new(
        order_id,
        req.customer_id,
        Money::from_cents(req.amount_cents),
    );
    for item in req.items {
        intent = intent.with_item(item.item_id, item.quantity);
    }

    let outcome = state.pipeline.submit(intent).await?;
    Ok(Json(OrderResponse::from(&outcome)))
}

/// GET /orders/{id}: recorded state of an order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.pipeline.status(&OrderId::new(id)).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders?customer_id=: every order of a customer.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id = CustomerId::new(query.customer_id);
    if customer_id.is_blank() {
        return Err(ApiError::BadRequest("customer_id must not be empty".into()));
    }

    let orders = state.pipeline.orders_for_customer(&customer_id).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}
