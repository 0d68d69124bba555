//! Order API Handlers

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, AppResult};
use shared::models::{Order, OrderItem};

use crate::api::CurrentCustomer;
use crate::core::ServerState;

const RESOURCE: &str = "order";

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Buyers only see their own orders
async fn load_owned(state: &ServerState, customer: CurrentCustomer, id: i64) -> AppResult<Order> {
    let customer_id = customer.require()?;
    let order = state
        .ledger
        .find_order(id)
        .await?
        .filter(|o| o.customer_id == customer_id)
        .ok_or_else(|| AppError::not_found(format!("{RESOURCE} {id}")))?;
    Ok(order)
}

pub async fn get_by_id(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Path(id): Path<i64>,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = load_owned(&state, customer, id).await?;
    let items = state.ledger.find_order_items(id).await?;
    Ok(ApiResponse::success(OrderDetail { order, items }))
}

pub async fn cancel(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Path(id): Path<i64>,
    Json(body): Json<CancelRequest>,
) -> AppResult<ApiResponse<Order>> {
    load_owned(&state, customer, id).await?;
    let reason = body
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "customer_request".to_string());
    let order = state.stock.cancel_order(id, &reason).await?;
    Ok(ApiResponse::success(order))
}
