//! Stock API Handlers

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, AppResult};
use shared::models::{LowStockAlert, Reservation, ReservationStatus, StockCheck};

use crate::api::CurrentCustomer;
use crate::api::bearer::require_bearer;
use crate::core::ServerState;
use crate::stock::{BatchReservation, ReserveRequest, StockError, StockHold, SweepReport};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReserveMultipleBody {
    pub items: Vec<ReserveRequest>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

pub async fn check(
    State(state): State<ServerState>,
    Path(product_id): Path<i64>,
    Query(query): Query<CheckQuery>,
) -> AppResult<ApiResponse<StockCheck>> {
    let check = state.stock.check_stock(product_id, query.quantity).await?;
    Ok(ApiResponse::success(check))
}

pub async fn reserve(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Json(body): Json<ReserveRequest>,
) -> AppResult<ApiResponse<StockHold>> {
    let buyer_id = customer.require()?;
    let hold = state
        .stock
        .reserve_stock(body.product_id, body.quantity, buyer_id)
        .await?;
    Ok(ApiResponse::success(hold))
}

/// Per-line results are returned on failure as well
pub async fn reserve_multiple(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Json(body): Json<ReserveMultipleBody>,
) -> AppResult<ApiResponse<BatchReservation>> {
    let buyer_id = customer.require()?;
    if body.items.is_empty() {
        return Err(AppError::validation("items must not be empty"));
    }

    let mut batch = state.stock.reserve_multiple(&body.items, buyer_id).await;
    match batch.error.take() {
        None => Ok(ApiResponse::success(batch)),
        Some(e) => {
            let results = serde_json::to_value(&batch.results).unwrap_or_default();
            Err(AppError::from(e).with_detail("results", results))
        }
    }
}

/// Buyers only touch their own holds; someone else's hold reads as missing
async fn load_owned(
    state: &ServerState,
    customer: CurrentCustomer,
    id: i64,
) -> AppResult<Reservation> {
    let customer_id = customer.require()?;
    let reservation = state
        .ledger
        .find_reservation(id)
        .await?
        .filter(|r| r.customer_id == customer_id)
        .ok_or_else(|| AppError::from(StockError::ReservationNotFound(id)))?;
    Ok(reservation)
}

pub async fn release_reservation(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Path(id): Path<i64>,
) -> AppResult<ApiResponse<ReleaseResponse>> {
    let reservation = load_owned(&state, customer, id).await?;
    if reservation.status != ReservationStatus::Pending {
        return Ok(ApiResponse::success(ReleaseResponse { released: false }));
    }

    let hold = StockHold {
        product_id: reservation.product_id,
        quantity: reservation.quantity,
        reservation_id: Some(reservation.id),
        remaining_stock: 0,
    };
    let released = state.stock.release_hold(&hold).await?;
    Ok(ApiResponse::success(ReleaseResponse { released }))
}

pub async fn confirm_reservation(
    State(state): State<ServerState>,
    customer: CurrentCustomer,
    Path(id): Path<i64>,
) -> AppResult<ApiResponse<()>> {
    load_owned(&state, customer, id).await?;
    state.stock.confirm_reservation(id).await?;
    Ok(ApiResponse::ok())
}

/// Operator only
pub async fn sweep(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> AppResult<ApiResponse<SweepReport>> {
    require_bearer(&headers, &state.config.operator_token)?;
    let report = state.stock.cleanup_expired_reservations().await?;
    Ok(ApiResponse::success(report))
}

pub async fn low_stock(
    State(state): State<ServerState>,
    Query(query): Query<LowStockQuery>,
) -> AppResult<ApiResponse<Vec<LowStockAlert>>> {
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let alerts = state.stock.get_low_stock_alerts(threshold).await?;
    Ok(ApiResponse::success(alerts))
}
