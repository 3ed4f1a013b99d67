//! Back-office endpoints, mounted under `/admin` behind the admin API key.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{OrderStatus, PayoutTaskStatus};
use crate::error::AppError;
use crate::handlers::Pagination;
use crate::services::PayoutService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutFilter {
    pub status: Option<PayoutTaskStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    Pagination { limit, offset }.resolve()
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = page(filter.limit, filter.offset);
    let orders = state
        .order_service()
        .list_all(filter.status, limit, offset)
        .await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.order_service().get_for_admin(id).await?))
}

pub async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.order_service().refund_order(id).await?))
}

pub async fn cancel_order_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.order_service().cancel_item(item_id).await?))
}

pub async fn list_payouts(
    State(state): State<AppState>,
    Query(filter): Query<PayoutFilter>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = page(filter.limit, filter.offset);
    let tasks = PayoutService::new(state.db.clone())
        .list(filter.status, limit, offset)
        .await?;
    Ok(Json(tasks))
}

pub async fn mark_payout_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(PayoutService::new(state.db.clone()).mark_paid(id).await?))
}

pub async fn archive_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(PayoutService::new(state.db.clone()).archive(id).await?))
}
