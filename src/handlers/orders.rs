use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::Pagination;
use crate::middleware::auth::CurrentUser;
use crate::AppState;

pub async fn list_orders(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = page.resolve();
    let orders = state
        .order_service()
        .list_for_buyer(current.user.id, limit, offset)
        .await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let details = state.order_service().get_for_buyer(id, current.user.id).await?;
    Ok(Json(details))
}

/// The buyer acknowledges receipt of one item. Repeating the call is a no-op
/// that returns the current order.
pub async fn confirm_order_item(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let details = state
        .order_service()
        .confirm_item(item_id, current.user.id)
        .await?;
    Ok(Json(details))
}
