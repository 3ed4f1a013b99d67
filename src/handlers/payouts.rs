use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::Pagination;
use crate::middleware::auth::CurrentUser;
use crate::services::PayoutService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentInformationRequest {
    pub payment_information: serde_json::Value,
}

pub async fn list_payouts(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = page.resolve();
    let tasks = PayoutService::new(state.db.clone())
        .list_for_seller(current.user.id, limit, offset)
        .await?;
    Ok(Json(tasks))
}

pub async fn submit_payment_information(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentInformationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let task = PayoutService::new(state.db.clone())
        .submit_payment_information(id, current.user.id, payload.payment_information)
        .await?;
    Ok(Json(task))
}
