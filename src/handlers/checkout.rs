use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub copy_ids: Vec<Uuid>,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .checkout_service()
        .create_checkout(&current.user, &payload.copy_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}
