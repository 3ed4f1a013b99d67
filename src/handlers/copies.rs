use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::catalog::{self, CopyFilter};
use crate::db::models::ComicCopy;
use crate::domain::{CopyCondition, CopyStatus};
use crate::error::AppError;
use crate::handlers::Pagination;
use crate::middleware::auth::CurrentUser;
use crate::validation::{self, ValidationError, TEXT_MAX_LEN};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CopyQuery {
    pub status: Option<CopyStatus>,
    pub title_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCopyRequest {
    pub title_id: Uuid,
    pub condition: CopyCondition,
    pub notes: Option<String>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<CopyStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCopyRequest {
    pub condition: CopyCondition,
    pub notes: Option<String>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub status: CopyStatus,
}

/// Owners may only move a copy between OWNED and LISTED; a listed copy
/// needs a price and a currency.
fn clean_sale_fields(
    status: CopyStatus,
    price: Option<i64>,
    currency: Option<&str>,
) -> Result<(CopyStatus, Option<i64>, Option<String>), ValidationError> {
    if status.is_locked() {
        return Err(ValidationError::new(
            "status",
            "must be OWNED or LISTED",
        ));
    }
    if let Some(price) = price {
        validation::validate_price(price)?;
    }
    let currency = currency.map(validation::normalize_currency).transpose()?;

    if status == CopyStatus::Listed {
        if price.is_none() {
            return Err(ValidationError::new("price", "is required to list a copy"));
        }
        if currency.is_none() {
            return Err(ValidationError::new("currency", "is required to list a copy"));
        }
    }

    Ok((status, price, currency))
}

async fn load_owned_copy(state: &AppState, id: Uuid, user_id: Uuid) -> Result<ComicCopy, AppError> {
    let copy = catalog::get_copy(&state.db, id)
        .await
        .map_err(AppError::not_found_or(format!("Copy {} not found", id)))?;
    if copy.owner_id != user_id {
        return Err(AppError::Forbidden("copy belongs to another user".to_string()));
    }
    if copy.status.is_locked() {
        return Err(AppError::Conflict(format!(
            "copy {} is {:?} and cannot be changed",
            id, copy.status
        )));
    }
    Ok(copy)
}

pub async fn list_copies(
    State(state): State<AppState>,
    Query(query): Query<CopyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve();
    let filter = CopyFilter {
        status: query.status,
        title_id: query.title_id,
        owner_id: query.owner_id,
    };
    Ok(Json(catalog::list_copies(&state.db, &filter, limit, offset).await?))
}

pub async fn get_copy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let copy = catalog::get_copy(&state.db, id)
        .await
        .map_err(AppError::not_found_or(format!("Copy {} not found", id)))?;
    Ok(Json(copy))
}

pub async fn create_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateCopyRequest>,
) -> Result<impl IntoResponse, AppError> {
    catalog::get_title(&state.db, payload.title_id)
        .await
        .map_err(AppError::not_found_or(format!("Title {} not found", payload.title_id)))?;

    let (status, price, currency) = clean_sale_fields(
        payload.status.unwrap_or(CopyStatus::Owned),
        payload.price,
        payload.currency.as_deref(),
    )?;
    let now = Utc::now();
    let copy = ComicCopy {
        id: Uuid::new_v4(),
        title_id: payload.title_id,
        owner_id: current.user.id,
        condition: payload.condition,
        notes: validation::clean_optional_text("notes", payload.notes.as_deref(), TEXT_MAX_LEN)?,
        price,
        currency,
        status,
        created_at: now,
        updated_at: now,
    };

    let copy = catalog::insert_copy(&state.db, &copy).await?;
    tracing::info!(copy_id = %copy.id, owner_id = %copy.owner_id, status = ?copy.status, "Copy created");
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn update_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCopyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut copy = load_owned_copy(&state, id, current.user.id).await?;
    let (status, price, currency) =
        clean_sale_fields(payload.status, payload.price, payload.currency.as_deref())?;

    copy.condition = payload.condition;
    copy.notes = validation::clean_optional_text("notes", payload.notes.as_deref(), TEXT_MAX_LEN)?;
    copy.price = price;
    copy.currency = currency;
    copy.status = status;

    // Zero rows means a checkout reserved the copy since it was loaded.
    let copy = catalog::update_copy(&state.db, &copy)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                AppError::Conflict(format!("copy {} was reserved and cannot be changed", id))
            }
            other => AppError::Database(other),
        })?;
    Ok(Json(copy))
}

pub async fn delete_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_copy(&state, id, current.user.id).await?;
    if !catalog::delete_copy(&state.db, id).await? {
        return Err(AppError::Conflict(format!(
            "copy {} was reserved and cannot be deleted",
            id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_requires_price_and_currency() {
        assert!(clean_sale_fields(CopyStatus::Listed, None, Some("eur")).is_err());
        assert!(clean_sale_fields(CopyStatus::Listed, Some(500), None).is_err());

        let (status, price, currency) =
            clean_sale_fields(CopyStatus::Listed, Some(500), Some(" EUR ")).unwrap();
        assert_eq!(status, CopyStatus::Listed);
        assert_eq!(price, Some(500));
        assert_eq!(currency.as_deref(), Some("eur"));
    }

    #[test]
    fn test_owned_copy_may_keep_a_price() {
        assert!(clean_sale_fields(CopyStatus::Owned, Some(500), Some("usd")).is_ok());
        assert!(clean_sale_fields(CopyStatus::Owned, None, None).is_ok());
    }

    #[test]
    fn test_owner_cannot_set_locked_status() {
        assert!(clean_sale_fields(CopyStatus::Reserved, Some(500), Some("eur")).is_err());
        assert!(clean_sale_fields(CopyStatus::Sold, Some(500), Some("eur")).is_err());
    }

    #[test]
    fn test_invalid_price_and_currency() {
        assert!(clean_sale_fields(CopyStatus::Listed, Some(0), Some("eur")).is_err());
        assert!(clean_sale_fields(CopyStatus::Listed, Some(500), Some("btc")).is_err());
    }
}
