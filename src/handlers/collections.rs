use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::catalog;
use crate::db::models::{Collection, ComicCopy};
use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::validation::{self, TEXT_MAX_LEN};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CollectionInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddCopyRequest {
    pub copy_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CollectionDetails {
    #[serde(flatten)]
    pub collection: Collection,
    pub copies: Vec<ComicCopy>,
}

async fn load_own_collection(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<Collection, AppError> {
    let collection = catalog::get_collection(&state.db, id)
        .await
        .map_err(AppError::not_found_or(format!("Collection {} not found", id)))?;
    if collection.owner_id != user_id {
        return Err(AppError::Forbidden(
            "collection belongs to another user".to_string(),
        ));
    }
    Ok(collection)
}

pub async fn list_collections(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        catalog::list_collections_for_owner(&state.db, current.user.id).await?,
    ))
}

pub async fn create_collection(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<CollectionInput>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let collection = Collection {
        id: Uuid::new_v4(),
        owner_id: current.user.id,
        name: validation::clean_name("name", &input.name)?,
        description: validation::clean_optional_text(
            "description",
            input.description.as_deref(),
            TEXT_MAX_LEN,
        )?,
        created_at: now,
        updated_at: now,
    };
    let collection = catalog::insert_collection(&state.db, &collection).await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

pub async fn get_collection(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let collection = load_own_collection(&state, id, current.user.id).await?;
    let copies = catalog::list_collection_copies(&state.db, id).await?;
    Ok(Json(CollectionDetails { collection, copies }))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    load_own_collection(&state, id, current.user.id).await?;
    catalog::delete_collection(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddCopyRequest>,
) -> Result<impl IntoResponse, AppError> {
    load_own_collection(&state, id, current.user.id).await?;
    let copy = catalog::get_copy(&state.db, payload.copy_id)
        .await
        .map_err(AppError::not_found_or(format!("Copy {} not found", payload.copy_id)))?;
    if copy.owner_id != current.user.id {
        return Err(AppError::Forbidden(
            "only your own copies can be collected".to_string(),
        ));
    }

    catalog::add_copy_to_collection(&state.db, id, copy.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_copy(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, copy_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    load_own_collection(&state, id, current.user.id).await?;
    if !catalog::remove_copy_from_collection(&state.db, id, copy_id).await? {
        return Err(AppError::NotFound(format!(
            "Copy {} is not in collection {}",
            copy_id, id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
