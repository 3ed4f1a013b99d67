//! Publishers, artists, series and titles. Reads are public; writes need a
//! logged-in user.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::catalog;
use crate::db::models::{Artist, Publisher, Series, Title};
use crate::error::AppError;
use crate::handlers::Pagination;
use crate::middleware::auth::CurrentUser;
use crate::services::catalog as catalog_service;
use crate::validation::{
    self, ValidationError, CREDIT_ROLE_MAX_LEN, ISSUE_NUMBER_MAX_LEN, TEXT_MAX_LEN,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub publisher_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    fn page(&self) -> (i64, i64) {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
        .resolve()
    }

    fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

fn deleted_or_not_found(deleted: bool, what: String) -> Result<StatusCode, AppError> {
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(what))
    }
}

// --- Publishers ---

#[derive(Debug, Deserialize)]
pub struct PublisherInput {
    pub name: String,
}

pub async fn list_publishers(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = pagination.resolve();
    Ok(Json(catalog::list_publishers(&state.db, limit, offset).await?))
}

pub async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let publisher = catalog::get_publisher(&state.db, id)
        .await
        .map_err(AppError::not_found_or(format!("Publisher {} not found", id)))?;
    Ok(Json(publisher))
}

pub async fn create_publisher(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<PublisherInput>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let publisher = Publisher {
        id: Uuid::new_v4(),
        name: validation::clean_name("name", &input.name)?,
        created_at: now,
        updated_at: now,
    };
    let publisher = catalog::insert_publisher(&state.db, &publisher).await?;
    Ok((StatusCode::CREATED, Json(publisher)))
}

pub async fn update_publisher(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<PublisherInput>,
) -> Result<impl IntoResponse, AppError> {
    let name = validation::clean_name("name", &input.name)?;
    let publisher = catalog::update_publisher(&state.db, id, &name)
        .await
        .map_err(AppError::not_found_or(format!("Publisher {} not found", id)))?;
    Ok(Json(publisher))
}

pub async fn delete_publisher(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = catalog::delete_publisher(&state.db, id).await?;
    deleted_or_not_found(deleted, format!("Publisher {} not found", id))
}

// --- Artists ---

#[derive(Debug, Deserialize)]
pub struct ArtistInput {
    pub name: String,
    pub bio: Option<String>,
}

fn artist_from_input(id: Uuid, input: &ArtistInput) -> Result<Artist, ValidationError> {
    let now = Utc::now();
    Ok(Artist {
        id,
        name: validation::clean_name("name", &input.name)?,
        bio: validation::clean_optional_text("bio", input.bio.as_deref(), TEXT_MAX_LEN)?,
        created_at: now,
        updated_at: now,
    })
}

pub async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = query.page();
    Ok(Json(
        catalog::list_artists(&state.db, query.search(), limit, offset).await?,
    ))
}

pub async fn get_artist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let artist = catalog::get_artist(&state.db, id)
        .await
        .map_err(AppError::not_found_or(format!("Artist {} not found", id)))?;
    Ok(Json(artist))
}

pub async fn create_artist(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<ArtistInput>,
) -> Result<impl IntoResponse, AppError> {
    let artist = artist_from_input(Uuid::new_v4(), &input)?;
    let artist = catalog::insert_artist(&state.db, &artist).await?;
    Ok((StatusCode::CREATED, Json(artist)))
}

pub async fn update_artist(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ArtistInput>,
) -> Result<impl IntoResponse, AppError> {
    let artist = artist_from_input(id, &input)?;
    let artist = catalog::update_artist(&state.db, &artist)
        .await
        .map_err(AppError::not_found_or(format!("Artist {} not found", id)))?;
    Ok(Json(artist))
}

pub async fn delete_artist(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = catalog::delete_artist(&state.db, id).await?;
    deleted_or_not_found(deleted, format!("Artist {} not found", id))
}

// --- Series ---

#[derive(Debug, Deserialize)]
pub struct SeriesInput {
    pub name: String,
    pub publisher_id: Option<Uuid>,
    pub start_year: Option<i32>,
}

fn series_from_input(id: Uuid, input: &SeriesInput) -> Result<Series, ValidationError> {
    if let Some(year) = input.start_year {
        validation::validate_year("start_year", year)?;
    }
    let now = Utc::now();
    Ok(Series {
        id,
        name: validation::clean_name("name", &input.name)?,
        publisher_id: input.publisher_id,
        start_year: input.start_year,
        created_at: now,
        updated_at: now,
    })
}

pub async fn list_series(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = query.page();
    Ok(Json(
        catalog::list_series(&state.db, query.publisher_id, limit, offset).await?,
    ))
}

pub async fn get_series(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let series = catalog::get_series(&state.db, id)
        .await
        .map_err(AppError::not_found_or(format!("Series {} not found", id)))?;
    Ok(Json(series))
}

pub async fn create_series(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<SeriesInput>,
) -> Result<impl IntoResponse, AppError> {
    let series = series_from_input(Uuid::new_v4(), &input)?;
    let series = catalog::insert_series(&state.db, &series).await?;
    Ok((StatusCode::CREATED, Json(series)))
}

pub async fn update_series(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SeriesInput>,
) -> Result<impl IntoResponse, AppError> {
    let series = series_from_input(id, &input)?;
    let series = catalog::update_series(&state.db, &series)
        .await
        .map_err(AppError::not_found_or(format!("Series {} not found", id)))?;
    Ok(Json(series))
}

pub async fn delete_series(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = catalog::delete_series(&state.db, id).await?;
    deleted_or_not_found(deleted, format!("Series {} not found", id))
}

// --- Titles ---

#[derive(Debug, Deserialize)]
pub struct CreditInput {
    pub artist_id: Uuid,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct TitleInput {
    pub name: String,
    pub series_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub issue_number: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub credits: Option<Vec<CreditInput>>,
}

fn title_from_input(id: Uuid, input: &TitleInput) -> Result<Title, ValidationError> {
    let now = Utc::now();
    Ok(Title {
        id,
        name: validation::clean_name("name", &input.name)?,
        series_id: input.series_id,
        publisher_id: input.publisher_id,
        issue_number: validation::clean_optional_text(
            "issue_number",
            input.issue_number.as_deref(),
            ISSUE_NUMBER_MAX_LEN,
        )?,
        release_date: input.release_date,
        description: validation::clean_optional_text(
            "description",
            input.description.as_deref(),
            TEXT_MAX_LEN,
        )?,
        created_at: now,
        updated_at: now,
    })
}

fn clean_credits(credits: &[CreditInput]) -> Result<Vec<(Uuid, String)>, ValidationError> {
    credits
        .iter()
        .map(|credit| {
            let role = validation::sanitize_string(&credit.role).to_lowercase();
            validation::validate_required("credits.role", &role)?;
            validation::validate_max_len("credits.role", &role, CREDIT_ROLE_MAX_LEN)?;
            Ok((credit.artist_id, role))
        })
        .collect()
}

pub async fn list_titles(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = query.page();
    Ok(Json(
        catalog::list_titles(&state.db, query.search(), query.series_id, limit, offset).await?,
    ))
}

pub async fn get_title(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(catalog_service::get_title(&state.db, id).await?))
}

pub async fn create_title(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<TitleInput>,
) -> Result<impl IntoResponse, AppError> {
    let title = title_from_input(Uuid::new_v4(), &input)?;
    let credits = clean_credits(input.credits.as_deref().unwrap_or_default())?;
    let details = catalog_service::create_title(&state.db, &title, &credits).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

pub async fn update_title(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<TitleInput>,
) -> Result<impl IntoResponse, AppError> {
    let title = title_from_input(id, &input)?;
    let credits = input.credits.as_deref().map(clean_credits).transpose()?;
    let details = catalog_service::update_title(&state.db, &title, credits.as_deref()).await?;
    Ok(Json(details))
}

pub async fn delete_title(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = catalog::delete_title(&state.db, id).await?;
    deleted_or_not_found(deleted, format!("Title {} not found", id))
}
