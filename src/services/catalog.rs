use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::catalog;
use crate::db::models::{Title, TitleCredit};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct TitleDetails {
    #[serde(flatten)]
    pub title: Title,
    pub credits: Vec<TitleCredit>,
}

/// Inserts a title together with its artist credits.
pub async fn create_title(
    pool: &PgPool,
    title: &Title,
    credits: &[(Uuid, String)],
) -> Result<TitleDetails, AppError> {
    let mut tx = pool.begin().await?;
    let title = catalog::insert_title(&mut tx, title).await?;
    catalog::replace_title_credits(&mut tx, title.id, credits).await?;
    tx.commit().await?;

    tracing::info!(title_id = %title.id, credits = credits.len(), "Title created");
    get_title(pool, title.id).await
}

/// Updates a title. Credits are replaced only when given.
pub async fn update_title(
    pool: &PgPool,
    title: &Title,
    credits: Option<&[(Uuid, String)]>,
) -> Result<TitleDetails, AppError> {
    let mut tx = pool.begin().await?;
    let title = catalog::update_title(&mut tx, title)
        .await
        .map_err(AppError::not_found_or(format!("Title {} not found", title.id)))?;
    if let Some(credits) = credits {
        catalog::replace_title_credits(&mut tx, title.id, credits).await?;
    }
    tx.commit().await?;

    get_title(pool, title.id).await
}

pub async fn get_title(pool: &PgPool, id: Uuid) -> Result<TitleDetails, AppError> {
    let title = catalog::get_title(pool, id)
        .await
        .map_err(AppError::not_found_or(format!("Title {} not found", id)))?;
    let credits = catalog::get_title_credits(pool, id).await?;
    Ok(TitleDetails { title, credits })
}
