use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{
    Artist, Collection, ComicCopy, Publisher, Series, Title, TitleCredit,
};
use crate::domain::status::CopyStatus;

/// Deletes a row by primary key. `table` is always a literal from this module.
async fn delete_row(pool: &PgPool, table: &'static str, id: Uuid) -> Result<bool> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", table))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Publishers ---

pub async fn insert_publisher(pool: &PgPool, publisher: &Publisher) -> Result<Publisher> {
    sqlx::query_as::<_, Publisher>(
        "INSERT INTO publishers (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(publisher.id)
    .bind(&publisher.name)
    .bind(publisher.created_at)
    .bind(publisher.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_publisher(pool: &PgPool, id: Uuid) -> Result<Publisher> {
    sqlx::query_as::<_, Publisher>("SELECT * FROM publishers WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn list_publishers(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Publisher>> {
    sqlx::query_as::<_, Publisher>("SELECT * FROM publishers ORDER BY name LIMIT $1 OFFSET $2")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
}

pub async fn update_publisher(pool: &PgPool, id: Uuid, name: &str) -> Result<Publisher> {
    sqlx::query_as::<_, Publisher>(
        "UPDATE publishers SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(name)
    .fetch_one(pool)
    .await
}

pub async fn delete_publisher(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_row(pool, "publishers", id).await
}

// --- Artists ---

pub async fn insert_artist(pool: &PgPool, artist: &Artist) -> Result<Artist> {
    sqlx::query_as::<_, Artist>(
        "INSERT INTO artists (id, name, bio, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(artist.id)
    .bind(&artist.name)
    .bind(&artist.bio)
    .bind(artist.created_at)
    .bind(artist.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_artist(pool: &PgPool, id: Uuid) -> Result<Artist> {
    sqlx::query_as::<_, Artist>("SELECT * FROM artists WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn list_artists(
    pool: &PgPool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Artist>> {
    sqlx::query_as::<_, Artist>(
        r#"
        SELECT * FROM artists
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
        ORDER BY name
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn update_artist(pool: &PgPool, artist: &Artist) -> Result<Artist> {
    sqlx::query_as::<_, Artist>(
        "UPDATE artists SET name = $2, bio = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(artist.id)
    .bind(&artist.name)
    .bind(&artist.bio)
    .fetch_one(pool)
    .await
}

pub async fn delete_artist(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_row(pool, "artists", id).await
}

// --- Series ---

pub async fn insert_series(pool: &PgPool, series: &Series) -> Result<Series> {
    sqlx::query_as::<_, Series>(
        r#"
        INSERT INTO series (id, name, publisher_id, start_year, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(series.id)
    .bind(&series.name)
    .bind(series.publisher_id)
    .bind(series.start_year)
    .bind(series.created_at)
    .bind(series.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_series(pool: &PgPool, id: Uuid) -> Result<Series> {
    sqlx::query_as::<_, Series>("SELECT * FROM series WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn list_series(
    pool: &PgPool,
    publisher_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Series>> {
    sqlx::query_as::<_, Series>(
        r#"
        SELECT * FROM series
        WHERE ($1::uuid IS NULL OR publisher_id = $1)
        ORDER BY name
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(publisher_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn update_series(pool: &PgPool, series: &Series) -> Result<Series> {
    sqlx::query_as::<_, Series>(
        r#"
        UPDATE series SET name = $2, publisher_id = $3, start_year = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(series.id)
    .bind(&series.name)
    .bind(series.publisher_id)
    .bind(series.start_year)
    .fetch_one(pool)
    .await
}

pub async fn delete_series(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_row(pool, "series", id).await
}

// --- Titles ---

pub async fn insert_title(
    executor: &mut SqlxTransaction<'_, Postgres>,
    title: &Title,
) -> Result<Title> {
    sqlx::query_as::<_, Title>(
        r#"
        INSERT INTO titles (
            id, name, series_id, publisher_id, issue_number, release_date, description,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(title.id)
    .bind(&title.name)
    .bind(title.series_id)
    .bind(title.publisher_id)
    .bind(&title.issue_number)
    .bind(title.release_date)
    .bind(&title.description)
    .bind(title.created_at)
    .bind(title.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn update_title(
    executor: &mut SqlxTransaction<'_, Postgres>,
    title: &Title,
) -> Result<Title> {
    sqlx::query_as::<_, Title>(
        r#"
        UPDATE titles SET
            name = $2, series_id = $3, publisher_id = $4, issue_number = $5,
            release_date = $6, description = $7, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(title.id)
    .bind(&title.name)
    .bind(title.series_id)
    .bind(title.publisher_id)
    .bind(&title.issue_number)
    .bind(title.release_date)
    .bind(&title.description)
    .fetch_one(&mut **executor)
    .await
}

/// Replaces every credit of a title.
pub async fn replace_title_credits(
    executor: &mut SqlxTransaction<'_, Postgres>,
    title_id: Uuid,
    credits: &[(Uuid, String)],
) -> Result<()> {
    sqlx::query("DELETE FROM title_credits WHERE title_id = $1")
        .bind(title_id)
        .execute(&mut **executor)
        .await?;

    for (artist_id, role) in credits {
        sqlx::query(
            "INSERT INTO title_credits (title_id, artist_id, role) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(title_id)
        .bind(artist_id)
        .bind(role)
        .execute(&mut **executor)
        .await?;
    }

    Ok(())
}

pub async fn get_title(pool: &PgPool, id: Uuid) -> Result<Title> {
    sqlx::query_as::<_, Title>("SELECT * FROM titles WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn get_title_credits(pool: &PgPool, title_id: Uuid) -> Result<Vec<TitleCredit>> {
    sqlx::query_as::<_, TitleCredit>(
        r#"
        SELECT c.artist_id, a.name AS artist_name, c.role
        FROM title_credits c
        JOIN artists a ON a.id = c.artist_id
        WHERE c.title_id = $1
        ORDER BY c.role, a.name
        "#,
    )
    .bind(title_id)
    .fetch_all(pool)
    .await
}

pub async fn list_titles(
    pool: &PgPool,
    search: Option<&str>,
    series_id: Option<Uuid>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Title>> {
    sqlx::query_as::<_, Title>(
        r#"
        SELECT * FROM titles
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
        AND ($2::uuid IS NULL OR series_id = $2)
        ORDER BY name, issue_number
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(search)
    .bind(series_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn delete_title(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_row(pool, "titles", id).await
}

// --- Copies ---

#[derive(Debug, Default, Clone)]
pub struct CopyFilter {
    pub status: Option<CopyStatus>,
    pub title_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
}

pub async fn insert_copy(pool: &PgPool, copy: &ComicCopy) -> Result<ComicCopy> {
    sqlx::query_as::<_, ComicCopy>(
        r#"
        INSERT INTO copies (
            id, title_id, owner_id, condition, notes, price, currency, status,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(copy.id)
    .bind(copy.title_id)
    .bind(copy.owner_id)
    .bind(copy.condition)
    .bind(&copy.notes)
    .bind(copy.price)
    .bind(&copy.currency)
    .bind(copy.status)
    .bind(copy.created_at)
    .bind(copy.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_copy(pool: &PgPool, id: Uuid) -> Result<ComicCopy> {
    sqlx::query_as::<_, ComicCopy>("SELECT * FROM copies WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn list_copies(
    pool: &PgPool,
    filter: &CopyFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ComicCopy>> {
    sqlx::query_as::<_, ComicCopy>(
        r#"
        SELECT * FROM copies
        WHERE ($1::copy_status IS NULL OR status = $1)
        AND ($2::uuid IS NULL OR title_id = $2)
        AND ($3::uuid IS NULL OR owner_id = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(filter.status)
    .bind(filter.title_id)
    .bind(filter.owner_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Updates an unlocked copy. Returns `RowNotFound` if the copy is missing or
/// got reserved concurrently.
pub async fn update_copy(pool: &PgPool, copy: &ComicCopy) -> Result<ComicCopy> {
    sqlx::query_as::<_, ComicCopy>(
        r#"
        UPDATE copies SET
            condition = $2, notes = $3, price = $4, currency = $5, status = $6, updated_at = NOW()
        WHERE id = $1 AND status IN ('OWNED', 'LISTED')
        RETURNING *
        "#,
    )
    .bind(copy.id)
    .bind(copy.condition)
    .bind(&copy.notes)
    .bind(copy.price)
    .bind(&copy.currency)
    .bind(copy.status)
    .fetch_one(pool)
    .await
}

pub async fn delete_copy(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM copies WHERE id = $1 AND status IN ('OWNED', 'LISTED')")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Collections ---

pub async fn insert_collection(pool: &PgPool, collection: &Collection) -> Result<Collection> {
    sqlx::query_as::<_, Collection>(
        r#"
        INSERT INTO collections (id, owner_id, name, description, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(collection.id)
    .bind(collection.owner_id)
    .bind(&collection.name)
    .bind(&collection.description)
    .bind(collection.created_at)
    .bind(collection.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_collection(pool: &PgPool, id: Uuid) -> Result<Collection> {
    sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn list_collections_for_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Collection>> {
    sqlx::query_as::<_, Collection>(
        "SELECT * FROM collections WHERE owner_id = $1 ORDER BY name",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn delete_collection(pool: &PgPool, id: Uuid) -> Result<bool> {
    delete_row(pool, "collections", id).await
}

pub async fn list_collection_copies(pool: &PgPool, collection_id: Uuid) -> Result<Vec<ComicCopy>> {
    sqlx::query_as::<_, ComicCopy>(
        r#"
        SELECT c.* FROM copies c
        JOIN collection_copies cc ON cc.copy_id = c.id
        WHERE cc.collection_id = $1
        ORDER BY cc.added_at
        "#,
    )
    .bind(collection_id)
    .fetch_all(pool)
    .await
}

pub async fn add_copy_to_collection(pool: &PgPool, collection_id: Uuid, copy_id: Uuid) -> Result<()> {
    sqlx::query(
        "INSERT INTO collection_copies (collection_id, copy_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(collection_id)
    .bind(copy_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_copy_from_collection(
    pool: &PgPool,
    collection_id: Uuid,
    copy_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM collection_copies WHERE collection_id = $1 AND copy_id = $2",
    )
    .bind(collection_id)
    .bind(copy_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
