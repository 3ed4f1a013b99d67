use sqlx::{PgPool, Result};
use uuid::Uuid;

use crate::db::models::User;

pub async fn insert_user(pool: &PgPool, user: &User) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, display_name, password_hash, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .bind(user.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn insert_token(pool: &PgPool, token_hash: &str, user_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO api_tokens (token_hash, user_id) VALUES ($1, $2)")
        .bind(token_hash)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_user_by_token_hash(pool: &PgPool, token_hash: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT u.* FROM users u
        JOIN api_tokens t ON t.user_id = u.id
        WHERE t.token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn delete_token(pool: &PgPool, token_hash: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM api_tokens WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
