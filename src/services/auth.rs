//! Account registration, password login and bearer tokens.
//!
//! Tokens are 32 random bytes, hex encoded. Only their SHA-256 digest is
//! stored, so a leaked `api_tokens` table cannot be replayed.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::instrument;

use crate::db::models::User;
use crate::db::users;
use crate::error::AppError;
use crate::validation::{self, NAME_MAX_LEN};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(hash: &str, password: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {}", e)))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!(
            "password verification failed: {}",
            e
        ))),
    }
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(name = "auth_service::register", skip(self, password), err(Display))]
    pub async fn register(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let email = validation::normalize_email(email)?;
        let display_name = validation::sanitize_string(display_name);
        validation::validate_required("display_name", &display_name)?;
        validation::validate_max_len("display_name", &display_name, NAME_MAX_LEN)?;
        validation::validate_password(password)?;

        if users::find_user_by_email(&self.pool, &email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "An account for {} already exists",
                email
            )));
        }

        let user = User::new(email, display_name, hash_password(password)?);
        let user = users::insert_user(&self.pool, &user).await?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Checks credentials and issues a new bearer token.
    #[instrument(name = "auth_service::login", skip(self, password), err(Display))]
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AppError> {
        let invalid = || AppError::Unauthorized("Invalid email or password".to_string());
        let email = email.trim().to_lowercase();

        let user = users::find_user_by_email(&self.pool, &email)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&user.password_hash, password)? {
            return Err(invalid());
        }

        let token = generate_token();
        users::insert_token(&self.pool, &hash_token(&token), user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(token)
    }

    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        users::find_user_by_token_hash(&self.pool, &hash_token(token))
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        users::delete_token(&self.pool, &hash_token(token)).await?;
        Ok(())
    }
}
