use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const IDEMPOTENCY_TTL: u64 = 86400; // 24 hours in seconds
const PROCESSING_TTL: u64 = 300;
const IDEMPOTENCY_PREFIX: &str = "idempotency:";
const MAX_CACHED_BODY: usize = 64 * 1024;

#[derive(Clone)]
pub struct IdempotencyService {
    redis_client: redis::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert("x-idempotent-replay", HeaderValue::from_static("true"));
        response
    }
}

/// Keys are scoped to the caller's credentials, method and path so one
/// client key cannot replay another user's or another endpoint's response.
pub fn cache_key(
    authorization: Option<&str>,
    method: &str,
    path: &str,
    idempotency_key: &str,
) -> String {
    let caller = authorization
        .map(|value| hex::encode(&Sha256::digest(value.as_bytes())[..8]))
        .unwrap_or_else(|| "anonymous".to_string());
    format!(
        "{}{}:{}:{}:{}",
        IDEMPOTENCY_PREFIX, caller, method, path, idempotency_key
    )
}

impl IdempotencyService {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    /// Check if a request with this key is already being processed or was completed
    pub async fn check_idempotency(&self, key: &str) -> anyhow::Result<IdempotencyStatus> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // SET NX claims the key atomically for this request.
        let claimed: bool = redis::cmd("SET")
            .arg(key)
            .arg("PROCESSING")
            .arg("NX")
            .arg("EX")
            .arg(PROCESSING_TTL)
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();
        if claimed {
            return Ok(IdempotencyStatus::New);
        }

        let existing: Option<String> = conn.get(key).await?;
        match existing {
            Some(value) if value == "PROCESSING" => Ok(IdempotencyStatus::Processing),
            Some(value) => Ok(IdempotencyStatus::Completed(serde_json::from_str(&value)?)),
            // Expired between the two calls.
            None => Ok(IdempotencyStatus::Processing),
        }
    }

    /// Store the successful response for future duplicate requests
    pub async fn store_response(&self, key: &str, cached: &CachedResponse) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(cached)?;
        let _: () = conn.set_ex(key, serialized, IDEMPOTENCY_TTL).await?;
        Ok(())
    }

    /// Release the processing lock if an error occurs
    pub async fn release_lock(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum IdempotencyStatus {
    New,
    Processing,
    Completed(CachedResponse),
}

/// Replays the stored response for a repeated `x-idempotency-key`.
/// Requests without the header pass straight through.
pub async fn idempotency_middleware(
    State(service): State<IdempotencyService>,
    request: Request,
    next: Next,
) -> Response {
    let idempotency_key = match request.headers().get("x-idempotency-key") {
        Some(key) => match key.to_str() {
            Ok(k) if !k.trim().is_empty() && k.len() <= 255 => k.trim().to_string(),
            _ => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid idempotency key format",
                        "status": 400
                    })),
                )
                    .into_response();
            }
        },
        None => return next.run(request).await,
    };
    let key = cache_key(
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
        request.method().as_str(),
        request.uri().path(),
        &idempotency_key,
    );

    match service.check_idempotency(&key).await {
        Ok(IdempotencyStatus::New) => {
            let response = next.run(request).await;

            if !response.status().is_success() {
                if let Err(e) = service.release_lock(&key).await {
                    tracing::error!(error = %e, "Failed to release idempotency lock");
                }
                return response;
            }

            let (parts, body) = response.into_parts();
            let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to buffer response for idempotency cache");
                    if let Err(e) = service.release_lock(&key).await {
                        tracing::error!(error = %e, "Failed to release idempotency lock");
                    }
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({
                            "error": "Internal server error",
                            "status": 500
                        })),
                    )
                        .into_response();
                }
            };

            let cached = CachedResponse {
                status: parts.status.as_u16(),
                content_type: parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            };
            if let Err(e) = service.store_response(&key, &cached).await {
                tracing::error!(error = %e, "Failed to store idempotency response");
            }

            Response::from_parts(parts, Body::from(bytes))
        }
        Ok(IdempotencyStatus::Processing) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "Request is currently being processed",
                "status": 409
            })),
        )
            .into_response(),
        Ok(IdempotencyStatus::Completed(cached)) => {
            tracing::info!(key = %key, "Replaying idempotent response");
            cached.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Idempotency check failed");
            // On Redis failure, proceed with request (fail open)
            next.run(request).await
        }
    }
}
