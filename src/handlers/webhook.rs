use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AppError;
use crate::payments::webhook::{verify_event, StripeEvent, WebhookError};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Largest webhook body read before the signature is checked.
pub const MAX_WEBHOOK_BODY: usize = 64 * 1024;

/// Extractor that checks the `Stripe-Signature` header against the raw
/// body before the event is parsed.
pub struct VerifiedStripeEvent(pub StripeEvent);

#[async_trait]
impl FromRequest<AppState> for VerifiedStripeEvent {
    type Rejection = WebhookRejection;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or(WebhookRejection::Signature(WebhookError::MissingHeader))?;

        let declared_len = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.is_some_and(|len| len > MAX_WEBHOOK_BODY) {
            return Err(WebhookRejection::BodyTooLarge);
        }

        // A body that outgrows the limit without a Content-Length ends up here too.
        let body = axum::body::to_bytes(req.into_body(), MAX_WEBHOOK_BODY)
            .await
            .map_err(|_| WebhookRejection::BodyRead)?;

        let event = verify_event(
            &state.config.stripe_webhook_secret,
            &body,
            &signature,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| match e {
            WebhookError::InvalidPayload(_) => WebhookRejection::Payload(e),
            e => WebhookRejection::Signature(e),
        })?;

        Ok(VerifiedStripeEvent(event))
    }
}

#[derive(Debug)]
pub enum WebhookRejection {
    Signature(WebhookError),
    Payload(WebhookError),
    BodyTooLarge,
    BodyRead,
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookRejection::Signature(WebhookError::InvalidSecret) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid webhook secret configuration".to_string(),
            ),
            WebhookRejection::Signature(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            WebhookRejection::Payload(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            WebhookRejection::BodyTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Webhook body exceeds {} bytes", MAX_WEBHOOK_BODY),
            ),
            WebhookRejection::BodyRead => (
                StatusCode::BAD_REQUEST,
                "Failed to read request body".to_string(),
            ),
        };

        tracing::warn!("Stripe webhook rejected: {:?}", self);
        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    VerifiedStripeEvent(event): VerifiedStripeEvent,
) -> Result<impl IntoResponse, AppError> {
    state.checkout_service().handle_event(event).await?;
    Ok(Json(json!({ "received": true })))
}
