//! Stripe webhook verification and event decoding.
//!
//! Stripe signs `"{timestamp}.{raw body}"` with HMAC-SHA256 and sends
//! `Stripe-Signature: t=<unix>,v1=<hex>`. The timestamp is bounded here with
//! checked arithmetic before the payload reaches `Webhook::construct_event`.

use ::stripe::{EventObject, EventType, Webhook};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing Stripe-Signature header")]
    MissingHeader,
    #[error("malformed Stripe-Signature header")]
    MalformedHeader,
    #[error("Stripe-Signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature timestamp outside tolerance")]
    TimestampOutsideTolerance,
    #[error("signature verification failed")]
    SignatureMismatch,
    #[error("invalid webhook secret configuration")]
    InvalidSecret,
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

impl From<::stripe::WebhookError> for WebhookError {
    fn from(e: ::stripe::WebhookError) -> Self {
        match e {
            ::stripe::WebhookError::BadKey => WebhookError::InvalidSecret,
            ::stripe::WebhookError::BadSignature => WebhookError::SignatureMismatch,
            ::stripe::WebhookError::BadTimestamp(_) => WebhookError::TimestampOutsideTolerance,
            ::stripe::WebhookError::BadParse(e) => WebhookError::InvalidPayload(e.to_string()),
            _ => WebhookError::MalformedHeader,
        }
    }
}

fn check_timestamp(header: &str, now_unix: i64) -> Result<(), WebhookError> {
    let raw = header
        .split(',')
        .find_map(|part| part.trim().strip_prefix("t="))
        .ok_or(WebhookError::MissingTimestamp)?;
    let timestamp: i64 = raw.parse().map_err(|_| WebhookError::MalformedHeader)?;

    match now_unix.checked_sub(timestamp).map(i64::unsigned_abs) {
        Some(age) if age <= SIGNATURE_TOLERANCE_SECS => Ok(()),
        _ => Err(WebhookError::TimestampOutsideTolerance),
    }
}

/// Verifies a webhook payload against its `Stripe-Signature` header and
/// decodes the event.
pub fn verify_event(
    secret: &str,
    payload: &[u8],
    header: &str,
    now_unix: i64,
) -> Result<StripeEvent, WebhookError> {
    check_timestamp(header, now_unix)?;

    let payload =
        std::str::from_utf8(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let event = Webhook::construct_event(payload, header, secret)?;
    Ok(StripeEvent::from(event))
}

/// Signs a payload the way Stripe does. Used to build test fixtures and by
/// local tooling replaying events.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// The checkout-session fields the marketplace reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub client_reference_id: Option<String>,
    pub payment_intent: Option<String>,
    pub payment_status: Option<String>,
}

impl From<::stripe::CheckoutSession> for CheckoutSessionObject {
    fn from(session: ::stripe::CheckoutSession) -> Self {
        Self {
            id: session.id.to_string(),
            client_reference_id: session.client_reference_id,
            payment_intent: session.payment_intent.map(|intent| intent.id().to_string()),
            payment_status: Some(session.payment_status.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeEvent {
    CheckoutCompleted {
        event_id: String,
        session: CheckoutSessionObject,
    },
    CheckoutExpired {
        event_id: String,
        session: CheckoutSessionObject,
    },
    Ignored {
        event_id: String,
        event_type: String,
    },
}

impl From<::stripe::Event> for StripeEvent {
    fn from(event: ::stripe::Event) -> Self {
        let event_id = event.id.to_string();
        match (event.type_, event.data.object) {
            (
                EventType::CheckoutSessionCompleted | EventType::CheckoutSessionAsyncPaymentSucceeded,
                EventObject::CheckoutSession(session),
            ) => StripeEvent::CheckoutCompleted {
                event_id,
                session: session.into(),
            },
            (EventType::CheckoutSessionExpired, EventObject::CheckoutSession(session)) => {
                StripeEvent::CheckoutExpired {
                    event_id,
                    session: session.into(),
                }
            }
            (event_type, _) => StripeEvent::Ignored {
                event_id,
                event_type: format!("{:?}", event_type),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::stripe::tests::session_json;
    use serde_json::json;

    const SECRET: &str = "whsec_test123secret456";

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn event(event_type: &str, payment_status: &str) -> Vec<u8> {
        let mut session = session_json("cs_test_1", None);
        session["client_reference_id"] = json!("3f1c0f5e-5a4f-4c49-9d1a-6f0c1d9d2b11");
        session["payment_intent"] = json!("pi_1");
        session["payment_status"] = json!(payment_status);
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "object": "event",
            "api_version": null,
            "created": 1718100000,
            "livemode": false,
            "pending_webhooks": 1,
            "request": null,
            "type": event_type,
            "data": { "object": session }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let payload = event("checkout.session.completed", "paid");
        let header = sign_payload(SECRET, &payload, now());
        assert!(verify_event(SECRET, &payload, &header, now()).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = event("checkout.session.completed", "paid");
        let header = sign_payload("whsec_wrong_secret", &payload, now());
        assert_eq!(
            verify_event(SECRET, &payload, &header, now()),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_modified_payload_rejected() {
        let payload = event("checkout.session.completed", "paid");
        let header = sign_payload(SECRET, &payload, now());
        let tampered = event("checkout.session.completed", "unpaid");
        assert_eq!(
            verify_event(SECRET, &tampered, &header, now()),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = event("checkout.session.completed", "paid");
        let header = sign_payload(SECRET, &payload, now() - 600);
        assert_eq!(
            verify_event(SECRET, &payload, &header, now()),
            Err(WebhookError::TimestampOutsideTolerance)
        );
    }

    #[test]
    fn test_extreme_timestamps_are_rejected_without_overflow() {
        let payload = b"{}";
        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            assert_eq!(
                verify_event(SECRET, payload, header, 1_700_000_000),
                Err(WebhookError::TimestampOutsideTolerance)
            );
        }
        assert_eq!(
            check_timestamp("t=-9223372036854775808,v1=00", i64::MAX),
            Err(WebhookError::TimestampOutsideTolerance)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let payload = event("checkout.session.completed", "paid");
        assert_eq!(
            verify_event(SECRET, &payload, "garbage", now()),
            Err(WebhookError::MissingTimestamp)
        );
        assert_eq!(
            verify_event(SECRET, &payload, "v1=abcd", now()),
            Err(WebhookError::MissingTimestamp)
        );
        assert_eq!(
            verify_event(SECRET, &payload, "t=soon,v1=abcd", now()),
            Err(WebhookError::MalformedHeader)
        );
        assert!(verify_event(SECRET, &payload, &format!("t={}", now()), now()).is_err());
    }

    #[test]
    fn test_completed_event_is_decoded() {
        let payload = event("checkout.session.completed", "paid");
        let header = sign_payload(SECRET, &payload, now());

        match verify_event(SECRET, &payload, &header, now()).unwrap() {
            StripeEvent::CheckoutCompleted { event_id, session } => {
                assert_eq!(event_id, "evt_1");
                assert_eq!(session.id, "cs_test_1");
                assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));
                assert_eq!(session.payment_status.as_deref(), Some("paid"));
                assert_eq!(
                    session.client_reference_id.as_deref(),
                    Some("3f1c0f5e-5a4f-4c49-9d1a-6f0c1d9d2b11")
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_expired_and_unrelated_events() {
        let payload = event("checkout.session.expired", "unpaid");
        let header = sign_payload(SECRET, &payload, now());
        assert!(matches!(
            verify_event(SECRET, &payload, &header, now()),
            Ok(StripeEvent::CheckoutExpired { .. })
        ));

        let payload = event("checkout.session.async_payment_failed", "unpaid");
        let header = sign_payload(SECRET, &payload, now());
        assert!(matches!(
            verify_event(SECRET, &payload, &header, now()),
            Ok(StripeEvent::Ignored { .. })
        ));
    }

    #[test]
    fn test_invalid_payload() {
        let header = sign_payload(SECRET, b"not json", now());
        assert!(matches!(
            verify_event(SECRET, b"not json", &header, now()),
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
