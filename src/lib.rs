pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod mailer;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::mailer::Mailer;
use crate::middleware::{
    auth::admin_auth,
    idempotency::{idempotency_middleware, IdempotencyService},
    request_logger::{request_logger_middleware, RequestLogSettings},
};
use crate::payments::StripeClient;
use crate::services::{CheckoutService, OrderService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub stripe: StripeClient,
    pub mailer: Arc<dyn Mailer>,
    pub idempotency: Option<IdempotencyService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        db: sqlx::PgPool,
        config: Config,
        mailer: Arc<dyn Mailer>,
        idempotency: Option<IdempotencyService>,
    ) -> Self {
        let stripe = StripeClient::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
        );
        Self {
            db,
            config: Arc::new(config),
            stripe,
            mailer,
            idempotency,
            start_time: Instant::now(),
        }
    }

    pub fn checkout_service(&self) -> CheckoutService {
        CheckoutService::new(
            self.db.clone(),
            self.stripe.clone(),
            self.config.checkout_success_url.clone(),
            self.config.checkout_cancel_url.clone(),
        )
    }

    pub fn order_service(&self) -> OrderService {
        OrderService::new(
            self.db.clone(),
            self.stripe.clone(),
            self.mailer.clone(),
            self.config.admin_email.clone(),
        )
    }
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-idempotency-key"),
        ]);

    match origins {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(parsed)
        }
        None => layer.allow_origin(Any),
    }
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/orders", get(handlers::admin::list_orders))
        .route("/orders/:id", get(handlers::admin::get_order))
        .route("/orders/:id/refund", post(handlers::admin::refund_order))
        .route(
            "/order-items/:id/cancel",
            post(handlers::admin::cancel_order_item),
        )
        .route("/payouts", get(handlers::admin::list_payouts))
        .route(
            "/payouts/:id/mark-paid",
            post(handlers::admin::mark_payout_paid),
        )
        .route("/payouts/:id/archive", post(handlers::admin::archive_payout))
        .route_layer(from_fn_with_state(state.clone(), admin_auth))
}

fn catalog_routes() -> Router<AppState> {
    use handlers::catalog::*;

    Router::new()
        .route("/publishers", get(list_publishers).post(create_publisher))
        .route(
            "/publishers/:id",
            get(get_publisher)
                .put(update_publisher)
                .delete(delete_publisher),
        )
        .route("/artists", get(list_artists).post(create_artist))
        .route(
            "/artists/:id",
            get(get_artist).put(update_artist).delete(delete_artist),
        )
        .route("/series", get(list_series).post(create_series))
        .route(
            "/series/:id",
            get(get_series).put(update_series).delete(delete_series),
        )
        .route("/titles", get(list_titles).post(create_title))
        .route(
            "/titles/:id",
            get(get_title).put(update_title).delete(delete_title),
        )
}

fn checkout_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new().route("/checkout", post(handlers::checkout::create_checkout));
    match &state.idempotency {
        Some(service) => router.route_layer(from_fn_with_state(
            service.clone(),
            idempotency_middleware,
        )),
        None => router,
    }
}

pub fn create_app(state: AppState) -> Router {
    let log_settings = RequestLogSettings {
        log_body: state.config.log_request_body,
    };
    let cors = cors_layer(state.config.cors_allowed_origins.as_deref());

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me))
        .merge(catalog_routes())
        .route(
            "/copies",
            get(handlers::copies::list_copies).post(handlers::copies::create_copy),
        )
        .route(
            "/copies/:id",
            get(handlers::copies::get_copy)
                .put(handlers::copies::update_copy)
                .delete(handlers::copies::delete_copy),
        )
        .route(
            "/collections",
            get(handlers::collections::list_collections)
                .post(handlers::collections::create_collection),
        )
        .route(
            "/collections/:id",
            get(handlers::collections::get_collection)
                .delete(handlers::collections::delete_collection),
        )
        .route(
            "/collections/:id/copies",
            post(handlers::collections::add_copy),
        )
        .route(
            "/collections/:id/copies/:copy_id",
            axum::routing::delete(handlers::collections::remove_copy),
        )
        .merge(checkout_routes(&state))
        .route("/webhooks/stripe", post(handlers::webhook::stripe_webhook))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/order-items/:id/confirm",
            post(handlers::orders::confirm_order_item),
        )
        .route("/payouts", get(handlers::payouts::list_payouts))
        .route(
            "/payouts/:id/payment-information",
            put(handlers::payouts::submit_payment_information),
        )
        .nest("/admin", admin_routes(&state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(from_fn_with_state(log_settings, request_logger_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::mailer::LogMailer;
    use crate::payments::stripe::tests::session_json;
    use crate::payments::webhook::sign_payload;

    fn test_state() -> AppState {
        let config = crate::config::test_config();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let mailer = Arc::new(LogMailer::new(config.mail_from.clone()));
        AppState::new(pool, config, mailer, None)
    }

    #[tokio::test]
    async fn test_admin_routes_require_api_key() {
        let app = create_app(test_state());

        let response = app
            .clone()
            .oneshot(Request::get("/admin/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/admin/payouts")
                    .header("Authorization", "Bearer not-the-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_routes_require_bearer_token() {
        let app = create_app(test_state());

        for (method, uri) in [("GET", "/me"), ("POST", "/checkout"), ("GET", "/payouts")] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"copy_ids":[]}"#))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signatures() {
        let app = create_app(test_state());
        let payload = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;

        let response = app
            .clone()
            .oneshot(
                Request::post("/webhooks/stripe")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let now = chrono::Utc::now().timestamp();
        let forged = sign_payload("whsec_other_secret", payload.as_bytes(), now);
        let response = app
            .clone()
            .oneshot(
                Request::post("/webhooks/stripe")
                    .header("Stripe-Signature", forged)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let stale = sign_payload("whsec_test_secret", payload.as_bytes(), now - 3600);
        let response = app
            .oneshot(
                Request::post("/webhooks/stripe")
                    .header("Stripe-Signature", stale)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_ignores_unrelated_events() {
        let app = create_app(test_state());
        let payload = serde_json::json!({
            "id": "evt_2",
            "object": "event",
            "api_version": null,
            "created": 1718100000,
            "livemode": false,
            "pending_webhooks": 1,
            "request": null,
            "type": "checkout.session.async_payment_failed",
            "data": { "object": session_json("cs_1", None) }
        })
        .to_string();
        let signature = sign_payload(
            "whsec_test_secret",
            payload.as_bytes(),
            chrono::Utc::now().timestamp(),
        );

        let response = app
            .oneshot(
                Request::post("/webhooks/stripe")
                    .header("Stripe-Signature", signature)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_webhook_rejects_oversized_bodies() {
        let app = create_app(test_state());
        let payload = vec![b'x'; handlers::webhook::MAX_WEBHOOK_BODY + 1];
        let signature = sign_payload(
            "whsec_test_secret",
            &payload,
            chrono::Utc::now().timestamp(),
        );

        let response = app
            .clone()
            .oneshot(
                Request::post("/webhooks/stripe")
                    .header("Stripe-Signature", signature.clone())
                    .header("content-length", payload.len().to_string())
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = app
            .oneshot(
                Request::post("/webhooks/stripe")
                    .header("Stripe-Signature", signature)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_malformed_event_is_bad_request() {
        let app = create_app(test_state());
        let payload = "not json";
        let signature = sign_payload(
            "whsec_test_secret",
            payload.as_bytes(),
            chrono::Utc::now().timestamp(),
        );

        let response = app
            .oneshot(
                Request::post("/webhooks/stripe")
                    .header("Stripe-Signature", signature)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
