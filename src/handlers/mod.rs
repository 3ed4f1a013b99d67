pub mod admin;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod collections;
pub mod copies;
pub mod orders;
pub mod payouts;
pub mod webhook;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

use crate::health::{self, PostgresChecker, RedisChecker, StripeChecker};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Returns `(limit, offset)` clamped to sane bounds.
    pub fn resolve(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = health::check_health(
        PostgresChecker::new(state.db.clone()),
        state.idempotency.clone().map(RedisChecker::new),
        StripeChecker::new(state.stripe.clone()),
        state.start_time,
    )
    .await;

    let status_code = if response.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
