use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::middleware::idempotency::IdempotencyService;
use crate::payments::StripeClient;

const CRITICAL_DEPENDENCIES: [&str; 1] = ["postgres"];

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    pub fn is_unhealthy(&self) -> bool {
        self.status == "unhealthy"
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub struct RedisChecker {
    service: IdempotencyService,
}

impl RedisChecker {
    pub fn new(service: IdempotencyService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl DependencyChecker for RedisChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.service.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

/// Reports the Stripe client's circuit breaker without calling Stripe.
pub struct StripeChecker {
    client: StripeClient,
}

impl StripeChecker {
    pub fn new(client: StripeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for StripeChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.circuit_state().as_str() {
            "closed" => DependencyStatus::healthy(start),
            state => DependencyStatus::unhealthy(format!("circuit breaker {}", state)),
        }
    }
}

pub async fn check_health(
    postgres: PostgresChecker,
    redis: Option<RedisChecker>,
    stripe: StripeChecker,
    start_time: Instant,
) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let (postgres_result, redis_result, stripe_result) = tokio::join!(
        timeout(timeout_duration, postgres.check()),
        async {
            match &redis {
                Some(checker) => Some(timeout(timeout_duration, checker.check()).await),
                None => None,
            }
        },
        timeout(timeout_duration, stripe.check())
    );

    let mut dependencies = HashMap::new();
    dependencies.insert(
        "postgres".to_string(),
        postgres_result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
    );
    // Redis only backs idempotency and is skipped when not configured.
    if let Some(result) = redis_result {
        dependencies.insert(
            "redis".to_string(),
            result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
        );
    }
    dependencies.insert(
        "stripe".to_string(),
        stripe_result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout")),
    );

    HealthResponse {
        status: determine_overall_status(&dependencies),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if CRITICAL_DEPENDENCIES.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}
