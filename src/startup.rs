use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    /// `None` when no Redis is configured.
    pub redis: Option<bool>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        match self.redis {
            Some(ok) => println!("Redis Connectivity:    {}", status(ok)),
            None => println!("Redis Connectivity:    SKIPPED (REDIS_URL not set)"),
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: None,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {:#}", e));
    }

    if let Some(redis_url) = &config.redis_url {
        match validate_redis(redis_url).await {
            Ok(()) => report.redis = Some(true),
            Err(e) => {
                report.redis = Some(false);
                report.errors.push(format!("Redis: {:#}", e));
            }
        }
    }

    Ok(report)
}

pub fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.admin_api_key.len() < 16 {
        anyhow::bail!("ADMIN_API_KEY must be at least 16 characters");
    }
    if !config.stripe_webhook_secret.starts_with("whsec_") {
        anyhow::bail!("STRIPE_WEBHOOK_SECRET must start with 'whsec_'");
    }

    url::Url::parse(&config.stripe_api_base).context("STRIPE_API_BASE is not a valid URL")?;
    url::Url::parse(&config.checkout_success_url)
        .context("CHECKOUT_SUCCESS_URL is not a valid URL")?;
    url::Url::parse(&config.checkout_cancel_url)
        .context("CHECKOUT_CANCEL_URL is not a valid URL")?;
    if let Some(relay) = &config.mail_relay_url {
        url::Url::parse(relay).context("MAIL_RELAY_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_valid_config_passes() {
        let mut config = test_config();
        config.admin_api_key = "a-long-enough-admin-key".to_string();
        config.stripe_webhook_secret = "whsec_abc".to_string();
        assert!(validate_env_vars(&config).is_ok());
    }

    #[test]
    fn test_short_admin_key_fails() {
        let mut config = test_config();
        config.admin_api_key = "short".to_string();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_bad_url_fails() {
        let mut config = test_config();
        config.admin_api_key = "a-long-enough-admin-key".to_string();
        config.stripe_webhook_secret = "whsec_abc".to_string();
        config.checkout_success_url = "not a url".to_string();
        let err = validate_env_vars(&config).unwrap_err();
        assert!(err.to_string().contains("CHECKOUT_SUCCESS_URL"));
    }

    #[test]
    fn test_report_without_redis_is_valid() {
        let report = ValidationReport {
            environment: true,
            database: true,
            redis: None,
            errors: vec![],
        };
        assert!(report.is_valid());
    }
}
