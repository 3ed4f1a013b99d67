use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "comic-market")]
#[command(about = "Comic Market - marketplace API for comic-book collectors", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the loaded configuration with secrets masked
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");
    crate::startup::validate_env_vars(config)?;

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  Stripe API Base: {}", config.stripe_api_base);
    println!("  Stripe Secret Key: {}", mask_secret(&config.stripe_secret_key));
    println!("  Stripe Webhook Secret: {}", mask_secret(&config.stripe_webhook_secret));
    println!("  Checkout Success URL: {}", config.checkout_success_url);
    println!("  Checkout Cancel URL: {}", config.checkout_cancel_url);
    println!("  Admin API Key: {}", mask_secret(&config.admin_api_key));
    println!("  Mail From: {}", config.mail_from);
    println!(
        "  Mail Relay: {}",
        config.mail_relay_url.as_deref().unwrap_or("(log only)")
    );
    println!(
        "  Admin E-mail: {}",
        config.admin_email.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Redis URL: {}",
        config
            .redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(idempotency disabled)".to_string())
    );
    println!("  Log Format: {:?}", config.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

/// Keeps a recognisable prefix such as `sk_test_` or `whsec_`.
fn mask_secret(secret: &str) -> String {
    let visible = secret
        .rfind('_')
        .map(|pos| pos + 1)
        .filter(|&end| end <= 8 && end < secret.len())
        .unwrap_or(0);
    format!("{}****", &secret[..visible])
}
