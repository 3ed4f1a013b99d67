//! Outgoing e-mail.
//!
//! Production traffic goes through an HTTP transactional-mail relay; without a
//! relay configured, messages are only logged.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("mail relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailerError>;
}

/// Builds the mailer described by the configuration.
pub fn from_config(config: &Config) -> Arc<dyn Mailer> {
    match &config.mail_relay_url {
        Some(url) => {
            tracing::info!(relay = %url, "Using HTTP mail relay");
            Arc::new(HttpMailer::new(
                url.clone(),
                config.mail_relay_api_key.clone(),
                config.mail_from.clone(),
            ))
        }
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, e-mails will only be logged");
            Arc::new(LogMailer::new(config.mail_from.clone()))
        }
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: Option<String>, from: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailerError> {
        let message = RelayMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %email.to, subject = %email.subject, "E-mail sent");
        Ok(())
    }
}

pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: String) -> Self {
        Self { from }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailerError> {
        tracing::info!(
            from = %self.from,
            to = %email.to,
            subject = %email.subject,
            body_len = email.text.len(),
            "E-mail not sent (no relay configured)"
        );
        Ok(())
    }
}
