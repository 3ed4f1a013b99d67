use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;

use ::stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateRefund, Currency, ErrorCode,
    PaymentIntentId, Refund, RequestStrategy,
};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("Stripe rejected the request ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Stripe request failed: {0}")]
    Request(String),
    #[error("Invalid Stripe request: {0}")]
    InvalidRequest(String),
    #[error("Invalid response from Stripe: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<::stripe::StripeError> for StripeError {
    fn from(e: ::stripe::StripeError) -> Self {
        match e {
            ::stripe::StripeError::Stripe(err) => StripeError::Api {
                status: err.http_status,
                message: err
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{:?}", err.error_type)),
            },
            other => StripeError::Request(other.to_string()),
        }
    }
}

/// One line of a checkout, priced inline.
#[derive(Debug, Clone)]
pub struct CheckoutLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Echoed back on webhook events; we use the order id.
    pub client_reference_id: String,
    pub customer_email: Option<String>,
    pub metadata: Vec<(String, String)>,
}

/// The parts of a created session the checkout flow keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Created { refund_id: String },
    /// Stripe reports the charge as refunded by an earlier attempt.
    AlreadyRefunded,
}

/// Stripe API client guarded by a circuit breaker.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl StripeClient {
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_circuit_breaker(base_url, secret_key, 3, 60)
    }

    /// `base_url` is checked by startup validation; an unparsable value
    /// falls back to the public Stripe endpoint.
    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = match url::Url::parse(&base_url) {
            Ok(_) => Client::from_url(base_url.as_str(), secret_key),
            Err(e) => {
                tracing::error!(base_url = %base_url, error = %e, "Invalid Stripe API base, using default");
                Client::new(secret_key)
            }
        };

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        StripeClient {
            client,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<OpenedSession, StripeError> {
        let currency = Currency::from_str(&request.currency).map_err(|_| {
            StripeError::InvalidRequest(format!("unsupported currency {}", request.currency))
        })?;

        let line_items = request
            .line_items
            .iter()
            .map(|item| CreateCheckoutSessionLineItems {
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency,
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: item.name.clone(),
                        ..Default::default()
                    }),
                    unit_amount: Some(item.unit_amount),
                    ..Default::default()
                }),
                quantity: Some(u64::from(item.quantity)),
                ..Default::default()
            })
            .collect();
        let metadata: HashMap<String, String> = request.metadata.iter().cloned().collect();

        let params = CreateCheckoutSession {
            mode: Some(CheckoutSessionMode::Payment),
            success_url: Some(&request.success_url),
            cancel_url: Some(&request.cancel_url),
            client_reference_id: Some(&request.client_reference_id),
            customer_email: request.customer_email.as_deref(),
            line_items: Some(line_items),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = self
            .guarded("checkout.session.create", CheckoutSession::create(&self.client, params))
            .await?;

        let id = session.id.to_string();
        match session.url {
            Some(url) => Ok(OpenedSession { id, url }),
            None => Err(StripeError::InvalidResponse(format!(
                "checkout session {} has no url",
                id
            ))),
        }
    }

    /// Refunds a payment intent in full. `idempotency_key` makes retries of
    /// the same refund return Stripe's first answer.
    pub async fn create_refund(
        &self,
        payment_intent: &str,
        idempotency_key: &str,
    ) -> Result<RefundOutcome, StripeError> {
        let intent = PaymentIntentId::from_str(payment_intent).map_err(|_| {
            StripeError::InvalidRequest(format!("invalid payment intent id {}", payment_intent))
        })?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(intent);

        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(idempotency_key.to_string()));
        let call = Refund::create(&client, params);

        self.guarded("refund.create", async move {
            match call.await {
                Ok(refund) => Ok(RefundOutcome::Created {
                    refund_id: refund.id.to_string(),
                }),
                Err(::stripe::StripeError::Stripe(err))
                    if matches!(err.code, Some(ErrorCode::ChargeAlreadyRefunded)) =>
                {
                    Ok(RefundOutcome::AlreadyRefunded)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StripeError>
    where
        F: Future<Output = Result<T, ::stripe::StripeError>>,
    {
        match self.circuit_breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(StripeError::CircuitBreakerOpen(
                "Stripe API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => {
                let e = StripeError::from(e);
                tracing::warn!(operation, error = %e, "Stripe request failed");
                Err(e)
            }
        }
    }
}
