pub mod stripe;
pub mod webhook;

pub use stripe::{
    CheckoutLineItem, CheckoutSessionRequest, OpenedSession, RefundOutcome, StripeClient,
    StripeError,
};
pub use webhook::{StripeEvent, WebhookError};
