use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::PayoutTask;
use crate::domain::status::PayoutTaskStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("cannot {action} a payout task in status {status}")]
    InvalidTransition {
        action: &'static str,
        status: PayoutTaskStatus,
    },

    #[error("payment information must be a non-empty JSON object")]
    EmptyPaymentInformation,

    #[error("seller still has {open} item(s) awaiting handover in this order")]
    OpenItems { open: usize },
}

impl PayoutTask {
    /// Seller provides (or replaces) the details needed to pay them.
    pub fn submit_payment_information(
        &mut self,
        information: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), PayoutError> {
        match &information {
            serde_json::Value::Object(map) if !map.is_empty() => {}
            _ => return Err(PayoutError::EmptyPaymentInformation),
        }

        match self.status {
            PayoutTaskStatus::PendingPaymentInformation | PayoutTaskStatus::PendingToPay => {
                self.payment_information = Some(information);
                self.status = PayoutTaskStatus::PendingToPay;
                self.updated_at = now;
                Ok(())
            }
            status => Err(PayoutError::InvalidTransition {
                action: "update payment information of",
                status,
            }),
        }
    }

    /// `open_items` counts the seller's items in the order still awaiting
    /// handover. Their confirmation would raise `amount`, so the task cannot
    /// be paid before they are confirmed or canceled.
    pub fn mark_paid(&mut self, open_items: usize, now: DateTime<Utc>) -> Result<(), PayoutError> {
        if self.status != PayoutTaskStatus::PendingToPay {
            return Err(PayoutError::InvalidTransition {
                action: "mark as paid",
                status: self.status,
            });
        }
        if open_items > 0 {
            return Err(PayoutError::OpenItems { open: open_items });
        }
        self.status = PayoutTaskStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), PayoutError> {
        if self.status != PayoutTaskStatus::Paid {
            return Err(PayoutError::InvalidTransition {
                action: "archive",
                status: self.status,
            });
        }
        self.status = PayoutTaskStatus::Archived;
        self.updated_at = now;
        Ok(())
    }
}
