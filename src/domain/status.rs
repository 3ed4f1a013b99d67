use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PaidPendingHandover,
    InProgressPartial,
    Completed,
    Canceled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PaidPendingHandover => "PAID_PENDING_HANDOVER",
            OrderStatus::InProgressPartial => "IN_PROGRESS_PARTIAL",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    /// Payment captured and not returned: item handover may proceed.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::PaidPendingHandover
                | OrderStatus::InProgressPartial
                | OrderStatus::Completed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_item_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderItemStatus {
    PendingHandover,
    BuyerConfirmed,
    Canceled,
}

impl fmt::Display for OrderItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderItemStatus::PendingHandover => "PENDING_HANDOVER",
            OrderItemStatus::BuyerConfirmed => "BUYER_CONFIRMED",
            OrderItemStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutTaskStatus {
    PendingPaymentInformation,
    PendingToPay,
    Paid,
    Archived,
}

impl fmt::Display for PayoutTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayoutTaskStatus::PendingPaymentInformation => "PENDING_PAYMENT_INFORMATION",
            PayoutTaskStatus::PendingToPay => "PENDING_TO_PAY",
            PayoutTaskStatus::Paid => "PAID",
            PayoutTaskStatus::Archived => "ARCHIVED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "copy_condition", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyCondition {
    Mint,
    NearMint,
    VeryFine,
    Fine,
    VeryGood,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "copy_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyStatus {
    Owned,
    Listed,
    Reserved,
    Sold,
}

impl CopyStatus {
    /// Reserved and sold copies are tied to an order and frozen.
    pub fn is_locked(&self) -> bool {
        matches!(self, CopyStatus::Reserved | CopyStatus::Sold)
    }
}
