//! Order workflow.
//!
//! An [`OrderAggregate`] is an order together with all of its items and payout
//! tasks, loaded under a row lock. Every transition mutates the aggregate in
//! memory and reports what happened; the caller persists the result inside the
//! same database transaction.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{Order, OrderItem, PayoutTask};
use crate::domain::status::{OrderItemStatus, OrderStatus, PayoutTaskStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("order item {0} not found")]
    ItemNotFound(Uuid),

    #[error("order item belongs to another buyer")]
    NotBuyer,

    #[error("order item {0} was canceled")]
    ItemCanceled(Uuid),

    #[error("order item {0} is already confirmed by the buyer")]
    ItemConfirmed(Uuid),

    #[error("order {reference} is {status}")]
    NotPaid { reference: String, status: OrderStatus },

    #[error("order {reference} cannot be refunded: {reason}")]
    NotRefundable { reference: String, reason: String },
}

/// Derives the order status from its items.
///
/// Canceled items do not count; an order with nothing but canceled items is
/// itself canceled.
pub fn derive_order_status(items: &[OrderItem]) -> OrderStatus {
    let active = items
        .iter()
        .filter(|item| item.status != OrderItemStatus::Canceled)
        .count();
    let confirmed = items
        .iter()
        .filter(|item| item.status == OrderItemStatus::BuyerConfirmed)
        .count();

    if active == 0 {
        OrderStatus::Canceled
    } else if confirmed == active {
        OrderStatus::Completed
    } else if confirmed > 0 {
        OrderStatus::InProgressPartial
    } else {
        OrderStatus::PaidPendingHandover
    }
}

/// Result of a buyer confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The item was confirmed earlier; nothing changed.
    AlreadyConfirmed,
    Confirmed {
        order_status: OrderStatus,
        /// Payout task touched by this confirmation, if the item has a seller.
        payout_task_id: Option<Uuid>,
        /// Set on the seller's first confirmed item in this order.
        notify_seller: Option<Uuid>,
    },
}

/// Result of canceling an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemCancellation {
    AlreadyCanceled,
    Canceled {
        order_status: OrderStatus,
        /// Copy to put back on the market.
        relist_copy: Option<Uuid>,
    },
}

#[derive(Debug, Clone)]
pub struct OrderAggregate {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payout_tasks: Vec<PayoutTask>,
}

impl OrderAggregate {
    pub fn new(order: Order, items: Vec<OrderItem>, payout_tasks: Vec<PayoutTask>) -> Self {
        Self {
            order,
            items,
            payout_tasks,
        }
    }

    pub fn item(&self, item_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn payout_task(&self, id: Uuid) -> Option<&PayoutTask> {
        self.payout_tasks.iter().find(|task| task.id == id)
    }

    /// Sum of confirmed item prices sold by `seller_id`.
    pub fn confirmed_total_for_seller(&self, seller_id: Uuid) -> i64 {
        self.items
            .iter()
            .filter(|item| {
                item.seller_id == Some(seller_id) && item.status == OrderItemStatus::BuyerConfirmed
            })
            .map(|item| item.price)
            .sum()
    }

    /// Items of `seller_id` in this order still waiting for handover.
    pub fn open_items_for_seller(&self, seller_id: Uuid) -> usize {
        self.items
            .iter()
            .filter(|item| {
                item.seller_id == Some(seller_id) && item.status == OrderItemStatus::PendingHandover
            })
            .count()
    }

    /// Buyer confirms the handover of one item.
    pub fn confirm_item(
        &mut self,
        item_id: Uuid,
        buyer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Confirmation, OrderError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;

        if self.order.buyer_id != Some(buyer_id) {
            return Err(OrderError::NotBuyer);
        }

        match self.items[index].status {
            OrderItemStatus::BuyerConfirmed => return Ok(Confirmation::AlreadyConfirmed),
            OrderItemStatus::Canceled => return Err(OrderError::ItemCanceled(item_id)),
            OrderItemStatus::PendingHandover => {}
        }

        if !self.order.status.is_paid() {
            return Err(OrderError::NotPaid {
                reference: self.order.reference.clone(),
                status: self.order.status,
            });
        }

        let seller_id = self.items[index].seller_id;
        let first_for_seller = seller_id.map(|seller| {
            !self.items.iter().any(|other| {
                other.id != item_id
                    && other.seller_id == Some(seller)
                    && other.status == OrderItemStatus::BuyerConfirmed
            })
        });

        let item = &mut self.items[index];
        item.status = OrderItemStatus::BuyerConfirmed;
        item.buyer_confirmed_at = Some(now);

        let order_status = self.recompute_status(now);

        let payout_task_id = seller_id.map(|seller| self.upsert_payout_task(seller, now));
        let notify_seller = match (seller_id, first_for_seller) {
            (Some(seller), Some(true)) => Some(seller),
            _ => None,
        };

        Ok(Confirmation::Confirmed {
            order_status,
            payout_task_id,
            notify_seller,
        })
    }

    /// Cancels an item that has not been handed over yet.
    pub fn cancel_item(
        &mut self,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemCancellation, OrderError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;

        match self.items[index].status {
            OrderItemStatus::Canceled => return Ok(ItemCancellation::AlreadyCanceled),
            OrderItemStatus::BuyerConfirmed => return Err(OrderError::ItemConfirmed(item_id)),
            OrderItemStatus::PendingHandover => {}
        }

        if !self.order.status.is_paid() {
            return Err(OrderError::NotPaid {
                reference: self.order.reference.clone(),
                status: self.order.status,
            });
        }

        let item = &mut self.items[index];
        item.status = OrderItemStatus::Canceled;
        let relist_copy = item.copy_id;

        let order_status = self.recompute_status(now);
        Ok(ItemCancellation::Canceled {
            order_status,
            relist_copy,
        })
    }

    /// Stripe reported the checkout session as paid. Returns `false` when the
    /// order had already left `PENDING` (webhook redelivery).
    pub fn mark_paid(&mut self, payment_intent_id: Option<String>, now: DateTime<Utc>) -> bool {
        if self.order.status != OrderStatus::Pending {
            return false;
        }
        self.order.status = OrderStatus::PaidPendingHandover;
        self.order.payment_intent_id = payment_intent_id;
        self.order.updated_at = now;
        true
    }

    /// The checkout session expired unpaid. Returns the copies to relist, or
    /// `None` when the order was no longer pending.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Option<Vec<Uuid>> {
        if self.order.status != OrderStatus::Pending {
            return None;
        }
        let copies = self.cancel_open_items();
        self.order.status = OrderStatus::Canceled;
        self.order.updated_at = now;
        Some(copies)
    }

    /// Checks that the order may be refunded and returns the payment intent.
    pub fn refundable_payment_intent(&self) -> Result<&str, OrderError> {
        let not_refundable = |reason: &str| OrderError::NotRefundable {
            reference: self.order.reference.clone(),
            reason: reason.to_string(),
        };

        if !matches!(
            self.order.status,
            OrderStatus::PaidPendingHandover | OrderStatus::Canceled
        ) {
            return Err(not_refundable(&format!("order is {}", self.order.status)));
        }
        if self
            .items
            .iter()
            .any(|item| item.status == OrderItemStatus::BuyerConfirmed)
        {
            return Err(not_refundable("an item was already confirmed"));
        }
        self.order
            .payment_intent_id
            .as_deref()
            .ok_or_else(|| not_refundable("no captured payment"))
    }

    /// Marks the order refunded after the payment provider returned the money.
    /// Returns the copies to relist.
    pub fn apply_refund(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let copies = self.cancel_open_items();
        self.order.status = OrderStatus::Refunded;
        self.order.updated_at = now;
        copies
    }

    fn cancel_open_items(&mut self) -> Vec<Uuid> {
        self.items
            .iter_mut()
            .filter(|item| item.status == OrderItemStatus::PendingHandover)
            .filter_map(|item| {
                item.status = OrderItemStatus::Canceled;
                item.copy_id
            })
            .collect()
    }

    fn recompute_status(&mut self, now: DateTime<Utc>) -> OrderStatus {
        if matches!(
            self.order.status,
            OrderStatus::Pending | OrderStatus::Refunded
        ) {
            return self.order.status;
        }
        let status = derive_order_status(&self.items);
        if status != self.order.status {
            tracing::debug!(
                order_reference = %self.order.reference,
                from = %self.order.status,
                to = %status,
                "Order status changed"
            );
            self.order.status = status;
            self.order.updated_at = now;
        }
        status
    }

    fn upsert_payout_task(&mut self, seller_id: Uuid, now: DateTime<Utc>) -> Uuid {
        let amount = self.confirmed_total_for_seller(seller_id);

        if let Some(task) = self
            .payout_tasks
            .iter_mut()
            .find(|task| task.seller_id == seller_id)
        {
            task.amount = amount;
            task.updated_at = now;
            return task.id;
        }

        let task = PayoutTask {
            id: Uuid::new_v4(),
            order_id: self.order.id,
            seller_id,
            amount,
            currency: self.order.currency.clone(),
            status: PayoutTaskStatus::PendingPaymentInformation,
            payment_information: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = task.id;
        self.payout_tasks.push(task);
        id
    }
}
