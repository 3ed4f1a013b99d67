use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::models::{Order, OrderItem, PayoutTask, User};
use crate::db::{queries, users};
use crate::domain::{Confirmation, ItemCancellation, OrderAggregate, OrderStatus};
use crate::error::AppError;
use crate::mailer::{Email, Mailer};
use crate::payments::{RefundOutcome, StripeClient};

/// An order with its items, and for admins its payout tasks.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub payout_tasks: Vec<PayoutTask>,
}

impl OrderDetails {
    fn for_buyer(aggregate: OrderAggregate) -> Self {
        Self {
            order: aggregate.order,
            items: aggregate.items,
            payout_tasks: Vec::new(),
        }
    }
}

/// Builds the payout-details request sent when a seller's first item in an
/// order is confirmed. The admin copy is only added when an address is set.
pub fn payout_request_emails(
    seller: &User,
    order: &Order,
    task: &PayoutTask,
    admin_email: Option<&str>,
) -> Vec<Email> {
    let amount = format_amount(task.amount, &task.currency);
    let mut emails = vec![Email {
        to: seller.email.clone(),
        subject: format!("Order {}: please send your payout details", order.reference),
        text: format!(
            "Hello {},\n\n\
             The buyer of order {} confirmed receiving your comic. \
             {} is waiting to be paid out to you.\n\n\
             Please submit your payment information for payout task {} \
             so we can transfer the money.\n",
            seller.display_name, order.reference, amount, task.id
        ),
    }];

    if let Some(admin) = admin_email {
        emails.push(Email {
            to: admin.to_string(),
            subject: format!("Order {}: payout pending for {}", order.reference, seller.email),
            text: format!(
                "Seller {} ({}) has a confirmed handover in order {}.\n\
                 Payout task {} currently amounts to {}.\n",
                seller.display_name, seller.email, order.reference, task.id, amount
            ),
        });
    }

    emails
}

fn format_amount(minor: i64, currency: &str) -> String {
    format!(
        "{}.{:02} {}",
        minor / 100,
        (minor % 100).abs(),
        currency.to_uppercase()
    )
}

/// Sends every message, logging failures instead of returning them.
pub async fn dispatch_emails(mailer: &dyn Mailer, emails: &[Email]) {
    for email in emails {
        if let Err(e) = mailer.send(email).await {
            tracing::error!(to = %email.to, subject = %email.subject, error = %e, "Failed to send e-mail");
        }
    }
}

pub struct OrderService {
    pool: PgPool,
    stripe: StripeClient,
    mailer: Arc<dyn Mailer>,
    admin_email: Option<String>,
}

impl OrderService {
    pub fn new(
        pool: PgPool,
        stripe: StripeClient,
        mailer: Arc<dyn Mailer>,
        admin_email: Option<String>,
    ) -> Self {
        Self {
            pool,
            stripe,
            mailer,
            admin_email,
        }
    }

    /// Buyer confirms that one item was handed over.
    ///
    /// The order row stays locked for the whole transition so concurrent
    /// confirmations of the same order run one after another. The seller is
    /// notified after commit; a failed e-mail never undoes the confirmation.
    pub async fn confirm_item(&self, item_id: Uuid, buyer_id: Uuid) -> Result<OrderDetails, AppError> {
        let mut tx = self.pool.begin().await?;
        let order = queries::lock_order_for_item(&mut tx, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order item {} not found", item_id)))?;

        let mut aggregate = queries::load_aggregate(&mut tx, order).await?;
        let confirmation = aggregate.confirm_item(item_id, buyer_id, Utc::now())?;

        let (order_status, payout_task_id, notify_seller) = match confirmation {
            Confirmation::AlreadyConfirmed => {
                tracing::debug!(item_id = %item_id, "Order item already confirmed");
                return Ok(OrderDetails::for_buyer(aggregate));
            }
            Confirmation::Confirmed {
                order_status,
                payout_task_id,
                notify_seller,
            } => (order_status, payout_task_id, notify_seller),
        };

        queries::save_aggregate(&mut tx, &aggregate).await?;
        tx.commit().await?;

        tracing::info!(
            order_reference = %aggregate.order.reference,
            item_id = %item_id,
            order_status = %order_status,
            "Order item confirmed by buyer"
        );

        if let (Some(seller_id), Some(task_id)) = (notify_seller, payout_task_id) {
            if let Some(task) = aggregate.payout_task(task_id) {
                self.notify_seller(seller_id, &aggregate.order, task).await;
            }
        }

        Ok(OrderDetails::for_buyer(aggregate))
    }

    async fn notify_seller(&self, seller_id: Uuid, order: &Order, task: &PayoutTask) {
        let seller = match users::get_user(&self.pool, seller_id).await {
            Ok(seller) => seller,
            Err(e) => {
                tracing::error!(seller_id = %seller_id, error = %e, "Could not load seller for payout e-mail");
                return;
            }
        };
        let emails = payout_request_emails(&seller, order, task, self.admin_email.as_deref());
        dispatch_emails(self.mailer.as_ref(), &emails).await;
    }

    /// Cancels an item that was never handed over and relists its copy.
    pub async fn cancel_item(&self, item_id: Uuid) -> Result<OrderDetails, AppError> {
        let mut tx = self.pool.begin().await?;
        let order = queries::lock_order_for_item(&mut tx, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order item {} not found", item_id)))?;

        let mut aggregate = queries::load_aggregate(&mut tx, order).await?;
        match aggregate.cancel_item(item_id, Utc::now())? {
            ItemCancellation::AlreadyCanceled => {
                return Ok(self.details_for_admin(aggregate));
            }
            ItemCancellation::Canceled {
                order_status,
                relist_copy,
            } => {
                if let Some(copy_id) = relist_copy {
                    queries::relist_copies(&mut tx, &[copy_id]).await?;
                }
                queries::save_aggregate(&mut tx, &aggregate).await?;
                tx.commit().await?;
                tracing::info!(
                    order_reference = %aggregate.order.reference,
                    item_id = %item_id,
                    order_status = %order_status,
                    "Order item canceled"
                );
            }
        }

        Ok(self.details_for_admin(aggregate))
    }

    /// Returns the whole payment and releases every open item. Only allowed
    /// while nothing was handed over.
    pub async fn refund_order(&self, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let mut tx = self.pool.begin().await?;
        let order = queries::lock_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        let mut aggregate = queries::load_aggregate(&mut tx, order).await?;
        let payment_intent = aggregate.refundable_payment_intent()?.to_string();

        // Stripe replays the first answer for a repeated key, so a refund
        // whose commit failed can be retried safely.
        let idempotency_key = format!("refund-{}", aggregate.order.id);
        let outcome = self
            .stripe
            .create_refund(&payment_intent, &idempotency_key)
            .await?;

        let copies = aggregate.apply_refund(Utc::now());
        queries::relist_copies(&mut tx, &copies).await?;
        queries::save_aggregate(&mut tx, &aggregate).await?;
        tx.commit().await?;

        match &outcome {
            RefundOutcome::Created { refund_id } => tracing::info!(
                order_reference = %aggregate.order.reference,
                refund_id = %refund_id,
                released = copies.len(),
                "Order refunded"
            ),
            RefundOutcome::AlreadyRefunded => tracing::warn!(
                order_reference = %aggregate.order.reference,
                released = copies.len(),
                "Charge was already refunded at Stripe, order marked refunded"
            ),
        }

        Ok(self.details_for_admin(aggregate))
    }

    pub async fn get_for_buyer(&self, order_id: Uuid, buyer_id: Uuid) -> Result<OrderDetails, AppError> {
        let order = queries::get_order(&self.pool, order_id)
            .await
            .map_err(AppError::not_found_or(format!("Order {} not found", order_id)))?;
        if order.buyer_id != Some(buyer_id) {
            return Err(AppError::Forbidden("order belongs to another buyer".to_string()));
        }
        let items = queries::get_order_items(&self.pool, order_id).await?;
        Ok(OrderDetails {
            order,
            items,
            payout_tasks: Vec::new(),
        })
    }

    pub async fn list_for_buyer(&self, buyer_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Order>, AppError> {
        Ok(queries::list_orders_for_buyer(&self.pool, buyer_id, limit, offset).await?)
    }

    pub async fn get_for_admin(&self, order_id: Uuid) -> Result<OrderDetails, AppError> {
        let order = queries::get_order(&self.pool, order_id)
            .await
            .map_err(AppError::not_found_or(format!("Order {} not found", order_id)))?;
        let items = queries::get_order_items(&self.pool, order_id).await?;
        let payout_tasks = queries::get_payout_tasks_for_order(&self.pool, order_id).await?;
        Ok(OrderDetails {
            order,
            items,
            payout_tasks,
        })
    }

    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, AppError> {
        Ok(queries::list_orders(&self.pool, status, limit, offset).await?)
    }

    fn details_for_admin(&self, aggregate: OrderAggregate) -> OrderDetails {
        OrderDetails {
            order: aggregate.order,
            items: aggregate.items,
            payout_tasks: aggregate.payout_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::tests::{item, order};
    use crate::mailer::tests::RecordingMailer;

    fn seller() -> User {
        User::new(
            "seller@example.com".to_string(),
            "Sam Seller".to_string(),
            "hash".to_string(),
        )
    }

    /// Runs the confirmation transition the way the service does and returns
    /// the e-mails it would send.
    fn emails_after_confirming(
        aggregate: &mut OrderAggregate,
        item_id: Uuid,
        buyer: Uuid,
        seller: &User,
    ) -> Vec<Email> {
        match aggregate.confirm_item(item_id, buyer, Utc::now()).unwrap() {
            Confirmation::Confirmed {
                notify_seller: Some(_),
                payout_task_id: Some(task_id),
                ..
            } => {
                let task = aggregate.payout_task(task_id).unwrap();
                payout_request_emails(seller, &aggregate.order, task, Some("admin@example.com"))
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_payout_request_mentions_reference_and_amount() {
        let seller = seller();
        let order = order(Uuid::new_v4(), OrderStatus::Completed);
        let mut task_source = OrderAggregate::new(order.clone(), vec![item(&order, Some(seller.id), 1999)], vec![]);
        let item_id = task_source.items[0].id;
        let buyer = order.buyer_id.unwrap();

        let emails = emails_after_confirming(&mut task_source, item_id, buyer, &seller);

        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].to, "seller@example.com");
        assert!(emails[0].subject.contains("CM-20240611-ABCDEF12"));
        assert!(emails[0].text.contains("19.99 EUR"));
        assert_eq!(emails[1].to, "admin@example.com");
    }

    #[test]
    fn test_no_admin_copy_without_admin_address() {
        let seller = seller();
        let order = order(Uuid::new_v4(), OrderStatus::Completed);
        let task = PayoutTask {
            id: Uuid::new_v4(),
            order_id: order.id,
            seller_id: seller.id,
            amount: 500,
            currency: "eur".to_string(),
            status: crate::domain::PayoutTaskStatus::PendingPaymentInformation,
            payment_information: None,
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let emails = payout_request_emails(&seller, &order, &task, None);
        assert_eq!(emails.len(), 1);
    }

    #[test]
    fn test_second_item_of_same_seller_sends_nothing() {
        let seller = seller();
        let buyer = Uuid::new_v4();
        let order = order(buyer, OrderStatus::PaidPendingHandover);
        let items = vec![item(&order, Some(seller.id), 1000), item(&order, Some(seller.id), 500)];
        let (first, second) = (items[0].id, items[1].id);
        let mut aggregate = OrderAggregate::new(order, items, vec![]);

        assert_eq!(emails_after_confirming(&mut aggregate, first, buyer, &seller).len(), 2);
        assert!(emails_after_confirming(&mut aggregate, second, buyer, &seller).is_empty());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1999, "eur"), "19.99 EUR");
        assert_eq!(format_amount(5, "usd"), "0.05 USD");
        assert_eq!(format_amount(120000, "gbp"), "1200.00 GBP");
    }

    #[tokio::test]
    async fn test_dispatch_sends_every_message() {
        let mailer = RecordingMailer::default();
        let emails = vec![
            Email {
                to: "a@example.com".to_string(),
                subject: "one".to_string(),
                text: "1".to_string(),
            },
            Email {
                to: "b@example.com".to_string(),
                subject: "two".to_string(),
                text: "2".to_string(),
            },
        ];

        dispatch_emails(&mailer, &emails).await;

        assert_eq!(*mailer.sent.lock().unwrap(), emails);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        let emails = vec![Email {
            to: "a@example.com".to_string(),
            subject: "one".to_string(),
            text: "1".to_string(),
        }];

        dispatch_emails(&mailer, &emails).await;

        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
