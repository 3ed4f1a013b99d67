use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::db::models::{ListedCopy, Order, OrderItem, User};
use crate::db::queries::{self, Reservation};
use crate::domain::reference::generate_reference;
use crate::domain::{CopyStatus, OrderItemStatus, OrderStatus};
use crate::error::AppError;
use crate::payments::webhook::CheckoutSessionObject;
use crate::payments::{CheckoutLineItem, CheckoutSessionRequest, StripeClient, StripeEvent};
use crate::validation::MAX_CHECKOUT_ITEMS;

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    pub order_id: Uuid,
    pub reference: String,
    pub checkout_url: String,
}

/// Copies that passed every purchase check, in request order.
#[derive(Debug, Clone)]
pub struct CheckoutPlan {
    pub currency: String,
    pub total_amount: i64,
    pub lines: Vec<PlannedLine>,
}

#[derive(Debug, Clone)]
pub struct PlannedLine {
    pub copy_id: Uuid,
    pub seller_id: Uuid,
    pub title_name: String,
    pub price: i64,
}

/// Checks that `buyer_id` may buy exactly the copies in `requested`.
pub fn plan_checkout(
    buyer_id: Uuid,
    requested: &[Uuid],
    copies: Vec<ListedCopy>,
) -> Result<CheckoutPlan, AppError> {
    if requested.is_empty() {
        return Err(AppError::BadRequest("copy_ids must not be empty".to_string()));
    }
    if requested.len() > MAX_CHECKOUT_ITEMS {
        return Err(AppError::BadRequest(format!(
            "at most {} copies can be bought at once",
            MAX_CHECKOUT_ITEMS
        )));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = requested.iter().find(|id| !seen.insert(**id)) {
        return Err(AppError::BadRequest(format!("copy {} requested twice", dup)));
    }

    let mut by_id: HashMap<Uuid, ListedCopy> = copies.into_iter().map(|c| (c.id, c)).collect();
    let mut currency: Option<String> = None;
    let mut lines = Vec::with_capacity(requested.len());

    for id in requested {
        let copy = by_id
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("Copy {} not found", id)))?;

        if copy.status != CopyStatus::Listed {
            return Err(AppError::BadRequest(format!("copy {} is not for sale", id)));
        }
        if copy.owner_id == buyer_id {
            return Err(AppError::BadRequest(format!(
                "copy {} belongs to the buyer",
                id
            )));
        }
        let (price, copy_currency) = match (copy.price, copy.currency) {
            (Some(price), Some(currency)) => (price, currency),
            _ => {
                return Err(AppError::BadRequest(format!("copy {} has no price", id)));
            }
        };
        match &currency {
            Some(existing) if *existing != copy_currency => {
                return Err(AppError::BadRequest(
                    "all copies of a checkout must share one currency".to_string(),
                ));
            }
            Some(_) => {}
            None => currency = Some(copy_currency),
        }

        lines.push(PlannedLine {
            copy_id: copy.id,
            seller_id: copy.owner_id,
            title_name: copy.title_name,
            price,
        });
    }

    Ok(CheckoutPlan {
        currency: currency.unwrap_or_default(),
        total_amount: lines.iter().map(|line| line.price).sum(),
        lines,
    })
}

pub struct CheckoutService {
    pool: PgPool,
    stripe: StripeClient,
    success_url: String,
    cancel_url: String,
}

impl CheckoutService {
    pub fn new(pool: PgPool, stripe: StripeClient, success_url: String, cancel_url: String) -> Self {
        Self {
            pool,
            stripe,
            success_url,
            cancel_url,
        }
    }

    /// Opens a Stripe Checkout Session and records the pending order with
    /// its copies reserved.
    pub async fn create_checkout(
        &self,
        buyer: &User,
        copy_ids: &[Uuid],
    ) -> Result<CheckoutResult, AppError> {
        let copies = queries::get_copies_for_checkout(&self.pool, copy_ids).await?;
        let plan = plan_checkout(buyer.id, copy_ids, copies)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let reference = generate_reference(now);

        let request = CheckoutSessionRequest {
            currency: plan.currency.clone(),
            line_items: plan
                .lines
                .iter()
                .map(|line| CheckoutLineItem {
                    name: line.title_name.clone(),
                    unit_amount: line.price,
                    quantity: 1,
                })
                .collect(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            client_reference_id: order_id.to_string(),
            customer_email: Some(buyer.email.clone()),
            metadata: vec![("order_reference".to_string(), reference.clone())],
        };
        let session = self.stripe.create_checkout_session(&request).await?;

        let order = Order {
            id: order_id,
            buyer_id: Some(buyer.id),
            checkout_session_id: Some(session.id.clone()),
            payment_intent_id: None,
            total_amount: plan.total_amount,
            currency: plan.currency.clone(),
            reference: reference.clone(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        queries::insert_order(&mut tx, &order).await?;
        for line in &plan.lines {
            let item = OrderItem {
                id: Uuid::new_v4(),
                order_id,
                copy_id: Some(line.copy_id),
                seller_id: Some(line.seller_id),
                title_name: line.title_name.clone(),
                price: line.price,
                currency: plan.currency.clone(),
                status: OrderItemStatus::PendingHandover,
                buyer_confirmed_at: None,
                created_at: now,
            };
            queries::insert_order_item(&mut tx, &item).await?;
        }

        let reservations: Vec<Reservation> = plan
            .lines
            .iter()
            .map(|line| Reservation {
                copy_id: line.copy_id,
                price: line.price,
                currency: plan.currency.clone(),
            })
            .collect();
        let reserved = queries::reserve_copies(&mut tx, &reservations).await?;
        if reserved != reservations.len() as u64 {
            tx.rollback().await?;
            // The session is never paid and Stripe expires it.
            tracing::warn!(
                order_reference = %reference,
                checkout_session = %session.id,
                requested = reservations.len(),
                reserved,
                "Copies were taken or repriced by a concurrent request"
            );
            return Err(AppError::Conflict(
                "one or more copies are no longer available at the listed price".to_string(),
            ));
        }

        tx.commit().await?;

        tracing::info!(
            order_reference = %reference,
            buyer_id = %buyer.id,
            items = reservations.len(),
            total = plan.total_amount,
            currency = %plan.currency,
            "Checkout started"
        );

        Ok(CheckoutResult {
            order_id,
            reference,
            checkout_url: session.url,
        })
    }

    /// Applies a verified Stripe event. Redeliveries and unknown sessions are
    /// acknowledged without changes.
    pub async fn handle_event(&self, event: StripeEvent) -> Result<(), AppError> {
        match event {
            StripeEvent::CheckoutCompleted { event_id, session } => {
                if session.payment_status.as_deref() == Some("unpaid") {
                    tracing::info!(
                        event_id = %event_id,
                        checkout_session = %session.id,
                        "Checkout completed without payment yet, waiting for async payment"
                    );
                    return Ok(());
                }
                self.complete_session(&event_id, &session).await
            }
            StripeEvent::CheckoutExpired { event_id, session } => {
                self.expire_session(&event_id, &session).await
            }
            StripeEvent::Ignored {
                event_id,
                event_type,
            } => {
                tracing::debug!(event_id = %event_id, event_type = %event_type, "Ignoring Stripe event");
                Ok(())
            }
        }
    }

    async fn complete_session(
        &self,
        event_id: &str,
        session: &CheckoutSessionObject,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = queries::lock_order_for_session(&mut tx, &session.id).await? else {
            tracing::warn!(event_id = %event_id, checkout_session = %session.id, "No order for checkout session");
            return Ok(());
        };

        let mut aggregate = queries::load_aggregate(&mut tx, order).await?;
        if !aggregate.mark_paid(session.payment_intent.clone(), Utc::now()) {
            tracing::debug!(
                event_id = %event_id,
                order_reference = %aggregate.order.reference,
                status = %aggregate.order.status,
                "Checkout completion already applied"
            );
            return Ok(());
        }

        let copies: Vec<Uuid> = aggregate
            .items
            .iter()
            .filter(|item| item.status != OrderItemStatus::Canceled)
            .filter_map(|item| item.copy_id)
            .collect();
        queries::mark_copies_sold(&mut tx, &copies).await?;
        queries::save_aggregate(&mut tx, &aggregate).await?;
        tx.commit().await?;

        tracing::info!(
            event_id = %event_id,
            order_reference = %aggregate.order.reference,
            "Order paid"
        );
        Ok(())
    }

    async fn expire_session(
        &self,
        event_id: &str,
        session: &CheckoutSessionObject,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = queries::lock_order_for_session(&mut tx, &session.id).await? else {
            tracing::warn!(event_id = %event_id, checkout_session = %session.id, "No order for checkout session");
            return Ok(());
        };

        let mut aggregate = queries::load_aggregate(&mut tx, order).await?;
        let Some(copies) = aggregate.expire(Utc::now()) else {
            tracing::debug!(
                event_id = %event_id,
                order_reference = %aggregate.order.reference,
                status = %aggregate.order.status,
                "Expired session for an order that is no longer pending"
            );
            return Ok(());
        };

        queries::relist_copies(&mut tx, &copies).await?;
        queries::save_aggregate(&mut tx, &aggregate).await?;
        tx.commit().await?;

        tracing::info!(
            event_id = %event_id,
            order_reference = %aggregate.order.reference,
            released = copies.len(),
            "Checkout expired, copies relisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(owner_id: Uuid, price: i64, currency: &str) -> ListedCopy {
        ListedCopy {
            id: Uuid::new_v4(),
            owner_id,
            title_name: "Saga #1".to_string(),
            price: Some(price),
            currency: Some(currency.to_string()),
            status: CopyStatus::Listed,
        }
    }

    #[test]
    fn test_plan_keeps_request_order_and_sums() {
        let buyer = Uuid::new_v4();
        let a = listed(Uuid::new_v4(), 1200, "eur");
        let b = listed(Uuid::new_v4(), 800, "eur");
        let requested = vec![b.id, a.id];

        let plan = plan_checkout(buyer, &requested, vec![a.clone(), b.clone()]).unwrap();

        assert_eq!(plan.currency, "eur");
        assert_eq!(plan.total_amount, 2000);
        assert_eq!(plan.lines[0].copy_id, b.id);
        assert_eq!(plan.lines[1].seller_id, a.owner_id);
    }

    #[test]
    fn test_plan_rejects_empty_and_duplicates() {
        let buyer = Uuid::new_v4();
        assert!(matches!(
            plan_checkout(buyer, &[], vec![]),
            Err(AppError::BadRequest(_))
        ));

        let a = listed(Uuid::new_v4(), 500, "eur");
        assert!(matches!(
            plan_checkout(buyer, &[a.id, a.id], vec![a.clone()]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_plan_rejects_too_many_copies() {
        let ids: Vec<Uuid> = (0..=MAX_CHECKOUT_ITEMS).map(|_| Uuid::new_v4()).collect();
        assert!(matches!(
            plan_checkout(Uuid::new_v4(), &ids, vec![]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_plan_unknown_copy_is_not_found() {
        assert!(matches!(
            plan_checkout(Uuid::new_v4(), &[Uuid::new_v4()], vec![]),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_plan_rejects_unlisted_own_and_mixed_currency() {
        let buyer = Uuid::new_v4();

        let mut reserved = listed(Uuid::new_v4(), 500, "eur");
        reserved.status = CopyStatus::Reserved;
        assert!(matches!(
            plan_checkout(buyer, &[reserved.id], vec![reserved.clone()]),
            Err(AppError::BadRequest(_))
        ));

        let own = listed(buyer, 500, "eur");
        assert!(matches!(
            plan_checkout(buyer, &[own.id], vec![own.clone()]),
            Err(AppError::BadRequest(_))
        ));

        let eur = listed(Uuid::new_v4(), 500, "eur");
        let usd = listed(Uuid::new_v4(), 500, "usd");
        assert!(matches!(
            plan_checkout(buyer, &[eur.id, usd.id], vec![eur.clone(), usd.clone()]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_plan_rejects_unpriced_copy() {
        let mut copy = listed(Uuid::new_v4(), 500, "eur");
        copy.price = None;
        assert!(matches!(
            plan_checkout(Uuid::new_v4(), &[copy.id], vec![copy.clone()]),
            Err(AppError::BadRequest(_))
        ));
    }
}
