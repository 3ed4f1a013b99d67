use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::PayoutTask;
use crate::db::queries;
use crate::domain::{PayoutError, PayoutTaskStatus};
use crate::error::AppError;

pub struct PayoutService {
    pool: PgPool,
}

impl PayoutService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_seller(
        &self,
        seller_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PayoutTask>, AppError> {
        Ok(queries::list_payout_tasks_for_seller(&self.pool, seller_id, limit, offset).await?)
    }

    pub async fn list(
        &self,
        status: Option<PayoutTaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PayoutTask>, AppError> {
        Ok(queries::list_payout_tasks(&self.pool, status, limit, offset).await?)
    }

    /// Seller hands in how they want to be paid.
    pub async fn submit_payment_information(
        &self,
        task_id: Uuid,
        seller_id: Uuid,
        information: serde_json::Value,
    ) -> Result<PayoutTask, AppError> {
        self.transition(task_id, Some(seller_id), "payment information submitted", |task, now| {
            task.submit_payment_information(information, now)
        })
        .await
    }

    /// Refused while the seller still has items of the order awaiting
    /// handover. Locks the order before the task, the same order confirmations
    /// take their locks in.
    pub async fn mark_paid(&self, task_id: Uuid) -> Result<PayoutTask, AppError> {
        let order_id = queries::get_payout_task(&self.pool, task_id)
            .await
            .map_err(AppError::not_found_or(format!("Payout task {} not found", task_id)))?
            .order_id;

        let mut tx = self.pool.begin().await?;
        let order = queries::lock_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        let aggregate = queries::load_aggregate(&mut tx, order).await?;
        let mut task = queries::lock_payout_task(&mut tx, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payout task {} not found", task_id)))?;

        let from = task.status;
        task.mark_paid(aggregate.open_items_for_seller(task.seller_id), Utc::now())?;
        let task = queries::update_payout_task(&mut tx, &task).await?;
        tx.commit().await?;

        tracing::info!(
            payout_task_id = %task.id,
            order_reference = %aggregate.order.reference,
            from = %from,
            to = %task.status,
            amount = task.amount,
            "Payout task marked paid"
        );
        Ok(task)
    }

    pub async fn archive(&self, task_id: Uuid) -> Result<PayoutTask, AppError> {
        self.transition(task_id, None, "archived", PayoutTask::archive)
            .await
    }

    /// Locks the task, checks ownership when `seller_id` is given, applies
    /// `apply` and stores the result.
    async fn transition<F>(
        &self,
        task_id: Uuid,
        seller_id: Option<Uuid>,
        action: &str,
        apply: F,
    ) -> Result<PayoutTask, AppError>
    where
        F: FnOnce(&mut PayoutTask, DateTime<Utc>) -> Result<(), PayoutError>,
    {
        let mut tx = self.pool.begin().await?;
        let mut task = queries::lock_payout_task(&mut tx, task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payout task {} not found", task_id)))?;

        if let Some(seller_id) = seller_id {
            if task.seller_id != seller_id {
                return Err(AppError::Forbidden(
                    "payout task belongs to another seller".to_string(),
                ));
            }
        }

        let from = task.status;
        apply(&mut task, Utc::now())?;
        let task = queries::update_payout_task(&mut tx, &task).await?;
        tx.commit().await?;

        tracing::info!(
            payout_task_id = %task.id,
            from = %from,
            to = %task.status,
            "Payout task {}", action
        );
        Ok(task)
    }
}
