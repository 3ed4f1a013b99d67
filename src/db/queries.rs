use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{ListedCopy, Order, OrderItem, PayoutTask};
use crate::domain::status::{OrderStatus, PayoutTaskStatus};
use crate::domain::OrderAggregate;

// --- Copy Reservation ---

pub async fn get_copies_for_checkout(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<ListedCopy>> {
    sqlx::query_as::<_, ListedCopy>(
        r#"
        SELECT c.id, c.owner_id, t.name AS title_name, c.price, c.currency, c.status
        FROM copies c
        JOIN titles t ON t.id = c.title_id
        WHERE c.id = ANY($1)
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// One copy a checkout wants to reserve, with the price and currency the
/// buyer is being charged.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub copy_id: Uuid,
    pub price: i64,
    pub currency: String,
}

/// LISTED → RESERVED, only for copies whose price and currency still match.
/// Returns the number of copies actually reserved.
pub async fn reserve_copies(
    executor: &mut SqlxTransaction<'_, Postgres>,
    reservations: &[Reservation],
) -> Result<u64> {
    let ids: Vec<Uuid> = reservations.iter().map(|r| r.copy_id).collect();
    let prices: Vec<i64> = reservations.iter().map(|r| r.price).collect();
    let currencies: Vec<String> = reservations.iter().map(|r| r.currency.clone()).collect();

    let result = sqlx::query(
        r#"
        UPDATE copies c
        SET status = 'RESERVED', updated_at = NOW()
        FROM UNNEST($1::uuid[], $2::bigint[], $3::text[]) AS r(id, price, currency)
        WHERE c.id = r.id
          AND c.status = 'LISTED'
          AND c.price = r.price
          AND c.currency = r.currency
        "#,
    )
    .bind(&ids)
    .bind(&prices)
    .bind(&currencies)
    .execute(&mut **executor)
    .await?;
    Ok(result.rows_affected())
}

/// RESERVED → SOLD.
pub async fn mark_copies_sold(
    executor: &mut SqlxTransaction<'_, Postgres>,
    ids: &[Uuid],
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE copies SET status = 'SOLD', updated_at = NOW() WHERE id = ANY($1) AND status = 'RESERVED'",
    )
    .bind(ids)
    .execute(&mut **executor)
    .await?;
    Ok(result.rows_affected())
}

/// RESERVED or SOLD → LISTED.
pub async fn relist_copies(
    executor: &mut SqlxTransaction<'_, Postgres>,
    ids: &[Uuid],
) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        "UPDATE copies SET status = 'LISTED', updated_at = NOW() WHERE id = ANY($1) AND status IN ('RESERVED', 'SOLD')",
    )
    .bind(ids)
    .execute(&mut **executor)
    .await?;
    Ok(result.rows_affected())
}

// --- Order Queries ---

pub async fn insert_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order: &Order,
) -> Result<Order> {
    sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (
            id, buyer_id, checkout_session_id, payment_intent_id, total_amount, currency,
            reference, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(order.buyer_id)
    .bind(&order.checkout_session_id)
    .bind(&order.payment_intent_id)
    .bind(order.total_amount)
    .bind(&order.currency)
    .bind(&order.reference)
    .bind(order.status)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn insert_order_item(
    executor: &mut SqlxTransaction<'_, Postgres>,
    item: &OrderItem,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, copy_id, seller_id, title_name, price, currency, status,
            buyer_confirmed_at, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(item.id)
    .bind(item.order_id)
    .bind(item.copy_id)
    .bind(item.seller_id)
    .bind(&item.title_name)
    .bind(item.price)
    .bind(&item.currency)
    .bind(item.status)
    .bind(item.buyer_confirmed_at)
    .bind(item.created_at)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

pub async fn lock_order(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut **executor)
        .await
}

pub async fn lock_order_for_item(
    executor: &mut SqlxTransaction<'_, Postgres>,
    item_id: Uuid,
) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT o.* FROM orders o
        JOIN order_items i ON i.order_id = o.id
        WHERE i.id = $1
        FOR UPDATE OF o
        "#,
    )
    .bind(item_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn lock_order_for_session(
    executor: &mut SqlxTransaction<'_, Postgres>,
    checkout_session_id: &str,
) -> Result<Option<Order>> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE checkout_session_id = $1 FOR UPDATE")
        .bind(checkout_session_id)
        .fetch_optional(&mut **executor)
        .await
}

/// Loads items and payout tasks of an order that is already locked.
pub async fn load_aggregate(
    executor: &mut SqlxTransaction<'_, Postgres>,
    order: Order,
) -> Result<OrderAggregate> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order.id)
    .fetch_all(&mut **executor)
    .await?;

    let payout_tasks = sqlx::query_as::<_, PayoutTask>(
        "SELECT * FROM payout_tasks WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order.id)
    .fetch_all(&mut **executor)
    .await?;

    Ok(OrderAggregate::new(order, items, payout_tasks))
}

/// Writes back the order, its items and its payout tasks.
pub async fn save_aggregate(
    executor: &mut SqlxTransaction<'_, Postgres>,
    aggregate: &OrderAggregate,
) -> Result<()> {
    let order = &aggregate.order;
    sqlx::query(
        "UPDATE orders SET status = $2, payment_intent_id = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.status)
    .bind(&order.payment_intent_id)
    .bind(order.updated_at)
    .execute(&mut **executor)
    .await?;

    for item in &aggregate.items {
        sqlx::query(
            "UPDATE order_items SET status = $2, buyer_confirmed_at = $3 WHERE id = $1",
        )
        .bind(item.id)
        .bind(item.status)
        .bind(item.buyer_confirmed_at)
        .execute(&mut **executor)
        .await?;
    }

    for task in &aggregate.payout_tasks {
        upsert_payout_task(executor, task).await?;
    }

    Ok(())
}

pub async fn get_order(pool: &PgPool, id: Uuid) -> Result<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn get_order_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItem>> {
    sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}

pub async fn list_orders_for_buyer(
    pool: &PgPool,
    buyer_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>> {
    sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(buyer_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_orders(
    pool: &PgPool,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Order>> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT * FROM orders
        WHERE ($1::order_status IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

// --- Payout Task Queries ---

pub async fn upsert_payout_task(
    executor: &mut SqlxTransaction<'_, Postgres>,
    task: &PayoutTask,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payout_tasks (
            id, order_id, seller_id, amount, currency, status, payment_information,
            paid_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (order_id, seller_id) DO UPDATE SET
            amount = EXCLUDED.amount,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(task.id)
    .bind(task.order_id)
    .bind(task.seller_id)
    .bind(task.amount)
    .bind(&task.currency)
    .bind(task.status)
    .bind(&task.payment_information)
    .bind(task.paid_at)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

pub async fn get_payout_task(pool: &PgPool, id: Uuid) -> Result<PayoutTask> {
    sqlx::query_as::<_, PayoutTask>("SELECT * FROM payout_tasks WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn lock_payout_task(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<PayoutTask>> {
    sqlx::query_as::<_, PayoutTask>("SELECT * FROM payout_tasks WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **executor)
        .await
}

pub async fn update_payout_task(
    executor: &mut SqlxTransaction<'_, Postgres>,
    task: &PayoutTask,
) -> Result<PayoutTask> {
    sqlx::query_as::<_, PayoutTask>(
        r#"
        UPDATE payout_tasks
        SET status = $2, payment_information = $3, paid_at = $4, updated_at = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(task.id)
    .bind(task.status)
    .bind(&task.payment_information)
    .bind(task.paid_at)
    .bind(task.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_payout_tasks_for_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<PayoutTask>> {
    sqlx::query_as::<_, PayoutTask>(
        "SELECT * FROM payout_tasks WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
}

pub async fn list_payout_tasks_for_seller(
    pool: &PgPool,
    seller_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<PayoutTask>> {
    sqlx::query_as::<_, PayoutTask>(
        "SELECT * FROM payout_tasks WHERE seller_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(seller_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_payout_tasks(
    pool: &PgPool,
    status: Option<PayoutTaskStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<PayoutTask>> {
    sqlx::query_as::<_, PayoutTask>(
        r#"
        SELECT * FROM payout_tasks
        WHERE ($1::payout_task_status IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}
