use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vendra_order::models::{Order, OrderItem, OrderPaymentStatus, OrderStatus, PaymentMethod};
use vendra_order::repository::{OrderRepository, RepoError};

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    external_ref: String,
    buyer_id: Uuid,
    vendor_id: Uuid,
    total_price: i64,
    platform_fee: i64,
    vendor_amount: i64,
    status: String,
    payment_status: String,
    payment_method: String,
    provider_ref: Option<String>,
    shipping_address: String,
    delivery_date: Option<DateTime<Utc>>,
    payment_release_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    vendor_id: Uuid,
    product_name: String,
    quantity: i32,
    unit_price: i64,
    created_at: DateTime<Utc>,
}

fn order_status(s: &str) -> Result<OrderStatus, RepoError> {
    match s {
        "PENDING" => Ok(OrderStatus::Pending),
        "PROCESSING" => Ok(OrderStatus::Processing),
        "CONFIRMED" => Ok(OrderStatus::Confirmed),
        "SHIPPED" => Ok(OrderStatus::Shipped),
        "DELIVERED" => Ok(OrderStatus::Delivered),
        "CANCELLED" => Ok(OrderStatus::Cancelled),
        "PAYMENT_FAILED" => Ok(OrderStatus::PaymentFailed),
        other => Err(format!("unknown order status in store: {}", other).into()),
    }
}

fn payment_status(s: &str) -> Result<OrderPaymentStatus, RepoError> {
    match s {
        "PENDING" => Ok(OrderPaymentStatus::Pending),
        "PENDING_VERIFICATION" => Ok(OrderPaymentStatus::PendingVerification),
        "HELD" => Ok(OrderPaymentStatus::Held),
        "CAPTURED" => Ok(OrderPaymentStatus::Captured),
        "RELEASED" => Ok(OrderPaymentStatus::Released),
        "REFUNDED" => Ok(OrderPaymentStatus::Refunded),
        "FAILED" => Ok(OrderPaymentStatus::Failed),
        other => Err(format!("unknown payment status in store: {}", other).into()),
    }
}

fn payment_method(s: &str) -> Result<PaymentMethod, RepoError> {
    match s {
        "CARD" => Ok(PaymentMethod::Card),
        "COD" => Ok(PaymentMethod::Cod),
        other => Err(format!("unknown payment method in store: {}", other).into()),
    }
}

fn assemble(row: OrderRow, item_rows: Vec<OrderItemRow>) -> Result<Order, RepoError> {
    let items = item_rows
        .into_iter()
        .map(|item| OrderItem {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            vendor_id: item.vendor_id,
            product_name: item.product_name,
            quantity: item.quantity as u32,
            unit_price: item.unit_price,
            created_at: item.created_at,
        })
        .collect();

    Ok(Order {
        id: row.id,
        external_ref: row.external_ref,
        buyer_id: row.buyer_id,
        vendor_id: row.vendor_id,
        items,
        total_price: row.total_price,
        platform_fee: row.platform_fee,
        vendor_amount: row.vendor_amount,
        status: order_status(&row.status)?,
        payment_status: payment_status(&row.payment_status)?,
        payment_method: payment_method(&row.payment_method)?,
        provider_ref: row.provider_ref,
        shipping_address: row.shipping_address.into(),
        delivery_date: row.delivery_date,
        payment_release_date: row.payment_release_date,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, external_ref, buyer_id, vendor_id, total_price, platform_fee,
                                vendor_amount, status, payment_status, payment_method, provider_ref,
                                shipping_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id)
        .bind(&order.external_ref)
        .bind(order.buyer_id)
        .bind(order.vendor_id)
        .bind(order.total_price)
        .bind(order.platform_fee)
        .bind(order.vendor_amount)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.provider_ref)
        .bind(&order.shipping_address.0)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, vendor_id, product_name,
                                         quantity, unit_price, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.vendor_id)
            .bind(&item.product_name)
            .bind(item.quantity as i32)
            .bind(item.unit_price)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, external_ref, buyer_id, vendor_id, total_price, platform_fee, vendor_amount,
                   status, payment_status, payment_method, provider_ref, shipping_address,
                   delivery_date, payment_release_date, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, vendor_id, product_name, quantity, unit_price, created_at
            FROM order_items WHERE order_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(assemble(row, items)?))
    }

    async fn list_orders(&self, buyer_id: Uuid) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC")
                .bind(buyer_id)
                .fetch_all(&self.pool)
                .await?;

        let mut orders = Vec::new();
        for (id,) in rows {
            if let Some(order) = self.get_order(id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[OrderStatus],
        next: OrderStatus,
    ) -> Result<bool, RepoError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();

        // Compare-and-set: zero rows affected means the precondition no
        // longer held (lost race or duplicate delivery).
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = ANY($3)",
        )
        .bind(next.as_str())
        .bind(id)
        .bind(&expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_payment_status(
        &self,
        id: Uuid,
        payment_status: OrderPaymentStatus,
        provider_ref: Option<&str>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $1, provider_ref = COALESCE($2, provider_ref), updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(payment_status.as_str())
        .bind(provider_ref)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_delivered(&self, id: Uuid, delivered_at: DateTime<Utc>) -> Result<(), RepoError> {
        sqlx::query("UPDATE orders SET delivery_date = $1, updated_at = NOW() WHERE id = $2")
            .bind(delivered_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_payment_release_date(
        &self,
        id: Uuid,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE orders SET payment_release_date = $1, updated_at = NOW() WHERE id = $2")
            .bind(released_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
