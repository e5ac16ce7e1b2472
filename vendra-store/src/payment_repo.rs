use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vendra_order::models::{Payment, PaymentStatus};
use vendra_order::repository::{PaymentRepository, RepoError};

pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    provider_ref: Option<String>,
    vendor_account: Option<String>,
    platform_fee: i64,
    vendor_amount: i64,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn status_from(s: &str) -> Result<PaymentStatus, RepoError> {
    match s {
        "INITIATED" => Ok(PaymentStatus::Initiated),
        "AUTHORIZED" => Ok(PaymentStatus::Authorized),
        "CAPTURED" => Ok(PaymentStatus::Captured),
        "REFUND_PENDING" => Ok(PaymentStatus::RefundPending),
        "REFUNDED" => Ok(PaymentStatus::Refunded),
        "REFUND_FAILED" => Ok(PaymentStatus::RefundFailed),
        "FAILED" => Ok(PaymentStatus::Failed),
        other => Err(format!("unknown payment status in store: {}", other).into()),
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = RepoError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            amount: row.amount,
            currency: row.currency,
            status: status_from(&row.status)?,
            provider_ref: row.provider_ref,
            vendor_account: row.vendor_account,
            platform_fee: row.platform_fee,
            vendor_amount: row.vendor_amount,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT: &str = r#"
    SELECT id, order_id, amount, currency, status, provider_ref, vendor_account,
           platform_fee, vendor_amount, failure_reason, created_at, updated_at
    FROM payments
"#;

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn create_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount, currency, status, provider_ref,
                                  vendor_account, platform_fee, vendor_amount, failure_reason,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.provider_ref)
        .bind(&payment.vendor_account)
        .bind(payment.platform_fee)
        .bind(payment.vendor_amount)
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, RepoError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!("{} WHERE order_id = $1", SELECT))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn get_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, RepoError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("{} WHERE provider_ref = $1", SELECT))
                .bind(provider_ref)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        next: PaymentStatus,
    ) -> Result<bool, RepoError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();

        let result = sqlx::query(
            "UPDATE payments SET status = $1, updated_at = NOW() WHERE id = $2 AND status = ANY($3)",
        )
        .bind(next.as_str())
        .bind(id)
        .bind(&expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(&self, id: Uuid, reason: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE payments SET failure_reason = $1, updated_at = NOW() WHERE id = $2")
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
