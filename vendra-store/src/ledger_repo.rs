use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vendra_order::models::{
    VendorBalance, VendorEntry, VendorTransaction, VendorTransactionKind, VendorTransactionStatus,
};
use vendra_order::repository::{RepoError, VendorLedgerRepository};

pub struct PgVendorLedgerRepository {
    pool: PgPool,
}

impl PgVendorLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    vendor_id: Uuid,
    order_id: Option<Uuid>,
    kind: String,
    amount: i64,
    balance_after: i64,
    status: String,
    created_at: DateTime<Utc>,
}

fn kind_from(s: &str) -> Result<VendorTransactionKind, RepoError> {
    match s {
        "SALE" => Ok(VendorTransactionKind::Sale),
        "PAYOUT" => Ok(VendorTransactionKind::Payout),
        "REFUND" => Ok(VendorTransactionKind::Refund),
        "FEE" => Ok(VendorTransactionKind::Fee),
        "ADJUSTMENT" => Ok(VendorTransactionKind::Adjustment),
        other => Err(format!("unknown ledger kind in store: {}", other).into()),
    }
}

fn status_from(s: &str) -> Result<VendorTransactionStatus, RepoError> {
    match s {
        "PENDING" => Ok(VendorTransactionStatus::Pending),
        "SETTLED" => Ok(VendorTransactionStatus::Settled),
        "FAILED" => Ok(VendorTransactionStatus::Failed),
        other => Err(format!("unknown ledger status in store: {}", other).into()),
    }
}

fn status_str(status: VendorTransactionStatus) -> &'static str {
    match status {
        VendorTransactionStatus::Pending => "PENDING",
        VendorTransactionStatus::Settled => "SETTLED",
        VendorTransactionStatus::Failed => "FAILED",
    }
}

impl TryFrom<TransactionRow> for VendorTransaction {
    type Error = RepoError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(VendorTransaction {
            id: row.id,
            vendor_id: row.vendor_id,
            order_id: row.order_id,
            kind: kind_from(&row.kind)?,
            amount: row.amount,
            balance_after: row.balance_after,
            status: status_from(&row.status)?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl VendorLedgerRepository for PgVendorLedgerRepository {
    async fn append(&self, entry: VendorEntry) -> Result<VendorTransaction, RepoError> {
        let mut tx = self.pool.begin().await?;

        // The balance row is the materialized projection of the
        // transaction log; it only ever changes inside this append.
        let (balance_after,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO vendor_balances (vendor_id, balance, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (vendor_id)
            DO UPDATE SET balance = vendor_balances.balance + $2, updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(entry.vendor_id)
        .bind(entry.amount)
        .fetch_one(&mut *tx)
        .await?;

        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO vendor_transactions (id, vendor_id, order_id, kind, amount, balance_after,
                                             status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(entry.vendor_id)
        .bind(entry.order_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(balance_after)
        .bind(status_str(entry.status))
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VendorTransaction {
            id,
            vendor_id: entry.vendor_id,
            order_id: entry.order_id,
            kind: entry.kind,
            amount: entry.amount,
            balance_after,
            status: entry.status,
            created_at,
        })
    }

    async fn balance(&self, vendor_id: Uuid) -> Result<VendorBalance, RepoError> {
        let row: Option<(i64, DateTime<Utc>)> =
            sqlx::query_as("SELECT balance, updated_at FROM vendor_balances WHERE vendor_id = $1")
                .bind(vendor_id)
                .fetch_optional(&self.pool)
                .await?;

        let (balance, updated_at) = row.unwrap_or((0, Utc::now()));
        Ok(VendorBalance {
            vendor_id,
            balance,
            updated_at,
        })
    }

    async fn transactions(&self, vendor_id: Uuid) -> Result<Vec<VendorTransaction>, RepoError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, vendor_id, order_id, kind, amount, balance_after, status, created_at
            FROM vendor_transactions WHERE vendor_id = $1 ORDER BY created_at
            "#,
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VendorTransaction::try_from).collect()
    }

    async fn update_payout_status_for_order(
        &self,
        order_id: Uuid,
        status: VendorTransactionStatus,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE vendor_transactions SET status = $1 WHERE order_id = $2 AND kind = 'PAYOUT'",
        )
        .bind(status_str(status))
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn vendor_account(&self, vendor_id: Uuid) -> Result<Option<String>, RepoError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT provider_account_id FROM vendor_accounts
            WHERE vendor_id = $1 AND payouts_enabled = TRUE
            "#,
        )
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(account,)| account))
    }

    async fn set_vendor_account_status(
        &self,
        vendor_account: &str,
        payouts_enabled: bool,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE vendor_accounts SET payouts_enabled = $1, updated_at = NOW()
            WHERE provider_account_id = $2
            "#,
        )
        .bind(payouts_enabled)
        .bind(vendor_account)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
