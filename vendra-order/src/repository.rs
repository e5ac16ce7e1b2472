use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Order, OrderPaymentStatus, OrderStatus, Payment, PaymentStatus, VendorBalance, VendorEntry,
    VendorTransaction, VendorTransactionStatus,
};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence for the Order aggregate. Concurrency safety for a single
/// order rests on the status-guarded updates: a transition applies only
/// when the current status matches one of the expected preconditions, so
/// racing writers resolve through compare-and-set rather than locks.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<(), RepoError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError>;

    async fn list_orders(&self, buyer_id: Uuid) -> Result<Vec<Order>, RepoError>;

    /// Returns true when the transition applied; false when the current
    /// status matched none of `expected` (lost race or repeat delivery).
    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[OrderStatus],
        next: OrderStatus,
    ) -> Result<bool, RepoError>;

    async fn update_payment_status(
        &self,
        id: Uuid,
        payment_status: OrderPaymentStatus,
        provider_ref: Option<&str>,
    ) -> Result<(), RepoError>;

    async fn set_delivered(&self, id: Uuid, delivered_at: DateTime<Utc>) -> Result<(), RepoError>;

    async fn set_payment_release_date(
        &self,
        id: Uuid,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepoError>;
}

/// Persistence for settlement-side payment records.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: &Payment) -> Result<(), RepoError>;

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, RepoError>;

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError>;

    async fn get_by_provider_ref(&self, provider_ref: &str)
        -> Result<Option<Payment>, RepoError>;

    /// Compare-and-set status update; same contract as the order guard.
    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        next: PaymentStatus,
    ) -> Result<bool, RepoError>;

    /// Persist a provider failure reason. Always written before the
    /// error is surfaced to the caller.
    async fn record_failure(&self, id: Uuid, reason: &str) -> Result<(), RepoError>;
}

/// Append-only vendor money-movement ledger. The balance is a
/// materialized projection maintained by `append`; nothing else mutates
/// it.
#[async_trait]
pub trait VendorLedgerRepository: Send + Sync {
    /// Append an entry and return the stored transaction with the
    /// resulting balance.
    async fn append(&self, entry: VendorEntry) -> Result<VendorTransaction, RepoError>;

    async fn balance(&self, vendor_id: Uuid) -> Result<VendorBalance, RepoError>;

    async fn transactions(&self, vendor_id: Uuid) -> Result<Vec<VendorTransaction>, RepoError>;

    /// Payout confirmation/failure reported back by the out-of-band
    /// transfer processor or a provider transfer webhook.
    async fn update_payout_status_for_order(
        &self,
        order_id: Uuid,
        status: VendorTransactionStatus,
    ) -> Result<u64, RepoError>;

    /// Connected-account reference for split payouts, if the vendor has
    /// completed provider onboarding.
    async fn vendor_account(&self, vendor_id: Uuid) -> Result<Option<String>, RepoError>;

    /// Capability sync from `account.updated` webhook events.
    async fn set_vendor_account_status(
        &self,
        vendor_account: &str,
        payouts_enabled: bool,
    ) -> Result<(), RepoError>;
}

/// Persisted idempotency keys for consumed events, so duplicate delivery
/// is provably a no-op across consumer restarts.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record a key. Returns true when newly recorded, false when the
    /// key was already present (duplicate delivery).
    async fn record(&self, key: &str, ttl_seconds: u64) -> Result<bool, RepoError>;
}
