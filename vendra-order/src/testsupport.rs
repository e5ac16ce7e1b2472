//! In-memory doubles for the core seams, used across unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;
use vendra_core::clients::{CartClient, CartLine, InventoryClient, StockCheck, StockUpdateItem, StockUpdateStatus};
use vendra_core::events::EventSink;
use vendra_core::payment::{
    AuthorizationRequest, PaymentProvider, ProviderError, ProviderIntent, ProviderIntentStatus,
    ProviderRefund, ProviderRefundStatus,
};
use vendra_core::{CoreError, CoreResult};

use crate::models::{
    Order, OrderPaymentStatus, OrderStatus, Payment, PaymentStatus, VendorBalance, VendorEntry,
    VendorTransaction, VendorTransactionKind, VendorTransactionStatus,
};
use crate::repository::{
    OrderRepository, PaymentRepository, RepoError, VendorLedgerRepository,
};

#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl MemoryOrderRepository {
    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), RepoError> {
        self.orders.lock().unwrap().insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    async fn list_orders(&self, buyer_id: Uuid) -> Result<Vec<Order>, RepoError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[OrderStatus],
        next: OrderStatus,
    ) -> Result<bool, RepoError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or("order not found")?;
        if !expected.contains(&order.status) {
            return Ok(false);
        }
        order.status = next;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_payment_status(
        &self,
        id: Uuid,
        payment_status: OrderPaymentStatus,
        provider_ref: Option<&str>,
    ) -> Result<(), RepoError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or("order not found")?;
        order.payment_status = payment_status;
        if let Some(provider_ref) = provider_ref {
            order.provider_ref = Some(provider_ref.to_string());
        }
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_delivered(
        &self,
        id: Uuid,
        delivered_at: chrono::DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or("order not found")?;
        order.delivery_date = Some(delivered_at);
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn set_payment_release_date(
        &self,
        id: Uuid,
        released_at: chrono::DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or("order not found")?;
        order.payment_release_date = Some(released_at);
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPaymentRepository {
    payments: Mutex<HashMap<Uuid, Payment>>,
}

impl MemoryPaymentRepository {
    pub fn by_order(&self, order_id: Uuid) -> Option<Payment> {
        self.payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.order_id == order_id)
            .cloned()
    }
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepository {
    async fn create_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, RepoError> {
        Ok(self.payments.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_order(&self, order_id: Uuid) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn get_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<Payment>, RepoError> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn update_status_guarded(
        &self,
        id: Uuid,
        expected: &[PaymentStatus],
        next: PaymentStatus,
    ) -> Result<bool, RepoError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or("payment not found")?;
        if !expected.contains(&payment.status) {
            return Ok(false);
        }
        payment.status = next;
        payment.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_failure(&self, id: Uuid, reason: &str) -> Result<(), RepoError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments.get_mut(&id).ok_or("payment not found")?;
        payment.failure_reason = Some(reason.to_string());
        payment.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<VendorTransaction>>,
    balances: Mutex<HashMap<Uuid, i64>>,
    accounts: Mutex<HashMap<Uuid, String>>,
}

impl MemoryLedger {
    pub fn with_account(self, vendor_id: Uuid, account: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(vendor_id, account.to_string());
        self
    }

    pub fn entries_of_kind(&self, kind: VendorTransactionKind) -> Vec<VendorTransaction> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl VendorLedgerRepository for MemoryLedger {
    async fn append(&self, entry: VendorEntry) -> Result<VendorTransaction, RepoError> {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(entry.vendor_id).or_insert(0);
        *balance += entry.amount;

        let tx = VendorTransaction {
            id: Uuid::new_v4(),
            vendor_id: entry.vendor_id,
            order_id: entry.order_id,
            kind: entry.kind,
            amount: entry.amount,
            balance_after: *balance,
            status: entry.status,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(tx.clone());
        Ok(tx)
    }

    async fn balance(&self, vendor_id: Uuid) -> Result<VendorBalance, RepoError> {
        let balance = *self.balances.lock().unwrap().get(&vendor_id).unwrap_or(&0);
        Ok(VendorBalance {
            vendor_id,
            balance,
            updated_at: Utc::now(),
        })
    }

    async fn transactions(&self, vendor_id: Uuid) -> Result<Vec<VendorTransaction>, RepoError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    async fn update_payout_status_for_order(
        &self,
        order_id: Uuid,
        status: VendorTransactionStatus,
    ) -> Result<u64, RepoError> {
        let mut entries = self.entries.lock().unwrap();
        let mut updated = 0;
        for tx in entries.iter_mut() {
            if tx.order_id == Some(order_id) && tx.kind == VendorTransactionKind::Payout {
                tx.status = status;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn vendor_account(&self, vendor_id: Uuid) -> Result<Option<String>, RepoError> {
        Ok(self.accounts.lock().unwrap().get(&vendor_id).cloned())
    }

    async fn set_vendor_account_status(
        &self,
        _vendor_account: &str,
        _payouts_enabled: bool,
    ) -> Result<(), RepoError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub published: Mutex<Vec<(String, String, String)>>,
}

impl RecordingSink {
    pub fn topic_count(&self, topic: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            key.to_string(),
            payload.to_string(),
        ));
        Ok(())
    }
}

/// Inventory stub: every product is in stock unless listed as short.
#[derive(Default)]
pub struct StubInventoryClient {
    pub shortages: Mutex<HashMap<Uuid, u32>>,
    pub check_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl StubInventoryClient {
    pub fn with_shortage(self, product_id: Uuid, available: u32) -> Self {
        self.shortages.lock().unwrap().insert(product_id, available);
        self
    }

    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryClient for StubInventoryClient {
    async fn check_stock(&self, product_id: Uuid, quantity: u32) -> CoreResult<StockCheck> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Unavailable("inventory service down".into()));
        }
        self.check_calls.fetch_add(1, Ordering::SeqCst);

        let shortages = self.shortages.lock().unwrap();
        match shortages.get(&product_id) {
            Some(&available) if available < quantity => Ok(StockCheck {
                in_stock: false,
                available_qty: available,
                reservation_token: None,
            }),
            _ => Ok(StockCheck {
                in_stock: true,
                available_qty: quantity,
                reservation_token: Some(format!("rsv-{}", product_id.simple())),
            }),
        }
    }

    async fn update_stock(
        &self,
        items: &[StockUpdateItem],
    ) -> CoreResult<Vec<StockUpdateStatus>> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(items
            .iter()
            .map(|item| StockUpdateStatus {
                product_id: item.product_id,
                updated: true,
                message: None,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct StubCartClient {
    pub lines: Mutex<Vec<CartLine>>,
}

impl StubCartClient {
    pub fn with_lines(self, lines: Vec<CartLine>) -> Self {
        *self.lines.lock().unwrap() = lines;
        self
    }
}

#[async_trait]
impl CartClient for StubCartClient {
    async fn get_cart_items(&self, _buyer_id: Uuid) -> CoreResult<Vec<CartLine>> {
        Ok(self.lines.lock().unwrap().clone())
    }
}

/// Provider double recording call counts; individual operations can be
/// made to fail.
#[derive(Default)]
pub struct MockProvider {
    pub authorize_calls: AtomicUsize,
    pub capture_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub fail_capture: AtomicBool,
    pub fail_refund: AtomicBool,
}

impl MockProvider {
    fn intent(&self, order_id: Uuid, amount: i64, status: ProviderIntentStatus) -> ProviderIntent {
        ProviderIntent {
            provider_ref: format!("pi_{}", order_id.simple()),
            order_id,
            amount,
            currency: "USD".to_string(),
            status,
            client_secret: None,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<ProviderIntent, ProviderError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.intent(
            request.order_id,
            request.amount,
            ProviderIntentStatus::RequiresCapture,
        ))
    }

    async fn capture(&self, provider_ref: &str) -> Result<ProviderIntent, ProviderError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(ProviderError::Declined("card issuer rejected capture".into()));
        }
        Ok(ProviderIntent {
            provider_ref: provider_ref.to_string(),
            order_id: Uuid::nil(),
            amount: 0,
            currency: "USD".to_string(),
            status: ProviderIntentStatus::Succeeded,
            client_secret: None,
            created_at: Utc::now(),
        })
    }

    async fn cancel(&self, provider_ref: &str) -> Result<ProviderIntent, ProviderError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderIntent {
            provider_ref: provider_ref.to_string(),
            order_id: Uuid::nil(),
            amount: 0,
            currency: "USD".to_string(),
            status: ProviderIntentStatus::Canceled,
            client_secret: None,
            created_at: Utc::now(),
        })
    }

    async fn refund(
        &self,
        provider_ref: &str,
        amount: Option<i64>,
    ) -> Result<ProviderRefund, ProviderError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(ProviderError::RefundRejected("insufficient provider balance".into()));
        }
        Ok(ProviderRefund {
            provider_ref: format!("re_{}", provider_ref),
            amount: amount.unwrap_or(0),
            status: ProviderRefundStatus::Succeeded,
            failure_reason: None,
        })
    }

    async fn create_transfer(
        &self,
        _vendor_account: &str,
        _amount: i64,
        order_ref: &str,
    ) -> Result<String, ProviderError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("tr_{}", order_ref))
    }
}
