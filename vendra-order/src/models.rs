use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vendra_core::{CoreError, CoreResult};
use vendra_shared::pii::Masked;

/// Order status in the lifecycle. DELIVERED is terminal with payment
/// released; CANCELLED and PAYMENT_FAILED are the side branches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
    PaymentFailed,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Pending, PaymentFailed)
                | (Processing, Confirmed)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Processing, PaymentFailed)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::PaymentFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

/// Payment state tracked on the order aggregate. HELD is the escrow
/// state: authorized, not yet captured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Pending,
    PendingVerification,
    Held,
    Captured,
    Released,
    Refunded,
    Failed,
}

impl OrderPaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "PENDING",
            OrderPaymentStatus::PendingVerification => "PENDING_VERIFICATION",
            OrderPaymentStatus::Held => "HELD",
            OrderPaymentStatus::Captured => "CAPTURED",
            OrderPaymentStatus::Released => "RELEASED",
            OrderPaymentStatus::Refunded => "REFUNDED",
            OrderPaymentStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Cod,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Cod => "COD",
        }
    }
}

/// Pricing policy applied at order creation.
#[derive(Debug, Clone)]
pub struct OrderPolicy {
    pub platform_fee_bps: u32,
    pub currency: String,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            platform_fee_bps: 1000,
            currency: "USD".to_string(),
        }
    }
}

/// Line item input at creation time. `product_name` is snapshotted onto
/// the order so later catalog edits cannot alter historical orders.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

/// An individual product within an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// The single source of truth for a purchase. Never physically deleted;
/// terminal outcomes are expressed through status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub external_ref: String,
    pub buyer_id: Uuid,
    pub vendor_id: Uuid,
    pub items: Vec<OrderItem>,
    pub total_price: i64,
    pub platform_fee: i64,
    pub vendor_amount: i64,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub payment_method: PaymentMethod,
    pub provider_ref: Option<String>,
    pub shipping_address: Masked<String>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub payment_release_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build an order from validated inputs. All items must belong to a
    /// single vendor; the caller splits multi-vendor carts upstream.
    /// `total_price` is fixed here and never recomputed from the catalog.
    pub fn new(
        buyer_id: Uuid,
        items: Vec<NewOrderItem>,
        payment_method: PaymentMethod,
        shipping_address: String,
        policy: &OrderPolicy,
    ) -> CoreResult<Self> {
        if items.is_empty() {
            return Err(CoreError::Validation("order has no items".into()));
        }
        if shipping_address.trim().is_empty() {
            return Err(CoreError::Validation("shipping address is required".into()));
        }

        let vendor_id = items[0].vendor_id;
        for item in &items {
            if item.quantity == 0 {
                return Err(CoreError::Validation(format!(
                    "quantity must be positive for product {}",
                    item.product_id
                )));
            }
            if item.unit_price < 0 {
                return Err(CoreError::Validation(format!(
                    "unit price must not be negative for product {}",
                    item.product_id
                )));
            }
            if item.product_name.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "product name snapshot missing for product {}",
                    item.product_id
                )));
            }
            if item.vendor_id != vendor_id {
                return Err(CoreError::Validation(
                    "order items span multiple vendors; split the cart per vendor".into(),
                ));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        let items: Vec<OrderItem> = items
            .into_iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                product_id: item.product_id,
                vendor_id: item.vendor_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                created_at: now,
            })
            .collect();

        let total_price: i64 = items.iter().map(OrderItem::line_total).sum();
        let platform_fee = total_price * i64::from(policy.platform_fee_bps) / 10_000;
        let vendor_amount = total_price - platform_fee;

        let (status, payment_status) = match payment_method {
            PaymentMethod::Cod => (
                OrderStatus::Processing,
                OrderPaymentStatus::PendingVerification,
            ),
            PaymentMethod::Card => (OrderStatus::Pending, OrderPaymentStatus::Pending),
        };

        Ok(Self {
            id,
            external_ref: format!(
                "VDR-{}-{}",
                now.timestamp(),
                &id.to_string()[..8].to_uppercase()
            ),
            buyer_id,
            vendor_id,
            items,
            total_price,
            platform_fee,
            vendor_amount,
            status,
            payment_status,
            payment_method,
            provider_ref: None,
            shipping_address: shipping_address.into(),
            delivery_date: None,
            payment_release_date: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Settlement-side payment record. One per order. Status is monotonic
/// forward except the refund branch; terminal refund states are never
/// overwritten.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Authorized,
    Captured,
    RefundPending,
    Refunded,
    RefundFailed,
    Failed,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Initiated, Authorized)
                | (Initiated, Failed)
                | (Authorized, Captured)
                | (Authorized, RefundPending)
                | (Authorized, Refunded)
                | (Authorized, Failed)
                | (Captured, RefundPending)
                | (Captured, Failed)
                | (RefundPending, Refunded)
                | (RefundPending, RefundFailed)
        )
    }

    pub fn is_refund_terminal(self) -> bool {
        matches!(self, PaymentStatus::Refunded | PaymentStatus::RefundFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::RefundPending => "REFUND_PENDING",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::RefundFailed => "REFUND_FAILED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_ref: Option<String>,
    pub vendor_account: Option<String>,
    pub platform_fee: i64,
    pub vendor_amount: i64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(order: &Order, currency: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total_price,
            currency,
            status: PaymentStatus::Initiated,
            provider_ref: None,
            vendor_account: None,
            platform_fee: order.platform_fee,
            vendor_amount: order.vendor_amount,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Money-movement types in the vendor ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorTransactionKind {
    Sale,
    Payout,
    Refund,
    Fee,
    Adjustment,
}

impl VendorTransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VendorTransactionKind::Sale => "SALE",
            VendorTransactionKind::Payout => "PAYOUT",
            VendorTransactionKind::Refund => "REFUND",
            VendorTransactionKind::Fee => "FEE",
            VendorTransactionKind::Adjustment => "ADJUSTMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorTransactionStatus {
    Pending,
    Settled,
    Failed,
}

/// Input for appending a ledger entry. `amount` is signed: credits are
/// positive, debits negative.
#[derive(Debug, Clone)]
pub struct VendorEntry {
    pub vendor_id: Uuid,
    pub order_id: Option<Uuid>,
    pub kind: VendorTransactionKind,
    pub amount: i64,
    pub status: VendorTransactionStatus,
}

/// Append-only record of money movement to a vendor. `balance_after` is
/// the materialized projection at append time; the balance changes only
/// by appending a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorTransaction {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub order_id: Option<Uuid>,
    pub kind: VendorTransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub status: VendorTransactionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorBalance {
    pub vendor_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(vendor_id: Uuid, quantity: u32, unit_price: i64) -> NewOrderItem {
        NewOrderItem {
            product_id: Uuid::new_v4(),
            vendor_id,
            product_name: "Walnut Desk Organizer".to_string(),
            quantity,
            unit_price,
        }
    }

    #[test]
    fn test_total_is_sum_of_line_totals() {
        let vendor = Uuid::new_v4();
        let order = Order::new(
            Uuid::new_v4(),
            vec![item(vendor, 2, 1000), item(vendor, 1, 500)],
            PaymentMethod::Card,
            "9 Foundry Row".to_string(),
            &OrderPolicy::default(),
        )
        .unwrap();

        assert_eq!(order.total_price, 2500);
        assert_eq!(order.platform_fee + order.vendor_amount, order.total_price);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    }

    #[test]
    fn test_cod_starts_processing() {
        let vendor = Uuid::new_v4();
        let order = Order::new(
            Uuid::new_v4(),
            vec![item(vendor, 1, 700)],
            PaymentMethod::Cod,
            "9 Foundry Row".to_string(),
            &OrderPolicy::default(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(
            order.payment_status,
            OrderPaymentStatus::PendingVerification
        );
    }

    #[test]
    fn test_mixed_vendor_items_rejected() {
        let result = Order::new(
            Uuid::new_v4(),
            vec![item(Uuid::new_v4(), 1, 100), item(Uuid::new_v4(), 1, 100)],
            PaymentMethod::Card,
            "9 Foundry Row".to_string(),
            &OrderPolicy::default(),
        );

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let vendor = Uuid::new_v4();
        let result = Order::new(
            Uuid::new_v4(),
            vec![item(vendor, 0, 100)],
            PaymentMethod::Card,
            "9 Foundry Row".to_string(),
            &OrderPolicy::default(),
        );

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_order_transition_table() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Confirmed.can_transition_to(Cancelled));

        // SHIPPED is reachable only from CONFIRMED/PROCESSING.
        assert!(!Pending.can_transition_to(Shipped));
        // DELIVERED only from SHIPPED.
        assert!(!Confirmed.can_transition_to(Delivered));
        // Terminal states go nowhere.
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_payment_refund_branch() {
        use PaymentStatus::*;

        assert!(Authorized.can_transition_to(Captured));
        assert!(Captured.can_transition_to(RefundPending));
        assert!(Authorized.can_transition_to(RefundPending));
        assert!(RefundPending.can_transition_to(Refunded));

        // Terminal refund states are immutable.
        assert!(!Refunded.can_transition_to(RefundPending));
        assert!(!RefundFailed.can_transition_to(Refunded));
        assert!(Refunded.is_refund_terminal());
    }
}
