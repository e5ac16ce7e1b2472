use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic names for the order/payment event exchange. Messages on every
/// topic are keyed by order id so a partitioned log preserves per-order
/// ordering.
pub mod topics {
    pub const ORDER_SUCCESS: &str = "order_success";
    pub const ORDER_RETURNED: &str = "order_returned";
    pub const PAYMENT_REQUESTS: &str = "payment_requests";
    pub const PAYMENT_ACTIONS: &str = "payment_actions";
    pub const VENDOR_PAYMENTS: &str = "vendor_payments";
    pub const CHECKOUT_COMPLETED: &str = "checkout_completed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEventItem {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub quantity: u32,
    pub unit_price: i64,
}

/// Published when an order is created. Consumed by inventory (stock
/// decrement), search reindexing and notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSuccessEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderEventItem>,
    pub total_price: i64,
}

/// Published on cancellation/return. Same shape as `OrderSuccessEvent`;
/// inventory consumes it to restock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReturnedEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderEventItem>,
    pub total_price: i64,
}

/// Asks the payment service to open a checkout session for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub payment_method: String,
    pub vendor_id: Uuid,
    pub vendor_stripe_account_id: Option<String>,
    pub vendor_amount: i64,
    pub platform_fee: i64,
}

/// Settlement actions the engine has taken against held funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentActionKind {
    Capture,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentActionData {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentActionEvent {
    pub action: PaymentActionKind,
    pub data: PaymentActionData,
}

/// Posted for vendors without a connected provider account; an
/// out-of-band bank-transfer processor consumes this queue and reports
/// payout status back into the vendor ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPaymentEvent {
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub amount: i64,
    pub platform_fee: i64,
    pub release_date: DateTime<Utc>,
}

/// Outcome values on the `checkout_completed` topic. A closed enum:
/// payloads carrying any other value fail deserialization and are
/// skipped by the consumer rather than falling through silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutOutcome {
    CheckoutCompleted,
    PaymentFailed,
    CheckoutFailed,
}

impl CheckoutOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutOutcome::CheckoutCompleted => "checkout_completed",
            CheckoutOutcome::PaymentFailed => "payment_failed",
            CheckoutOutcome::CheckoutFailed => "checkout_failed",
        }
    }
}

/// Consumed from the payment service after its checkout flow finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCompletedEvent {
    pub order_id: Uuid,
    pub payment_intent_id: String,
    pub amount: i64,
    pub status: CheckoutOutcome,
}
