use async_trait::async_trait;
use uuid::Uuid;

use crate::CoreResult;

/// Result of a stock availability check. The reservation token is minted
/// by the inventory service and consumed by the matching `update_stock`
/// decrement, so check-then-decrement is no longer an unsynchronized
/// pair.
#[derive(Debug, Clone)]
pub struct StockCheck {
    pub in_stock: bool,
    pub available_qty: u32,
    pub reservation_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StockUpdateItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub reservation_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StockUpdateStatus {
    pub product_id: Uuid,
    pub updated: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

/// Synchronous facade over the inventory service. Calls block the
/// handling task until response or deadline; implementations map
/// transport failures to `CoreError::Unavailable`.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn check_stock(&self, product_id: Uuid, quantity: u32) -> CoreResult<StockCheck>;

    async fn update_stock(&self, items: &[StockUpdateItem]) -> CoreResult<Vec<StockUpdateStatus>>;
}

/// Synchronous facade over the cart service.
#[async_trait]
pub trait CartClient: Send + Sync {
    async fn get_cart_items(&self, buyer_id: Uuid) -> CoreResult<Vec<CartLine>>;
}
