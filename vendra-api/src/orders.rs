use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vendra_core::identity::{Actor, ActorRole};
use vendra_core::CoreError;
use vendra_order::models::{NewOrderItem, Order, PaymentMethod};
use vendra_order::OrderStatusView;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFromCartRequest {
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub selected_items: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub external_ref: String,
    pub status: String,
    pub payment_status: String,
    pub total_price: i64,
    pub platform_fee: i64,
    pub vendor_amount: i64,
    pub items: Vec<OrderItemResponse>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            external_ref: order.external_ref,
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            total_price: order.total_price,
            platform_fee: order.platform_fee,
            vendor_amount: order.vendor_amount,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            created_at: order.created_at,
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/from-cart", post(create_order_from_cart))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route("/v1/orders/{id}/ship", post(mark_as_shipped))
        .route("/v1/orders/{id}/confirm-delivery", post(confirm_delivery))
        .route("/v1/orders/{id}/status", get(get_order_status))
        .route("/v1/admin/orders/{id}/release-payment", post(release_payment))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
/// Direct purchase for the authenticated buyer.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    require_role(&actor, ActorRole::Buyer)?;

    let items = req
        .items
        .into_iter()
        .map(|item| NewOrderItem {
            product_id: item.product_id,
            vendor_id: item.vendor_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect();

    let order = state
        .orchestrator
        .create_direct(actor.id, items, req.payment_method, req.shipping_address)
        .await?;

    Ok(Json(order.into()))
}

/// POST /v1/orders/from-cart
/// Checkout the buyer's pending cart (optionally a selection of it).
pub async fn create_order_from_cart(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateFromCartRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    require_role(&actor, ActorRole::Buyer)?;

    let order = state
        .orchestrator
        .create_from_cart(
            actor.id,
            req.payment_method,
            req.shipping_address,
            req.selected_items,
        )
        .await?;

    Ok(Json(order.into()))
}

/// POST /v1/orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusView>, AppError> {
    state
        .orchestrator
        .cancel_order(order_id, actor.id, actor.role)
        .await?;

    Ok(Json(state.orchestrator.get_status(order_id).await?))
}

/// POST /v1/orders/:id/ship
/// Vendor marks the order shipped.
pub async fn mark_as_shipped(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusView>, AppError> {
    require_role(&actor, ActorRole::Vendor)?;

    state.orchestrator.mark_as_shipped(order_id, actor.id).await?;
    Ok(Json(state.orchestrator.get_status(order_id).await?))
}

/// POST /v1/orders/:id/confirm-delivery
/// Buyer confirms delivery, releasing the escrow.
pub async fn confirm_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusView>, AppError> {
    require_role(&actor, ActorRole::Buyer)?;

    state
        .orchestrator
        .confirm_delivery(order_id, actor.id)
        .await?;
    Ok(Json(state.orchestrator.get_status(order_id).await?))
}

/// GET /v1/orders/:id/status
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusView>, AppError> {
    Ok(Json(state.orchestrator.get_status(order_id).await?))
}

/// POST /v1/admin/orders/:id/release-payment
/// Admin escape hatch releasing escrow without buyer confirmation.
pub async fn release_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStatusView>, AppError> {
    require_role(&actor, ActorRole::Admin)?;

    state
        .orchestrator
        .release_payment_manually(order_id, actor.id)
        .await?;
    Ok(Json(state.orchestrator.get_status(order_id).await?))
}

fn require_role(actor: &Actor, role: ActorRole) -> Result<(), AppError> {
    if actor.role != role {
        return Err(AppError(CoreError::Forbidden(format!(
            "requires {:?} role",
            role
        ))));
    }
    Ok(())
}
