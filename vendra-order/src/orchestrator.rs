use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vendra_core::clients::{CartClient, InventoryClient, StockUpdateItem};
use vendra_core::events::{publish_event, EventSink};
use vendra_core::identity::ActorRole;
use vendra_core::{CoreError, CoreResult};
use vendra_shared::models::events::{
    topics, CheckoutCompletedEvent, CheckoutOutcome, OrderEventItem, OrderReturnedEvent,
    OrderSuccessEvent, PaymentRequestEvent,
};

use crate::ledger::VendorLedgerService;
use crate::models::{
    NewOrderItem, Order, OrderPaymentStatus, OrderPolicy, OrderStatus, PaymentMethod,
    PaymentStatus,
};
use crate::repository::{OrderRepository, RepoError};
use crate::settlement::PaymentSettlementEngine;

/// Status projection returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order_id: Uuid,
    pub external_ref: String,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub delivery_date: Option<DateTime<Utc>>,
    pub payment_release_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// The top-level order state machine:
/// PENDING → PROCESSING → CONFIRMED → SHIPPED → DELIVERED, with
/// CANCELLED and PAYMENT_FAILED side branches. Coordinates inventory,
/// the settlement engine, and the event log; no distributed transaction,
/// so every transition is idempotent and status-guarded.
pub struct OrderOrchestrator {
    orders: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryClient>,
    cart: Arc<dyn CartClient>,
    settlement: Arc<PaymentSettlementEngine>,
    ledger: Arc<VendorLedgerService>,
    events: Arc<dyn EventSink>,
    policy: OrderPolicy,
}

impl OrderOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        inventory: Arc<dyn InventoryClient>,
        cart: Arc<dyn CartClient>,
        settlement: Arc<PaymentSettlementEngine>,
        ledger: Arc<VendorLedgerService>,
        events: Arc<dyn EventSink>,
        policy: OrderPolicy,
    ) -> Self {
        Self {
            orders,
            inventory,
            cart,
            settlement,
            ledger,
            events,
            policy,
        }
    }

    /// Checkout from the buyer's pending cart. `selected_items` narrows
    /// the cart to specific products; None takes the whole cart.
    pub async fn create_from_cart(
        &self,
        buyer_id: Uuid,
        payment_method: PaymentMethod,
        shipping_address: String,
        selected_items: Option<Vec<Uuid>>,
    ) -> CoreResult<Order> {
        let lines = self.cart.get_cart_items(buyer_id).await?;

        let items: Vec<NewOrderItem> = lines
            .into_iter()
            .filter(|line| match &selected_items {
                Some(selected) => selected.contains(&line.product_id),
                None => true,
            })
            .map(|line| NewOrderItem {
                product_id: line.product_id,
                vendor_id: line.vendor_id,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        if items.is_empty() {
            return Err(CoreError::Validation(
                "cart has no items matching the selection".into(),
            ));
        }

        self.create_direct(buyer_id, items, payment_method, shipping_address)
            .await
    }

    /// Direct purchase. All-or-nothing: every line item must pass the
    /// stock check before anything is persisted; a single shortage fails
    /// the whole order with no partial state left behind.
    pub async fn create_direct(
        &self,
        buyer_id: Uuid,
        items: Vec<NewOrderItem>,
        payment_method: PaymentMethod,
        shipping_address: String,
    ) -> CoreResult<Order> {
        let order = Order::new(
            buyer_id,
            items,
            payment_method,
            shipping_address,
            &self.policy,
        )?;

        let mut stock_updates = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let check = self
                .inventory
                .check_stock(item.product_id, item.quantity)
                .await?;
            if !check.in_stock {
                return Err(CoreError::OutOfStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: check.available_qty,
                });
            }
            stock_updates.push(StockUpdateItem {
                product_id: item.product_id,
                quantity: item.quantity,
                reservation_token: check.reservation_token,
            });
        }

        self.orders
            .create_order(&order)
            .await
            .map_err(store_err)?;

        // The reservation tokens hold the stock; a failed decrement here
        // is reconciled by the inventory service when the token expires,
        // so it must not fail the already-persisted order.
        if let Err(e) = self.inventory.update_stock(&stock_updates).await {
            warn!(order_id = %order.id, error = %e, "stock decrement deferred to reconciliation");
        }

        publish_event(
            self.events.as_ref(),
            topics::ORDER_SUCCESS,
            &order.id.to_string(),
            &order_event(&order),
        )
        .await?;

        if order.payment_method == PaymentMethod::Card {
            let vendor_account = self
                .ledger
                .repository()
                .vendor_account(order.vendor_id)
                .await
                .map_err(store_err)?;
            let request = PaymentRequestEvent {
                order_id: order.id,
                user_id: order.buyer_id,
                amount: order.total_price,
                payment_method: order.payment_method.as_str().to_string(),
                vendor_id: order.vendor_id,
                vendor_stripe_account_id: vendor_account,
                vendor_amount: order.vendor_amount,
                platform_fee: order.platform_fee,
            };
            publish_event(
                self.events.as_ref(),
                topics::PAYMENT_REQUESTS,
                &order.id.to_string(),
                &request,
            )
            .await?;
        }

        info!(
            order_id = %order.id,
            external_ref = %order.external_ref,
            buyer_id = %order.buyer_id,
            total = order.total_price,
            status = order.status.as_str(),
            "order created"
        );
        Ok(order)
    }

    /// Consumer entry point for the checkout-completion topic. Delivery
    /// is at-least-once: applying the same outcome twice is an Ok no-op.
    pub async fn handle_checkout_event(&self, event: &CheckoutCompletedEvent) -> CoreResult<()> {
        let order = self.order(event.order_id).await?;

        match event.status {
            CheckoutOutcome::CheckoutCompleted => {
                let applied = self
                    .orders
                    .update_status_guarded(
                        order.id,
                        &[OrderStatus::Pending, OrderStatus::Processing],
                        OrderStatus::Confirmed,
                    )
                    .await
                    .map_err(store_err)?;

                if !applied {
                    let current = self.order(order.id).await?;
                    if current.status != OrderStatus::Confirmed {
                        warn!(
                            order_id = %order.id,
                            status = current.status.as_str(),
                            "checkout completion for order no longer awaiting payment"
                        );
                    }
                    return Ok(());
                }

                self.settlement
                    .register_authorized(&order, &event.payment_intent_id)
                    .await?;
                self.orders
                    .update_payment_status(
                        order.id,
                        OrderPaymentStatus::Held,
                        Some(&event.payment_intent_id),
                    )
                    .await
                    .map_err(store_err)?;
                info!(order_id = %order.id, "payment held in escrow, order confirmed");
            }
            CheckoutOutcome::PaymentFailed | CheckoutOutcome::CheckoutFailed => {
                let applied = self
                    .orders
                    .update_status_guarded(
                        order.id,
                        &[OrderStatus::Pending, OrderStatus::Processing],
                        OrderStatus::PaymentFailed,
                    )
                    .await
                    .map_err(store_err)?;
                if applied {
                    self.orders
                        .update_payment_status(order.id, OrderPaymentStatus::Failed, None)
                        .await
                        .map_err(store_err)?;
                    info!(order_id = %order.id, "checkout failed, order closed");
                }
            }
        }

        Ok(())
    }

    /// Vendor marks the order shipped. Only reachable from
    /// CONFIRMED/PROCESSING; repeating the call on a SHIPPED order is a
    /// no-op.
    pub async fn mark_as_shipped(&self, order_id: Uuid, vendor_id: Uuid) -> CoreResult<()> {
        let order = self.order(order_id).await?;
        if order.vendor_id != vendor_id {
            return Err(CoreError::Forbidden(
                "only the order's vendor may mark it shipped".into(),
            ));
        }

        let applied = self
            .orders
            .update_status_guarded(
                order_id,
                &[OrderStatus::Confirmed, OrderStatus::Processing],
                OrderStatus::Shipped,
            )
            .await
            .map_err(store_err)?;

        if !applied {
            let current = self.order(order_id).await?;
            if current.status == OrderStatus::Shipped {
                return Ok(());
            }
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: OrderStatus::Shipped.as_str().to_string(),
            });
        }

        info!(order_id = %order_id, vendor_id = %vendor_id, "order shipped");
        Ok(())
    }

    /// Buyer confirms delivery; this, not shipment, is what releases
    /// the escrow. The guarded SHIPPED→DELIVERED transition ensures the
    /// capture path runs exactly once.
    pub async fn confirm_delivery(&self, order_id: Uuid, buyer_id: Uuid) -> CoreResult<()> {
        let order = self.order(order_id).await?;
        if order.buyer_id != buyer_id {
            return Err(CoreError::Forbidden(
                "only the order's buyer may confirm delivery".into(),
            ));
        }

        let applied = self
            .orders
            .update_status_guarded(order_id, &[OrderStatus::Shipped], OrderStatus::Delivered)
            .await
            .map_err(store_err)?;

        if !applied {
            let current = self.order(order_id).await?;
            if current.status == OrderStatus::Delivered {
                return Ok(());
            }
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: OrderStatus::Delivered.as_str().to_string(),
            });
        }

        self.orders
            .set_delivered(order_id, Utc::now())
            .await
            .map_err(store_err)?;

        self.release_funds(&order).await?;
        info!(order_id = %order_id, "delivery confirmed, escrow released");
        Ok(())
    }

    /// Cancel an order. Buyers may cancel their own order before
    /// shipment; the vendor or an admin may force-cancel a shipped one.
    /// With funds held or captured, exactly one refund is issued; a
    /// PENDING order with no authorization produces no refund attempt.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor_id: Uuid,
        role: ActorRole,
    ) -> CoreResult<()> {
        let order = self.order(order_id).await?;

        if order.status == OrderStatus::Cancelled {
            return Ok(());
        }

        let allowed_from: &[OrderStatus] = match role {
            ActorRole::Buyer => {
                if order.buyer_id != actor_id {
                    return Err(CoreError::Forbidden(
                        "buyers may only cancel their own orders".into(),
                    ));
                }
                if order.status == OrderStatus::Shipped {
                    return Err(CoreError::Forbidden(
                        "buyers cannot cancel after shipment".into(),
                    ));
                }
                &[
                    OrderStatus::Pending,
                    OrderStatus::Processing,
                    OrderStatus::Confirmed,
                ]
            }
            ActorRole::Vendor => {
                if order.vendor_id != actor_id {
                    return Err(CoreError::Forbidden(
                        "vendors may only cancel their own orders".into(),
                    ));
                }
                &[
                    OrderStatus::Pending,
                    OrderStatus::Processing,
                    OrderStatus::Confirmed,
                    OrderStatus::Shipped,
                ]
            }
            ActorRole::Admin => &[
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Confirmed,
                OrderStatus::Shipped,
            ],
        };

        let applied = self
            .orders
            .update_status_guarded(order_id, allowed_from, OrderStatus::Cancelled)
            .await
            .map_err(store_err)?;

        if !applied {
            let current = self.order(order_id).await?;
            if current.status == OrderStatus::Cancelled {
                return Ok(());
            }
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: OrderStatus::Cancelled.as_str().to_string(),
            });
        }

        match order.payment_status {
            OrderPaymentStatus::Held => {
                let payment = self.settlement.refund(order_id, None).await?;
                if payment.status == PaymentStatus::Refunded {
                    self.orders
                        .update_payment_status(order_id, OrderPaymentStatus::Refunded, None)
                        .await
                        .map_err(store_err)?;
                }
            }
            OrderPaymentStatus::Captured | OrderPaymentStatus::Released => {
                let payment = self.settlement.refund(order_id, None).await?;
                if payment.status == PaymentStatus::Refunded {
                    self.ledger.record_refund(&order, order.total_price).await?;
                    self.orders
                        .update_payment_status(order_id, OrderPaymentStatus::Refunded, None)
                        .await
                        .map_err(store_err)?;
                }
            }
            // Nothing authorized yet: no refund attempt.
            OrderPaymentStatus::Pending
            | OrderPaymentStatus::PendingVerification
            | OrderPaymentStatus::Refunded
            | OrderPaymentStatus::Failed => {}
        }

        publish_event(
            self.events.as_ref(),
            topics::ORDER_RETURNED,
            &order.id.to_string(),
            &OrderReturnedEvent {
                order_id: order.id,
                user_id: order.buyer_id,
                items: event_items(&order),
                total_price: order.total_price,
            },
        )
        .await?;

        info!(
            order_id = %order_id,
            actor_id = %actor_id,
            role = ?role,
            "order cancelled"
        );
        Ok(())
    }

    /// Admin escape hatch: release escrow without the buyer's delivery
    /// confirmation. Same capture/payout path, logged as an override.
    pub async fn release_payment_manually(
        &self,
        order_id: Uuid,
        admin_id: Uuid,
    ) -> CoreResult<()> {
        let order = self.order(order_id).await?;

        if !matches!(
            order.status,
            OrderStatus::Shipped | OrderStatus::Delivered
        ) {
            return Err(CoreError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: "PAYMENT_RELEASED".to_string(),
            });
        }

        warn!(
            order_id = %order_id,
            admin_id = %admin_id,
            "manual payment release: bypassing buyer confirmation"
        );
        self.release_funds(&order).await
    }

    pub async fn get_status(&self, order_id: Uuid) -> CoreResult<OrderStatusView> {
        let order = self.order(order_id).await?;
        Ok(OrderStatusView {
            order_id: order.id,
            external_ref: order.external_ref,
            status: order.status,
            payment_status: order.payment_status,
            delivery_date: order.delivery_date,
            payment_release_date: order.payment_release_date,
            updated_at: order.updated_at,
        })
    }

    /// Capture held funds, book the sale, and pay the vendor. Idempotent
    /// through the release-date check; COD orders skip the provider
    /// capture since cash settles on the doorstep.
    async fn release_funds(&self, order: &Order) -> CoreResult<()> {
        let current = self.order(order.id).await?;
        if current.payment_release_date.is_some() {
            return Ok(());
        }

        if order.payment_method != PaymentMethod::Cod {
            self.settlement.capture(order.id).await?;
        }

        self.orders
            .update_payment_status(order.id, OrderPaymentStatus::Captured, None)
            .await
            .map_err(store_err)?;
        self.orders
            .set_payment_release_date(order.id, Utc::now())
            .await
            .map_err(store_err)?;

        self.ledger.record_sale(order).await?;
        self.settlement.create_vendor_payout(order).await?;

        self.orders
            .update_payment_status(order.id, OrderPaymentStatus::Released, None)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn order(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .get_order(order_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("order {}", order_id)))
    }
}

fn event_items(order: &Order) -> Vec<OrderEventItem> {
    order
        .items
        .iter()
        .map(|item| OrderEventItem {
            product_id: item.product_id,
            vendor_id: item.vendor_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect()
}

fn order_event(order: &Order) -> OrderSuccessEvent {
    OrderSuccessEvent {
        order_id: order.id,
        user_id: order.buyer_id,
        items: event_items(order),
        total_price: order.total_price,
    }
}

fn store_err(e: RepoError) -> CoreError {
    CoreError::Unavailable(format!("order store: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{
        MemoryLedger, MemoryOrderRepository, MemoryPaymentRepository, MockProvider, RecordingSink,
        StubCartClient, StubInventoryClient,
    };
    use std::sync::atomic::Ordering;
    use vendra_core::clients::CartLine;

    struct Harness {
        orchestrator: OrderOrchestrator,
        orders: Arc<MemoryOrderRepository>,
        payments: Arc<MemoryPaymentRepository>,
        provider: Arc<MockProvider>,
        inventory: Arc<StubInventoryClient>,
        sink: Arc<RecordingSink>,
    }

    fn harness(inventory: StubInventoryClient, cart: StubCartClient) -> Harness {
        let orders = Arc::new(MemoryOrderRepository::default());
        let payments = Arc::new(MemoryPaymentRepository::default());
        let provider = Arc::new(MockProvider::default());
        let inventory = Arc::new(inventory);
        let sink = Arc::new(RecordingSink::default());
        let ledger = Arc::new(VendorLedgerService::new(Arc::new(MemoryLedger::default())));

        let settlement = Arc::new(PaymentSettlementEngine::new(
            provider.clone(),
            payments.clone(),
            ledger.clone(),
            sink.clone(),
            "USD".to_string(),
        ));

        let orchestrator = OrderOrchestrator::new(
            orders.clone(),
            inventory.clone(),
            Arc::new(cart),
            settlement,
            ledger,
            sink.clone(),
            OrderPolicy::default(),
        );

        Harness {
            orchestrator,
            orders,
            payments,
            provider,
            inventory,
            sink,
        }
    }

    fn cart_lines(vendor_id: Uuid) -> Vec<CartLine> {
        vec![
            CartLine {
                product_id: Uuid::new_v4(),
                vendor_id,
                product_name: "Cast Iron Skillet".to_string(),
                quantity: 2,
                unit_price: 1000,
            },
            CartLine {
                product_id: Uuid::new_v4(),
                vendor_id,
                product_name: "Trivet".to_string(),
                quantity: 1,
                unit_price: 500,
            },
        ]
    }

    fn checkout_event(order_id: Uuid, status: CheckoutOutcome) -> CheckoutCompletedEvent {
        CheckoutCompletedEvent {
            order_id,
            payment_intent_id: format!("pi_{}", order_id.simple()),
            amount: 2500,
            status,
        }
    }

    async fn confirmed_order(h: &Harness) -> Order {
        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();
        h.orchestrator
            .handle_checkout_event(&checkout_event(order.id, CheckoutOutcome::CheckoutCompleted))
            .await
            .unwrap();
        h.orders.order(order.id).unwrap()
    }

    #[tokio::test]
    async fn test_cart_checkout_creates_pending_order() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );

        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(order.total_price, 2500);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
        assert_eq!(h.inventory.check_calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.sink.topic_count(topics::ORDER_SUCCESS), 1);
        assert_eq!(h.sink.topic_count(topics::PAYMENT_REQUESTS), 1);
    }

    #[tokio::test]
    async fn test_out_of_stock_creates_nothing() {
        let vendor_id = Uuid::new_v4();
        let lines = cart_lines(vendor_id);
        let short_product = lines[1].product_id;
        let h = harness(
            StubInventoryClient::default().with_shortage(short_product, 0),
            StubCartClient::default().with_lines(lines),
        );

        let result = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await;

        assert!(matches!(result, Err(CoreError::OutOfStock { .. })));
        // All-or-nothing: no partial order, no events.
        assert_eq!(h.orders.len(), 0);
        assert_eq!(h.sink.topic_count(topics::ORDER_SUCCESS), 0);
    }

    #[tokio::test]
    async fn test_duplicate_checkout_completion_is_noop() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();

        let event = checkout_event(order.id, CheckoutOutcome::CheckoutCompleted);
        h.orchestrator.handle_checkout_event(&event).await.unwrap();
        h.orchestrator.handle_checkout_event(&event).await.unwrap();

        let stored = h.orders.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(stored.payment_status, OrderPaymentStatus::Held);
        // Only one payment record despite the duplicate delivery.
        assert!(h.payments.by_order(order.id).is_some());
    }

    #[tokio::test]
    async fn test_checkout_failure_closes_order() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();

        h.orchestrator
            .handle_checkout_event(&checkout_event(order.id, CheckoutOutcome::PaymentFailed))
            .await
            .unwrap();

        let stored = h.orders.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::PaymentFailed);
        assert_eq!(stored.payment_status, OrderPaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_ship_requires_confirmed() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();

        // Still PENDING: shipping is rejected as an invalid transition.
        let result = h.orchestrator.mark_as_shipped(order.id, vendor_id).await;
        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_only_vendor_may_ship() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = confirmed_order(&h).await;

        let wrong = h
            .orchestrator
            .mark_as_shipped(order.id, Uuid::new_v4())
            .await;
        assert!(matches!(wrong, Err(CoreError::Forbidden(_))));

        h.orchestrator
            .mark_as_shipped(order.id, vendor_id)
            .await
            .unwrap();
        assert_eq!(h.orders.order(order.id).unwrap().status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_delivery_confirmation_releases_escrow_once() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = confirmed_order(&h).await;
        h.orchestrator
            .mark_as_shipped(order.id, vendor_id)
            .await
            .unwrap();

        h.orchestrator
            .confirm_delivery(order.id, order.buyer_id)
            .await
            .unwrap();
        // Repeat confirmation: no second capture.
        h.orchestrator
            .confirm_delivery(order.id, order.buyer_id)
            .await
            .unwrap();

        let stored = h.orders.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert_eq!(stored.payment_status, OrderPaymentStatus::Released);
        assert!(stored.delivery_date.is_some());
        assert!(stored.payment_release_date.is_some());
        assert_eq!(h.provider.capture_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_buyer_cannot_confirm_delivery() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = confirmed_order(&h).await;
        h.orchestrator
            .mark_as_shipped(order.id, vendor_id)
            .await
            .unwrap();

        let result = h
            .orchestrator
            .confirm_delivery(order.id, Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_cancel_pending_makes_no_refund_attempt() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();

        h.orchestrator
            .cancel_order(order.id, order.buyer_id, ActorRole::Buyer)
            .await
            .unwrap();

        assert_eq!(h.orders.order(order.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(h.provider.refund_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.provider.cancel_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.sink.topic_count(topics::ORDER_RETURNED), 1);
    }

    #[tokio::test]
    async fn test_cancel_confirmed_issues_exactly_one_refund() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = confirmed_order(&h).await;

        h.orchestrator
            .cancel_order(order.id, order.buyer_id, ActorRole::Buyer)
            .await
            .unwrap();

        let stored = h.orders.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.payment_status, OrderPaymentStatus::Refunded);
        // Held funds: the single refund is the authorization cancel.
        assert_eq!(
            h.provider.cancel_calls.load(Ordering::SeqCst)
                + h.provider.refund_calls.load(Ordering::SeqCst),
            1
        );

        // Cancelling again is an idempotent no-op.
        h.orchestrator
            .cancel_order(order.id, order.buyer_id, ActorRole::Buyer)
            .await
            .unwrap();
        assert_eq!(
            h.provider.cancel_calls.load(Ordering::SeqCst)
                + h.provider.refund_calls.load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_buyer_cannot_cancel_after_shipment_but_vendor_can() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = confirmed_order(&h).await;
        h.orchestrator
            .mark_as_shipped(order.id, vendor_id)
            .await
            .unwrap();

        let buyer_attempt = h
            .orchestrator
            .cancel_order(order.id, order.buyer_id, ActorRole::Buyer)
            .await;
        assert!(matches!(buyer_attempt, Err(CoreError::Forbidden(_))));

        h.orchestrator
            .cancel_order(order.id, vendor_id, ActorRole::Vendor)
            .await
            .unwrap();
        assert_eq!(h.orders.order(order.id).unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_admin_manual_release() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = confirmed_order(&h).await;
        h.orchestrator
            .mark_as_shipped(order.id, vendor_id)
            .await
            .unwrap();

        h.orchestrator
            .release_payment_manually(order.id, Uuid::new_v4())
            .await
            .unwrap();

        let stored = h.orders.order(order.id).unwrap();
        // Order stays SHIPPED: manual release moves money, not goods.
        assert_eq!(stored.status, OrderStatus::Shipped);
        assert_eq!(stored.payment_status, OrderPaymentStatus::Released);
        assert!(stored.payment_release_date.is_some());
        assert_eq!(h.provider.capture_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_inventory_is_retryable() {
        let vendor_id = Uuid::new_v4();
        let inventory = StubInventoryClient::default();
        inventory.set_unavailable();
        let h = harness(
            inventory,
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );

        let result = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Card,
                "18 Mill Road".to_string(),
                None,
            )
            .await;

        match result {
            Err(e) => assert!(e.is_retryable()),
            Ok(_) => panic!("expected unavailable error"),
        }
    }

    #[tokio::test]
    async fn test_cod_order_skips_provider_on_release() {
        let vendor_id = Uuid::new_v4();
        let h = harness(
            StubInventoryClient::default(),
            StubCartClient::default().with_lines(cart_lines(vendor_id)),
        );
        let order = h
            .orchestrator
            .create_from_cart(
                Uuid::new_v4(),
                PaymentMethod::Cod,
                "18 Mill Road".to_string(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        h.orchestrator
            .mark_as_shipped(order.id, vendor_id)
            .await
            .unwrap();
        h.orchestrator
            .confirm_delivery(order.id, order.buyer_id)
            .await
            .unwrap();

        let stored = h.orders.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert_eq!(stored.payment_status, OrderPaymentStatus::Released);
        // Cash on delivery: no provider capture.
        assert_eq!(h.provider.capture_calls.load(Ordering::SeqCst), 0);
    }
}
