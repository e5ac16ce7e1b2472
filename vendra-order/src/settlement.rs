use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use vendra_core::events::{publish_event, EventSink};
use vendra_core::payment::{
    AuthorizationRequest, PaymentProvider, WebhookEvent, WebhookEventKind,
};
use vendra_core::{CoreError, CoreResult};
use vendra_shared::models::events::{
    topics, PaymentActionData, PaymentActionEvent, PaymentActionKind, VendorPaymentEvent,
};

use crate::ledger::VendorLedgerService;
use crate::models::{Order, Payment, PaymentStatus, VendorTransactionStatus};
use crate::repository::{PaymentRepository, RepoError};

/// Owns the escrow lifecycle against the payment provider: authorize,
/// capture, cancel, refund, vendor payout, and inbound webhook dispatch.
/// Funds are authorized in manual-capture mode at checkout and held
/// until delivery confirmation releases them.
pub struct PaymentSettlementEngine {
    provider: Arc<dyn PaymentProvider>,
    payments: Arc<dyn PaymentRepository>,
    ledger: Arc<VendorLedgerService>,
    events: Arc<dyn EventSink>,
    currency: String,
}

impl PaymentSettlementEngine {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        payments: Arc<dyn PaymentRepository>,
        ledger: Arc<VendorLedgerService>,
        events: Arc<dyn EventSink>,
        currency: String,
    ) -> Self {
        Self {
            provider,
            payments,
            ledger,
            events,
            currency,
        }
    }

    pub fn ledger(&self) -> &Arc<VendorLedgerService> {
        &self.ledger
    }

    /// Create a provider-side intent in manual-capture mode. With a
    /// connected vendor account the intent is configured as a split
    /// transfer, so capture auto-routes vendor funds net of the platform
    /// fee. The local record lands `AUTHORIZED`; provider declines are
    /// persisted with their reason.
    pub async fn create_authorization(&self, order: &Order) -> CoreResult<Payment> {
        if let Some(existing) = self
            .payments
            .get_by_order(order.id)
            .await
            .map_err(store_err)?
        {
            return Ok(existing);
        }

        let vendor_account = self
            .ledger
            .repository()
            .vendor_account(order.vendor_id)
            .await
            .map_err(store_err)?;

        let request = AuthorizationRequest {
            order_id: order.id,
            amount: order.total_price,
            currency: self.currency.clone(),
            vendor_account: vendor_account.clone(),
            platform_fee: order.platform_fee,
            vendor_amount: order.vendor_amount,
        };

        let mut payment = Payment::new(order, self.currency.clone());
        payment.vendor_account = vendor_account;

        match self.provider.create_authorization(&request).await {
            Ok(intent) => {
                payment.provider_ref = Some(intent.provider_ref);
                payment.status = PaymentStatus::Authorized;
                self.payments
                    .create_payment(&payment)
                    .await
                    .map_err(store_err)?;
                info!(order_id = %order.id, payment_id = %payment.id, "payment authorized (escrow hold)");
                Ok(payment)
            }
            Err(e) => {
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(e.to_string());
                self.payments
                    .create_payment(&payment)
                    .await
                    .map_err(store_err)?;
                error!(order_id = %order.id, reason = %e, "authorization failed");
                Err(e.into())
            }
        }
    }

    /// Record an authorization performed by the external checkout flow,
    /// reported via the `checkout_completed` topic. Idempotent: an
    /// existing record for the order is returned as-is.
    pub async fn register_authorized(
        &self,
        order: &Order,
        provider_ref: &str,
    ) -> CoreResult<Payment> {
        if let Some(existing) = self
            .payments
            .get_by_order(order.id)
            .await
            .map_err(store_err)?
        {
            return Ok(existing);
        }

        let vendor_account = self
            .ledger
            .repository()
            .vendor_account(order.vendor_id)
            .await
            .map_err(store_err)?;

        let mut payment = Payment::new(order, self.currency.clone());
        payment.provider_ref = Some(provider_ref.to_string());
        payment.vendor_account = vendor_account;
        payment.status = PaymentStatus::Authorized;

        self.payments
            .create_payment(&payment)
            .await
            .map_err(store_err)?;
        Ok(payment)
    }

    /// Release held funds. Capturing an already-captured payment is an
    /// Ok no-op, so repeated delivery confirmations cannot double-charge.
    pub async fn capture(&self, order_id: Uuid) -> CoreResult<Payment> {
        let payment = self.payment_for(order_id).await?;

        if payment.status == PaymentStatus::Captured {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Authorized {
            return Err(CoreError::InvalidTransition {
                from: payment.status.as_str().to_string(),
                to: PaymentStatus::Captured.as_str().to_string(),
            });
        }

        let provider_ref = payment
            .provider_ref
            .clone()
            .ok_or_else(|| CoreError::Provider("payment has no provider reference".into()))?;

        if let Err(e) = self.provider.capture(&provider_ref).await {
            self.payments
                .record_failure(payment.id, &e.to_string())
                .await
                .map_err(store_err)?;
            error!(order_id = %order_id, reason = %e, "capture failed");
            return Err(e.into());
        }

        let applied = self
            .payments
            .update_status_guarded(
                payment.id,
                &[PaymentStatus::Authorized],
                PaymentStatus::Captured,
            )
            .await
            .map_err(store_err)?;
        if !applied {
            // Lost a race with a concurrent capture; the refetch tells
            // us whether the end state is the one we wanted.
            let current = self.payment_for(order_id).await?;
            if current.status == PaymentStatus::Captured {
                return Ok(current);
            }
            return Err(CoreError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: PaymentStatus::Captured.as_str().to_string(),
            });
        }

        self.publish_action(order_id, payment.id, payment.amount, PaymentActionKind::Capture)
            .await?;

        info!(order_id = %order_id, payment_id = %payment.id, "escrow captured");
        self.payment_for(order_id).await
    }

    /// Cancel a held authorization without capturing. The payment record
    /// lands `REFUNDED`: no funds moved, the hold is simply released.
    pub async fn cancel_authorization(&self, order_id: Uuid) -> CoreResult<Payment> {
        let payment = self.payment_for(order_id).await?;

        if payment.status.is_refund_terminal() {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Authorized {
            return Err(CoreError::InvalidTransition {
                from: payment.status.as_str().to_string(),
                to: PaymentStatus::Refunded.as_str().to_string(),
            });
        }

        let provider_ref = payment
            .provider_ref
            .clone()
            .ok_or_else(|| CoreError::Provider("payment has no provider reference".into()))?;

        if let Err(e) = self.provider.cancel(&provider_ref).await {
            self.payments
                .record_failure(payment.id, &e.to_string())
                .await
                .map_err(store_err)?;
            error!(order_id = %order_id, reason = %e, "authorization cancel failed");
            return Err(e.into());
        }

        self.payments
            .update_status_guarded(
                payment.id,
                &[PaymentStatus::Authorized],
                PaymentStatus::Refunded,
            )
            .await
            .map_err(store_err)?;

        self.publish_action(order_id, payment.id, payment.amount, PaymentActionKind::Cancel)
            .await?;

        info!(order_id = %order_id, payment_id = %payment.id, "escrow hold released");
        self.payment_for(order_id).await
    }

    /// Refund captured funds, fully (`amount: None`) or partially. The
    /// refund state, once `REFUNDED` or `REFUND_FAILED`, is never
    /// overwritten; repeated calls and duplicate webhooks are no-ops.
    pub async fn refund(&self, order_id: Uuid, amount: Option<i64>) -> CoreResult<Payment> {
        let payment = self.payment_for(order_id).await?;

        if payment.status.is_refund_terminal() {
            return Ok(payment);
        }
        if payment.status == PaymentStatus::Authorized {
            // Nothing was captured; releasing the hold is the refund.
            return self.cancel_authorization(order_id).await;
        }
        if payment.status != PaymentStatus::Captured {
            return Err(CoreError::InvalidTransition {
                from: payment.status.as_str().to_string(),
                to: PaymentStatus::RefundPending.as_str().to_string(),
            });
        }

        if let Some(requested) = amount {
            if requested <= 0 || requested > payment.amount {
                return Err(CoreError::Validation(format!(
                    "refund amount {} outside 1..={}",
                    requested, payment.amount
                )));
            }
        }

        let applied = self
            .payments
            .update_status_guarded(
                payment.id,
                &[PaymentStatus::Captured],
                PaymentStatus::RefundPending,
            )
            .await
            .map_err(store_err)?;
        if !applied {
            // A concurrent refund got there first.
            return self.payment_for(order_id).await;
        }

        let provider_ref = payment
            .provider_ref
            .clone()
            .ok_or_else(|| CoreError::Provider("payment has no provider reference".into()))?;

        match self.provider.refund(&provider_ref, amount).await {
            Ok(refund) => {
                use vendra_core::payment::ProviderRefundStatus;
                match refund.status {
                    ProviderRefundStatus::Succeeded => {
                        self.payments
                            .update_status_guarded(
                                payment.id,
                                &[PaymentStatus::RefundPending],
                                PaymentStatus::Refunded,
                            )
                            .await
                            .map_err(store_err)?;
                        info!(order_id = %order_id, amount = refund.amount, "refund succeeded");
                    }
                    ProviderRefundStatus::Pending => {
                        // Provider completes asynchronously; a webhook
                        // finishes the transition.
                        info!(order_id = %order_id, "refund pending at provider");
                    }
                    ProviderRefundStatus::Failed => {
                        let reason = refund
                            .failure_reason
                            .unwrap_or_else(|| "provider reported refund failure".into());
                        self.payments
                            .record_failure(payment.id, &reason)
                            .await
                            .map_err(store_err)?;
                        self.payments
                            .update_status_guarded(
                                payment.id,
                                &[PaymentStatus::RefundPending],
                                PaymentStatus::RefundFailed,
                            )
                            .await
                            .map_err(store_err)?;
                        error!(order_id = %order_id, reason = %reason, "refund failed");
                    }
                }
                self.payment_for(order_id).await
            }
            Err(e) => {
                self.payments
                    .record_failure(payment.id, &e.to_string())
                    .await
                    .map_err(store_err)?;
                self.payments
                    .update_status_guarded(
                        payment.id,
                        &[PaymentStatus::RefundPending],
                        PaymentStatus::RefundFailed,
                    )
                    .await
                    .map_err(store_err)?;
                error!(order_id = %order_id, reason = %e, "refund request failed");
                Err(e.into())
            }
        }
    }

    /// Pay the vendor their net proceeds. Connected-account vendors get
    /// a provider transfer; everyone else goes onto the bank-transfer
    /// queue, and the out-of-band processor reports payout status back
    /// into the ledger.
    pub async fn create_vendor_payout(&self, order: &Order) -> CoreResult<()> {
        let vendor_account = self
            .ledger
            .repository()
            .vendor_account(order.vendor_id)
            .await
            .map_err(store_err)?;

        match vendor_account {
            Some(account) => {
                let transfer_ref = self
                    .provider
                    .create_transfer(&account, order.vendor_amount, &order.external_ref)
                    .await
                    .map_err(|e| {
                        error!(order_id = %order.id, reason = %e, "vendor transfer failed");
                        CoreError::from(e)
                    })?;
                self.ledger
                    .record_payout(order.vendor_id, order.id, order.vendor_amount, true)
                    .await?;
                info!(order_id = %order.id, transfer_ref = %transfer_ref, "vendor transfer created");
            }
            None => {
                let event = VendorPaymentEvent {
                    order_id: order.id,
                    vendor_id: order.vendor_id,
                    amount: order.vendor_amount,
                    platform_fee: order.platform_fee,
                    release_date: chrono::Utc::now(),
                };
                publish_event(
                    self.events.as_ref(),
                    topics::VENDOR_PAYMENTS,
                    &order.id.to_string(),
                    &event,
                )
                .await?;
                self.ledger
                    .record_payout(order.vendor_id, order.id, order.vendor_amount, false)
                    .await?;
                info!(order_id = %order.id, vendor_id = %order.vendor_id, "bank payout queued");
            }
        }

        Ok(())
    }

    /// Dispatch a signature-verified provider event. Transitions here are
    /// the only path besides direct engine calls that may move payment
    /// state; client-supplied statuses never reach this code.
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> CoreResult<()> {
        match event.kind {
            WebhookEventKind::PaymentSucceeded => {
                let payment = self.payment_by_ref(&event.data.provider_ref).await?;
                self.payments
                    .update_status_guarded(
                        payment.id,
                        &[PaymentStatus::Initiated],
                        PaymentStatus::Authorized,
                    )
                    .await
                    .map_err(store_err)?;
                Ok(())
            }
            WebhookEventKind::PaymentCaptured => {
                let payment = self.payment_by_ref(&event.data.provider_ref).await?;
                // Duplicate capture confirmations land here as no-ops.
                self.payments
                    .update_status_guarded(
                        payment.id,
                        &[PaymentStatus::Authorized],
                        PaymentStatus::Captured,
                    )
                    .await
                    .map_err(store_err)?;
                Ok(())
            }
            WebhookEventKind::PaymentFailed => {
                let payment = self.payment_by_ref(&event.data.provider_ref).await?;
                let reason = event
                    .data
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "provider reported failure".into());
                self.payments
                    .record_failure(payment.id, &reason)
                    .await
                    .map_err(store_err)?;
                self.payments
                    .update_status_guarded(
                        payment.id,
                        &[
                            PaymentStatus::Initiated,
                            PaymentStatus::Authorized,
                            PaymentStatus::Captured,
                        ],
                        PaymentStatus::Failed,
                    )
                    .await
                    .map_err(store_err)?;
                warn!(provider_ref = %event.data.provider_ref, reason = %reason, "payment failed");
                Ok(())
            }
            WebhookEventKind::TransferUpdated => {
                let order_id = event.data.order_id.ok_or_else(|| {
                    CoreError::Validation("transfer event missing order reference".into())
                })?;
                let status = match event.data.status.as_deref() {
                    Some("paid") => VendorTransactionStatus::Settled,
                    Some("failed") => VendorTransactionStatus::Failed,
                    other => {
                        info!(order_id = %order_id, status = ?other, "transfer update observed");
                        return Ok(());
                    }
                };
                let updated = self.ledger.payout_reported(order_id, status).await?;
                info!(order_id = %order_id, updated, "payout status synced from transfer event");
                Ok(())
            }
            WebhookEventKind::AccountUpdated => {
                let account = event.data.vendor_account.as_deref().ok_or_else(|| {
                    CoreError::Validation("account event missing vendor account".into())
                })?;
                let payouts_enabled = event.data.status.as_deref() == Some("payouts_enabled");
                self.ledger
                    .repository()
                    .set_vendor_account_status(account, payouts_enabled)
                    .await
                    .map_err(store_err)?;
                info!(vendor_account = %account, payouts_enabled, "vendor account capability synced");
                Ok(())
            }
        }
    }

    async fn payment_for(&self, order_id: Uuid) -> CoreResult<Payment> {
        self.payments
            .get_by_order(order_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("payment for order {}", order_id)))
    }

    async fn payment_by_ref(&self, provider_ref: &str) -> CoreResult<Payment> {
        self.payments
            .get_by_provider_ref(provider_ref)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound(format!("payment for intent {}", provider_ref)))
    }

    async fn publish_action(
        &self,
        order_id: Uuid,
        payment_id: Uuid,
        amount: i64,
        action: PaymentActionKind,
    ) -> CoreResult<()> {
        let event = PaymentActionEvent {
            action,
            data: PaymentActionData {
                order_id,
                payment_id,
                amount,
            },
        };
        publish_event(
            self.events.as_ref(),
            topics::PAYMENT_ACTIONS,
            &order_id.to_string(),
            &event,
        )
        .await
    }
}

fn store_err(e: RepoError) -> CoreError {
    CoreError::Unavailable(format!("payment store: {}", e))
}

/// Provider used in sandbox/development wiring: every operation is
/// approved and references are minted locally. Swap in a real provider
/// adapter at the `PaymentProvider` seam for production.
pub struct SandboxProvider;

#[async_trait::async_trait]
impl PaymentProvider for SandboxProvider {
    async fn create_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<vendra_core::payment::ProviderIntent, vendra_core::payment::ProviderError> {
        Ok(vendra_core::payment::ProviderIntent {
            provider_ref: format!("pi_{}", request.order_id.simple()),
            order_id: request.order_id,
            amount: request.amount,
            currency: request.currency.clone(),
            status: vendra_core::payment::ProviderIntentStatus::RequiresCapture,
            client_secret: Some(format!("secret_{}", request.order_id.simple())),
            created_at: chrono::Utc::now(),
        })
    }

    async fn capture(
        &self,
        provider_ref: &str,
    ) -> Result<vendra_core::payment::ProviderIntent, vendra_core::payment::ProviderError> {
        Ok(vendra_core::payment::ProviderIntent {
            provider_ref: provider_ref.to_string(),
            order_id: Uuid::nil(),
            amount: 0,
            currency: "USD".to_string(),
            status: vendra_core::payment::ProviderIntentStatus::Succeeded,
            client_secret: None,
            created_at: chrono::Utc::now(),
        })
    }

    async fn cancel(
        &self,
        provider_ref: &str,
    ) -> Result<vendra_core::payment::ProviderIntent, vendra_core::payment::ProviderError> {
        Ok(vendra_core::payment::ProviderIntent {
            provider_ref: provider_ref.to_string(),
            order_id: Uuid::nil(),
            amount: 0,
            currency: "USD".to_string(),
            status: vendra_core::payment::ProviderIntentStatus::Canceled,
            client_secret: None,
            created_at: chrono::Utc::now(),
        })
    }

    async fn refund(
        &self,
        provider_ref: &str,
        amount: Option<i64>,
    ) -> Result<vendra_core::payment::ProviderRefund, vendra_core::payment::ProviderError> {
        Ok(vendra_core::payment::ProviderRefund {
            provider_ref: format!("re_{}", provider_ref),
            amount: amount.unwrap_or(0),
            status: vendra_core::payment::ProviderRefundStatus::Succeeded,
            failure_reason: None,
        })
    }

    async fn create_transfer(
        &self,
        _vendor_account: &str,
        _amount: i64,
        order_ref: &str,
    ) -> Result<String, vendra_core::payment::ProviderError> {
        Ok(format!("tr_{}", order_ref))
    }
}
