use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use vendra_core::{CoreError, CoreResult};

use crate::models::{
    Order, VendorEntry, VendorTransaction, VendorTransactionKind, VendorTransactionStatus,
};
use crate::repository::VendorLedgerRepository;

/// Books money movement for vendors against the append-only ledger.
/// A captured sale books the gross amount and the platform fee as two
/// entries, so the net credit equals the vendor amount and the fee stays
/// auditable.
pub struct VendorLedgerService {
    ledger: Arc<dyn VendorLedgerRepository>,
}

impl VendorLedgerService {
    pub fn new(ledger: Arc<dyn VendorLedgerRepository>) -> Self {
        Self { ledger }
    }

    pub fn repository(&self) -> &Arc<dyn VendorLedgerRepository> {
        &self.ledger
    }

    /// Credit a captured sale: gross SALE entry plus platform FEE debit.
    pub async fn record_sale(&self, order: &Order) -> CoreResult<VendorTransaction> {
        self.append(VendorEntry {
            vendor_id: order.vendor_id,
            order_id: Some(order.id),
            kind: VendorTransactionKind::Sale,
            amount: order.total_price,
            status: VendorTransactionStatus::Settled,
        })
        .await?;

        let fee = self
            .append(VendorEntry {
                vendor_id: order.vendor_id,
                order_id: Some(order.id),
                kind: VendorTransactionKind::Fee,
                amount: -order.platform_fee,
                status: VendorTransactionStatus::Settled,
            })
            .await?;

        info!(
            order_id = %order.id,
            vendor_id = %order.vendor_id,
            vendor_amount = order.vendor_amount,
            balance = fee.balance_after,
            "sale booked to vendor ledger"
        );
        Ok(fee)
    }

    /// Debit a payout. Connected-account transfers settle immediately;
    /// bank transfers stay PENDING until the processor reports back.
    pub async fn record_payout(
        &self,
        vendor_id: Uuid,
        order_id: Uuid,
        amount: i64,
        settled: bool,
    ) -> CoreResult<VendorTransaction> {
        let status = if settled {
            VendorTransactionStatus::Settled
        } else {
            VendorTransactionStatus::Pending
        };

        self.append(VendorEntry {
            vendor_id,
            order_id: Some(order_id),
            kind: VendorTransactionKind::Payout,
            amount: -amount,
            status,
        })
        .await
    }

    /// Reverse a refunded amount. Partial refunds book the vendor's
    /// proportional share: the REFUND entry debits the refunded gross and
    /// an ADJUSTMENT returns the fee share, so the net debit matches what
    /// the vendor originally kept for that slice of the order.
    pub async fn record_refund(&self, order: &Order, amount: i64) -> CoreResult<VendorTransaction> {
        let refund = self
            .append(VendorEntry {
                vendor_id: order.vendor_id,
                order_id: Some(order.id),
                kind: VendorTransactionKind::Refund,
                amount: -amount,
                status: VendorTransactionStatus::Settled,
            })
            .await?;

        let fee_share = if order.total_price > 0 {
            amount * order.platform_fee / order.total_price
        } else {
            0
        };

        if fee_share > 0 {
            return self
                .append(VendorEntry {
                    vendor_id: order.vendor_id,
                    order_id: Some(order.id),
                    kind: VendorTransactionKind::Adjustment,
                    amount: fee_share,
                    status: VendorTransactionStatus::Settled,
                })
                .await;
        }

        Ok(refund)
    }

    pub async fn payout_reported(
        &self,
        order_id: Uuid,
        status: VendorTransactionStatus,
    ) -> CoreResult<u64> {
        self.ledger
            .update_payout_status_for_order(order_id, status)
            .await
            .map_err(ledger_err)
    }

    async fn append(&self, entry: VendorEntry) -> CoreResult<VendorTransaction> {
        self.ledger.append(entry).await.map_err(ledger_err)
    }
}

fn ledger_err(e: crate::repository::RepoError) -> CoreError {
    CoreError::Unavailable(format!("vendor ledger: {}", e))
}
