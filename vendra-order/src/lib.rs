pub mod clients;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod repository;
pub mod settlement;

#[cfg(test)]
mod testsupport;

pub use ledger::VendorLedgerService;
pub use models::{
    Order, OrderItem, OrderPaymentStatus, OrderPolicy, OrderStatus, Payment, PaymentMethod,
    PaymentStatus,
};
pub use orchestrator::{OrderOrchestrator, OrderStatusView};
pub use settlement::PaymentSettlementEngine;
