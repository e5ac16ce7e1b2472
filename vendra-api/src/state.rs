use std::sync::Arc;
use vendra_core::payment::WebhookVerifier;
use vendra_order::{OrderOrchestrator, PaymentSettlementEngine};

use crate::middleware::governor::AdmissionGovernor;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub settlement: Arc<PaymentSettlementEngine>,
    pub verifier: Arc<WebhookVerifier>,
    pub governor: Arc<AdmissionGovernor>,
    pub metrics: Arc<prometheus::Registry>,
    pub auth: AuthConfig,
}
