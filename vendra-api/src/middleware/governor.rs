use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{HistogramOpts, HistogramVec, Registry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use vendra_core::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Bounded-admission interceptor for every inbound order/payment call.
/// A fixed-capacity semaphore caps concurrent in-flight requests; a full
/// semaphore rejects immediately with resource-exhausted instead of
/// queuing, so overload turns into fast retryable errors rather than
/// unbounded latency. Admitted calls run under a default deadline.
pub struct AdmissionGovernor {
    semaphore: Arc<Semaphore>,
    deadline: Duration,
    calls: HistogramVec,
}

impl AdmissionGovernor {
    pub fn new(max_in_flight: usize, deadline: Duration, registry: &Registry) -> Self {
        let calls = HistogramVec::new(
            HistogramOpts::new(
                "vendra_rpc_duration_seconds",
                "Inbound RPC duration by method and outcome",
            ),
            &["method", "outcome"],
        )
        .expect("valid histogram opts");
        registry
            .register(Box::new(calls.clone()))
            .expect("metric registration");

        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            deadline,
            calls,
        }
    }

    pub fn try_admit(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn record(&self, method: &str, outcome: &str, elapsed: Duration) {
        self.calls
            .with_label_values(&[method, outcome])
            .observe(elapsed.as_secs_f64());
        tracing::info!(
            method,
            outcome,
            duration_ms = elapsed.as_millis() as u64,
            "rpc completed"
        );
    }
}

pub async fn governor_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let method = format!("{} {}", req.method(), req.uri().path());
    let start = Instant::now();

    let Some(permit) = state.governor.try_admit() else {
        state.governor.record(&method, "rejected", start.elapsed());
        return AppError(CoreError::ResourceExhausted).into_response();
    };

    let result = tokio::time::timeout(state.governor.deadline(), next.run(req)).await;
    drop(permit);

    match result {
        Ok(response) => {
            let outcome = if response.status().is_success() {
                "ok"
            } else {
                "error"
            };
            state.governor.record(&method, outcome, start.elapsed());
            response
        }
        Err(_) => {
            state.governor.record(&method, "deadline", start.elapsed());
            (
                StatusCode::GATEWAY_TIMEOUT,
                "request exceeded default deadline",
            )
                .into_response()
        }
    }
}
