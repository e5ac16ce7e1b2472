pub mod clients;
pub mod events;
pub mod identity;
pub mod payment;

use uuid::Uuid;

/// Error taxonomy for the order core. Validation and business-rule
/// variants are terminal for the caller; `Unavailable` and
/// `ResourceExhausted` are infrastructure faults a caller may retry with
/// backoff.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Out of stock: product {product_id} requested {requested}, available {available}")]
    OutOfStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Actor not permitted: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Downstream service unavailable: {0}")]
    Unavailable(String),

    #[error("Payment provider failure: {0}")]
    Provider(String),

    #[error("Admission capacity exhausted")]
    ResourceExhausted,
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_) | CoreError::ResourceExhausted)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
