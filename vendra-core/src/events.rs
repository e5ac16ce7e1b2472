use async_trait::async_trait;
use serde::Serialize;

use crate::{CoreError, CoreResult};

/// Seam in front of the durable event log. The production implementation
/// wraps a Kafka producer; tests substitute a recording sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Serialize and publish a typed event, mapping broker failures to the
/// retryable `Unavailable` class.
pub async fn publish_event<T: Serialize>(
    sink: &dyn EventSink,
    topic: &str,
    key: &str,
    event: &T,
) -> CoreResult<()> {
    let payload = serde_json::to_string(event)
        .map_err(|e| CoreError::Validation(format!("event serialization failed: {}", e)))?;

    sink.publish(topic, key, &payload)
        .await
        .map_err(|e| CoreError::Unavailable(format!("event publish to {} failed: {}", topic, e)))
}
