use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vendra_order::repository::IdempotencyStore;
use vendra_order::OrderOrchestrator;
use vendra_shared::models::events::{topics, CheckoutCompletedEvent};

/// What the consumer loop should do with a message after handling.
#[derive(Debug, PartialEq, Eq)]
enum MessageOutcome {
    /// Handled (or idempotently skipped): commit the offset.
    Commit,
    /// Transient failure: leave the offset uncommitted so the message
    /// redelivers.
    Retry,
}

/// Dedicated consumer task for the checkout-completion topic. Offsets
/// are committed only after the handler succeeds; malformed payloads are
/// logged and committed (a parse failure never succeeds on retry);
/// transient handler failures leave the offset alone so the message
/// redelivers to an idempotent handler.
pub async fn start_checkout_worker(
    brokers: String,
    group_id: String,
    orchestrator: Arc<OrderOrchestrator>,
    idempotency: Arc<dyn IdempotencyStore>,
    idempotency_ttl_seconds: u64,
) {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Consumer creation failed");

    consumer
        .subscribe(&[topics::CHECKOUT_COMPLETED])
        .expect("Can't subscribe");

    info!(group_id, "checkout worker started, listening for payment outcomes");

    loop {
        match consumer.recv().await {
            // Fetch errors (including timeouts) are benign: log and keep
            // polling.
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                let outcome = match m.payload_view::<str>() {
                    Some(Ok(payload)) => {
                        let orchestrator = orchestrator.clone();
                        handle_payload(
                            payload,
                            idempotency.as_ref(),
                            idempotency_ttl_seconds,
                            move |event| async move {
                                orchestrator.handle_checkout_event(&event).await
                            },
                        )
                        .await
                    }
                    _ => {
                        error!("dropping checkout message with non-utf8 payload");
                        MessageOutcome::Commit
                    }
                };

                if outcome == MessageOutcome::Commit {
                    if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                        error!("offset commit failed: {}", e);
                    }
                }
            }
        }
    }
}

/// Parse, dedupe, and dispatch one message payload. Factored out of the
/// consumer loop so the commit policy is testable without a broker.
async fn handle_payload<F, Fut>(
    payload: &str,
    idempotency: &dyn IdempotencyStore,
    ttl_seconds: u64,
    handler: F,
) -> MessageOutcome
where
    F: FnOnce(CheckoutCompletedEvent) -> Fut,
    Fut: std::future::Future<Output = vendra_core::CoreResult<()>>,
{
    let event: CheckoutCompletedEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            // Unparseable payloads never succeed on retry; skip them.
            error!(error = %e, "dropping malformed checkout event");
            return MessageOutcome::Commit;
        }
    };

    let key = event_key(&event);
    match idempotency.record(&key, ttl_seconds).await {
        Ok(false) => {
            debug!(order_id = %event.order_id, "duplicate checkout event skipped");
            return MessageOutcome::Commit;
        }
        Ok(true) => {}
        Err(e) => {
            // Degrade to the handler's own idempotent transitions.
            warn!(error = %e, "idempotency store unavailable, relying on guarded transitions");
        }
    }

    match handler(event).await {
        Ok(()) => MessageOutcome::Commit,
        Err(e) if e.is_retryable() => {
            error!(error = %e, "transient handler failure, leaving offset for redelivery");
            MessageOutcome::Retry
        }
        Err(e) => {
            warn!(error = %e, "terminal handler failure, skipping event");
            MessageOutcome::Commit
        }
    }
}

fn event_key(event: &CheckoutCompletedEvent) -> String {
    format!(
        "{}:{}:{}",
        topics::CHECKOUT_COMPLETED,
        event.order_id,
        event.status.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;
    use vendra_core::CoreError;
    use vendra_order::repository::RepoError;
    use vendra_shared::models::events::CheckoutOutcome;

    #[derive(Default)]
    struct MemoryIdempotency {
        seen: Mutex<HashSet<String>>,
        fail: bool,
    }

    #[async_trait]
    impl IdempotencyStore for MemoryIdempotency {
        async fn record(&self, key: &str, _ttl_seconds: u64) -> Result<bool, RepoError> {
            if self.fail {
                return Err("redis down".into());
            }
            Ok(self.seen.lock().unwrap().insert(key.to_string()))
        }
    }

    fn event_json(order_id: Uuid) -> String {
        serde_json::to_string(&CheckoutCompletedEvent {
            order_id,
            payment_intent_id: "pi_1".to_string(),
            amount: 2500,
            status: CheckoutOutcome::CheckoutCompleted,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_payload_is_committed_not_retried() {
        let store = MemoryIdempotency::default();
        let calls = AtomicUsize::new(0);

        let outcome = handle_payload("{\"status\":\"nonsense\"}", &store, 60, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(outcome, MessageOutcome::Commit);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_skipped_before_handler() {
        let store = MemoryIdempotency::default();
        let payload = event_json(Uuid::new_v4());
        let calls = AtomicUsize::new(0);

        let first = handle_payload(&payload, &store, 60, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        let second = handle_payload(&payload, &store, 60, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(first, MessageOutcome::Commit);
        assert_eq!(second, MessageOutcome::Commit);
        // The duplicate never reached the handler.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_leaves_offset_uncommitted() {
        let store = MemoryIdempotency::default();
        let payload = event_json(Uuid::new_v4());

        let outcome = handle_payload(&payload, &store, 60, |_| async {
            Err(CoreError::Unavailable("order store down".into()))
        })
        .await;

        assert_eq!(outcome, MessageOutcome::Retry);
    }

    #[tokio::test]
    async fn test_idempotency_outage_degrades_to_handler() {
        let store = MemoryIdempotency {
            fail: true,
            ..Default::default()
        };
        let payload = event_json(Uuid::new_v4());
        let calls = AtomicUsize::new(0);

        let outcome = handle_payload(&payload, &store, 60, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        // Redis being down must not drop the event.
        assert_eq!(outcome, MessageOutcome::Commit);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
