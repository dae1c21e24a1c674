use crate::domain::event::PaymentEvent;
use crate::domain::ports::EventPublisher;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Publishes domain events to the log. Stands in for the external event bus
/// when the core runs without one (replay harness, local debugging).
#[derive(Default, Clone)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, topic: &str, key: &str, event: &PaymentEvent) -> Result<()> {
        tracing::info!(
            topic,
            key,
            transaction = %event.transaction_id,
            status = %event.payment.status,
            "payment event published"
        );
        Ok(())
    }
}

/// Captures published events in memory so tests can assert on them. Can be
/// armed to fail, to exercise the fire-and-forget contract.
#[derive(Default, Clone)]
pub struct RecordingEventPublisher {
    records: Arc<RwLock<Vec<PublishedEvent>>>,
    failing: Arc<RwLock<bool>>,
}

#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub event: PaymentEvent,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.records.read().await.clone()
    }

    /// Published event types, in publication order.
    pub async fn event_types(&self) -> Vec<String> {
        self.records
            .read()
            .await
            .iter()
            .map(|record| record.event.event_type.clone())
            .collect()
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, topic: &str, key: &str, event: &PaymentEvent) -> Result<()> {
        if *self.failing.read().await {
            return Err(PaymentError::ValidationError(
                "event bus unavailable".to_string(),
            ));
        }
        self.records.write().await.push(PublishedEvent {
            topic: topic.to_string(),
            key: key.to_string(),
            event: event.clone(),
        });
        Ok(())
    }
}
