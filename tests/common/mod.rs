use payflow::application::orchestrator::PaymentOrchestrator;
use payflow::application::reconciler::WebhookReconciler;
use payflow::domain::transaction::{
    Amount, CustomerDetails, PaymentMethod, PaymentRequest, Transaction,
};
use payflow::gateways::GatewayRegistry;
use payflow::gateways::mock::MockGateway;
use payflow::infrastructure::in_memory::InMemoryTransactionStore;
use payflow::infrastructure::publisher::RecordingEventPublisher;
use payflow::infrastructure::signature::HmacVerifier;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct Harness {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub reconciler: WebhookReconciler,
    pub gateway: Arc<MockGateway>,
    pub publisher: Arc<RecordingEventPublisher>,
}

/// Orchestrator + reconciler wired to an in-memory store and a scriptable
/// gateway registered for the `stripe` method.
pub fn harness() -> Harness {
    let gateway = Arc::new(MockGateway::new(PaymentMethod::Stripe));
    let publisher = Arc::new(RecordingEventPublisher::new());
    let mut registry = GatewayRegistry::new();
    registry.register(gateway.clone());

    let orchestrator = Arc::new(PaymentOrchestrator::new(
        Arc::new(InMemoryTransactionStore::new()),
        registry,
        publisher.clone(),
    ));
    let mut reconciler = WebhookReconciler::new(orchestrator.clone());
    reconciler.register(gateway.clone(), Box::new(HmacVerifier::new(WEBHOOK_SECRET)));

    Harness {
        orchestrator,
        reconciler,
        gateway,
        publisher,
    }
}

pub fn payment_request(order_id: &str, amount: Decimal) -> PaymentRequest {
    PaymentRequest {
        order_id: order_id.to_string(),
        user_id: "user-1".to_string(),
        amount: Amount::new(amount).unwrap(),
        currency: "USD".to_string(),
        method: PaymentMethod::Stripe,
        customer: CustomerDetails {
            name: Some("Ada Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
        },
        billing_address: None,
        description: None,
        success_url: None,
        cancel_url: None,
        metadata: None,
    }
}

pub fn webhook_payload(reference: &str, status: &str) -> Vec<u8> {
    serde_json::json!({ "reference": reference, "status": status })
        .to_string()
        .into_bytes()
}

pub fn sign(payload: &[u8]) -> String {
    HmacVerifier::sign(WEBHOOK_SECRET, payload)
}

/// Creates a payment and drives it to `Completed` via a signed webhook.
pub async fn completed_payment(h: &Harness, order_id: &str, amount: Decimal) -> Transaction {
    let tx = h
        .orchestrator
        .create(payment_request(order_id, amount))
        .await
        .unwrap();
    let reference = tx.external_reference.clone().unwrap();
    let payload = webhook_payload(&reference, "succeeded");
    h.reconciler
        .process(PaymentMethod::Stripe, &payload, Some(&sign(&payload)))
        .await
        .unwrap();
    h.orchestrator.get(tx.id).await.unwrap()
}
