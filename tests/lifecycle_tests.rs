mod common;

use common::{completed_payment, harness, payment_request, sign, webhook_payload};
use payflow::domain::transaction::{Amount, PaymentMethod, PaymentStatus};
use payflow::error::PaymentError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_full_payment_lifecycle() {
    let h = harness();

    // Create: pending, with a remote reference assigned by the gateway.
    let tx = h
        .orchestrator
        .create(payment_request("ORD-1", dec!(49.99)))
        .await
        .unwrap();
    assert_eq!(tx.status, PaymentStatus::Pending);
    let reference = tx.external_reference.clone().expect("reference assigned");

    // Gateway pushes completion.
    let payload = webhook_payload(&reference, "succeeded");
    h.reconciler
        .process(PaymentMethod::Stripe, &payload, Some(&sign(&payload)))
        .await
        .unwrap();
    let tx = h.orchestrator.get(tx.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Completed);
    assert!(tx.completed_at.is_some());

    // Partial refund.
    let tx = h
        .orchestrator
        .refund(tx.id, Amount::new(dec!(20.00)).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(tx.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(tx.refunded_amount, dec!(20.00));

    // Refund the remainder.
    let tx = h
        .orchestrator
        .refund(tx.id, Amount::new(dec!(29.99)).unwrap(), None)
        .await
        .unwrap();
    assert_eq!(tx.status, PaymentStatus::Refunded);
    assert_eq!(tx.refunded_amount, dec!(49.99));

    // Nothing left to refund.
    let err = h
        .orchestrator
        .refund(tx.id, Amount::new(dec!(0.01)).unwrap(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::RefundExceedsCapture { .. }));

    assert_eq!(
        h.publisher.event_types().await,
        vec![
            "payment.created",
            "payment.completed",
            "payment.refunded",
            "payment.refunded",
        ]
    );
}

#[tokio::test]
async fn test_duplicate_order_creates_no_second_record() {
    let h = harness();
    let first = h
        .orchestrator
        .create(payment_request("ORD-1", dec!(10.00)))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .create(payment_request("ORD-1", dec!(99.00)))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::DuplicateOrder(_)));

    let current = h.orchestrator.get_by_order_id("ORD-1").await.unwrap();
    assert_eq!(current.id, first.id);
    assert_eq!(current.amount.value(), dec!(10.00));
}

#[tokio::test]
async fn test_cancel_completed_payment_rejected() {
    let h = harness();
    let tx = completed_payment(&h, "ORD-1", dec!(25.00)).await;

    let err = h.orchestrator.cancel(tx.id).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::InvalidTransition {
            from: PaymentStatus::Completed,
            to: PaymentStatus::Cancelled,
        }
    ));

    // Still completed, still refundable.
    let current = h.orchestrator.get(tx.id).await.unwrap();
    assert_eq!(current.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_confirm_tracks_remote_processing() {
    let h = harness();
    let tx = h
        .orchestrator
        .create(payment_request("ORD-1", dec!(10.00)))
        .await
        .unwrap();
    let reference = tx.external_reference.clone().unwrap();

    h.gateway.set_remote_status(&reference, "processing").await;
    let tx = h.orchestrator.confirm(tx.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Processing);

    h.gateway.set_remote_status(&reference, "succeeded").await;
    let tx = h.orchestrator.confirm(tx.id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_lookup_by_order_and_id() {
    let h = harness();
    let tx = h
        .orchestrator
        .create(payment_request("ORD-7", dec!(5.00)))
        .await
        .unwrap();

    assert_eq!(h.orchestrator.get(tx.id).await.unwrap().id, tx.id);
    assert_eq!(
        h.orchestrator.get_by_order_id("ORD-7").await.unwrap().id,
        tx.id
    );
    assert!(matches!(
        h.orchestrator.get_by_order_id("ORD-8").await,
        Err(PaymentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unsupported_method_rejected_before_gateway() {
    let h = harness();
    let mut request = payment_request("ORD-1", dec!(10.00));
    request.method = PaymentMethod::BankTransfer;

    let err = h.orchestrator.create(request).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::UnsupportedMethod(PaymentMethod::BankTransfer)
    ));
    assert!(matches!(
        h.orchestrator.get_by_order_id("ORD-1").await,
        Err(PaymentError::NotFound(_))
    ));
}
