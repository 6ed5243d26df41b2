mod common;

use common::{mock_webhook, sign, Harness};
use payment_settlement::domain::audit::AuditDecision;
use payment_settlement::domain::payment::{GatewayKind, OrderStatus, PaymentStatus};
use payment_settlement::domain::webhook::{ChargeOutcome, WebhookOutcome};
use payment_settlement::error::{SettlementError, SignatureError};
use payment_settlement::gateways::signature::sign_sha512_hex;
use payment_settlement::gateways::GatewayStatusReport;
use payment_settlement::service::reconciler::Reconciler;
use payment_settlement::repo::ports::{OrderSync, PaymentStore};
use payment_settlement::service::webhook_processor::CHECKOUT_CLOSED_REASON;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn duplicate_delivery_completes_once() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let processor = h.processor();
    let body = mock_webhook("charge.success", &record.reference, "2700");
    let sig = sign(&body);

    let first = processor.handle(GatewayKind::Paystack, &body, Some(&sig)).await.unwrap();
    let second = processor.handle(GatewayKind::Paystack, &body, Some(&sig)).await.unwrap();

    assert_eq!(first, WebhookOutcome::Completed { payment_id: record.id });
    assert_eq!(second, WebhookOutcome::AlreadyProcessed { payment_id: record.id });

    let stored = h.payment(record.id).await;
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.gateway_reference.as_deref(), Some("mock_txn_42"));

    let updates = h.orders.updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].payment_status, PaymentStatus::Completed);
    assert_eq!(updates[0].order_status, Some(OrderStatus::Processing));
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_produce_one_order_update() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let processor = h.processor();
    let body = mock_webhook("charge.success", &record.reference, "2700");
    let sig = sign(&body);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let processor = processor.clone();
        let body = body.clone();
        let sig = sig.clone();
        handles.push(tokio::spawn(async move {
            processor.handle(GatewayKind::Paystack, &body, Some(&sig)).await
        }));
    }
    let mut completed = 0;
    for handle in handles {
        if let WebhookOutcome::Completed { .. } = handle.await.unwrap().unwrap() {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(h.orders.updates().await.len(), 1);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn minor_unit_amount_is_corrected_and_audited() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "270000");

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Completed { payment_id: record.id });
    assert_eq!(h.payment(record.id).await.amount, dec!(2700));

    let entries = h.audit.entries().await;
    let correction = entries
        .iter()
        .find(|e| e.decision == AuditDecision::Corrected)
        .expect("correction entry");
    assert_eq!(correction.gateway_amount, Some(dec!(270000)));
    assert_eq!(correction.order_amount, dec!(2700));
    assert!(correction.reason.contains("270000"));
    assert!(entries.iter().any(|e| e.decision == AuditDecision::Completed));
}

#[tokio::test]
async fn genuine_mismatch_fails_the_payment() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "1000");

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Failed { payment_id: record.id });
    let stored = h.payment(record.id).await;
    assert_eq!(stored.status, PaymentStatus::Failed);
    let reason = stored.failure_reason.unwrap();
    assert!(reason.contains("amount mismatch"));
    assert!(reason.contains("1000"));
    assert!(reason.contains("2700"));

    let rejected = h
        .audit
        .entries()
        .await
        .into_iter()
        .find(|e| e.decision == AuditDecision::Rejected)
        .unwrap();
    assert_eq!(rejected.mismatch_ratio, Some(dec!(2.7)));
    assert!(h
        .orders
        .updates()
        .await
        .iter()
        .all(|u| u.payment_status != PaymentStatus::Completed));
}

#[tokio::test]
async fn bad_signature_changes_nothing() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "2700");
    let forged = sign_sha512_hex("someone-else", &body);

    let err = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&forged))
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::Signature(SignatureError::Mismatch)));
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
    assert!(h.audit.entries().await.is_empty());
    assert!(h.orders.updates().await.is_empty());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "2700");

    let err = h
        .processor()
        .handle(GatewayKind::Paystack, &body, None)
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::Signature(SignatureError::MissingSignature)));
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn unconfigured_secret_rejects_every_webhook() {
    let h = Harness::with_secret("");
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "2700");

    let err = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap_err();

    assert!(matches!(err, SettlementError::Signature(SignatureError::MissingSecret)));
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn unknown_reference_is_acknowledged_without_changes() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", "PH-NOT-OURS", "2700");

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::UnknownReference);
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn reference_is_scoped_to_the_gateway() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "2700");

    let outcome = h
        .processor()
        .handle(GatewayKind::Monnify, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::UnknownReference);
}

#[tokio::test]
async fn declined_attempt_keeps_payment_open_for_a_later_success() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let processor = h.processor();
    let declined = mock_webhook("charge.failed", &record.reference, "2700");
    let paid = mock_webhook("charge.success", &record.reference, "2700");

    let first = processor
        .handle(GatewayKind::Paystack, &declined, Some(&sign(&declined)))
        .await
        .unwrap();
    assert_eq!(first, WebhookOutcome::AttemptFailed { payment_id: record.id });
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
    assert!(h.orders.updates().await.is_empty());
    assert!(h.notifier.sent().is_empty());

    let second = processor
        .handle(GatewayKind::Paystack, &paid, Some(&sign(&paid)))
        .await
        .unwrap();
    assert_eq!(second, WebhookOutcome::Completed { payment_id: record.id });
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Completed);
    let updates = h.orders.updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn closed_checkout_fails_the_payment_and_informs_the_order() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.closed", &record.reference, "2700");

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Failed { payment_id: record.id });
    let stored = h.payment(record.id).await;
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some(CHECKOUT_CLOSED_REASON));
    let order = h.orders.order(record.order_id).await.unwrap();
    assert_eq!(order.payment_status, Some(PaymentStatus::Failed));
    assert_eq!(order.status, OrderStatus::Pending);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn other_events_are_ignored() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("transfer.pending", &record.reference, "2700");

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Ignored);
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_order_update_is_queued_and_relayed() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "2700");
    h.orders.fail_next_updates(2);

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Completed { payment_id: record.id });
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Completed);
    assert!(h.orders.updates().await.is_empty());
    let pending = h.queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1, "inline try counts as the first attempt");

    let relay = h.relay();
    assert_eq!(relay.tick().await.unwrap(), 0, "retry is not due yet");

    h.queue.make_all_due().await;
    assert_eq!(relay.tick().await.unwrap(), 0);
    assert_eq!(h.queue.pending().await[0].attempts, 2);

    h.queue.make_all_due().await;
    assert_eq!(relay.tick().await.unwrap(), 1);
    assert!(h.queue.pending().await.is_empty());

    let updates = h.orders.updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].order_id, record.order_id);
    assert_eq!(updates[0].payment_status, PaymentStatus::Completed);
    let order = h.orders.order(record.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn settlement_is_refused_when_the_order_update_cannot_be_queued() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "2700");
    let processor = h.processor();
    h.orders.fail_next_updates(1);
    h.queue.set_failing(true);

    let first = processor
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await;
    assert!(matches!(first, Err(SettlementError::Store(_))));
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
    assert!(h.notifier.sent().is_empty());

    h.queue.set_failing(false);
    let second = processor
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();
    assert_eq!(second, WebhookOutcome::Completed { payment_id: record.id });
    assert!(h.orders.updates().await.is_empty(), "inline update hit the injected failure");
    assert_eq!(h.queue.pending().await.len(), 1);

    h.queue.make_all_due().await;
    assert_eq!(h.relay().tick().await.unwrap(), 1);
    let order = h.orders.order(record.order_id).await.unwrap();
    assert_eq!(order.payment_status, Some(PaymentStatus::Completed));
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn relay_finishes_a_transition_whose_inline_update_never_ran() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let completion = payment_settlement::domain::payment::Completion {
        amount: dec!(2700),
        gateway_reference: None,
        gateway_response: serde_json::json!({}),
        completed_at: chrono::Utc::now(),
    };
    let sync = OrderSync {
        order_id: record.order_id,
        payment_status: PaymentStatus::Completed,
        order_status: Some(OrderStatus::Processing),
    };
    assert!(h
        .payments
        .complete_if_pending(record.id, &completion, &sync)
        .await
        .unwrap()
        .is_some());

    let relay = h.relay();
    assert_eq!(relay.tick().await.unwrap(), 0, "inline path gets the first go");
    h.queue.make_all_due().await;
    assert_eq!(relay.tick().await.unwrap(), 1);
    assert_eq!(
        h.orders.order(record.order_id).await.unwrap().status,
        OrderStatus::Processing
    );
}

#[tokio::test]
async fn relay_keeps_going_when_a_task_cannot_be_marked() {
    let h = Harness::succeeding();
    let first = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let second = h.pending_payment(dec!(1500), GatewayKind::Paystack).await;
    let processor = h.processor();
    h.orders.fail_next_updates(2);
    for (record, amount) in [(&first, "2700"), (&second, "1500")] {
        let body = mock_webhook("charge.success", &record.reference, amount);
        processor
            .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
            .await
            .unwrap();
    }
    assert_eq!(h.queue.pending().await.len(), 2);

    let relay = h.relay();
    h.queue.make_all_due().await;
    h.queue.fail_next_marks(1);
    assert_eq!(relay.tick().await.unwrap(), 2);
    assert_eq!(h.orders.updates().await.len(), 2);
    let stuck = h.queue.pending().await;
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].payment_id, first.id);

    assert_eq!(relay.tick().await.unwrap(), 0, "claim is still leased");
    h.queue.expire_leases().await;
    assert_eq!(relay.tick().await.unwrap(), 1);
    assert!(h.queue.pending().await.is_empty());
    let order = h.orders.order(second.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn audit_outage_does_not_block_settlement() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;
    let body = mock_webhook("charge.success", &record.reference, "270000");
    h.audit.set_failing(true);

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Completed { payment_id: record.id });
    assert_eq!(h.orders.updates().await.len(), 1);
}

#[tokio::test]
async fn missing_order_fails_the_payment() {
    let h = Harness::succeeding();
    let record = h
        .pending_payment_for(Uuid::new_v4(), dec!(2700), GatewayKind::Paystack)
        .await;
    let body = mock_webhook("charge.success", &record.reference, "2700");

    let outcome = h
        .processor()
        .handle(GatewayKind::Paystack, &body, Some(&sign(&body)))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Failed { payment_id: record.id });
    let reason = h.payment(record.id).await.failure_reason.unwrap();
    assert!(reason.contains("not found"));
}

#[tokio::test]
async fn reconciler_settles_stale_payment_through_the_same_path() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Monnify).await;
    h.monnify.set_status(GatewayStatusReport {
        reference: record.reference.clone(),
        gateway_reference: Some("MNFY|42".to_string()),
        amount: dec!(2700),
        currency: "NGN".to_string(),
        outcome: ChargeOutcome::Succeeded,
        raw: serde_json::json!({"paymentStatus": "PAID"}),
    });

    let reconciler = Reconciler {
        gateways: h.gateways(),
        payments: Arc::new(h.payments.clone()),
        processor: h.processor(),
        grace: chrono::Duration::zero(),
        batch_size: 10,
    };

    let summary = reconciler.run_once().await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Completed);

    let again = reconciler.run_once().await.unwrap();
    assert_eq!(again.checked, 0);
    assert_eq!(h.orders.updates().await.len(), 1);
}

#[tokio::test]
async fn reconciler_leaves_inconclusive_payments_pending() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Paystack).await;

    let reconciler = Reconciler {
        gateways: h.gateways(),
        payments: Arc::new(h.payments.clone()),
        processor: h.processor(),
        grace: chrono::Duration::zero(),
        batch_size: 10,
    };

    let summary = reconciler.run_once().await.unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn reconciler_treats_a_declined_attempt_as_still_open() {
    let h = Harness::succeeding();
    let record = h.pending_payment(dec!(2700), GatewayKind::Monnify).await;
    h.monnify.set_status(GatewayStatusReport {
        reference: record.reference.clone(),
        gateway_reference: None,
        amount: dec!(2700),
        currency: "NGN".to_string(),
        outcome: ChargeOutcome::AttemptFailed,
        raw: serde_json::json!({"paymentStatus": "FAILED"}),
    });

    let reconciler = Reconciler {
        gateways: h.gateways(),
        payments: Arc::new(h.payments.clone()),
        processor: h.processor(),
        grace: chrono::Duration::zero(),
        batch_size: 10,
    };

    let summary = reconciler.run_once().await.unwrap();
    assert_eq!(summary.still_pending, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.payment(record.id).await.status, PaymentStatus::Pending);
}
