//! End-to-end orchestration scenarios over the in-memory stack.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tonic::Request;

use grocerd::bus::Topic;
use grocerd::ledger::Ledger;
use grocerd::codec;
use grocerd::proto::fulfillment_server::Fulfillment;
use grocerd::proto::{OrderRequest, ReplyCode, RequestKind};

use common::{
    report, spawn_population_except, stack, submit, DownPriceSource, TablePriceSource,
};

const WAIT: Duration = Duration::from_secs(2);
const SHORT_WAIT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn fetch_with_full_quorum_deducts_stock_and_prices() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), WAIT).await;
    stack.ledger.set_quantity("bread", 10).await.unwrap();
    stack.ledger.set_quantity("milk", 5).await.unwrap();
    spawn_population_except(&stack, None);

    let reply = submit(
        &stack,
        RequestKind::Fetch,
        "customer-1",
        &[("bread", 2), ("milk", 1)],
    )
    .await;

    assert_eq!(reply.code(), ReplyCode::Ok);
    assert!(reply.message.contains("received all worker replies"));
    assert!(reply.message.contains("ITEMIZED BILL"));
    assert!(reply.message.contains("bread: 2 x $3.50 = $7.00"));
    assert!(reply.message.ends_with("TOTAL: $9.25"));

    assert_eq!(stack.ledger.quantity("bread").await.unwrap(), Some(8));
    assert_eq!(stack.ledger.quantity("milk").await.unwrap(), Some(4));
}

#[tokio::test]
async fn fetch_exceeding_stock_is_rejected_without_mutation() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), WAIT).await;
    stack.ledger.set_quantity("bread", 10).await.unwrap();
    spawn_population_except(&stack, None);

    let reply = submit(&stack, RequestKind::Fetch, "customer-2", &[("bread", 1000)]).await;

    assert_eq!(reply.code(), ReplyCode::BadRequest);
    assert!(reply.message.contains("bread"));
    assert!(reply.message.contains("need 1000"));
    assert!(reply.message.contains("have 10"));

    assert_eq!(stack.ledger.quantity("bread").await.unwrap(), Some(10));
}

#[tokio::test]
async fn fetch_quorum_timeout_compensates_the_reservation() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), SHORT_WAIT).await;
    stack.ledger.set_quantity("eggs", 6).await.unwrap();
    // Four of five workers: the quorum can never complete.
    spawn_population_except(&stack, Some("party"));
    let mut sub = stack.bus.subscribe(&[Topic::Fetch]);

    let reply = submit(&stack, RequestKind::Fetch, "customer-3", &[("eggs", 1)]).await;

    assert_eq!(reply.code(), ReplyCode::BadRequest);
    assert!(reply.message.contains("Timed out waiting for all workers"));

    // Compensation restored the deducted quantity.
    assert_eq!(stack.ledger.quantity("eggs").await.unwrap(), Some(6));

    // The lifecycle row is closed on the timeout path too.
    let order = codec::decode(&sub.recv().await.unwrap().payload).unwrap();
    let record = stack
        .lifecycle
        .fetch(&order.request_id)
        .await
        .unwrap()
        .expect("lifecycle row");
    assert!(record.end_time.is_some());
    assert_eq!(record.request_kind, "FETCH");
}

#[tokio::test]
async fn restock_credits_stock_only_after_quorum() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), WAIT).await;
    stack.ledger.set_quantity("beef", 0).await.unwrap();
    let mut sub = stack.bus.subscribe(&[Topic::Restock]);

    let service = stack.service.clone();
    let submit_task = tokio::spawn(async move {
        service
            .submit_order(Request::new(OrderRequest {
                request_kind: RequestKind::Restock as i32,
                id: "supplier-1".to_string(),
                items: [("beef".to_string(), 10)].into_iter().collect(),
            }))
            .await
            .unwrap()
            .into_inner()
    });

    let order = codec::decode(&sub.recv().await.unwrap().payload).unwrap();
    assert_eq!(order.kind, RequestKind::Restock);

    // Work dispatched, quorum pending: the credit must not have happened.
    assert_eq!(stack.ledger.quantity("beef").await.unwrap(), Some(0));

    for name in ["bread", "dairy", "meat", "produce", "party"] {
        assert!(report(&stack, &order.request_id, name).await);
    }

    let reply = submit_task.await.unwrap();
    assert_eq!(reply.code(), ReplyCode::Ok);
    assert_eq!(
        reply.message,
        format!("OK: received all worker replies for {}", order.request_id)
    );
    assert_eq!(stack.ledger.quantity("beef").await.unwrap(), Some(10));

    let record = stack
        .lifecycle
        .fetch(&order.request_id)
        .await
        .unwrap()
        .expect("lifecycle row");
    assert_eq!(record.request_kind, "RESTOCK");
    assert_eq!(record.served_id, "supplier-1");
    assert!(record.total_duration_ms.is_some());
}

#[tokio::test]
async fn duplicate_worker_reports_do_not_satisfy_quorum() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), WAIT).await;
    stack.ledger.set_quantity("bread", 10).await.unwrap();
    let mut sub = stack.bus.subscribe(&[Topic::Fetch]);

    let service = stack.service.clone();
    let submit_task = tokio::spawn(async move {
        service
            .submit_order(Request::new(OrderRequest {
                request_kind: RequestKind::Fetch as i32,
                id: "customer-4".to_string(),
                items: [("bread".to_string(), 1)].into_iter().collect(),
            }))
            .await
            .unwrap()
            .into_inner()
    });

    let order = codec::decode(&sub.recv().await.unwrap().payload).unwrap();

    // Four distinct workers, one of them reporting three times.
    for name in ["bread", "bread", "bread", "dairy", "meat", "produce"] {
        assert!(report(&stack, &order.request_id, name).await);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        !submit_task.is_finished(),
        "gate must still wait for the fifth distinct worker"
    );

    assert!(report(&stack, &order.request_id, "party").await);
    let reply = submit_task.await.unwrap();
    assert_eq!(reply.code(), ReplyCode::Ok);
}

#[tokio::test]
async fn report_for_finished_request_is_acked_and_ignored() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), WAIT).await;
    stack.ledger.set_quantity("bread", 5).await.unwrap();
    spawn_population_except(&stack, None);

    let reply = submit(&stack, RequestKind::Fetch, "customer-5", &[("bread", 1)]).await;
    assert_eq!(reply.code(), ReplyCode::Ok);

    // The request is finished and cleaned up; a straggler report is still
    // acknowledged and mutates nothing.
    assert!(report(&stack, "no-such-request", "bread").await);
    assert_eq!(stack.tracker.seen_count("no-such-request"), None);
    assert_eq!(stack.ledger.quantity("bread").await.unwrap(), Some(4));
}

#[tokio::test]
async fn empty_id_or_items_is_rejected_before_side_effects() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), WAIT).await;
    stack.ledger.set_quantity("bread", 5).await.unwrap();

    let no_id = submit(&stack, RequestKind::Fetch, "", &[("bread", 1)]).await;
    assert_eq!(no_id.code(), ReplyCode::BadRequest);
    assert_eq!(no_id.message, "Empty id or items");

    let no_items = submit(&stack, RequestKind::Fetch, "customer-6", &[]).await;
    assert_eq!(no_items.code(), ReplyCode::BadRequest);
    assert_eq!(no_items.message, "Empty id or items");

    assert_eq!(stack.ledger.quantity("bread").await.unwrap(), Some(5));
}

#[tokio::test]
async fn pricing_outage_does_not_fail_the_order() {
    let stack = stack(Arc::new(DownPriceSource), WAIT).await;
    stack.ledger.set_quantity("bread", 5).await.unwrap();
    spawn_population_except(&stack, None);

    let reply = submit(&stack, RequestKind::Fetch, "customer-7", &[("bread", 2)]).await;

    assert_eq!(reply.code(), ReplyCode::Ok);
    assert!(reply.message.contains("Pricing service unavailable"));
    // Fulfillment still happened.
    assert_eq!(stack.ledger.quantity("bread").await.unwrap(), Some(3));
}

#[tokio::test]
async fn work_order_on_the_bus_matches_the_submitted_order() {
    let stack = stack(Arc::new(TablePriceSource::with_defaults()), SHORT_WAIT).await;
    stack.ledger.set_quantity("bread", 5).await.unwrap();
    stack.ledger.set_quantity("milk", 5).await.unwrap();
    let mut sub = stack.bus.subscribe(&[Topic::Fetch]);

    // No workers: the order times out, but the dispatch is what we inspect.
    let reply = submit(
        &stack,
        RequestKind::Fetch,
        "customer-8",
        &[("milk", 2), ("bread", 1)],
    )
    .await;
    assert_eq!(reply.code(), ReplyCode::BadRequest);

    let order = codec::decode(&sub.recv().await.unwrap().payload).unwrap();
    assert_eq!(order.kind, RequestKind::Fetch);
    assert_eq!(order.served_id, "customer-8");
    let items: Vec<(&str, u32)> = order
        .items
        .iter()
        .map(|item| (item.name.as_str(), item.quantity))
        .collect();
    // Name order: deterministic dispatch payload.
    assert_eq!(items, vec![("bread", 1), ("milk", 2)]);
}
