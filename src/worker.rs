//! In-process category workers for standalone mode and tests.
//!
//! Each worker owns a disjoint set of item names, subscribes to both topics,
//! and reports exactly once per work order it observes: OK when it handled
//! at least one relevant item, NOOP otherwise. Quorum upstream counts one
//! report per worker regardless of relevance.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tonic::Request;
use tracing::{info, warn};

use crate::bus::WorkSubscriber;
use crate::codec;
use crate::proto::fulfillment_server::Fulfillment;
use crate::proto::{WorkerResult, WorkerStatus};
use crate::services::FulfillmentService;

/// A worker identity: its name and the item names it is responsible for.
pub struct CategoryWorker {
    pub name: String,
    pub items: HashSet<String>,
}

impl CategoryWorker {
    /// Create a worker for the given category.
    pub fn new(name: &str, items: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The reference five-worker population and its item ownership.
pub fn default_population() -> Vec<CategoryWorker> {
    vec![
        CategoryWorker::new("bread", &["bread"]),
        CategoryWorker::new("dairy", &["milk", "eggs"]),
        CategoryWorker::new("meat", &["chicken", "beef"]),
        CategoryWorker::new("produce", &["apples", "bananas"]),
        CategoryWorker::new("party", &["soda", "napkins"]),
    ]
}

/// Run a worker on its bus subscription, reporting through the fulfillment
/// service until the bus closes.
pub fn spawn(
    worker: CategoryWorker,
    mut subscription: WorkSubscriber,
    service: Arc<FulfillmentService>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            let order = match codec::decode(&message.payload) {
                Ok(order) => order,
                Err(e) => {
                    warn!(worker = %worker.name, error = %e, "Undecodable work order, skipping");
                    continue;
                }
            };

            let relevant: Vec<&str> = order
                .items
                .iter()
                .filter(|item| worker.items.contains(&item.name))
                .map(|item| item.name.as_str())
                .collect();

            let (status, note) = if relevant.is_empty() {
                (
                    WorkerStatus::WorkerNoop,
                    format!("NOOP for topic={}", message.topic),
                )
            } else {
                info!(worker = %worker.name, request_id = %order.request_id, items = ?relevant, "Handling work order");
                (
                    WorkerStatus::WorkerOk,
                    format!("OK handled {relevant:?} topic={}", message.topic),
                )
            };

            let result = WorkerResult {
                request_id: order.request_id.clone(),
                served_id: order.served_id.clone(),
                worker_name: worker.name.clone(),
                status: status as i32,
                message: note,
            };

            if let Err(e) = service.report_worker_result(Request::new(result)).await {
                warn!(worker = %worker.name, error = %e, "Failed to report result");
            }
        }
    })
}
