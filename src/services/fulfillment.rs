//! Fulfillment service: the per-order coordination state machine.
//!
//! One `submit_order` call drives a single order end to end:
//!
//! ```text
//! VALIDATE -> PERSIST_START -> (RESERVE_STOCK if fetch) -> DISPATCH
//!   -> AWAIT_WORKERS -> FINALIZE_SUCCESS | COMPENSATE_TIMEOUT
//!   -> PERSIST_END -> REPLY
//! ```
//!
//! Stock is reserved before dispatch and credited back if the worker quorum
//! never arrives, so work is never in flight without a matching inventory
//! accounting decision. Lifecycle persistence is best-effort on every path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analytics::LifecycleStore;
use crate::bus::{Topic, WorkBus};
use crate::codec::{self, CodecError, WorkItem, WorkOrder};
use crate::ledger::{Ledger, LedgerError};
use crate::pricing::{format_receipt, PriceSource};
use crate::proto::fulfillment_server::Fulfillment;
use crate::proto::{Ack, OrderReply, OrderRequest, ReplyCode, RequestKind, WorkerResult};
use crate::tracker::{ResponseTracker, TrackerError, WaitOutcome};

/// Reasons an order is rejected with BAD_REQUEST.
///
/// Everything else that can go wrong (lifecycle writes, pricing, restock
/// credit) is absorbed and logged rather than surfaced.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Empty id or items")]
    InvalidRequest,

    /// Insufficient stock or an inventory database failure; either way the
    /// request aborts before any work is dispatched.
    #[error(transparent)]
    Stock(#[from] LedgerError),

    #[error("Timed out waiting for all workers (request {request_id})")]
    WorkerTimeout { request_id: String },

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Encode(#[from] CodecError),
}

fn kind_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Fetch => "FETCH",
        RequestKind::Restock => "RESTOCK",
    }
}

fn topic_for(kind: RequestKind) -> Topic {
    match kind {
        RequestKind::Fetch => Topic::Fetch,
        RequestKind::Restock => Topic::Restock,
    }
}

/// Order-fulfillment orchestrator.
///
/// Owns one response tracker shared with the worker reporting endpoint;
/// every other collaborator is injected behind a trait.
pub struct FulfillmentService {
    ledger: Arc<dyn Ledger>,
    bus: Arc<dyn WorkBus>,
    tracker: Arc<ResponseTracker>,
    prices: Arc<dyn PriceSource>,
    lifecycle: Arc<dyn LifecycleStore>,
    /// Size of the fixed worker population; the quorum target.
    expected_workers: usize,
    /// How long AWAIT_WORKERS blocks before compensation kicks in.
    worker_wait: Duration,
}

impl FulfillmentService {
    /// Create a new fulfillment service.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        bus: Arc<dyn WorkBus>,
        tracker: Arc<ResponseTracker>,
        prices: Arc<dyn PriceSource>,
        lifecycle: Arc<dyn LifecycleStore>,
        expected_workers: usize,
        worker_wait: Duration,
    ) -> Self {
        Self {
            ledger,
            bus,
            tracker,
            prices,
            lifecycle,
            expected_workers,
            worker_wait,
        }
    }

    /// Run one order through the state machine.
    async fn process(&self, order: OrderRequest) -> Result<String, OrderError> {
        // VALIDATE: terminal, no side effects.
        if order.id.is_empty() || order.items.is_empty() {
            return Err(OrderError::InvalidRequest);
        }

        let kind = order.request_kind();
        let served_id = order.id;
        // Name-ordered so the first deficient item is deterministic.
        let items: BTreeMap<String, u32> = order.items.into_iter().collect();

        let request_id = Uuid::new_v4().to_string();
        let started = Utc::now();

        info!(
            request_id = %request_id,
            served_id = %served_id,
            kind = kind_label(kind),
            items = ?items,
            "Order received"
        );

        // PERSIST_START: best-effort.
        if let Err(e) = self
            .lifecycle
            .record_start(&request_id, &served_id, kind_label(kind), started)
            .await
        {
            warn!(request_id = %request_id, error = %e, "Failed to record lifecycle start");
        }

        // RESERVE_STOCK: fetch orders deduct up front, all-or-nothing.
        // Restock adds stock only after the workers have actually shelved it.
        if kind == RequestKind::Fetch {
            self.ledger.reserve(&items).await?;
        }

        // DISPATCH + AWAIT_WORKERS.
        let waited = match self
            .dispatch_and_wait(&request_id, kind, &served_id, &items)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release_reservation(kind, &request_id, &items).await;
                self.tracker.cleanup(&request_id);
                return Err(e);
            }
        };

        let result = match waited {
            WaitOutcome::Complete => {
                let note = self.finalize(kind, &request_id, &items).await;
                Ok(format!(
                    "OK: received all worker replies for {request_id}{note}"
                ))
            }
            WaitOutcome::TimedOut => {
                // COMPENSATE_TIMEOUT: the credit completes before the reply
                // returns, so the caller never sees stock held by a request
                // that is no longer in flight.
                self.release_reservation(kind, &request_id, &items).await;
                Err(OrderError::WorkerTimeout {
                    request_id: request_id.clone(),
                })
            }
        };

        self.tracker.cleanup(&request_id);

        // PERSIST_END: best-effort, both outcomes.
        let ended = Utc::now();
        let duration_ms = (ended - started).num_milliseconds();
        if let Err(e) = self.lifecycle.record_end(&request_id, ended, duration_ms).await {
            warn!(request_id = %request_id, error = %e, "Failed to record lifecycle end");
        }

        result
    }

    /// Register the quorum entry, broadcast the work order once, and wait
    /// for the gate or the deadline.
    async fn dispatch_and_wait(
        &self,
        request_id: &str,
        kind: RequestKind,
        served_id: &str,
        items: &BTreeMap<String, u32>,
    ) -> Result<WaitOutcome, OrderError> {
        self.tracker.register(request_id, self.expected_workers)?;

        let order = WorkOrder {
            request_id: request_id.to_string(),
            kind,
            served_id: served_id.to_string(),
            items: items
                .iter()
                .map(|(name, &quantity)| WorkItem {
                    name: name.clone(),
                    quantity,
                })
                .collect(),
        };
        let payload = codec::encode(&order)?;

        let topic = topic_for(kind);
        // Fire-and-forget: a failed broadcast is not retried, it simply
        // surfaces as a quorum timeout.
        if let Err(e) = self.bus.publish(topic, payload).await {
            error!(request_id = %request_id, error = %e, "Work order broadcast failed");
        } else {
            info!(request_id = %request_id, topic = %topic, "Work order published");
        }

        Ok(self.tracker.wait(request_id, self.worker_wait).await?)
    }

    /// Credit a fetch reservation back. No-op for restock.
    async fn release_reservation(
        &self,
        kind: RequestKind,
        request_id: &str,
        items: &BTreeMap<String, u32>,
    ) {
        if kind != RequestKind::Fetch {
            return;
        }
        if let Err(e) = self.ledger.credit(items).await {
            error!(request_id = %request_id, error = %e, "Failed to roll back reservation");
        }
    }

    /// FINALIZE_SUCCESS: apply restock credit or fetch pricing. Returns the
    /// note appended to the OK reply.
    async fn finalize(
        &self,
        kind: RequestKind,
        request_id: &str,
        items: &BTreeMap<String, u32>,
    ) -> String {
        match kind {
            RequestKind::Restock => {
                // Physical work is already done; a failed credit is logged,
                // not surfaced.
                if let Err(e) = self.ledger.credit(items).await {
                    warn!(request_id = %request_id, error = %e, "Failed to add restock inventory");
                }
                String::new()
            }
            RequestKind::Fetch => match self.prices.quote(items).await {
                Ok(reply) => {
                    info!(request_id = %request_id, total = reply.total, "Pricing received");
                    format_receipt(&reply)
                }
                Err(e) => {
                    warn!(request_id = %request_id, error = %e, "Pricing unavailable");
                    format!("\nPricing service unavailable: {e}")
                }
            },
        }
    }
}

#[tonic::async_trait]
impl Fulfillment for FulfillmentService {
    async fn submit_order(
        &self,
        request: Request<OrderRequest>,
    ) -> Result<Response<OrderReply>, Status> {
        let order = request.into_inner();

        let reply = match self.process(order).await {
            Ok(message) => OrderReply {
                code: ReplyCode::Ok as i32,
                message,
            },
            Err(e) => {
                warn!(error = %e, "Order rejected");
                OrderReply {
                    code: ReplyCode::BadRequest as i32,
                    message: e.to_string(),
                }
            }
        };

        Ok(Response::new(reply))
    }

    async fn report_worker_result(
        &self,
        request: Request<WorkerResult>,
    ) -> Result<Response<Ack>, Status> {
        let result = request.into_inner();

        info!(
            request_id = %result.request_id,
            worker = %result.worker_name,
            served_id = %result.served_id,
            status = ?result.status(),
            message = %result.message,
            "Worker result"
        );

        // Reports for unknown or already-finished requests are dropped
        // inside the tracker; workers never retry and never branch on the
        // acknowledgement, so this always acks.
        self.tracker.report(&result.request_id, &result.worker_name);

        Ok(Response::new(Ack {
            ok: true,
            message: "ack".to_string(),
        }))
    }
}
