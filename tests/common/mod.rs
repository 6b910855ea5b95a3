//! Shared fixtures: an in-memory stack (sqlite ledger + channel bus +
//! tracker + mock pricing) wired into a FulfillmentService.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use tonic::Request;

use grocerd::analytics::SqliteLifecycleStore;
use grocerd::bus::{ChannelWorkBus, Topic};
use grocerd::ledger::SqliteLedger;
use grocerd::pricing::{PriceSource, PricingError};
use grocerd::proto::fulfillment_server::Fulfillment;
use grocerd::proto::{
    ItemPrice, OrderReply, OrderRequest, PriceReply, ReplyCode, RequestKind, WorkerResult,
    WorkerStatus,
};
use grocerd::services::FulfillmentService;
use grocerd::tracker::ResponseTracker;
use grocerd::worker;

/// Price table mock: unit prices by name, missing names resolve to 0.00.
pub struct TablePriceSource {
    prices: HashMap<&'static str, f64>,
}

impl TablePriceSource {
    pub fn with_defaults() -> Self {
        Self {
            prices: HashMap::from([
                ("bread", 3.5),
                ("milk", 2.25),
                ("eggs", 4.0),
                ("beef", 8.0),
            ]),
        }
    }
}

#[async_trait]
impl PriceSource for TablePriceSource {
    async fn quote(
        &self,
        items: &BTreeMap<String, u32>,
    ) -> Result<PriceReply, PricingError> {
        let mut item_prices = Vec::new();
        let mut total = 0.0;
        for (name, &quantity) in items {
            let unit_price = *self.prices.get(name.as_str()).unwrap_or(&0.0);
            let subtotal = unit_price * f64::from(quantity);
            total += subtotal;
            item_prices.push(ItemPrice {
                name: name.clone(),
                quantity,
                unit_price,
                subtotal,
            });
        }
        Ok(PriceReply {
            code: ReplyCode::Ok as i32,
            message: format!("Price calculated for {} items", items.len()),
            item_prices,
            total,
        })
    }
}

/// Pricing mock that is always unreachable.
pub struct DownPriceSource;

#[async_trait]
impl PriceSource for DownPriceSource {
    async fn quote(
        &self,
        _items: &BTreeMap<String, u32>,
    ) -> Result<PriceReply, PricingError> {
        Err(PricingError::Connection("connection refused".to_string()))
    }
}

pub struct Stack {
    pub service: Arc<FulfillmentService>,
    pub ledger: Arc<SqliteLedger>,
    pub lifecycle: Arc<SqliteLifecycleStore>,
    pub bus: Arc<ChannelWorkBus>,
    pub tracker: Arc<ResponseTracker>,
}

/// Build a stack with the reference five-worker quorum and the given
/// price source and worker-wait budget.
pub async fn stack(prices: Arc<dyn PriceSource>, worker_wait: Duration) -> Stack {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let ledger = Arc::new(SqliteLedger::new(pool.clone()));
    ledger.init().await.unwrap();
    let lifecycle = Arc::new(SqliteLifecycleStore::new(pool));
    lifecycle.init().await.unwrap();

    let bus = Arc::new(ChannelWorkBus::new());
    let tracker = Arc::new(ResponseTracker::new());

    let service = Arc::new(FulfillmentService::new(
        ledger.clone(),
        bus.clone(),
        tracker.clone(),
        prices,
        lifecycle.clone(),
        5,
        worker_wait,
    ));

    Stack {
        service,
        ledger,
        lifecycle,
        bus,
        tracker,
    }
}

/// Spawn the reference worker population, optionally leaving one out.
pub fn spawn_population_except(stack: &Stack, skip: Option<&str>) {
    for category_worker in worker::default_population() {
        if skip == Some(category_worker.name.as_str()) {
            continue;
        }
        let subscription = stack.bus.subscribe(&[Topic::Fetch, Topic::Restock]);
        worker::spawn(category_worker, subscription, stack.service.clone());
    }
}

/// Submit an order and return the unwrapped reply.
pub async fn submit(
    stack: &Stack,
    kind: RequestKind,
    id: &str,
    items: &[(&str, u32)],
) -> OrderReply {
    let request = OrderRequest {
        request_kind: kind as i32,
        id: id.to_string(),
        items: items.iter().map(|(n, q)| (n.to_string(), *q)).collect(),
    };
    stack
        .service
        .submit_order(Request::new(request))
        .await
        .unwrap()
        .into_inner()
}

/// Report one worker result directly through the reporting endpoint.
pub async fn report(stack: &Stack, request_id: &str, worker_name: &str) -> bool {
    let result = WorkerResult {
        request_id: request_id.to_string(),
        served_id: "test".to_string(),
        worker_name: worker_name.to_string(),
        status: WorkerStatus::WorkerOk as i32,
        message: String::new(),
    };
    stack
        .service
        .report_worker_result(Request::new(result))
        .await
        .unwrap()
        .into_inner()
        .ok
}
