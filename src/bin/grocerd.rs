//! grocerd: standalone order-fulfillment orchestrator.
//!
//! Serves the Fulfillment gRPC surface with the category workers embedded
//! in-process on the channel bus. The pricing collaborator is external and
//! reached over gRPC.

use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Server;
use tracing::{error, info};

use grocerd::analytics::SqliteLifecycleStore;
use grocerd::bus::{ChannelWorkBus, Topic};
use grocerd::config::Config;
use grocerd::ledger::SqliteLedger;
use grocerd::pricing::GrpcPriceSource;
use grocerd::proto::fulfillment_server::FulfillmentServer;
use grocerd::services::FulfillmentService;
use grocerd::tracker::ResponseTracker;
use grocerd::worker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    grocerd::utils::bootstrap::init_tracing();

    let config_path = grocerd::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting grocerd orchestrator");

    if let Some(parent) = std::path::Path::new(&config.storage.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool =
        sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.storage.path)).await?;

    let ledger = Arc::new(SqliteLedger::new(pool.clone()));
    ledger.init().await?;
    let lifecycle = Arc::new(SqliteLifecycleStore::new(pool));
    lifecycle.init().await?;
    info!("Storage initialized at {}", config.storage.path);

    let bus = Arc::new(ChannelWorkBus::new());
    let tracker = Arc::new(ResponseTracker::new());
    let prices = Arc::new(GrpcPriceSource::new(config.pricing.address.clone()));

    let service = Arc::new(FulfillmentService::new(
        ledger,
        bus.clone(),
        tracker,
        prices,
        lifecycle,
        config.workers.names.len(),
        Duration::from_secs(config.workers.wait_secs),
    ));

    // Standalone mode: the worker population runs in-process, subscribed to
    // both topics like any external worker would be.
    for category_worker in worker::default_population() {
        let subscription = bus.subscribe(&[Topic::Fetch, Topic::Restock]);
        worker::spawn(category_worker, subscription, service.clone());
    }
    info!(
        workers = config.workers.names.len(),
        pricing = %config.pricing.address,
        "Worker population started"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "Fulfillment gRPC listening");

    Server::builder()
        .add_service(FulfillmentServer::from_arc(service))
        .serve(addr)
        .await?;

    Ok(())
}
