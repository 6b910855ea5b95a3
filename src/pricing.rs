//! Pricing collaborator client.
//!
//! The pricing service is external; grocerd only consumes its documented
//! `GetPrice` contract, and only after worker completion for fetch orders.
//! Pricing failure never fails the order: the caller appends an
//! unavailability note instead.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::proto::pricing_client::PricingClient;
use crate::proto::{PriceReply, PriceRequest, ReplyCode};

/// Result type for pricing operations.
pub type Result<T> = std::result::Result<T, PricingError>;

/// Errors that can occur while fetching a quote.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("pricing connection failed: {0}")]
    Connection(String),

    #[error("pricing rejected the request: {0}")]
    Rejected(String),

    #[error("pricing call failed: {0}")]
    Grpc(#[from] tonic::Status),
}

/// Source of itemized quotes for an order.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Quote the given item map. A missing price on the pricing side
    /// resolves to 0.00 per the contract; only transport or explicit
    /// rejection surfaces as an error.
    async fn quote(&self, items: &BTreeMap<String, u32>) -> Result<PriceReply>;
}

/// gRPC client for the external pricing service.
///
/// Connects per call; pricing sits off the hot path and a standing
/// connection is not worth managing.
pub struct GrpcPriceSource {
    address: String,
}

impl GrpcPriceSource {
    /// Create a price source for the pricing service at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    async fn connect(&self) -> Result<Channel> {
        Channel::from_shared(format!("http://{}", self.address))
            .map_err(|e| PricingError::Connection(format!("invalid address: {e}")))?
            .connect()
            .await
            .map_err(|e| PricingError::Connection(format!("connection failed: {e}")))
    }
}

#[async_trait]
impl PriceSource for GrpcPriceSource {
    async fn quote(&self, items: &BTreeMap<String, u32>) -> Result<PriceReply> {
        let channel = self.connect().await?;
        let mut client = PricingClient::new(channel);

        let request = PriceRequest {
            items: items.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        };

        let reply = client.get_price(request).await?.into_inner();
        if reply.code() != ReplyCode::Ok {
            return Err(PricingError::Rejected(reply.message));
        }
        Ok(reply)
    }
}

/// Render a successful quote as the itemized bill appended to the reply.
pub fn format_receipt(reply: &PriceReply) -> String {
    let mut receipt = String::from("\n\nITEMIZED BILL:\n");
    for line in &reply.item_prices {
        receipt.push_str(&format!(
            "  {}: {} x ${:.2} = ${:.2}\n",
            line.name, line.quantity, line.unit_price, line.subtotal
        ));
    }
    receipt.push_str(&format!("TOTAL: ${:.2}", reply.total));
    receipt
}
