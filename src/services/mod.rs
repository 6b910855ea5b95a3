//! gRPC service implementations.

pub mod fulfillment;

pub use fulfillment::{FulfillmentService, OrderError};
