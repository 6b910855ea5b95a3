//! grocerd - order-fulfillment orchestrator
//!
//! Coordinates one customer/supplier order across a fixed population of
//! category workers: reserves stock transactionally, broadcasts a binary
//! work order, waits for a quorum of worker reports, and compensates the
//! reservation if the quorum never arrives.

pub mod analytics;
pub mod bus;
pub mod codec;
pub mod config;
pub mod ledger;
pub mod pricing;
pub mod services;
pub mod tracker;
pub mod utils;
pub mod worker;

pub mod proto {
    tonic::include_proto!("grocerd");
}
