//! Request/response correlation, pool and balancer wiring, and the
//! public call API for meshrpc.

mod builder;
mod client;
mod pending;

pub use builder::ClientBuilder;
pub use client::{CallHandle, Client, ClientConfig};
