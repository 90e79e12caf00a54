//! Service/method registration, accept loop, and per-connection dispatch
//! for meshrpc.

mod context;
mod dispatcher;
mod service;

pub use context::Context;
pub use dispatcher::Server;
pub use service::{Handler, Service, ServiceBuilder, TypedHandler};
