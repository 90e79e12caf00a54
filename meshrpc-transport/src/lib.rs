//! Framed TCP transport endpoint, heartbeat liveness, and connection
//! pooling for meshrpc.

mod endpoint;
mod pool;

pub use endpoint::{spawn_heartbeat, HeartbeatConfig, HeartbeatState, Transport};
pub use pool::{BoxedFactory, Pool, PoolConfig};
