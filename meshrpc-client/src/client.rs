//! Client core (spec §4.6), grounded on `original_source/client/client.go`.
//!
//! One persistent [`meshrpc_transport::Transport`] is kept per resolved
//! address (not a connection borrowed and returned per call) so requests
//! to the same instance can be pipelined: several calls may be in flight
//! on one transport at once, each tracked by request id in that
//! transport's [`PendingTable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshrpc_core::{
    split_service_method, Error, Header, JsonCodec, KnownCodec, LinkLayer, Message, MessageKind,
    MsgpackCodec, PayloadCodec, Result,
};
use meshrpc_registry::{Balancer, Registry};
use meshrpc_transport::{spawn_heartbeat, HeartbeatConfig, Pool, Transport};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{instrument, warn};

use crate::pending::PendingTable;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub heartbeat: HeartbeatConfig,
    /// Overall per-call timeout applied when a request's own
    /// `Header::timeout` is unset.
    pub default_timeout: Duration,
    /// Link-layer transform applied to every frame this client sends and
    /// receives (spec §4.3/§4.4/§6). Must match the peer's configuration.
    pub link: LinkLayer,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            heartbeat: HeartbeatConfig::default(),
            default_timeout: Duration::from_secs(30),
            link: LinkLayer::new(),
        }
    }
}

struct Connection {
    transport: Arc<Transport>,
    pending: PendingTable,
}

/// An in-flight asynchronous call, mirroring the Go original's `Call`
/// with `Done` replaced by a `oneshot` receiver.
pub struct CallHandle {
    rx: oneshot::Receiver<Result<Message>>,
}

impl CallHandle {
    pub async fn wait(self) -> Result<Message> {
        self.rx.await.map_err(|_| Error::Cancelled)?
    }
}

pub struct Client {
    registry: Arc<dyn Registry>,
    balancer: Arc<dyn Balancer>,
    pool: Arc<Pool>,
    config: ClientConfig,
    seq: AtomicU64,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl Client {
    pub fn new(registry: Arc<dyn Registry>, balancer: Arc<dyn Balancer>, config: ClientConfig) -> Self {
        let pool_config = meshrpc_transport::PoolConfig::default();
        let pool = Arc::new(Pool::new(pool_config, tcp_dial_factory(config.link.clone())));
        Client {
            registry,
            balancer,
            pool,
            config,
            seq: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `service_method` ("Service.Method") to an instance via the
    /// registry and balancer, then dispatch the request asynchronously.
    /// Use [`Client::call`] for the common request/await-reply case.
    #[instrument(skip(self, args))]
    pub async fn go<Req: Serialize>(
        &self,
        service_method: &str,
        args: &Req,
        codec: KnownCodec,
    ) -> Result<CallHandle> {
        let (service, method) = split_service_method(service_method);
        let instance = self
            .registry
            .select_instance(service, self.balancer.as_ref())
            .await?;
        let address = instance
            .endpoints
            .first()
            .ok_or_else(|| Error::InstanceNotFound(instance.id.clone()))?
            .clone();

        let body = match codec {
            KnownCodec::Json => JsonCodec.encode(args)?,
            KnownCodec::Msgpack => MsgpackCodec.encode(args)?,
            KnownCodec::Protobuf => {
                return Err(Error::UnsupportedCodec(
                    "use a dedicated protobuf call path".into(),
                ))
            }
        };

        let content_type = match codec {
            KnownCodec::Json => JsonCodec.content_type(),
            KnownCodec::Msgpack => MsgpackCodec.content_type(),
            KnownCodec::Protobuf => "application/x-protobuf",
        };

        let conn = self.connection_for(&address).await?;
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;

        let (tx, rx) = oneshot::channel();
        conn.pending.insert(id, tx);

        let header = Header::request(id, service, method)
            .with_codec(content_type)
            .with_timeout(self.config.default_timeout);
        let msg = Message::new(header, body);

        if let Err(e) = conn.transport.send(&msg).await {
            conn.pending.remove(id);
            return Err(e);
        }

        Ok(CallHandle { rx })
    }

    /// Synchronous call: send the request and await the decoded reply.
    pub async fn call<Req: Serialize, Reply: DeserializeOwned>(
        &self,
        service_method: &str,
        args: &Req,
    ) -> Result<Reply> {
        let handle = self.go(service_method, args, KnownCodec::Json).await?;
        let timeout = self.config.default_timeout;
        let response = tokio::time::timeout(timeout, handle.wait())
            .await
            .map_err(|_| Error::Timeout)??;

        if response.header.is_error() {
            return Err(Error::RemoteError(response.header.error.clone()));
        }
        JsonCodec.decode(&response.body)
    }

    async fn connection_for(&self, address: &str) -> Result<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(address) {
            return Ok(conn.clone());
        }

        let transport = self.pool.get(address).await?;
        spawn_heartbeat(transport.clone(), self.config.heartbeat);

        let conn = Arc::new(Connection {
            transport,
            pending: PendingTable::new(),
        });
        spawn_read_pump(conn.clone());

        connections.insert(address.to_string(), conn.clone());
        Ok(conn)
    }

    pub async fn close(&self) -> Result<()> {
        let mut connections = self.connections.lock().await;
        for (address, conn) in connections.drain() {
            conn.pending.fail_all(|| Error::TransportClosed);
            self.pool.put(&address, conn.transport.clone()).await;
        }
        self.pool.close().await
    }
}

fn tcp_dial_factory(link: LinkLayer) -> meshrpc_transport::BoxedFactory {
    Arc::new(move |address: String| {
        let link = link.clone();
        Box::pin(async move {
            let stream = TcpStream::connect(&address)
                .await
                .map_err(|e| Error::LinkFailure(e.to_string()))?;
            Transport::with_link(stream, link)
        })
    })
}

fn spawn_read_pump(conn: Arc<Connection>) {
    tokio::spawn(async move {
        loop {
            match conn.transport.receive().await {
                Ok(msg) => match msg.header.kind {
                    MessageKind::Heartbeat => conn.transport.observe_pong(),
                    MessageKind::Response => {
                        if let Some(tx) = conn.pending.remove(msg.header.id) {
                            let _ = tx.send(Ok(msg));
                        }
                    }
                    MessageKind::Request => {
                        warn!("client received a Request-kind message, ignoring");
                    }
                },
                Err(e) => {
                    let fatal = e.is_transport_fatal();
                    conn.pending.fail_all(|| Error::TransportClosed);
                    if fatal {
                        return;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrpc_registry::{InMemoryRegistry, RandomBalancer, Registry, ServiceInstance};
    use meshrpc_server::{Context as ServerContext, Server, ServiceBuilder, TypedHandler};
    use serde::{Deserialize, Serialize};
    use tokio::net::TcpListener;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Serialize, Deserialize)]
    struct Pong {
        n: u32,
    }

    async fn echo(_ctx: ServerContext, req: Ping) -> Result<Pong> {
        Ok(Pong { n: req.n + 1 })
    }

    #[tokio::test]
    async fn end_to_end_call_through_registry_and_balancer() {
        let server = Server::default();
        server.register(
            ServiceBuilder::new("Echo")
                .method("Ping", TypedHandler::new(echo))
                .build()
                .unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        let registry = InMemoryRegistry::new();
        registry
            .register(ServiceInstance::new("i1", "Echo", vec![addr.to_string()]))
            .await
            .unwrap();

        let client = Client::new(registry, Arc::new(RandomBalancer), ClientConfig::default());
        let reply: Pong = client.call("Echo.Ping", &Ping { n: 41 }).await.unwrap();
        assert_eq!(reply.n, 42);
    }

    #[tokio::test]
    async fn call_to_unregistered_service_is_service_not_found() {
        let registry = InMemoryRegistry::new();
        let client = Client::new(registry, Arc::new(RandomBalancer), ClientConfig::default());
        let err = client
            .call::<Ping, Pong>("Ghost.Ping", &Ping { n: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound(_)));
    }
}
