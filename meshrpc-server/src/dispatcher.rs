//! Accept loop and per-connection dispatch (spec §4.7), grounded on
//! `original_source/server/server.go`'s `handleRequest`/`processRequest`
//! pair — one task per connection, one task per in-flight request.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use meshrpc_core::{Error, Header, LinkLayer, Message, MessageKind, Result};
use meshrpc_transport::{spawn_heartbeat, HeartbeatConfig, Transport};
use tokio::net::TcpListener;
use tracing::{error, instrument, warn};

use crate::context::Context;
use crate::service::Service;

/// Holds registered services and drives the TCP accept loop. Cheap to
/// clone (an `Arc` inside) so it can be shared across connection tasks.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    services: RwLock<HashMap<String, Service>>,
    heartbeat: HeartbeatConfig,
    link: LinkLayer,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(HeartbeatConfig::default())
    }
}

impl Server {
    pub fn new(heartbeat: HeartbeatConfig) -> Self {
        Self::with_link(heartbeat, LinkLayer::new())
    }

    /// Construct a server whose accepted connections run every frame
    /// through `link` on send/receive (spec §4.3/§4.4/§6).
    pub fn with_link(heartbeat: HeartbeatConfig, link: LinkLayer) -> Self {
        Server {
            inner: Arc::new(Inner {
                services: RwLock::new(HashMap::new()),
                heartbeat,
                link,
            }),
        }
    }

    pub fn register(&self, service: Service) {
        self.inner
            .services
            .write()
            .unwrap()
            .insert(service.name().to_string(), service);
    }

    /// Accept connections on `listener` until it errors. Each accepted
    /// connection is dispatched on its own task; `serve` itself never
    /// returns on a healthy listener.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| Error::LinkFailure(e.to_string()))?;
            let transport = Arc::new(Transport::with_link(stream, self.inner.link.clone())?);
            spawn_heartbeat(transport.clone(), self.inner.heartbeat);

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(transport).await {
                    warn!(%peer, error = %e, "connection loop ended");
                }
            });
        }
    }

    async fn handle_connection(&self, transport: Arc<Transport>) -> Result<()> {
        loop {
            let msg = match transport.receive().await {
                Ok(msg) => msg,
                Err(Error::TransportClosed) => return Ok(()),
                Err(e) => return Err(e),
            };

            match msg.header.kind {
                MessageKind::Heartbeat => {
                    transport.observe_pong();
                }
                MessageKind::Request => {
                    let server = self.clone();
                    let transport = transport.clone();
                    tokio::spawn(async move {
                        server.process_request(msg, transport).await;
                    });
                }
                MessageKind::Response => {
                    warn!("server received a Response-kind message, ignoring");
                }
            }
        }
    }

    #[instrument(skip(self, msg, transport), fields(service = %msg.header.service, method = %msg.header.method))]
    async fn process_request(&self, msg: Message, transport: Arc<Transport>) {
        let request_id = msg.header.id;
        let reply_body = self.dispatch(&msg.header, msg.body).await;

        let response_header = match &reply_body {
            Ok(_) => Header::response(request_id),
            Err(e) => Header::response(request_id).with_error(e.to_string()),
        };
        let body = reply_body.unwrap_or_default();

        if let Err(e) = transport.send(&Message::new(response_header, body)).await {
            error!(error = %e, "failed to send response");
        }
    }

    async fn dispatch(&self, header: &Header, body: bytes::Bytes) -> Result<bytes::Bytes> {
        let ctx = Context::new(header.timeout);
        ctx.check()?;

        let services = self.inner.services.read().unwrap();
        let service = services
            .get(&header.service)
            .ok_or_else(|| Error::ServiceNotFound(header.service.clone()))?;
        let handler = service
            .method(&header.method)
            .ok_or_else(|| Error::MethodNotFound(header.method.clone()))?
            .clone();
        drop(services);

        handler.call(&ctx, &header.codec, body).await
    }
}
