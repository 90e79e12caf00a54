//! Service and method registration (spec §4.7, §9 Design Note).
//!
//! The original reflection-based registration (any method with the right
//! receiver/arg/reply shape is picked up automatically) has no idiomatic
//! Rust equivalent; instead handlers are registered explicitly as trait
//! objects. [`TypedHandler`] lets a plain async function be registered
//! without writing the trait impl by hand, so hand-written handlers
//! remain possible without codegen.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use meshrpc_core::{codec_for_content_type, Error, JsonCodec, KnownCodec, MsgpackCodec, PayloadCodec, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::context::Context;

/// A registered method, erased over its concrete request/reply types.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &Context, content_type: &str, body: Bytes) -> Result<Bytes>;
}

/// Adapts `async fn(Context, Req) -> Result<Reply>` into a [`Handler`].
/// Protobuf-coded calls are rejected with
/// [`Error::InvalidProtobufMessage`] since `Req`/`Reply` here are bound by
/// `Serialize`/`DeserializeOwned`, not `prost::Message`; register a
/// dedicated handler for protobuf methods instead.
pub struct TypedHandler<F, Req, Reply> {
    func: F,
    _marker: PhantomData<fn(Req) -> Reply>,
}

impl<F, Req, Reply, Fut> TypedHandler<F, Req, Reply>
where
    F: Fn(Context, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply>> + Send,
    Req: DeserializeOwned + Send,
    Reply: Serialize + Send,
{
    pub fn new(func: F) -> Self {
        TypedHandler {
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Req, Reply, Fut> Handler for TypedHandler<F, Req, Reply>
where
    F: Fn(Context, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply>> + Send,
    Req: DeserializeOwned + Send,
    Reply: Serialize + Send,
{
    async fn call(&self, ctx: &Context, content_type: &str, body: Bytes) -> Result<Bytes> {
        match codec_for_content_type(content_type) {
            KnownCodec::Json => {
                let req: Req = JsonCodec.decode(&body)?;
                let reply = (self.func)(ctx.clone(), req).await?;
                JsonCodec.encode(&reply)
            }
            KnownCodec::Msgpack => {
                let req: Req = MsgpackCodec.decode(&body)?;
                let reply = (self.func)(ctx.clone(), req).await?;
                MsgpackCodec.encode(&reply)
            }
            KnownCodec::Protobuf => Err(Error::InvalidProtobufMessage),
        }
    }
}

/// A named group of methods, analogous to the Go original's reflected
/// `Service`.
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<dyn Handler>>,
}

pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, Arc<dyn Handler>>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn method(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Service> {
        if self.methods.is_empty() {
            return Err(Error::NoAvailableMethods);
        }
        Ok(Service {
            name: self.name,
            methods: self.methods,
        })
    }
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.methods.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Serialize, Deserialize)]
    struct Pong {
        n: u32,
    }

    async fn echo(_ctx: Context, req: Ping) -> Result<Pong> {
        Ok(Pong { n: req.n })
    }

    #[test]
    fn empty_service_is_no_available_methods() {
        let err = ServiceBuilder::new("Echo").build().unwrap_err();
        assert!(matches!(err, Error::NoAvailableMethods));
    }

    #[tokio::test]
    async fn typed_handler_round_trips_json() {
        let service = ServiceBuilder::new("Echo")
            .method("Ping", TypedHandler::new(echo))
            .build()
            .unwrap();

        let handler = service.method("Ping").unwrap();
        let body = JsonCodec.encode(&Ping { n: 5 }).unwrap();
        let reply_bytes = handler
            .call(&Context::no_deadline(), "application/json", body)
            .await
            .unwrap();
        let reply: Pong = JsonCodec.decode(&reply_bytes).unwrap();
        assert_eq!(reply.n, 5);
    }

    #[tokio::test]
    async fn unknown_method_lookup_returns_none() {
        let service = ServiceBuilder::new("Echo")
            .method("Ping", TypedHandler::new(echo))
            .build()
            .unwrap();
        assert!(service.method("Pong").is_none());
    }
}
