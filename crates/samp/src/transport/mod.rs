// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport adapter: one method-dispatch surface over both wire formats.
//!
//! The hub core sees "a method named *M* with SAMP-value arguments produced
//! result *R* or raised *E*" regardless of whether the wire was XML-RPC
//! (Standard Profile) or JSON frames (Web Profile). Inbound requests hit a
//! [`MethodMap`] populated at server construction; outbound callbacks go
//! through [`XmlRpcClient`] or a Web Profile pull queue.

pub mod json;
pub mod outbound;
pub mod xmlrpc;

pub use outbound::XmlRpcClient;

use crate::error::{HubError, HubResult};
use crate::value::SampValue;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Method prefix for inbound Standard Profile calls.
pub const HUB_PREFIX: &str = "samp.hub.";
/// Method prefix for inbound Web Profile calls.
pub const WEBHUB_PREFIX: &str = "samp.webhub.";
/// Method prefix for outbound callbacks.
pub const CLIENT_PREFIX: &str = "samp.client.";

/// Outbound callback method names.
pub const RECEIVE_NOTIFICATION: &str = "samp.client.receiveNotification";
pub const RECEIVE_CALL: &str = "samp.client.receiveCall";
pub const RECEIVE_RESPONSE: &str = "samp.client.receiveResponse";

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, I/O, or HTTP failure on an outbound call.
    #[error("transport failure: {0}")]
    Failed(String),

    /// The remote endpoint answered with a fault.
    #[error("remote fault {code}: {message}")]
    Remote { code: i32, message: String },

    /// The envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    Codec(String),

    /// No handler registered for the method.
    #[error("no such method: {0}")]
    UnknownMethod(String),
}

/// Profile-supplied evidence about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestCtx {
    /// Peer socket address, when the transport knows it.
    pub peer: Option<SocketAddr>,
    /// `Origin` header, Web Profile only.
    pub origin: Option<String>,
}

/// Boxed future returned by method handlers.
pub type MethodFuture = Pin<Box<dyn Future<Output = HubResult<SampValue>> + Send>>;

/// Handler for one inbound method.
pub trait MethodHandler: Send + Sync {
    fn call(&self, ctx: RequestCtx, params: Vec<SampValue>) -> MethodFuture;
}

/// Function-based handlers.
impl<F> MethodHandler for F
where
    F: Fn(RequestCtx, Vec<SampValue>) -> MethodFuture + Send + Sync,
{
    fn call(&self, ctx: RequestCtx, params: Vec<SampValue>) -> MethodFuture {
        self(ctx, params)
    }
}

/// Wrap an async closure as a boxed-future [`MethodHandler`].
pub fn handler<F, Fut>(f: F) -> Arc<dyn MethodHandler>
where
    F: Fn(RequestCtx, Vec<SampValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HubResult<SampValue>> + Send + 'static,
{
    Arc::new(move |ctx: RequestCtx, params: Vec<SampValue>| -> MethodFuture {
        Box::pin(f(ctx, params))
    })
}

/// Explicit dispatch table, populated at server construction.
#[derive(Default)]
pub struct MethodMap {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a fully-prefixed method name.
    pub fn insert(&mut self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Dispatch one call.
    pub async fn dispatch(
        &self,
        name: &str,
        ctx: RequestCtx,
        params: Vec<SampValue>,
    ) -> HubResult<SampValue> {
        match self.handlers.get(name) {
            Some(handler) => handler.call(ctx, params).await,
            None => Err(HubError::Transport(TransportError::UnknownMethod(
                name.to_string(),
            ))),
        }
    }

    /// Registered method names, for diagnostics.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// One outbound callback invocation, queued towards a recipient.
///
/// `params` excludes the recipient's private key; the Standard Profile
/// prepends it at POST time and the Web Profile omits it from pulled frames.
#[derive(Debug, Clone)]
pub struct Callback {
    pub method: String,
    pub params: Vec<SampValue>,
}

impl Callback {
    pub fn notification(sender_id: &str, message: SampValue) -> Self {
        Self {
            method: RECEIVE_NOTIFICATION.to_string(),
            params: vec![SampValue::string(sender_id), message],
        }
    }

    pub fn call(sender_id: &str, msg_id: &str, message: SampValue) -> Self {
        Self {
            method: RECEIVE_CALL.to_string(),
            params: vec![
                SampValue::string(sender_id),
                SampValue::string(msg_id),
                message,
            ],
        }
    }

    pub fn response(responder_id: &str, tag: &str, response: SampValue) -> Self {
        Self {
            method: RECEIVE_RESPONSE.to_string(),
            params: vec![
                SampValue::string(responder_id),
                SampValue::string(tag),
                response,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler() -> Arc<dyn MethodHandler> {
        Arc::new(|_ctx: RequestCtx, params: Vec<SampValue>| -> MethodFuture {
            Box::pin(async move { Ok(SampValue::List(params)) })
        })
    }

    #[tokio::test]
    async fn test_dispatch_known_method() {
        let mut map = MethodMap::new();
        map.insert("samp.hub.ping", ok_handler());

        let result = map
            .dispatch(
                "samp.hub.ping",
                RequestCtx::default(),
                vec![SampValue::string("x")],
            )
            .await
            .unwrap();
        assert_eq!(result, SampValue::List(vec![SampValue::string("x")]));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method_faults() {
        let map = MethodMap::new();
        let err = map
            .dispatch("samp.hub.nope", RequestCtx::default(), vec![])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TransportFailure");
    }

    #[test]
    fn test_callback_shapes() {
        let cb = Callback::call("c1", "mid:1:x", SampValue::Map(Default::default()));
        assert_eq!(cb.method, RECEIVE_CALL);
        assert_eq!(cb.params.len(), 3);
        assert_eq!(cb.params[0].as_str(), Some("c1"));
        assert_eq!(cb.params[1].as_str(), Some("mid:1:x"));
    }
}
