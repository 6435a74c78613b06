// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client runtime: the registration and messaging API applications use.
//!
//! A [`HubConnection`] discovers the hub through the Standard Profile
//! lockfile, registers, and wraps every hub method. Applications that want
//! to receive messages implement [`CallableClient`] and call
//! [`HubConnection::serve_callable`], which publishes a loopback callback
//! endpoint and declares it to the hub.

use crate::error::HubError;
use crate::lockfile::{self, HubLocation, LockInfo, LockfileError};
use crate::transport::{
    xmlrpc, TransportError, XmlRpcClient, HUB_PREFIX, RECEIVE_CALL, RECEIVE_NOTIFICATION,
    RECEIVE_RESPONSE,
};
use crate::value::{SampMap, SampValue};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected hub answer: {0}")]
    Protocol(String),

    #[error("callback server bind error: {0}")]
    Bind(String),
}

/// Receiver side of a callable client. Implementations must be quick;
/// anything slow (including replying to a call) belongs on a spawned task.
pub trait CallableClient: Send + Sync {
    fn receive_notification(&self, _sender_id: &str, _message: &SampMap) {}

    /// A tracked call. The application must eventually answer with
    /// [`HubConnection::reply`] quoting `msg_id`.
    fn receive_call(&self, _sender_id: &str, _msg_id: &str, _message: &SampMap) {}

    fn receive_response(&self, _responder_id: &str, _tag: &str, _response: &SampMap) {}
}

#[derive(Debug)]
struct ConnInner {
    rpc: XmlRpcClient,
    hub_url: String,
    hub_id: String,
    self_id: String,
    private_key: String,
}

/// A registered connection to a hub over the Standard Profile.
#[derive(Clone, Debug)]
pub struct HubConnection {
    inner: Arc<ConnInner>,
}

impl HubConnection {
    /// Discover the hub (environment, then `override_path`, then
    /// `$HOME/.samp`), validate the lock info, and register.
    pub async fn connect(override_path: Option<&Path>) -> Result<Self, ClientError> {
        let info = match lockfile::resolve_location(override_path)? {
            HubLocation::Path(path) => LockInfo::read(&path)?,
            HubLocation::Url(url) => {
                let text = reqwest::get(&url)
                    .await
                    .map_err(|e| TransportError::Failed(e.to_string()))?
                    .text()
                    .await
                    .map_err(|e| TransportError::Failed(e.to_string()))?;
                LockInfo::parse(&text)
            }
        };
        info.check()?;
        let url = info
            .xmlrpc_url()
            .ok_or(LockfileError::IncompleteLockInfo(lockfile::KEY_XMLRPC_URL))?
            .to_string();
        let secret = info
            .secret()
            .ok_or(LockfileError::IncompleteLockInfo(lockfile::KEY_SECRET))?
            .to_string();
        Self::connect_to(&url, &secret).await
    }

    /// Register against a known endpoint and secret.
    pub async fn connect_to(hub_url: &str, secret: &str) -> Result<Self, ClientError> {
        let rpc = XmlRpcClient::new(Duration::from_secs(10))?;
        let result = rpc
            .call(
                hub_url,
                &format!("{}register", HUB_PREFIX),
                &[SampValue::string(secret)],
            )
            .await?;
        let map = result
            .as_map()
            .ok_or_else(|| ClientError::Protocol("register result is not a mapping".into()))?;
        let field = |key: &str| -> Result<String, ClientError> {
            map.get_str(key)
                .map(str::to_string)
                .ok_or_else(|| ClientError::Protocol(format!("register result lacks {}", key)))
        };
        let conn = Self {
            inner: Arc::new(ConnInner {
                rpc,
                hub_url: hub_url.to_string(),
                hub_id: field("samp.hub-id")?,
                self_id: field("samp.self-id")?,
                private_key: field("samp.private-key")?,
            }),
        };
        debug!(id = %conn.self_id(), "registered with hub");
        Ok(conn)
    }

    pub fn self_id(&self) -> &str {
        &self.inner.self_id
    }

    pub fn hub_id(&self) -> &str {
        &self.inner.hub_id
    }

    async fn call_hub(&self, method: &str, params: Vec<SampValue>) -> Result<SampValue, ClientError> {
        let name = format!("{}{}", HUB_PREFIX, method);
        Ok(self.inner.rpc.call(&self.inner.hub_url, &name, &params).await?)
    }

    fn keyed(&self, rest: Vec<SampValue>) -> Vec<SampValue> {
        let mut params = vec![SampValue::string(&self.inner.private_key)];
        params.extend(rest);
        params
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call_hub("ping", Vec::new()).await?;
        Ok(())
    }

    pub async fn declare_metadata(&self, metadata: SampMap) -> Result<(), ClientError> {
        self.call_hub(
            "declareMetadata",
            self.keyed(vec![SampValue::Map(metadata)]),
        )
        .await?;
        Ok(())
    }

    pub async fn declare_subscriptions(&self, subs: SampValue) -> Result<(), ClientError> {
        self.call_hub("declareSubscriptions", self.keyed(vec![subs]))
            .await?;
        Ok(())
    }

    pub async fn get_metadata(&self, target: &str) -> Result<SampMap, ClientError> {
        let value = self
            .call_hub("getMetadata", self.keyed(vec![SampValue::string(target)]))
            .await?;
        value
            .as_map()
            .cloned()
            .ok_or_else(|| ClientError::Protocol("metadata is not a mapping".into()))
    }

    pub async fn get_subscriptions(&self, target: &str) -> Result<SampMap, ClientError> {
        let value = self
            .call_hub(
                "getSubscriptions",
                self.keyed(vec![SampValue::string(target)]),
            )
            .await?;
        value
            .as_map()
            .cloned()
            .ok_or_else(|| ClientError::Protocol("subscriptions are not a mapping".into()))
    }

    pub async fn get_registered_clients(&self) -> Result<Vec<String>, ClientError> {
        let value = self
            .call_hub("getRegisteredClients", self.keyed(Vec::new()))
            .await?;
        let items = value
            .as_list()
            .ok_or_else(|| ClientError::Protocol("client list is not a list".into()))?;
        Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    pub async fn get_subscribed_clients(&self, mtype: &str) -> Result<SampMap, ClientError> {
        let value = self
            .call_hub(
                "getSubscribedClients",
                self.keyed(vec![SampValue::string(mtype)]),
            )
            .await?;
        value
            .as_map()
            .cloned()
            .ok_or_else(|| ClientError::Protocol("subscriber map is not a mapping".into()))
    }

    pub async fn notify(&self, recipient: &str, message: SampValue) -> Result<(), ClientError> {
        self.call_hub(
            "notify",
            self.keyed(vec![SampValue::string(recipient), message]),
        )
        .await?;
        Ok(())
    }

    pub async fn notify_all(&self, message: SampValue) -> Result<Vec<String>, ClientError> {
        let value = self.call_hub("notifyAll", self.keyed(vec![message])).await?;
        let items = value
            .as_list()
            .ok_or_else(|| ClientError::Protocol("recipient list is not a list".into()))?;
        Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    /// Returns the hub-minted message id.
    pub async fn call(
        &self,
        recipient: &str,
        tag: &str,
        message: SampValue,
    ) -> Result<String, ClientError> {
        let value = self
            .call_hub(
                "call",
                self.keyed(vec![
                    SampValue::string(recipient),
                    SampValue::string(tag),
                    message,
                ]),
            )
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Protocol("message id is not a string".into()))
    }

    pub async fn call_all(&self, tag: &str, message: SampValue) -> Result<SampMap, ClientError> {
        let value = self
            .call_hub("callAll", self.keyed(vec![SampValue::string(tag), message]))
            .await?;
        value
            .as_map()
            .cloned()
            .ok_or_else(|| ClientError::Protocol("message id map is not a mapping".into()))
    }

    /// Returns the response mapping (synthetic `samp.error` on timeout).
    pub async fn call_and_wait(
        &self,
        recipient: &str,
        message: SampValue,
        timeout_secs: i64,
    ) -> Result<SampMap, ClientError> {
        let value = self
            .call_hub(
                "callAndWait",
                self.keyed(vec![
                    SampValue::string(recipient),
                    message,
                    SampValue::from_int(timeout_secs),
                ]),
            )
            .await?;
        value
            .as_map()
            .cloned()
            .ok_or_else(|| ClientError::Protocol("response is not a mapping".into()))
    }

    pub async fn reply(&self, msg_id: &str, response: SampValue) -> Result<(), ClientError> {
        self.call_hub(
            "reply",
            self.keyed(vec![SampValue::string(msg_id), response]),
        )
        .await?;
        Ok(())
    }

    pub async fn unregister(&self) -> Result<(), ClientError> {
        self.call_hub("unregister", self.keyed(Vec::new())).await?;
        Ok(())
    }

    /// Publish a loopback callback endpoint serving `receiver` and declare
    /// it to the hub, making this client callable.
    pub async fn serve_callable(
        &self,
        receiver: Arc<dyn CallableClient>,
    ) -> Result<(), ClientError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| ClientError::Bind(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| ClientError::Bind(e.to_string()))?
            .port();
        let url = format!("http://127.0.0.1:{}/", port);

        let state = Arc::new(CallbackState {
            receiver,
            private_key: self.inner.private_key.clone(),
        });
        let app = Router::new()
            .route("/", post(handle_callback))
            .with_state(state);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                warn!(%err, "callback server error");
            }
        });

        self.call_hub(
            "setXmlrpcCallback",
            self.keyed(vec![SampValue::string(&url)]),
        )
        .await?;
        Ok(())
    }
}

struct CallbackState {
    receiver: Arc<dyn CallableClient>,
    private_key: String,
}

/// Serve one `samp.client.*` invocation from the hub.
async fn handle_callback(State(state): State<Arc<CallbackState>>, body: String) -> Response {
    let outcome = dispatch_callback(&state, &body);
    let body = match outcome {
        Ok(()) => xmlrpc::encode_response(&SampValue::string("")),
        Err(err) => xmlrpc::encode_fault(xmlrpc::FAULT_CODE, &err.to_string()),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        body,
    )
        .into_response()
}

fn dispatch_callback(state: &CallbackState, body: &str) -> Result<(), HubError> {
    let (method, params) = xmlrpc::decode_request(body).map_err(HubError::Transport)?;

    let key = params
        .first()
        .and_then(SampValue::as_str)
        .ok_or_else(|| HubError::malformed("missing private key", ""))?;
    if key != state.private_key {
        return Err(HubError::AuthFailure);
    }
    let str_at = |i: usize| -> Result<&str, HubError> {
        params
            .get(i)
            .and_then(SampValue::as_str)
            .ok_or_else(|| HubError::malformed(format!("argument {} must be a string", i), ""))
    };
    let map_at = |i: usize| -> Result<&SampMap, HubError> {
        params
            .get(i)
            .and_then(SampValue::as_map)
            .ok_or_else(|| HubError::malformed(format!("argument {} must be a mapping", i), ""))
    };

    match method.as_str() {
        RECEIVE_NOTIFICATION => {
            state.receiver.receive_notification(str_at(1)?, map_at(2)?);
        }
        RECEIVE_CALL => {
            state.receiver.receive_call(str_at(1)?, str_at(2)?, map_at(3)?);
        }
        RECEIVE_RESPONSE => {
            state
                .receiver
                .receive_response(str_at(1)?, str_at(2)?, map_at(3)?);
        }
        other => {
            return Err(HubError::Transport(TransportError::UnknownMethod(
                other.to_string(),
            )))
        }
    }
    Ok(())
}
