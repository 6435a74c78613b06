// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Standard Profile: lockfile discovery plus XML-RPC on a loopback port.
//!
//! Startup asks the OS for a free port (bind to port 0), generates
//! `samp.secret`, and writes the lockfile atomically. A watcher task shuts
//! the hub down if the lockfile disappears or its secret changes; shutdown
//! deletes the lockfile if it is still ours.

use crate::error::HubError;
use crate::hub::{Hub, KeyGenerator};
use crate::lockfile::{HubLocation, LockInfo, LockfileError};
use crate::profile::{arg_str, hub_methods, void, ProfileError};
use crate::transport::{
    handler, xmlrpc, Callback, MethodMap, RequestCtx, XmlRpcClient, HUB_PREFIX,
};
use crate::value::SampValue;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use ring::constant_time;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Depth of each client's delivery lane.
const LANE_DEPTH: usize = 4096;

/// A running Standard Profile server.
pub struct StandardProfile {
    /// The hub endpoint URL published in the lockfile.
    pub url: String,
    /// Where the lockfile was written.
    pub lock_path: PathBuf,
    /// The registration secret (exposed for tests and embedding).
    pub secret: String,
    task: tokio::task::JoinHandle<()>,
}

impl StandardProfile {
    /// Bind, publish the lockfile, and serve until the hub stops.
    pub async fn start(hub: Arc<Hub>) -> Result<Self, ProfileError> {
        let bind = (hub.config().bind_address, 0u16);
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|e| ProfileError::Bind(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| ProfileError::Bind(e.to_string()))?
            .port();
        let host = hub.config().effective_localhost();
        let url = format!("http://{}:{}/", host, port);

        let secret = KeyGenerator::new().generate("");
        let lock_path = match crate::lockfile::resolve_location(
            hub.config().lockfile_path.as_deref(),
        )? {
            HubLocation::Path(path) => path,
            HubLocation::Url(url) => {
                return Err(ProfileError::Lockfile(LockfileError::BadLockUrl(url)))
            }
        };

        let mut lock_info = LockInfo::new(secret.clone(), url.clone());
        lock_info.set("samp.hub.impl", "samp-rs");
        lock_info.write(&lock_path)?;
        info!(%url, path = %lock_path.display(), "standard profile up");

        let mut methods = hub_methods(&hub, HUB_PREFIX);
        install_register(&mut methods, &hub, &secret);
        install_set_callback(&mut methods, &hub);

        let state = Arc::new(methods);
        let app = Router::new()
            .route("/", post(handle_xmlrpc))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let serve_hub = hub.clone();
        let watch_hub = hub.clone();
        let watch_path = lock_path.clone();
        let watch_secret = secret.clone();
        let task = tokio::spawn(async move {
            let watcher = tokio::spawn(watch_lockfile(watch_hub, watch_path.clone(), watch_secret.clone()));
            let shutdown_hub = serve_hub.clone();
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_hub.stopped().await })
                .await
            {
                warn!(%err, "standard profile server error");
            }
            watcher.abort();
            remove_lockfile(&watch_path, &watch_secret);
        });

        Ok(Self {
            url,
            lock_path,
            secret,
            task,
        })
    }

    /// Abort the server task without touching the hub.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// `samp.hub.register(secret)` — the secret is the sole credential.
fn install_register(methods: &mut MethodMap, hub: &Arc<Hub>, secret: &str) {
    let hub = hub.clone();
    let secret = secret.to_string();
    methods.insert(
        format!("{}register", HUB_PREFIX),
        handler(move |_ctx: RequestCtx, params: Vec<SampValue>| {
            let hub = hub.clone();
            let secret = secret.clone();
            async move {
                let presented = arg_str(&params, 0)?;
                if constant_time::verify_slices_are_equal(
                    presented.as_bytes(),
                    secret.as_bytes(),
                )
                .is_err()
                {
                    debug!("registration with wrong secret rejected");
                    return Err(HubError::AuthFailure);
                }
                let registration = hub.register("").await?;
                Ok(registration.to_value())
            }
        }),
    );
}

/// `samp.hub.setXmlrpcCallback(privkey, url)` — makes the client callable.
///
/// A lane task serializes deliveries per client: callbacks POST one at a
/// time, so per-sender order is preserved and failures are logged and
/// swallowed.
fn install_set_callback(methods: &mut MethodMap, hub: &Arc<Hub>) {
    let hub = hub.clone();
    methods.insert(
        format!("{}setXmlrpcCallback", HUB_PREFIX),
        handler(move |_ctx: RequestCtx, params: Vec<SampValue>| {
            let hub = hub.clone();
            async move {
                let private_key = arg_str(&params, 0)?.to_string();
                let endpoint = arg_str(&params, 1)?.to_string();
                let client = XmlRpcClient::new(hub.config().callback_timeout())
                    .map_err(HubError::Transport)?;

                let (tx, rx) = mpsc::channel::<Callback>(LANE_DEPTH);
                let id = hub.set_callback_lane(&private_key, tx).await?;
                tokio::spawn(run_lane(client, endpoint, private_key, id, rx));
                Ok(void())
            }
        }),
    );
}

/// Consume a client's delivery lane, POSTing each callback to its endpoint.
async fn run_lane(
    client: XmlRpcClient,
    endpoint: String,
    private_key: String,
    client_id: String,
    mut rx: mpsc::Receiver<Callback>,
) {
    while let Some(cb) = rx.recv().await {
        let mut params = Vec::with_capacity(cb.params.len() + 1);
        params.push(SampValue::string(&private_key));
        params.extend(cb.params);
        if let Err(err) = client.call(&endpoint, &cb.method, &params).await {
            warn!(client = %client_id, method = %cb.method, %err, "callback delivery failed");
        }
    }
    debug!(client = %client_id, "delivery lane closed");
}

/// The single XML-RPC endpoint. Faults are always HTTP 200.
async fn handle_xmlrpc(State(methods): State<Arc<MethodMap>>, body: String) -> Response {
    let (method, params) = match xmlrpc::decode_request(&body) {
        Ok(decoded) => decoded,
        Err(err) => {
            return xml_body(xmlrpc::encode_fault(xmlrpc::FAULT_CODE, &err.to_string()));
        }
    };
    debug!(%method, "xml-rpc request");
    let result = methods
        .dispatch(&method, RequestCtx::default(), params)
        .await;
    match result {
        Ok(value) => xml_body(xmlrpc::encode_response(&value)),
        Err(err) => xml_body(xmlrpc::encode_fault(
            xmlrpc::FAULT_CODE,
            &format!("{}: {}", err.code(), err),
        )),
    }
}

fn xml_body(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        body,
    )
        .into_response()
}

/// Shut the hub down if the lockfile vanishes or stops being ours.
async fn watch_lockfile(hub: Arc<Hub>, path: PathBuf, secret: String) {
    let mut ticker = tokio::time::interval(hub.config().lockfile_poll());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !hub.is_accepting() {
            return;
        }
        let ours = LockInfo::read(&path)
            .map(|info| info.secret() == Some(secret.as_str()))
            .unwrap_or(false);
        if !ours {
            warn!(path = %path.display(), "lockfile removed or altered; shutting down");
            hub.shutdown().await;
            return;
        }
    }
}

/// Delete the lockfile at shutdown, but only if it still carries our secret.
fn remove_lockfile(path: &std::path::Path, secret: &str) {
    match LockInfo::read(path) {
        Ok(info) if info.secret() == Some(secret) => {
            if let Err(err) = std::fs::remove_file(path) {
                warn!(path = %path.display(), %err, "failed to delete lockfile");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;

    #[test]
    fn test_state_secret_is_used_verbatim() {
        // verify_slices_are_equal treats equal-length equal bytes as Ok.
        assert!(constant_time::verify_slices_are_equal(b"abc", b"abc").is_ok());
        assert!(constant_time::verify_slices_are_equal(b"abc", b"abd").is_err());
        assert!(constant_time::verify_slices_are_equal(b"abc", b"abcd").is_err());
    }

    #[tokio::test]
    async fn test_start_writes_lockfile_and_serves() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".samp");
        let hub = Arc::new(Hub::new(HubConfig {
            lockfile_path: Some(lock_path.clone()),
            ..Default::default()
        }));

        let profile = StandardProfile::start(hub.clone()).await.unwrap();
        assert!(lock_path.exists());
        let info = LockInfo::read(&lock_path).unwrap();
        info.check().unwrap();
        assert_eq!(info.xmlrpc_url(), Some(profile.url.as_str()));
        assert_eq!(info.secret(), Some(profile.secret.as_str()));

        profile.abort();
    }
}
