// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Web Profile: one HTTP endpoint for every browser client.
//!
//! There is no per-client URL. Registration is authorized against the
//! requesting page's `Origin`; outbound deliveries are enqueued per client
//! and drained by `pullCallbacks`. CORS preflight and ordinary requests are
//! authorized independently through an [`OriginAuthorizer`].

pub mod queue;

pub use queue::PullQueue;

use crate::error::HubError;
use crate::hub::Hub;
use crate::profile::{arg, arg_str, hub_methods, parse_timeout, void, ProfileError};
use crate::transport::{handler, json, Callback, MethodMap, RequestCtx, WEBHUB_PREFIX};
use crate::value::SampValue;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Depth of each client's delivery lane.
const LANE_DEPTH: usize = 4096;

/// Longest wait `pullCallbacks` will honour.
const MAX_PULL_WAIT: Duration = Duration::from_secs(600);

/// Key prefix distinguishing Web Profile private keys.
pub const WEB_KEY_PREFIX: &str = "wk:";

/// Decides whether a registering page may join the hub.
pub trait ClientAuthorizer: Send + Sync {
    /// `origin` is the page's `Origin` header; `name` its declared
    /// `samp.name`, when given.
    fn authorize(&self, origin: Option<&str>, name: Option<&str>) -> bool;
}

/// Decides whether an origin may talk to the endpoint at all (both for CORS
/// preflight and for ordinary requests).
pub trait OriginAuthorizer: Send + Sync {
    fn allow_origin(&self, origin: &str) -> bool;
}

/// Accept everything. For tests and trusted setups.
pub struct AllowAll;

impl ClientAuthorizer for AllowAll {
    fn authorize(&self, _origin: Option<&str>, _name: Option<&str>) -> bool {
        true
    }
}

impl OriginAuthorizer for AllowAll {
    fn allow_origin(&self, _origin: &str) -> bool {
        true
    }
}

/// Refuse everything.
pub struct DenyAll;

impl ClientAuthorizer for DenyAll {
    fn authorize(&self, _origin: Option<&str>, _name: Option<&str>) -> bool {
        false
    }
}

impl OriginAuthorizer for DenyAll {
    fn allow_origin(&self, _origin: &str) -> bool {
        false
    }
}

struct WebState {
    methods: MethodMap,
    origin_auth: Arc<dyn OriginAuthorizer>,
}

/// A running Web Profile server.
pub struct WebProfile {
    /// The endpoint URL all Web clients share.
    pub url: String,
    task: tokio::task::JoinHandle<()>,
}

impl WebProfile {
    /// Bind the single Web endpoint and serve until the hub stops.
    pub async fn start(
        hub: Arc<Hub>,
        client_auth: Arc<dyn ClientAuthorizer>,
        origin_auth: Arc<dyn OriginAuthorizer>,
    ) -> Result<Self, ProfileError> {
        let bind = (hub.config().bind_address, hub.config().web_port);
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|e| ProfileError::Bind(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| ProfileError::Bind(e.to_string()))?
            .port();
        let url = format!("http://{}:{}/", hub.config().effective_localhost(), port);

        let queues: Arc<DashMap<String, Arc<PullQueue>>> = Arc::new(DashMap::new());
        let mut methods = hub_methods(&hub, WEBHUB_PREFIX);
        install_register(&mut methods, &hub, &queues, client_auth);
        install_unregister(&mut methods, &hub, &queues);
        install_pull_callbacks(&mut methods, &queues);
        install_allow_reverse_callbacks(&mut methods, &queues);

        let state = Arc::new(WebState {
            methods,
            origin_auth,
        });
        let app = Router::new()
            .route("/", post(handle_post).options(handle_preflight))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        info!(%url, "web profile up");
        let shutdown_hub = hub.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_hub.stopped().await })
                .await
            {
                warn!(%err, "web profile server error");
            }
        });

        Ok(Self { url, task })
    }

    /// Abort the server task without touching the hub.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// `samp.webhub.register(identity-map?)` — authorization against the
/// request's `Origin` and the declared name. Creates the client's pull queue.
fn install_register(
    methods: &mut MethodMap,
    hub: &Arc<Hub>,
    queues: &Arc<DashMap<String, Arc<PullQueue>>>,
    client_auth: Arc<dyn ClientAuthorizer>,
) {
    let hub = hub.clone();
    let queues = queues.clone();
    methods.insert(
        format!("{}register", WEBHUB_PREFIX),
        handler(move |ctx: RequestCtx, params: Vec<SampValue>| {
            let hub = hub.clone();
            let queues = queues.clone();
            let client_auth = client_auth.clone();
            async move {
                let name = params
                    .first()
                    .and_then(SampValue::as_map)
                    .and_then(|m| m.get_str("samp.name"))
                    .map(str::to_string);
                if !client_auth.authorize(ctx.origin.as_deref(), name.as_deref()) {
                    debug!(origin = ?ctx.origin, "web registration denied");
                    return Err(HubError::AuthFailure);
                }

                let registration = hub.register(WEB_KEY_PREFIX).await?;
                let queue = Arc::new(PullQueue::new(
                    registration.self_id.clone(),
                    hub.config().callback_queue_bound,
                ));

                // Lane task moves deliveries into the bounded pull queue.
                let (tx, mut rx) = mpsc::channel::<Callback>(LANE_DEPTH);
                hub.set_callback_lane(&registration.private_key, tx).await?;
                let feeder_queue = queue.clone();
                tokio::spawn(async move {
                    while let Some(cb) = rx.recv().await {
                        feeder_queue.push(cb);
                    }
                });

                queues.insert(registration.private_key.clone(), queue);
                Ok(registration.to_value())
            }
        }),
    );
}

/// Web-specific `unregister`: also discards the pull queue.
fn install_unregister(
    methods: &mut MethodMap,
    hub: &Arc<Hub>,
    queues: &Arc<DashMap<String, Arc<PullQueue>>>,
) {
    let hub = hub.clone();
    let queues = queues.clone();
    methods.insert(
        format!("{}unregister", WEBHUB_PREFIX),
        handler(move |_ctx: RequestCtx, params: Vec<SampValue>| {
            let hub = hub.clone();
            let queues = queues.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                hub.unregister(&key).await?;
                queues.remove(&key);
                Ok(void())
            }
        }),
    );
}

/// `samp.webhub.pullCallbacks(privkey, timeoutSecs)`.
fn install_pull_callbacks(
    methods: &mut MethodMap,
    queues: &Arc<DashMap<String, Arc<PullQueue>>>,
) {
    let queues = queues.clone();
    methods.insert(
        format!("{}pullCallbacks", WEBHUB_PREFIX),
        handler(move |_ctx: RequestCtx, params: Vec<SampValue>| {
            let queues = queues.clone();
            async move {
                let key = arg_str(&params, 0)?;
                let timeout = parse_timeout(arg_str(&params, 1)?)?
                    .unwrap_or(MAX_PULL_WAIT)
                    .min(MAX_PULL_WAIT);
                let queue = queues
                    .get(key)
                    .map(|q| q.value().clone())
                    .ok_or(HubError::AuthFailure)?;

                let batch = queue.pull(timeout).await;
                Ok(SampValue::List(
                    batch.iter().map(json::callback_frame).collect(),
                ))
            }
        }),
    );
}

/// `samp.webhub.allowReverseCallbacks(privkey, "0"|"1")` — recorded;
/// deliveries keep flowing through the pull queue either way.
fn install_allow_reverse_callbacks(
    methods: &mut MethodMap,
    queues: &Arc<DashMap<String, Arc<PullQueue>>>,
) {
    let queues = queues.clone();
    methods.insert(
        format!("{}allowReverseCallbacks", WEBHUB_PREFIX),
        handler(move |_ctx: RequestCtx, params: Vec<SampValue>| {
            let queues = queues.clone();
            async move {
                let key = arg_str(&params, 0)?;
                let allow = arg(&params, 1)?
                    .as_bool()
                    .ok_or_else(|| HubError::malformed("flag must be \"0\" or \"1\"", ""))?;
                let queue = queues
                    .get(key)
                    .map(|q| q.value().clone())
                    .ok_or(HubError::AuthFailure)?;
                queue.set_reverse_callbacks(allow);
                Ok(void())
            }
        }),
    );
}

fn origin_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// CORS headers echoing an approved origin.
fn cors_headers(origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    headers
}

/// CORS preflight for the single endpoint.
async fn handle_preflight(State(state): State<Arc<WebState>>, headers: HeaderMap) -> Response {
    match origin_of(&headers) {
        Some(origin) if state.origin_auth.allow_origin(&origin) => {
            let mut out = cors_headers(&origin);
            out.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("POST, OPTIONS"),
            );
            out.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Content-Type"),
            );
            (StatusCode::NO_CONTENT, out).into_response()
        }
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

/// The single JSON endpoint for every Web client.
async fn handle_post(
    State(state): State<Arc<WebState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let origin = origin_of(&headers);

    // Ordinary requests are origin-checked independently of preflight.
    if let Some(origin) = &origin {
        if !state.origin_auth.allow_origin(origin) {
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let (method, params) = match json::decode_request(&body) {
        Ok(decoded) => decoded,
        Err(err) => {
            let fault = HubError::Transport(err);
            return json_response(StatusCode::OK, json::encode_error(&fault), origin.as_deref());
        }
    };
    debug!(%method, "web request");

    let ctx = RequestCtx {
        peer: None,
        origin: origin.clone(),
    };
    let is_register = method == format!("{}register", WEBHUB_PREFIX);
    match state.methods.dispatch(&method, ctx, params).await {
        Ok(value) => json_response(StatusCode::OK, json::encode_result(&value), origin.as_deref()),
        // A denied registration is an HTTP-level rejection.
        Err(err @ HubError::AuthFailure) if is_register => {
            json_response(StatusCode::FORBIDDEN, json::encode_error(&err), origin.as_deref())
        }
        Err(err) => json_response(StatusCode::OK, json::encode_error(&err), origin.as_deref()),
    }
}

fn json_response(status: StatusCode, body: String, origin: Option<&str>) -> Response {
    let mut headers = origin.map(cors_headers).unwrap_or_default();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    (status, headers, body).into_response()
}
