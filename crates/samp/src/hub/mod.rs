// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The hub service: client registry, subscription matching, message routing,
//! and call tracking.
//!
//! Profiles authenticate inbound requests, translate them into calls on
//! [`Hub`], and own the delivery lanes that carry callbacks back out.
//! Deliveries and bounded waits happen outside the registry lock; only
//! registry mutation holds it.

pub mod event;
pub mod registry;
pub mod tracker;

pub use event::HubObserver;
pub use registry::{ClientId, ClientRegistry, KeyGenerator, HUB_ID};
pub use tracker::CallTracker;

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::mtype::{MType, Subscriptions};
use crate::transport::Callback;
use crate::value::{SampMap, SampValue};
use event::{
    EVENT_METADATA, EVENT_REGISTER, EVENT_SHUTDOWN, EVENT_SUBSCRIPTIONS, EVENT_UNREGISTER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify, RwLock};
use tracing::{debug, info, warn};
use tracker::Completion;

/// Message mapping key: the MType.
pub const KEY_MTYPE: &str = "samp.mtype";
/// Message mapping key: the params mapping.
pub const KEY_PARAMS: &str = "samp.params";
/// Response mapping key: overall status.
pub const KEY_STATUS: &str = "samp.status";
/// Response mapping key: result mapping (success).
pub const KEY_RESULT: &str = "samp.result";
/// Response mapping key: error mapping (failure).
pub const KEY_ERROR: &str = "samp.error";
/// Error mapping key: human-readable text.
pub const KEY_ERRORTXT: &str = "samp.errortxt";
/// Error mapping key: machine-readable kind.
pub const KEY_CODE: &str = "samp.code";

/// `samp.status` value for success.
pub const STATUS_OK: &str = "samp.ok";
/// `samp.status` value for failure.
pub const STATUS_ERROR: &str = "samp.error";

/// Build a message mapping from an MType and a params mapping.
pub fn message(mtype: &str, params: SampMap) -> SampValue {
    let mut map = SampMap::new();
    map.insert(KEY_MTYPE, SampValue::string(mtype));
    map.insert(KEY_PARAMS, SampValue::Map(params));
    SampValue::Map(map)
}

/// Build a successful response mapping.
pub fn ok_response(result: SampMap) -> SampValue {
    let mut map = SampMap::new();
    map.insert(KEY_STATUS, SampValue::string(STATUS_OK));
    map.insert(KEY_RESULT, SampValue::Map(result));
    SampValue::Map(map)
}

/// Build a synthetic error response mapping.
pub fn error_response(errtxt: &str, code: Option<&str>) -> SampValue {
    let mut error = SampMap::new();
    error.insert(KEY_ERRORTXT, SampValue::string(errtxt));
    if let Some(code) = code {
        error.insert(KEY_CODE, SampValue::string(code));
    }
    let mut map = SampMap::new();
    map.insert(KEY_STATUS, SampValue::string(STATUS_ERROR));
    map.insert(KEY_ERROR, SampValue::Map(error));
    SampValue::Map(map)
}

/// Credentials handed to a freshly registered client.
#[derive(Debug, Clone)]
pub struct Registration {
    pub hub_id: String,
    pub self_id: ClientId,
    pub private_key: String,
}

impl Registration {
    /// The wire mapping returned by `register`.
    pub fn to_value(&self) -> SampValue {
        let mut map = SampMap::new();
        map.insert("samp.hub-id", SampValue::string(&self.hub_id));
        map.insert("samp.self-id", SampValue::string(&self.self_id));
        map.insert("samp.private-key", SampValue::string(&self.private_key));
        SampValue::Map(map)
    }
}

/// A validated inbound message: the whole mapping plus its parsed MType.
struct Message {
    mtype: MType,
    value: SampValue,
}

impl Message {
    fn parse(value: SampValue) -> HubResult<Self> {
        value.validate()?;
        let map = value
            .as_map()
            .ok_or_else(|| HubError::malformed("message must be a mapping", ""))?;
        let mtype_str = map
            .get_str(KEY_MTYPE)
            .ok_or_else(|| HubError::malformed("message lacks samp.mtype", KEY_MTYPE))?;
        let mtype = MType::parse(mtype_str)?;
        if let Some(params) = map.get(KEY_PARAMS) {
            if params.as_map().is_none() {
                return Err(HubError::malformed("samp.params must be a mapping", KEY_PARAMS));
            }
        }
        Ok(Self { mtype, value })
    }
}

/// The hub. One per process; shared via `Arc` between profiles.
pub struct Hub {
    config: Arc<HubConfig>,
    registry: RwLock<ClientRegistry>,
    tracker: CallTracker,
    keygen: KeyGenerator,
    observers: std::sync::RwLock<Vec<Arc<dyn HubObserver>>>,
    accepting: AtomicBool,
    shutdown: Notify,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let mut hub_metadata = SampMap::new();
        hub_metadata.insert("samp.name", SampValue::string("hub"));
        hub_metadata.insert(
            "samp.description.text",
            SampValue::string("SAMP hub (samp-rs)"),
        );
        let max_clients = config.max_clients;
        Self {
            config: Arc::new(config),
            registry: RwLock::new(ClientRegistry::new(max_clients, hub_metadata)),
            tracker: CallTracker::new(),
            keygen: KeyGenerator::new(),
            observers: std::sync::RwLock::new(Vec::new()),
            accepting: AtomicBool::new(true),
            shutdown: Notify::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Attach an in-process observer.
    pub fn add_observer(&self, observer: Arc<dyn HubObserver>) {
        self.observers
            .write()
            .expect("observer list poisoned")
            .push(observer);
    }

    /// Resolves when [`Hub::shutdown`] has run.
    pub async fn stopped(&self) {
        // Create the listener before checking the flag so a shutdown racing
        // this call cannot slip between check and wait.
        let notified = self.shutdown.notified();
        if !self.is_accepting() {
            return;
        }
        notified.await;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    fn observers(&self) -> Vec<Arc<dyn HubObserver>> {
        self.observers.read().expect("observer list poisoned").clone()
    }

    // -- registration lifecycle ---------------------------------------------

    /// Register a new client. `key_prefix` distinguishes profiles
    /// (Standard: empty, Web: `"wk:"`).
    pub async fn register(&self, key_prefix: &str) -> HubResult<Registration> {
        if !self.is_accepting() {
            return Err(HubError::HubShutdown);
        }
        let private_key = self.keygen.generate(key_prefix);
        let id = {
            let mut reg = self.registry.write().await;
            let record = reg.register(private_key.clone())?;
            let id = record.id.clone();
            self.broadcast_event_locked(&reg, EVENT_REGISTER, &id);
            id
        };
        info!(client = %id, "client registered");
        for obs in self.observers() {
            obs.on_register(&id);
        }
        Ok(Registration {
            hub_id: HUB_ID.to_string(),
            self_id: id,
            private_key,
        })
    }

    /// Unregister the calling client and abandon its outstanding calls.
    pub async fn unregister(&self, private_key: &str) -> HubResult<()> {
        let id = {
            let mut reg = self.registry.write().await;
            let id = reg.resolve_key(private_key)?.id.clone();
            reg.unregister(&id);
            self.broadcast_event_locked(&reg, EVENT_UNREGISTER, &id);

            // Synthesize error responses to surviving senders of calls this
            // client will never answer. The client's own parked waits are
            // woken by dropping their rendezvous.
            for entry in self.tracker.abandon_for(&id) {
                let response = error_response(
                    &format!("recipient {} unregistered", id),
                    Some("UnknownTarget"),
                );
                match entry.waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        if let Some(sender) = reg.get(&entry.sender) {
                            enqueue(
                                sender,
                                Callback::response(&id, &entry.tag, response),
                            );
                        }
                    }
                }
            }
            id
        };
        info!(client = %id, "client unregistered");
        for obs in self.observers() {
            obs.on_unregister(&id);
        }
        Ok(())
    }

    /// Attach (or replace) the delivery lane that makes a client callable.
    pub async fn set_callback_lane(
        &self,
        private_key: &str,
        lane: mpsc::Sender<Callback>,
    ) -> HubResult<ClientId> {
        let mut reg = self.registry.write().await;
        let id = reg.resolve_key(private_key)?.id.clone();
        reg.set_lane(&id, lane);
        debug!(client = %id, "callback declared");
        Ok(id)
    }

    // -- metadata and subscriptions -----------------------------------------

    pub async fn declare_metadata(&self, private_key: &str, metadata: SampValue) -> HubResult<()> {
        metadata.validate()?;
        let map = metadata
            .as_map()
            .ok_or_else(|| HubError::malformed("metadata must be a mapping", ""))?
            .clone();
        let id = {
            let mut reg = self.registry.write().await;
            let id = reg.resolve_key(private_key)?.id.clone();
            reg.set_metadata(&id, map.clone());
            self.broadcast_event_locked(&reg, EVENT_METADATA, &id);
            id
        };
        for obs in self.observers() {
            obs.on_metadata(&id, &map);
        }
        Ok(())
    }

    pub async fn get_metadata(&self, private_key: &str, target: &str) -> HubResult<SampMap> {
        let reg = self.registry.read().await;
        reg.resolve_key(private_key)?;
        reg.target_metadata(target).map(Clone::clone)
    }

    pub async fn declare_subscriptions(
        &self,
        private_key: &str,
        subs: SampValue,
    ) -> HubResult<()> {
        subs.validate()?;
        let subs = Subscriptions::from_value(&subs)?;
        let id = {
            let mut reg = self.registry.write().await;
            let id = reg.resolve_key(private_key)?.id.clone();
            reg.set_subscriptions(&id, subs.clone());
            self.broadcast_event_locked(&reg, EVENT_SUBSCRIPTIONS, &id);
            id
        };
        for obs in self.observers() {
            obs.on_subscriptions(&id, &subs);
        }
        Ok(())
    }

    pub async fn get_subscriptions(
        &self,
        private_key: &str,
        target: &str,
    ) -> HubResult<SampValue> {
        let reg = self.registry.read().await;
        reg.resolve_key(private_key)?;
        Ok(reg.target_subscriptions(target)?.to_value())
    }

    /// Live client ids, excluding the caller and the hub itself.
    pub async fn get_registered_clients(&self, private_key: &str) -> HubResult<Vec<ClientId>> {
        let reg = self.registry.read().await;
        let id = reg.resolve_key(private_key)?.id.clone();
        Ok(reg.ids_excluding(&id))
    }

    /// Callable clients subscribed to `mtype`, excluding the caller, each
    /// with its most specific matching config.
    pub async fn get_subscribed_clients(
        &self,
        private_key: &str,
        mtype: &str,
    ) -> HubResult<SampMap> {
        let mtype = MType::parse(mtype)?;
        let reg = self.registry.read().await;
        let caller = reg.resolve_key(private_key)?.id.clone();
        let mut out = SampMap::new();
        let mut hits: Vec<_> = reg.subscribers(&mtype).into_iter().collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, config) in hits {
            if id != caller {
                out.insert(id, SampValue::Map(config));
            }
        }
        Ok(out)
    }

    // -- message routing ----------------------------------------------------

    /// Fire-and-forget delivery to one recipient.
    pub async fn notify(
        &self,
        private_key: &str,
        recipient: &str,
        message: SampValue,
    ) -> HubResult<()> {
        let message = Message::parse(message)?;
        let reg = self.registry.read().await;
        let sender = reg.resolve_key(private_key)?.id.clone();
        let target = reg
            .get(recipient)
            .ok_or_else(|| HubError::UnknownTarget(recipient.to_string()))?;
        if !reg.accepts(target, &message.mtype) {
            return Err(HubError::NotSubscribed {
                client: recipient.to_string(),
                mtype: message.mtype.to_string(),
            });
        }
        enqueue(target, Callback::notification(&sender, message.value));
        Ok(())
    }

    /// Broadcast to every subscribed callable client except the sender.
    /// Returns the recipients before deliveries complete.
    pub async fn notify_all(
        &self,
        private_key: &str,
        message: SampValue,
    ) -> HubResult<Vec<ClientId>> {
        let message = Message::parse(message)?;
        let reg = self.registry.read().await;
        let sender = reg.resolve_key(private_key)?.id.clone();
        let mut recipients: Vec<ClientId> = Vec::new();
        for (id, _) in reg.subscribers(&message.mtype) {
            if id == sender {
                continue;
            }
            if let Some(target) = reg.get(&id) {
                enqueue(target, Callback::notification(&sender, message.value.clone()));
                recipients.push(id);
            }
        }
        recipients.sort_unstable();
        Ok(recipients)
    }

    /// Tracked call to one recipient; returns the minted message id.
    pub async fn call(
        &self,
        private_key: &str,
        recipient: &str,
        tag: &str,
        message: SampValue,
    ) -> HubResult<String> {
        let message = Message::parse(message)?;
        let reg = self.registry.read().await;
        let sender = reg.resolve_key(private_key)?.id.clone();
        let target = reg
            .get(recipient)
            .ok_or_else(|| HubError::UnknownTarget(recipient.to_string()))?;
        if !reg.accepts(target, &message.mtype) {
            return Err(HubError::NotSubscribed {
                client: recipient.to_string(),
                mtype: message.mtype.to_string(),
            });
        }
        let msg_id = self.tracker.issue(&sender, recipient, tag, None);
        enqueue(target, Callback::call(&sender, &msg_id, message.value));
        Ok(msg_id)
    }

    /// Tracked call to every subscribed callable client except the sender.
    pub async fn call_all(
        &self,
        private_key: &str,
        tag: &str,
        message: SampValue,
    ) -> HubResult<SampMap> {
        let message = Message::parse(message)?;
        let reg = self.registry.read().await;
        let sender = reg.resolve_key(private_key)?.id.clone();
        let mut out = SampMap::new();
        let mut hits: Vec<_> = reg.subscribers(&message.mtype).into_iter().collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, _) in hits {
            if id == sender {
                continue;
            }
            if let Some(target) = reg.get(&id) {
                let msg_id = self.tracker.issue(&sender, &id, tag, None);
                enqueue(target, Callback::call(&sender, &msg_id, message.value.clone()));
                out.insert(id, SampValue::string(msg_id));
            }
        }
        Ok(out)
    }

    /// `call` plus a bounded wait for the response. A non-positive timeout
    /// waits indefinitely. Timeout yields a synthetic `samp.error` response,
    /// not a fault; the tracking entry is removed and any late reply is
    /// dropped.
    pub async fn call_and_wait(
        &self,
        private_key: &str,
        recipient: &str,
        message: SampValue,
        timeout: Option<Duration>,
    ) -> HubResult<SampValue> {
        let message = Message::parse(message)?;
        let (tx, rx) = oneshot::channel();
        let msg_id = {
            let reg = self.registry.read().await;
            let sender = reg.resolve_key(private_key)?.id.clone();
            let target = reg
                .get(recipient)
                .ok_or_else(|| HubError::UnknownTarget(recipient.to_string()))?;
            if !reg.accepts(target, &message.mtype) {
                return Err(HubError::NotSubscribed {
                    client: recipient.to_string(),
                    mtype: message.mtype.to_string(),
                });
            }
            let msg_id = self.tracker.issue(&sender, recipient, "", Some(tx));
            enqueue(target, Callback::call(&sender, &msg_id, message.value));
            msg_id
        };

        // Park outside the registry lock.
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.tracker.expire(&msg_id);
                    debug!(%msg_id, "callAndWait timed out");
                    return Ok(error_response(
                        &format!("no response within {:?}", limit),
                        Some("Timeout"),
                    ));
                }
            },
            None => rx.await,
        };
        match outcome {
            Ok(response) => Ok(response),
            // The rendezvous was dropped: recipient or hub went away.
            Err(_) => Ok(error_response("call abandoned", Some("UnknownTarget"))),
        }
    }

    /// Deliver a recipient's response for an outstanding call.
    pub async fn reply(
        &self,
        private_key: &str,
        msg_id: &str,
        response: SampValue,
    ) -> HubResult<()> {
        response.validate()?;
        let reg = self.registry.read().await;
        let replier = reg.resolve_key(private_key)?.id.clone();
        match self.tracker.complete(msg_id, &replier)? {
            Completion::Waiter(tx, _) => {
                let _ = tx.send(response);
            }
            Completion::Route { sender, tag } => {
                if let Some(target) = reg.get(&sender) {
                    enqueue(target, Callback::response(&replier, &tag, response));
                }
            }
            Completion::Dropped => {
                debug!(%msg_id, "late reply dropped");
            }
        }
        Ok(())
    }

    /// Liveness probe; requires no credentials.
    pub fn ping(&self) -> HubResult<()> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(HubError::HubShutdown)
        }
    }

    // -- shutdown -----------------------------------------------------------

    /// Stop the hub: broadcast the shutdown event, refuse further
    /// registrations, wake every waiter, and give lanes a grace period to
    /// drain.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("hub shutting down");
            {
                let reg = self.registry.read().await;
                self.broadcast_event_locked(&reg, EVENT_SHUTDOWN, HUB_ID);
            }
            for entry in self.tracker.drain() {
                if let Some(tx) = entry.waiter {
                    let _ = tx.send(error_response("hub shutting down", Some("hubshutdown")));
                }
            }
            for obs in self.observers() {
                obs.on_shutdown();
            }
            tokio::time::sleep(self.config.shutdown_grace()).await;
            self.shutdown.notify_waiters();
        }
    }

    // -- internals ----------------------------------------------------------

    /// Enqueue a `samp.hub.event.*` notification to every subscribed
    /// callable client. Called with the registry lock held so events for one
    /// client are observed in occurrence order.
    fn broadcast_event_locked(&self, reg: &ClientRegistry, mtype: &str, subject: &str) {
        let parsed = MType::parse(mtype).expect("event mtypes are well-formed");
        let mut params = SampMap::new();
        params.insert("id", SampValue::string(subject));
        let mut message = SampMap::new();
        message.insert(KEY_MTYPE, SampValue::string(mtype));
        message.insert(KEY_PARAMS, SampValue::Map(params));
        let message = SampValue::Map(message);

        for (id, _) in reg.subscribers(&parsed) {
            if let Some(target) = reg.get(&id) {
                enqueue(target, Callback::notification(HUB_ID, message.clone()));
            }
        }
    }
}

/// Push a callback onto a client's delivery lane. Full or closed lanes are
/// logged and dropped; callback failures never propagate into the calling
/// client's method.
fn enqueue(record: &registry::ClientRecord, callback: Callback) {
    if let Some(lane) = &record.lane {
        if let Err(err) = lane.try_send(callback) {
            warn!(client = %record.id, %err, "dropping callback");
        }
    }
}
