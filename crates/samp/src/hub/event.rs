// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hub lifecycle events and the observer seam.
//!
//! Registry and message events fan out two ways: as `samp.hub.event.*`
//! notifications to subscribed clients (sender `"hub"`), and to in-process
//! [`HubObserver`]s. Observers replace what a GUI window or message tracker
//! would otherwise subclass into the hub.

use crate::mtype::Subscriptions;
use crate::value::SampMap;

/// Broadcast when a client completes registration.
pub const EVENT_REGISTER: &str = "samp.hub.event.register";
/// Broadcast when a client declares metadata.
pub const EVENT_METADATA: &str = "samp.hub.event.metadata";
/// Broadcast when a client declares subscriptions.
pub const EVENT_SUBSCRIPTIONS: &str = "samp.hub.event.subscriptions";
/// Broadcast when a client unregisters.
pub const EVENT_UNREGISTER: &str = "samp.hub.event.unregister";
/// Broadcast once, before the hub stops serving.
pub const EVENT_SHUTDOWN: &str = "samp.hub.event.shutdown";

/// In-process observer of registry and lifecycle events.
///
/// All methods default to no-ops so observers implement only what they
/// watch. Called synchronously under the hub's registry lock; keep
/// implementations brief.
pub trait HubObserver: Send + Sync {
    fn on_register(&self, _id: &str) {}
    fn on_metadata(&self, _id: &str, _metadata: &SampMap) {}
    fn on_subscriptions(&self, _id: &str, _subs: &Subscriptions) {}
    fn on_unregister(&self, _id: &str) {}
    fn on_shutdown(&self) {}
}
