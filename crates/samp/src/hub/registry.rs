// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client registry: records, id/key allocation, and the subscription index.

use crate::error::{HubError, HubResult};
use crate::mtype::{MType, SubscriptionTrie, Subscriptions};
use crate::transport::Callback;
use crate::value::SampMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Public id of a registered client, e.g. `"c0001"`.
pub type ClientId = String;

/// The hub's own reserved public id. Appears as a sender of lifecycle
/// events; never receives.
pub const HUB_ID: &str = "hub";

/// Random-token generator for private keys and message ids.
///
/// Tokens are 18 bytes from the system CSPRNG, URL-safe base64, unique for
/// the hub's lifetime with overwhelming probability.
pub struct KeyGenerator {
    rng: SystemRandom,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Generate one token with the given prefix.
    pub fn generate(&self, prefix: &str) -> String {
        let mut bytes = [0u8; 18];
        // SystemRandom only fails when the OS entropy source is broken.
        self.rng
            .fill(&mut bytes)
            .expect("system random source unavailable");
        format!("{}{}", prefix, URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the hub holds for one registered client.
#[derive(Debug)]
pub struct ClientRecord {
    /// Hub-assigned public id, stable for the registration.
    pub id: ClientId,
    /// Hub-assigned private key; never disclosed to other clients.
    pub private_key: String,
    /// Declared metadata; empty until `declareMetadata`.
    pub metadata: SampMap,
    /// Declared subscriptions; empty until `declareSubscriptions`.
    pub subscriptions: Subscriptions,
    /// Delivery lane towards the client's callback endpoint or pull queue.
    /// `None` until the client declares a callback.
    pub lane: Option<mpsc::Sender<Callback>>,
}

impl ClientRecord {
    /// A client is callable once it has declared a callback.
    pub fn is_callable(&self) -> bool {
        self.lane.is_some()
    }
}

/// The registry proper. Guarded by the hub's coarse lock; all methods are
/// synchronous and hold no locks of their own.
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientRecord>,
    key_index: HashMap<String, ClientId>,
    trie: SubscriptionTrie<ClientId>,
    counter: u64,
    max_clients: usize,
    hub_metadata: SampMap,
}

impl ClientRegistry {
    pub fn new(max_clients: usize, hub_metadata: SampMap) -> Self {
        Self {
            clients: HashMap::new(),
            key_index: HashMap::new(),
            trie: SubscriptionTrie::new(),
            counter: 0,
            max_clients,
            hub_metadata,
        }
    }

    /// Allocate a record for a new client. The private key is supplied by
    /// the caller so each profile can apply its own key prefix.
    pub fn register(&mut self, private_key: String) -> HubResult<&ClientRecord> {
        if self.clients.len() >= self.max_clients {
            return Err(HubError::Overloaded);
        }
        self.counter += 1;
        let id = format!("c{:04}", self.counter);
        let record = ClientRecord {
            id: id.clone(),
            private_key: private_key.clone(),
            metadata: SampMap::new(),
            subscriptions: Subscriptions::new(),
            lane: None,
        };
        self.key_index.insert(private_key, id.clone());
        self.clients.insert(id.clone(), record);
        Ok(&self.clients[&id])
    }

    /// Remove a client, returning its record.
    pub fn unregister(&mut self, id: &str) -> Option<ClientRecord> {
        let record = self.clients.remove(id)?;
        self.key_index.remove(&record.private_key);
        self.trie.remove_client(&record.id);
        Some(record)
    }

    /// Map a private key to the owning client id.
    pub fn resolve_key(&self, private_key: &str) -> HubResult<&ClientRecord> {
        self.key_index
            .get(private_key)
            .and_then(|id| self.clients.get(id))
            .ok_or(HubError::AuthFailure)
    }

    pub fn get(&self, id: &str) -> Option<&ClientRecord> {
        self.clients.get(id)
    }

    /// Target lookup for `getMetadata`/`getSubscriptions`: the hub id and
    /// every live client are valid targets.
    pub fn target_metadata(&self, id: &str) -> HubResult<&SampMap> {
        if id == HUB_ID {
            return Ok(&self.hub_metadata);
        }
        self.clients
            .get(id)
            .map(|r| &r.metadata)
            .ok_or_else(|| HubError::UnknownTarget(id.to_string()))
    }

    pub fn target_subscriptions(&self, id: &str) -> HubResult<&Subscriptions> {
        self.clients
            .get(id)
            .map(|r| &r.subscriptions)
            .ok_or_else(|| HubError::UnknownTarget(id.to_string()))
    }

    pub fn set_metadata(&mut self, id: &str, metadata: SampMap) {
        if let Some(record) = self.clients.get_mut(id) {
            record.metadata = metadata;
        }
    }

    pub fn set_subscriptions(&mut self, id: &str, subs: Subscriptions) {
        if let Some(record) = self.clients.get_mut(id) {
            self.trie.set_subscriptions(&record.id, &subs);
            record.subscriptions = subs;
        }
    }

    /// Attach (or replace) a client's delivery lane.
    pub fn set_lane(&mut self, id: &str, lane: mpsc::Sender<Callback>) {
        if let Some(record) = self.clients.get_mut(id) {
            record.lane = Some(lane);
        }
    }

    /// Live public ids, excluding the given id and the hub.
    pub fn ids_excluding(&self, exclude: &str) -> Vec<ClientId> {
        let mut ids: Vec<_> = self
            .clients
            .keys()
            .filter(|id| *id != exclude)
            .cloned()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Callable clients subscribed to `mtype`, with the most specific
    /// matching config each.
    pub fn subscribers(&self, mtype: &MType) -> HashMap<ClientId, SampMap> {
        self.trie
            .subscribers(mtype)
            .into_iter()
            .filter(|(id, _)| {
                self.clients
                    .get(id)
                    .map(ClientRecord::is_callable)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Is the recipient callable and subscribed to `mtype`?
    pub fn accepts(&self, recipient: &ClientRecord, mtype: &MType) -> bool {
        recipient.is_callable() && recipient.subscriptions.best_match(mtype).is_some()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ClientRecord> {
        self.clients.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtype::MTypePattern;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(16, SampMap::new())
    }

    fn lane() -> mpsc::Sender<Callback> {
        mpsc::channel(8).0
    }

    #[test]
    fn test_register_allocates_sequential_ids() {
        let mut reg = registry();
        let a = reg.register("k-a".into()).unwrap().id.clone();
        let b = reg.register("k-b".into()).unwrap().id.clone();
        assert_eq!(a, "c0001");
        assert_eq!(b, "c0002");
    }

    #[test]
    fn test_key_id_bijection() {
        let mut reg = registry();
        let id = reg.register("k-a".into()).unwrap().id.clone();
        assert_eq!(reg.resolve_key("k-a").unwrap().id, id);
        assert!(reg.resolve_key("k-b").is_err());

        reg.unregister(&id);
        assert!(reg.resolve_key("k-a").is_err());
        assert!(reg.get(&id).is_none());
    }

    #[test]
    fn test_register_respects_limit() {
        let mut reg = ClientRegistry::new(2, SampMap::new());
        reg.register("a".into()).unwrap();
        reg.register("b".into()).unwrap();
        let err = reg.register("c".into()).unwrap_err();
        assert_eq!(err.code(), "Overloaded");
    }

    #[test]
    fn test_ids_do_not_recycle_after_unregister() {
        let mut reg = registry();
        let a = reg.register("a".into()).unwrap().id.clone();
        reg.unregister(&a);
        let b = reg.register("b".into()).unwrap().id.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn test_subscribers_require_callable() {
        let mut reg = registry();
        let id = reg.register("a".into()).unwrap().id.clone();
        let mut subs = Subscriptions::new();
        subs.insert(MTypePattern::parse("test.*").unwrap(), SampMap::new());
        reg.set_subscriptions(&id, subs);

        let mtype = MType::parse("test.ping").unwrap();
        assert!(reg.subscribers(&mtype).is_empty());

        reg.set_lane(&id, lane());
        assert_eq!(reg.subscribers(&mtype).len(), 1);
    }

    #[test]
    fn test_unregister_clears_subscription_index() {
        let mut reg = registry();
        let id = reg.register("a".into()).unwrap().id.clone();
        reg.set_lane(&id, lane());
        let mut subs = Subscriptions::new();
        subs.insert(MTypePattern::parse("*").unwrap(), SampMap::new());
        reg.set_subscriptions(&id, subs);

        reg.unregister(&id);
        assert!(reg
            .subscribers(&MType::parse("any.thing").unwrap())
            .is_empty());
    }

    #[test]
    fn test_hub_is_a_metadata_target() {
        let mut meta = SampMap::new();
        meta.insert("samp.name", crate::value::SampValue::string("hub"));
        let reg = ClientRegistry::new(4, meta);
        assert_eq!(reg.target_metadata(HUB_ID).unwrap().get_str("samp.name"), Some("hub"));
        assert!(reg.target_metadata("c9999").is_err());
    }

    #[test]
    fn test_keygen_tokens_unique_and_prefixed() {
        let kg = KeyGenerator::new();
        let a = kg.generate("wk:");
        let b = kg.generate("wk:");
        assert!(a.starts_with("wk:"));
        assert_ne!(a, b);
        assert!(a.len() > 20);
    }
}
