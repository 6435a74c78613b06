// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracking of outstanding calls.
//!
//! Every `call` mints a message id and records an entry until the recipient
//! replies, the caller's wait times out, or either party unregisters. The
//! entry optionally carries a one-shot rendezvous used by `callAndWait`.

use crate::error::{HubError, HubResult};
use crate::hub::registry::{ClientId, KeyGenerator};
use crate::value::SampValue;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// How long a timed-out message id keeps absorbing late replies.
const TOMBSTONE_TTL: Duration = Duration::from_secs(60);

/// One outstanding call.
pub struct CallEntry {
    pub msg_id: String,
    /// Caller-supplied opaque correlator, echoed in `receiveResponse`.
    pub tag: String,
    pub sender: ClientId,
    pub recipient: ClientId,
    /// Present for `callAndWait`: resolving this delivers the response to
    /// the parked caller instead of its callback endpoint.
    pub waiter: Option<oneshot::Sender<SampValue>>,
}

/// What `reply` should do with a completed entry.
#[derive(Debug)]
pub enum Completion {
    /// Wake the parked `callAndWait` caller.
    Waiter(oneshot::Sender<SampValue>, ClientId),
    /// Route a `receiveResponse` callback to the original sender.
    Route { sender: ClientId, tag: String },
    /// The wait already timed out; drop the response silently.
    Dropped,
}

/// Concurrent map of outstanding calls, keyed by message id.
pub struct CallTracker {
    entries: DashMap<String, CallEntry>,
    /// Message ids whose `callAndWait` timed out; late replies are dropped.
    tombstones: DashMap<String, Instant>,
    seq: AtomicU64,
    keygen: KeyGenerator,
}

impl CallTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            tombstones: DashMap::new(),
            seq: AtomicU64::new(0),
            keygen: KeyGenerator::new(),
        }
    }

    /// Mint a message id and record the entry. The id carries a sequence
    /// number and a fresh random token; recipients must treat it as opaque.
    pub fn issue(
        &self,
        sender: &str,
        recipient: &str,
        tag: &str,
        waiter: Option<oneshot::Sender<SampValue>>,
    ) -> String {
        self.purge_tombstones();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let msg_id = format!("mid:{}:{}", seq, self.keygen.generate(""));
        self.entries.insert(
            msg_id.clone(),
            CallEntry {
                msg_id: msg_id.clone(),
                tag: tag.to_string(),
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                waiter,
            },
        );
        msg_id
    }

    /// Complete an entry with a reply from `replier`.
    ///
    /// The replier must be the original recipient; anything else (including
    /// a reply to a never-issued id) is `UnknownMsgId`.
    pub fn complete(&self, msg_id: &str, replier: &str) -> HubResult<Completion> {
        if self.tombstones.remove(msg_id).is_some() {
            return Ok(Completion::Dropped);
        }
        // Check identity before removing so a wrong replier cannot destroy
        // the entry.
        {
            let entry = self
                .entries
                .get(msg_id)
                .ok_or_else(|| HubError::UnknownMsgId(msg_id.to_string()))?;
            if entry.recipient != replier {
                return Err(HubError::UnknownMsgId(msg_id.to_string()));
            }
        }
        let (_, entry) = self
            .entries
            .remove(msg_id)
            .ok_or_else(|| HubError::UnknownMsgId(msg_id.to_string()))?;
        Ok(match entry.waiter {
            Some(tx) => Completion::Waiter(tx, entry.sender),
            None => Completion::Route {
                sender: entry.sender,
                tag: entry.tag,
            },
        })
    }

    /// Remove a timed-out entry and leave a tombstone absorbing the late
    /// reply, if one ever arrives.
    pub fn expire(&self, msg_id: &str) {
        if self.entries.remove(msg_id).is_some() {
            self.tombstones.insert(msg_id.to_string(), Instant::now());
        }
    }

    /// Abandon every entry referencing an unregistering client.
    ///
    /// Entries where the client was the *sender* are dropped outright;
    /// dropping their waiters wakes the client's own parked calls. Entries
    /// where it was the *recipient* are returned so the hub can synthesize
    /// error responses to the surviving senders.
    pub fn abandon_for(&self, client: &str) -> Vec<CallEntry> {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.sender == client || e.recipient == client)
            .map(|e| e.msg_id.clone())
            .collect();

        let mut as_recipient = Vec::new();
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                if entry.recipient == client && entry.sender != client {
                    as_recipient.push(entry);
                }
            }
        }
        as_recipient
    }

    /// Drain everything at hub shutdown, returning the entries so waiters
    /// can be woken with a synthetic error.
    pub fn drain(&self) -> Vec<CallEntry> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.msg_id.clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, e)| e))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_tombstones(&self) {
        if self.tombstones.is_empty() {
            return;
        }
        let now = Instant::now();
        self.tombstones
            .retain(|_, stamped| now.duration_since(*stamped) < TOMBSTONE_TTL);
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}
