// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # samp - Simple Application Messaging Protocol hub and client runtime
//!
//! A pure Rust implementation of the SAMP hub used to federate desktop
//! astronomy applications on one machine, together with the client runtime
//! applications use to talk to it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use samp::config::HubConfig;
//! use samp::hub::Hub;
//! use samp::profile::standard::StandardProfile;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(Hub::new(HubConfig::default()));
//! let profile = StandardProfile::start(hub.clone()).await?;
//! println!("hub at {}", profile.url);
//! hub.stopped().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Client Applications                         |
//! |        HubConnection -> register/notify/call/reply/callbacks        |
//! +---------------------------------------------------------------------+
//! |                             Profiles                                |
//! |   Standard (lockfile + XML-RPC)   |   Web (origin checks + pulls)   |
//! +---------------------------------------------------------------------+
//! |                             Hub Core                                |
//! |   Registry | Subscription Trie | Message Routing | Call Tracking    |
//! +---------------------------------------------------------------------+
//! |                        Transport Adapter                            |
//! |   Method dispatch table | XML-RPC codec | JSON frames | HTTP POST   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`hub::Hub`] | The broker: registry, routing, call tracking |
//! | [`profile::standard::StandardProfile`] | Lockfile discovery + XML-RPC server |
//! | [`profile::web::WebProfile`] | Single-endpoint HTTP service for browser clients |
//! | [`client::HubConnection`] | Application-side registration and messaging |
//! | [`value::SampValue`] | The strings/lists/mappings value tree |

/// Client runtime (discovery, registration, messaging, callbacks).
pub mod client;
/// Hub configuration (explicit, no globals).
pub mod config;
/// Error taxonomy shared by hub methods and profiles.
pub mod error;
/// The hub service: registry, routing, call tracking, lifecycle events.
pub mod hub;
/// Standard Profile lockfile reading and writing.
pub mod lockfile;
/// MTypes, subscription patterns, and the matching trie.
pub mod mtype;
/// Profiles: Standard (lockfile + XML-RPC) and Web (origin checks + pulls).
pub mod profile;
/// Transport adapter: dispatch table, wire codecs, outbound calls.
pub mod transport;
/// SAMP value model (strings, lists, mappings).
pub mod value;

pub use client::{CallableClient, HubConnection};
pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use hub::{Hub, HubObserver};
pub use value::{SampMap, SampValue};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
