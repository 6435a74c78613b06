// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Web Profile scenarios: JSON registration, pull queues with overflow,
//! origin authorization, CORS preflight.

use samp::config::HubConfig;
use samp::hub::Hub;
use samp::profile::web::{AllowAll, DenyAll, WebProfile};
use samp::value::{SampMap, SampValue};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    hub: Arc<Hub>,
    url: String,
    http: reqwest::Client,
}

async fn start_web(queue_bound: usize, deny: bool) -> Fixture {
    let hub = Arc::new(Hub::new(HubConfig {
        web_port: 0,
        callback_queue_bound: queue_bound,
        shutdown_grace_ms: 0,
        ..Default::default()
    }));
    let profile = if deny {
        WebProfile::start(hub.clone(), Arc::new(DenyAll), Arc::new(AllowAll))
            .await
            .unwrap()
    } else {
        WebProfile::start(hub.clone(), Arc::new(AllowAll), Arc::new(AllowAll))
            .await
            .unwrap()
    };
    Fixture {
        hub,
        url: profile.url.clone(),
        http: reqwest::Client::new(),
    }
}

fn frame(method: &str, params: Vec<SampValue>) -> String {
    let mut map = SampMap::new();
    map.insert("samp.methodName", SampValue::string(method));
    map.insert("samp.params", SampValue::List(params));
    SampValue::Map(map).to_json(false)
}

async fn post(fixture: &Fixture, origin: Option<&str>, body: String) -> (u16, SampValue) {
    let mut req = fixture.http.post(&fixture.url).body(body);
    if let Some(origin) = origin {
        req = req.header("Origin", origin);
    }
    let resp = req.send().await.unwrap();
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap();
    let value = SampValue::from_json(&text).unwrap();
    (status, value)
}

/// Invoke a method and unwrap the `samp.result` payload.
async fn invoke(fixture: &Fixture, method: &str, params: Vec<SampValue>) -> SampValue {
    let (status, value) = post(fixture, Some("https://app.example"), frame(method, params)).await;
    assert_eq!(status, 200);
    value
        .as_map()
        .and_then(|m| m.get("samp.result"))
        .unwrap_or_else(|| panic!("no result in {}", value))
        .clone()
}

async fn register(fixture: &Fixture) -> (String, String) {
    let mut identity = SampMap::new();
    identity.insert("samp.name", SampValue::string("test-app"));
    let result = invoke(
        fixture,
        "samp.webhub.register",
        vec![SampValue::Map(identity)],
    )
    .await;
    let map = result.as_map().unwrap();
    (
        map.get_str("samp.self-id").unwrap().to_string(),
        map.get_str("samp.private-key").unwrap().to_string(),
    )
}

#[tokio::test]
async fn register_returns_prefixed_key() {
    let fixture = start_web(64, false).await;
    let (id, key) = register(&fixture).await;
    assert!(id.starts_with('c'));
    assert!(key.starts_with("wk:"));
    fixture.hub.shutdown().await;
}

#[tokio::test]
async fn denied_registration_is_http_403() {
    let fixture = start_web(64, true).await;
    let (status, value) = post(
        &fixture,
        Some("https://evil.example"),
        frame("samp.webhub.register", vec![]),
    )
    .await;
    assert_eq!(status, 403);
    let map = value.as_map().unwrap();
    assert_eq!(map.get_str("samp.code"), Some("AuthFailure"));
    fixture.hub.shutdown().await;
}

#[tokio::test]
async fn pull_queue_overflow_keeps_newest_three() {
    let fixture = start_web(3, false).await;

    // W subscribes to registration events.
    let (_w_id, w_key) = register(&fixture).await;
    let mut subs = SampMap::new();
    subs.insert("samp.hub.event.register", SampValue::Map(SampMap::new()));
    invoke(
        &fixture,
        "samp.webhub.declareSubscriptions",
        vec![SampValue::string(&w_key), SampValue::Map(subs)],
    )
    .await;

    // Five other clients register while W never polls.
    let mut newcomers = Vec::new();
    for _ in 0..5 {
        let (id, _) = register(&fixture).await;
        newcomers.push(id);
    }

    // Give the lane feeders a moment to drain into the queue.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let batch = invoke(
        &fixture,
        "samp.webhub.pullCallbacks",
        vec![SampValue::string(&w_key), SampValue::string("1")],
    )
    .await;
    let items = batch.as_list().unwrap();
    assert_eq!(items.len(), 3, "expected exactly the last 3 events");

    let event_ids: Vec<&str> = items
        .iter()
        .map(|item| {
            let frame = item.as_map().unwrap();
            let params = frame.get("samp.params").unwrap().as_list().unwrap();
            // receiveNotification params: [senderId, message]
            let message = params[1].as_map().unwrap();
            message
                .get_map("samp.params")
                .unwrap()
                .get_str("id")
                .unwrap()
        })
        .collect();
    assert_eq!(event_ids, newcomers[2..].iter().map(String::as_str).collect::<Vec<_>>());

    fixture.hub.shutdown().await;
}

#[tokio::test]
async fn idle_pull_returns_empty_list() {
    let fixture = start_web(8, false).await;
    let (_id, key) = register(&fixture).await;

    let batch = invoke(
        &fixture,
        "samp.webhub.pullCallbacks",
        vec![SampValue::string(&key), SampValue::string("1")],
    )
    .await;
    assert!(batch.as_list().unwrap().is_empty());
    fixture.hub.shutdown().await;
}

#[tokio::test]
async fn web_clients_can_message_each_other() {
    let fixture = start_web(64, false).await;
    let (x_id, x_key) = register(&fixture).await;
    let (_y_id, y_key) = register(&fixture).await;

    let mut subs = SampMap::new();
    subs.insert("test.ping", SampValue::Map(SampMap::new()));
    invoke(
        &fixture,
        "samp.webhub.declareSubscriptions",
        vec![SampValue::string(&x_key), SampValue::Map(subs)],
    )
    .await;

    let mut message = SampMap::new();
    message.insert("samp.mtype", SampValue::string("test.ping"));
    message.insert("samp.params", SampValue::Map(SampMap::new()));
    invoke(
        &fixture,
        "samp.webhub.notify",
        vec![
            SampValue::string(&y_key),
            SampValue::string(&x_id),
            SampValue::Map(message),
        ],
    )
    .await;

    let batch = invoke(
        &fixture,
        "samp.webhub.pullCallbacks",
        vec![SampValue::string(&x_key), SampValue::string("5")],
    )
    .await;
    let items = batch.as_list().unwrap();
    assert_eq!(items.len(), 1);
    let frame = items[0].as_map().unwrap();
    assert_eq!(
        frame.get_str("samp.methodName"),
        Some("samp.client.receiveNotification")
    );

    fixture.hub.shutdown().await;
}

#[tokio::test]
async fn cors_preflight_echoes_approved_origin() {
    let fixture = start_web(8, false).await;

    let resp = fixture
        .http
        .request(reqwest::Method::OPTIONS, &fixture.url)
        .header("Origin", "https://app.example")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert_eq!(
        resp.headers()
            .get("Access-Control-Allow-Origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "https://app.example"
    );
    assert_eq!(
        resp.headers()
            .get("Access-Control-Allow-Credentials")
            .unwrap()
            .to_str()
            .unwrap(),
        "true"
    );

    // No Origin header at all: not a browser, refuse the preflight.
    let resp = fixture
        .http
        .request(reqwest::Method::OPTIONS, &fixture.url)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    fixture.hub.shutdown().await;
}

#[tokio::test]
async fn unknown_method_is_a_fault_frame() {
    let fixture = start_web(8, false).await;
    let (status, value) = post(
        &fixture,
        None,
        frame("samp.webhub.nonsense", vec![]),
    )
    .await;
    assert_eq!(status, 200);
    let map = value.as_map().unwrap();
    assert_eq!(map.get_str("samp.code"), Some("TransportFailure"));
    assert!(map.get_str("samp.error").unwrap().contains("nonsense"));
    fixture.hub.shutdown().await;
}
