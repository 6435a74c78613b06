// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lockfile contract: required keys, owner-only permissions, wrong-secret
//! rejection, deletion on shutdown.

use samp::client::HubConnection;
use samp::config::HubConfig;
use samp::hub::Hub;
use samp::lockfile::LockInfo;
use samp::profile::standard::StandardProfile;
use samp::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn lockfile_contract() {
    let lockdir = tempfile::tempdir().unwrap();
    let lock_path = lockdir.path().join(".samp");
    let hub = Arc::new(Hub::new(HubConfig {
        lockfile_path: Some(lock_path.clone()),
        shutdown_grace_ms: 0,
        ..Default::default()
    }));
    let profile = StandardProfile::start(hub.clone()).await.unwrap();

    // Required keys are present and valid.
    let info = LockInfo::read(&lock_path).unwrap();
    info.check().unwrap();
    assert_eq!(info.get("samp.profile.version"), Some("1.0"));
    assert_eq!(info.get("samp.hub.xmlrpc.url"), Some(profile.url.as_str()));
    assert!(info.get("samp.secret").is_some());

    // Owner-readable only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&lock_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "lockfile mode {:o} is group/world accessible", mode);
    }

    // The advertised endpoint accepts the real secret.
    let conn = HubConnection::connect_to(&profile.url, &profile.secret)
        .await
        .unwrap();
    assert_eq!(conn.hub_id(), "hub");

    // A wrong secret fails with AuthFailure.
    let err = HubConnection::connect_to(&profile.url, "wrong-secret")
        .await
        .unwrap_err();
    match err {
        samp::client::ClientError::Transport(TransportError::Remote { message, .. }) => {
            assert!(message.contains("AuthFailure"), "fault was: {}", message);
        }
        other => panic!("expected remote fault, got {:?}", other),
    }

    // Discovery through the lockfile path finds the same hub.
    let via_lockfile = HubConnection::connect(Some(&lock_path)).await.unwrap();
    assert_eq!(via_lockfile.hub_id(), "hub");

    // Shutdown deletes the lockfile.
    hub.shutdown().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!lock_path.exists(), "lockfile survived shutdown");
}

#[tokio::test]
async fn removing_lockfile_stops_the_hub() {
    let lockdir = tempfile::tempdir().unwrap();
    let lock_path = lockdir.path().join(".samp");
    let hub = Arc::new(Hub::new(HubConfig {
        lockfile_path: Some(lock_path.clone()),
        lockfile_poll_secs: 1,
        shutdown_grace_ms: 0,
        ..Default::default()
    }));
    let _profile = StandardProfile::start(hub.clone()).await.unwrap();
    assert!(hub.is_accepting());

    std::fs::remove_file(&lock_path).unwrap();

    // The watcher polls every second; give it a few chances.
    tokio::time::timeout(Duration::from_secs(10), hub.stopped())
        .await
        .expect("hub did not notice the missing lockfile");
    assert!(!hub.is_accepting());
}
