// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Standard Profile lockfile: the hub's rendezvous point.
//!
//! A UTF-8 text file of `key=value` lines advertising a running hub's RPC
//! endpoint and shared secret. The hub writes it at startup (owner-readable
//! only, atomically) and deletes it at shutdown; clients read it to discover
//! the hub.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Fixed first line of every lockfile this hub writes.
pub const LOCKFILE_HEADER: &str = "# SAMP Standard Profile lockfile";

/// Required key: shared registration secret.
pub const KEY_SECRET: &str = "samp.secret";
/// Required key: hub RPC endpoint URL.
pub const KEY_XMLRPC_URL: &str = "samp.hub.xmlrpc.url";
/// Required key: profile version, always `"1.0"`.
pub const KEY_PROFILE_VERSION: &str = "samp.profile.version";

/// The profile version this implementation speaks.
pub const PROFILE_VERSION: &str = "1.0";

/// Environment variable overriding hub discovery.
pub const ENV_SAMP_HUB: &str = "SAMP_HUB";
/// Recognised prefix for [`ENV_SAMP_HUB`].
pub const STD_LOCKURL_PREFIX: &str = "std-lockurl:";

/// Lockfile errors.
#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("I/O error on lockfile: {0}")]
    Io(#[from] std::io::Error),

    /// A required key is missing. Raised by [`LockInfo::check`], not by
    /// parsing.
    #[error("incomplete lock info: missing {0}")]
    IncompleteLockInfo(&'static str),

    #[error("cannot interpret lock URL {0:?}")]
    BadLockUrl(String),

    #[error("no home directory and no explicit lockfile path")]
    NoHome,
}

/// Parsed contents of a lockfile.
///
/// Unknown keys survive a parse/serialize round trip; the hub appends its
/// own implementation keys under the `samp.hub.` prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockInfo {
    entries: Vec<(String, String)>,
}

impl LockInfo {
    /// Build the lock info a hub publishes.
    pub fn new(secret: impl Into<String>, xmlrpc_url: impl Into<String>) -> Self {
        let mut info = Self::default();
        info.set(KEY_SECRET, secret.into());
        info.set(KEY_XMLRPC_URL, xmlrpc_url.into());
        info.set(KEY_PROFILE_VERSION, PROFILE_VERSION.to_string());
        info
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a key, preserving first-insertion order.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// The shared secret, if present.
    pub fn secret(&self) -> Option<&str> {
        self.get(KEY_SECRET)
    }

    /// The hub endpoint URL, if present.
    pub fn xmlrpc_url(&self) -> Option<&str> {
        self.get(KEY_XMLRPC_URL)
    }

    /// Explicit validation: all required keys present.
    pub fn check(&self) -> Result<(), LockfileError> {
        for key in [KEY_SECRET, KEY_XMLRPC_URL, KEY_PROFILE_VERSION] {
            if self.get(key).is_none() {
                return Err(LockfileError::IncompleteLockInfo(key));
            }
        }
        Ok(())
    }

    /// Parse lockfile text. Tolerates whitespace around `=`, skips blank
    /// lines and `#` comments, keeps unknown keys. Does not validate.
    pub fn parse(text: &str) -> Self {
        let mut info = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                info.set(key.trim(), value.trim());
            }
        }
        info
    }

    /// Serialize with the fixed header, required keys first in a stable
    /// order, then any extra keys in insertion order.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(LOCKFILE_HEADER);
        out.push('\n');
        for key in [KEY_SECRET, KEY_XMLRPC_URL, KEY_PROFILE_VERSION] {
            if let Some(value) = self.get(key) {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        for (key, value) in &self.entries {
            if key != KEY_SECRET && key != KEY_XMLRPC_URL && key != KEY_PROFILE_VERSION {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }

    /// Read and parse a lockfile from disk.
    pub fn read(path: &Path) -> Result<Self, LockfileError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Write atomically: serialize to a `.tmp` sibling created with
    /// owner-only permissions, then rename over the target.
    pub fn write(&self, path: &Path) -> Result<(), LockfileError> {
        let tmp = sibling_tmp(path);
        {
            let mut opts = std::fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                opts.mode(0o600);
            }
            let mut file = opts.open(&tmp)?;
            file.write_all(self.serialize().as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| ".samp".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Where to find a hub's lock info.
#[derive(Debug, Clone, PartialEq)]
pub enum HubLocation {
    /// A lockfile on the local filesystem.
    Path(PathBuf),
    /// A lock document served at a URL (from `std-lockurl:`).
    Url(String),
}

/// Resolve the lockfile location from the process environment.
///
/// Order: `$SAMP_HUB` with the `std-lockurl:` prefix, then the explicit
/// override, then `$HOME/.samp`.
pub fn resolve_location(override_path: Option<&Path>) -> Result<HubLocation, LockfileError> {
    resolve_location_with(
        std::env::var(ENV_SAMP_HUB).ok().as_deref(),
        override_path,
        std::env::var_os("HOME").map(PathBuf::from).as_deref(),
    )
}

/// Environment-free resolution core, for tests and embedding.
pub fn resolve_location_with(
    samp_hub: Option<&str>,
    override_path: Option<&Path>,
    home: Option<&Path>,
) -> Result<HubLocation, LockfileError> {
    if let Some(value) = samp_hub {
        if let Some(url) = value.strip_prefix(STD_LOCKURL_PREFIX) {
            if let Some(path) = file_url_to_path(url) {
                return Ok(HubLocation::Path(path));
            }
            if url.contains("://") {
                return Ok(HubLocation::Url(url.to_string()));
            }
            return Err(LockfileError::BadLockUrl(url.to_string()));
        }
        if !value.is_empty() {
            warn!(value, "ignoring {} without {} prefix", ENV_SAMP_HUB, STD_LOCKURL_PREFIX);
        }
    }
    if let Some(path) = override_path {
        return Ok(HubLocation::Path(path.to_path_buf()));
    }
    match home {
        Some(home) => Ok(HubLocation::Path(home.join(".samp"))),
        None => Err(LockfileError::NoHome),
    }
}

/// Interpret `file:` URLs (`file:/p`, `file:///p`, `file://localhost/p`).
fn file_url_to_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("file:")?;
    let path = if let Some(hostpath) = rest.strip_prefix("//") {
        // Skip an optional host component.
        let slash = hostpath.find('/')?;
        let (host, path) = hostpath.split_at(slash);
        if !host.is_empty() && host != "localhost" {
            return None;
        }
        path
    } else {
        rest
    };
    if path.starts_with('/') {
        Some(PathBuf::from(path))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_serialize_has_header_and_stable_order() {
        let mut info = LockInfo::new("s3cret", "http://127.0.0.1:1234/");
        info.set("samp.hub.impl", "samp-rs");
        let text = info.serialize();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], LOCKFILE_HEADER);
        assert_eq!(lines[1], "samp.secret=s3cret");
        assert_eq!(lines[2], "samp.hub.xmlrpc.url=http://127.0.0.1:1234/");
        assert_eq!(lines[3], "samp.profile.version=1.0");
        assert_eq!(lines[4], "samp.hub.impl=samp-rs");
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_comments() {
        let text = "# a comment\n\n  samp.secret =  abc \nsamp.hub.xmlrpc.url=http://h/\nsamp.profile.version = 1.0\nx.unknown=kept\n";
        let info = LockInfo::parse(text);
        assert_eq!(info.secret(), Some("abc"));
        assert_eq!(info.get("x.unknown"), Some("kept"));
        assert!(info.check().is_ok());
    }

    #[test]
    fn test_check_reports_missing_key() {
        let mut info = LockInfo::default();
        info.set(KEY_SECRET, "abc");
        match info.check() {
            Err(LockfileError::IncompleteLockInfo(key)) => assert_eq!(key, KEY_XMLRPC_URL),
            other => panic!("expected IncompleteLockInfo, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_does_not_validate() {
        let info = LockInfo::parse("just=garbage\n");
        assert_eq!(info.get("just"), Some("garbage"));
        assert!(info.check().is_err());
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".samp");
        let info = LockInfo::new("tok", "http://127.0.0.1:9999/");
        info.write(&path).unwrap();

        let back = LockInfo::read(&path).unwrap();
        assert_eq!(back, info);
        assert!(!path.with_file_name(".samp.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join(".samp");
        LockInfo::new("tok", "http://h/").write(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_resolution_order() {
        let home = Path::new("/home/u");
        let over = Path::new("/tmp/other.samp");

        // Default: $HOME/.samp
        assert_eq!(
            resolve_location_with(None, None, Some(home)).unwrap(),
            HubLocation::Path(PathBuf::from("/home/u/.samp"))
        );

        // Override beats home
        assert_eq!(
            resolve_location_with(None, Some(over), Some(home)).unwrap(),
            HubLocation::Path(over.to_path_buf())
        );

        // std-lockurl beats both
        assert_eq!(
            resolve_location_with(Some("std-lockurl:file:///var/lock"), Some(over), Some(home))
                .unwrap(),
            HubLocation::Path(PathBuf::from("/var/lock"))
        );

        // Other SAMP_HUB values are ignored
        assert_eq!(
            resolve_location_with(Some("classname:foo"), None, Some(home)).unwrap(),
            HubLocation::Path(PathBuf::from("/home/u/.samp"))
        );

        // No home at all
        assert!(matches!(
            resolve_location_with(None, None, None),
            Err(LockfileError::NoHome)
        ));
    }

    #[test]
    fn test_lockurl_http_passthrough() {
        assert_eq!(
            resolve_location_with(Some("std-lockurl:http://h/x"), None, None).unwrap(),
            HubLocation::Url("http://h/x".into())
        );
    }

    #[test]
    fn test_file_url_forms() {
        assert_eq!(file_url_to_path("file:/a/b"), Some(PathBuf::from("/a/b")));
        assert_eq!(file_url_to_path("file:///a/b"), Some(PathBuf::from("/a/b")));
        assert_eq!(
            file_url_to_path("file://localhost/a"),
            Some(PathBuf::from("/a"))
        );
        assert_eq!(file_url_to_path("file://otherhost/a"), None);
        assert_eq!(file_url_to_path("http://h/"), None);
    }
}
