// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Profiles: concrete transport and discovery bindings over the hub core.
//!
//! Both profiles translate wire requests into [`Hub`](crate::hub::Hub) calls
//! through the same dispatch table; only registration evidence, callback
//! delivery, and discovery differ.

pub mod standard;
pub mod web;

use crate::error::{HubError, HubResult};
use crate::hub::Hub;
use crate::lockfile::LockfileError;
use crate::transport::{handler, MethodMap, TransportError};
use crate::value::SampValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors starting or running a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("bind error: {0}")]
    Bind(String),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Positional argument access with uniform validation errors.
pub(crate) fn arg<'a>(params: &'a [SampValue], index: usize) -> HubResult<&'a SampValue> {
    params
        .get(index)
        .ok_or_else(|| HubError::malformed(format!("missing argument {}", index), ""))
}

pub(crate) fn arg_str<'a>(params: &'a [SampValue], index: usize) -> HubResult<&'a str> {
    arg(params, index)?
        .as_str()
        .ok_or_else(|| HubError::malformed(format!("argument {} must be a string", index), ""))
}

/// Parse a SAMP timeout argument (decimal seconds). Non-positive values
/// mean an unbounded wait.
pub(crate) fn parse_timeout(text: &str) -> HubResult<Option<Duration>> {
    let secs: i64 = text
        .trim()
        .parse()
        .map_err(|_| HubError::malformed(format!("bad timeout {:?}", text), ""))?;
    if secs <= 0 {
        Ok(None)
    } else {
        Ok(Some(Duration::from_secs(secs as u64)))
    }
}

/// Empty result for void methods (XML-RPC needs some value).
pub(crate) fn void() -> SampValue {
    SampValue::string("")
}

/// Populate the method table shared by both profiles.
///
/// `prefix` is the wire namespace (`samp.hub.` or `samp.webhub.`);
/// registration and callback declaration are profile-specific and added by
/// the caller.
pub(crate) fn hub_methods(hub: &Arc<Hub>, prefix: &str) -> MethodMap {
    let mut map = MethodMap::new();
    let name = |m: &str| format!("{}{}", prefix, m);

    let h = hub.clone();
    map.insert(
        name("ping"),
        handler(move |_ctx, _params| {
            let hub = h.clone();
            async move {
                hub.ping()?;
                Ok(void())
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("unregister"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                hub.unregister(arg_str(&params, 0)?).await?;
                Ok(void())
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("declareMetadata"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let metadata = arg(&params, 1)?.clone();
                hub.declare_metadata(&key, metadata).await?;
                Ok(void())
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("getMetadata"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let meta = hub
                    .get_metadata(arg_str(&params, 0)?, arg_str(&params, 1)?)
                    .await?;
                Ok(SampValue::Map(meta))
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("declareSubscriptions"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let subs = arg(&params, 1)?.clone();
                hub.declare_subscriptions(&key, subs).await?;
                Ok(void())
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("getSubscriptions"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                hub.get_subscriptions(arg_str(&params, 0)?, arg_str(&params, 1)?)
                    .await
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("getRegisteredClients"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let ids = hub.get_registered_clients(arg_str(&params, 0)?).await?;
                Ok(SampValue::List(
                    ids.into_iter().map(SampValue::Str).collect(),
                ))
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("getSubscribedClients"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let subs = hub
                    .get_subscribed_clients(arg_str(&params, 0)?, arg_str(&params, 1)?)
                    .await?;
                Ok(SampValue::Map(subs))
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("notify"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let recipient = arg_str(&params, 1)?.to_string();
                let message = arg(&params, 2)?.clone();
                hub.notify(&key, &recipient, message).await?;
                Ok(void())
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("notifyAll"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let message = arg(&params, 1)?.clone();
                let sent = hub.notify_all(&key, message).await?;
                Ok(SampValue::List(
                    sent.into_iter().map(SampValue::Str).collect(),
                ))
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("call"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let recipient = arg_str(&params, 1)?.to_string();
                let tag = arg_str(&params, 2)?.to_string();
                let message = arg(&params, 3)?.clone();
                let msg_id = hub.call(&key, &recipient, &tag, message).await?;
                Ok(SampValue::string(msg_id))
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("callAll"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let tag = arg_str(&params, 1)?.to_string();
                let message = arg(&params, 2)?.clone();
                let ids = hub.call_all(&key, &tag, message).await?;
                Ok(SampValue::Map(ids))
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("callAndWait"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let recipient = arg_str(&params, 1)?.to_string();
                let message = arg(&params, 2)?.clone();
                let timeout = parse_timeout(arg_str(&params, 3)?)?;
                hub.call_and_wait(&key, &recipient, message, timeout).await
            }
        }),
    );

    let h = hub.clone();
    map.insert(
        name("reply"),
        handler(move |_ctx, params| {
            let hub = h.clone();
            async move {
                let key = arg_str(&params, 0)?.to_string();
                let msg_id = arg_str(&params, 1)?.to_string();
                let response = arg(&params, 2)?.clone();
                hub.reply(&key, &msg_id, response).await?;
                Ok(void())
            }
        }),
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("5").unwrap(), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout(" 10 ").unwrap(), Some(Duration::from_secs(10)));
        assert_eq!(parse_timeout("0").unwrap(), None);
        assert_eq!(parse_timeout("-1").unwrap(), None);
        assert!(parse_timeout("fast").is_err());
    }

    #[test]
    fn test_arg_access() {
        let params = vec![SampValue::string("a")];
        assert_eq!(arg_str(&params, 0).unwrap(), "a");
        assert!(arg_str(&params, 1).is_err());
        assert!(arg_str(&[SampValue::List(vec![])], 0).is_err());
    }

    #[tokio::test]
    async fn test_hub_methods_cover_contract() {
        let hub = Arc::new(Hub::new(crate::config::HubConfig::default()));
        let map = hub_methods(&hub, "samp.hub.");
        for method in [
            "ping",
            "unregister",
            "declareMetadata",
            "getMetadata",
            "declareSubscriptions",
            "getSubscriptions",
            "getRegisteredClients",
            "getSubscribedClients",
            "notify",
            "notifyAll",
            "call",
            "callAll",
            "callAndWait",
            "reply",
        ] {
            let name = format!("samp.hub.{}", method);
            assert!(
                map.method_names().any(|m| m == name),
                "missing handler for {}",
                name
            );
        }
    }
}
