// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON frames for the Web Profile.
//!
//! Requests, responses, and queued callbacks all share one shape built from
//! the strings-only JSON mapping of the SAMP value model:
//!
//! - request: `{"samp.methodName": <string>, "samp.params": <list>}`
//! - success: `{"samp.result": <value>}`
//! - failure: `{"samp.code": <string>, "samp.error": <string>}`
//!
//! Pulled callbacks reuse the request shape.

use crate::error::HubError;
use crate::transport::{Callback, TransportError};
use crate::value::{SampMap, SampValue};

/// Key naming the invoked method.
pub const KEY_METHOD: &str = "samp.methodName";
/// Key carrying the positional parameter list.
pub const KEY_PARAMS: &str = "samp.params";
/// Key carrying a successful result.
pub const KEY_RESULT: &str = "samp.result";
/// Key carrying an error message.
pub const KEY_ERROR: &str = "samp.error";
/// Key carrying the error kind.
pub const KEY_CODE: &str = "samp.code";

/// Decode a request frame into `(method, params)`.
pub fn decode_request(body: &str) -> Result<(String, Vec<SampValue>), TransportError> {
    let value =
        SampValue::from_json(body).map_err(|e| TransportError::Codec(e.to_string()))?;
    let map = value
        .as_map()
        .ok_or_else(|| TransportError::Codec("request frame is not a mapping".into()))?;
    let method = map
        .get_str(KEY_METHOD)
        .ok_or_else(|| TransportError::Codec(format!("missing {}", KEY_METHOD)))?
        .to_string();
    let params = match map.get(KEY_PARAMS) {
        Some(SampValue::List(items)) => items.clone(),
        Some(_) => {
            return Err(TransportError::Codec(format!(
                "{} is not a list",
                KEY_PARAMS
            )))
        }
        None => Vec::new(),
    };
    Ok((method, params))
}

/// Encode a request frame (also the shape of a pulled callback).
pub fn encode_request(method: &str, params: &[SampValue]) -> String {
    frame(method, params).to_json(false)
}

/// Build the frame value for a queued callback.
pub fn callback_frame(cb: &Callback) -> SampValue {
    frame(&cb.method, &cb.params)
}

fn frame(method: &str, params: &[SampValue]) -> SampValue {
    let mut map = SampMap::new();
    map.insert(KEY_METHOD, SampValue::string(method));
    map.insert(KEY_PARAMS, SampValue::List(params.to_vec()));
    SampValue::Map(map)
}

/// Encode a success response frame.
pub fn encode_result(result: &SampValue) -> String {
    let mut map = SampMap::new();
    map.insert(KEY_RESULT, result.clone());
    SampValue::Map(map).to_json(false)
}

/// Encode a failure response frame.
pub fn encode_error(err: &HubError) -> String {
    let mut map = SampMap::new();
    map.insert(KEY_CODE, SampValue::string(err.code()));
    map.insert(KEY_ERROR, SampValue::string(err.to_string()));
    SampValue::Map(map).to_json(false)
}

/// Decode a response frame: the result value, or [`TransportError::Remote`]
/// carrying the error text.
pub fn decode_response(body: &str) -> Result<SampValue, TransportError> {
    let value =
        SampValue::from_json(body).map_err(|e| TransportError::Codec(e.to_string()))?;
    let map = value
        .as_map()
        .ok_or_else(|| TransportError::Codec("response frame is not a mapping".into()))?;
    if let Some(result) = map.get(KEY_RESULT) {
        return Ok(result.clone());
    }
    if let Some(error) = map.get_str(KEY_ERROR) {
        return Err(TransportError::Remote {
            code: crate::transport::xmlrpc::FAULT_CODE,
            message: error.to_string(),
        });
    }
    Err(TransportError::Codec(
        "response frame has neither result nor error".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let params = vec![
            SampValue::string("wk:abc"),
            SampValue::from_int(5),
        ];
        let body = encode_request("samp.webhub.pullCallbacks", &params);
        let (method, decoded) = decode_request(&body).unwrap();
        assert_eq!(method, "samp.webhub.pullCallbacks");
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_request_missing_params_is_empty() {
        let (method, params) =
            decode_request(r#"{"samp.methodName": "samp.webhub.ping"}"#).unwrap();
        assert_eq!(method, "samp.webhub.ping");
        assert!(params.is_empty());
    }

    #[test]
    fn test_request_rejects_bare_numbers() {
        let err = decode_request(r#"{"samp.methodName": "m", "samp.params": [5]}"#).unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));
    }

    #[test]
    fn test_result_round_trip() {
        let mut map = SampMap::new();
        map.insert("samp.private-key", SampValue::string("wk:xyz"));
        let value = SampValue::Map(map);
        let body = encode_result(&value);
        assert_eq!(decode_response(&body).unwrap(), value);
    }

    #[test]
    fn test_error_frame_surfaces_as_remote() {
        let body = encode_error(&HubError::AuthFailure);
        match decode_response(&body).unwrap_err() {
            TransportError::Remote { message, .. } => {
                assert!(message.contains("authentication"))
            }
            other => panic!("expected Remote, got {:?}", other),
        }
    }

    #[test]
    fn test_callback_frame_shape() {
        let cb = Callback::notification("c1", SampValue::Map(SampMap::new()));
        let frame = callback_frame(&cb);
        let map = frame.as_map().unwrap();
        assert_eq!(map.get_str(KEY_METHOD), Some("samp.client.receiveNotification"));
        assert_eq!(map.get(KEY_PARAMS).unwrap().as_list().unwrap().len(), 2);
    }
}
