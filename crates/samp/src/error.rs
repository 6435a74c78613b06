// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for hub operations.
//!
//! Every public hub method fails with a [`HubError`]. Each kind has a stable
//! wire code carried in the `samp.code` entry of a fault mapping, so both
//! profiles surface the same taxonomy regardless of transport.

use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;
use crate::value::{SampMap, SampValue};

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Errors raised by hub methods.
#[derive(Debug, Error)]
pub enum HubError {
    /// A SAMP value failed validation before any state change.
    #[error("malformed value at {path}: {reason}")]
    MalformedValue { reason: String, path: String },

    /// Unknown or revoked private key, or a rejected registration secret.
    #[error("authentication failed")]
    AuthFailure,

    /// The calling private key does not map to a registered client.
    #[error("no such registered client")]
    UnknownClient,

    /// The addressed public id does not exist.
    #[error("unknown client id: {0}")]
    UnknownTarget(String),

    /// The message id does not correspond to an outstanding call.
    #[error("unknown message id: {0}")]
    UnknownMsgId(String),

    /// The recipient is not subscribed to the message's MType.
    #[error("client {client} is not subscribed to {mtype}")]
    NotSubscribed { client: String, mtype: String },

    /// A bounded wait elapsed without a response.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Outbound transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Registration limit reached.
    #[error("registration limit reached")]
    Overloaded,

    /// The hub is shutting down and refuses further work.
    #[error("hub is shutting down")]
    HubShutdown,
}

impl HubError {
    /// Stable wire code for the `samp.code` fault entry.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedValue { .. } => "MalformedValue",
            Self::AuthFailure => "AuthFailure",
            Self::UnknownClient => "UnknownClient",
            Self::UnknownTarget(_) => "UnknownTarget",
            Self::UnknownMsgId(_) => "UnknownMsgId",
            Self::NotSubscribed { .. } => "NotSubscribed",
            Self::Timeout(_) => "Timeout",
            Self::Transport(_) => "TransportFailure",
            Self::Overloaded => "Overloaded",
            Self::HubShutdown => "HubShutdown",
        }
    }

    /// Shorthand for a validation failure.
    pub fn malformed(reason: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MalformedValue {
            reason: reason.into(),
            path: path.into(),
        }
    }

    /// Render as a wire fault mapping `{samp.code, samp.errortxt}`.
    pub fn to_fault(&self) -> SampMap {
        let mut map = SampMap::new();
        map.insert("samp.code", SampValue::string(self.code()));
        map.insert("samp.errortxt", SampValue::string(self.to_string()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_mapping_carries_code_and_text() {
        let err = HubError::UnknownTarget("c9".into());
        let fault = err.to_fault();
        assert_eq!(fault.get_str("samp.code"), Some("UnknownTarget"));
        assert_eq!(fault.get_str("samp.errortxt"), Some("unknown client id: c9"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errs = [
            HubError::AuthFailure,
            HubError::UnknownClient,
            HubError::Overloaded,
            HubError::HubShutdown,
        ];
        let mut codes: Vec<_> = errs.iter().map(|e| e.code()).collect();
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }
}
