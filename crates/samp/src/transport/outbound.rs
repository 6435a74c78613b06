// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound XML-RPC calls: hub-to-client callbacks and client-to-hub methods.

use crate::transport::{xmlrpc, TransportError};
use crate::value::SampValue;
use std::time::Duration;

/// XML-RPC over HTTP POST, with bounded connect/read timeouts.
#[derive(Debug, Clone)]
pub struct XmlRpcClient {
    http: reqwest::Client,
}

impl XmlRpcClient {
    /// Build a client with the given connect/read timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(Self { http })
    }

    /// POST one `methodCall` and decode the `methodResponse`.
    ///
    /// Fails with [`TransportError::Failed`] on connection problems and
    /// [`TransportError::Remote`] when the endpoint answers with a fault.
    pub async fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: &[SampValue],
    ) -> Result<SampValue, TransportError> {
        let body = xmlrpc::encode_request(method, params);
        let response = self
            .http
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;
        if !status.is_success() {
            return Err(TransportError::Failed(format!(
                "HTTP {} from {}",
                status, endpoint
            )));
        }
        xmlrpc::decode_response(&text)
    }
}
