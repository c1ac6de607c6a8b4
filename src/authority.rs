// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the external identity authority.
//!
//! Carries the machine-token exchange (client credentials, fetched fresh per
//! outbound call — tokens are cheap to request and expiry skew is more costly
//! to manage than an extra round trip) and the shared request plumbing every
//! orchestrator uses: `REQUEST-ID`/`TIMESTAMP` headers, bounded timeouts, and
//! upstream error translation.

use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;

const HEADER_REQUEST_ID: &str = "REQUEST-ID";
const HEADER_TIMESTAMP: &str = "TIMESTAMP";
const HEADER_USER_TOKEN: &str = "X-Token";

#[derive(Debug, Clone)]
pub struct AuthorityClient {
    base_url: String,
    session_url: String,
    public_key_url: String,
    client_id: String,
    client_secret: String,
    /// Client for JSON calls (default 15 s timeout).
    http: Client,
    /// Client for token exchange and binary asset fetches (default 10 s).
    short_http: Client,
}

impl AuthorityClient {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::internal("HTTP_CLIENT_FAILED", "failed to build HTTP client")
                    .with_cause(e)
            })?;
        let short_http = Client::builder()
            .timeout(Duration::from_secs(config.asset_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::internal("HTTP_CLIENT_FAILED", "failed to build HTTP client")
                    .with_cause(e)
            })?;

        Ok(Self {
            base_url: config.abdm_base_url.trim_end_matches('/').to_string(),
            session_url: config.abdm_session_url.clone(),
            public_key_url: config.abdm_public_key_url.clone(),
            client_id: config.abdm_client_id.clone(),
            client_secret: config.abdm_client_secret.clone(),
            http,
            short_http,
        })
    }

    /// Fetch a fresh machine bearer token via client-credentials exchange.
    pub async fn machine_token(&self) -> Result<String, AppError> {
        let payload = session_payload(&self.client_id, &self.client_secret);

        let response = self
            .short_http
            .post(&self.session_url)
            .header(HEADER_REQUEST_ID, Uuid::new_v4().to_string())
            .header(HEADER_TIMESTAMP, stamp_millis())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                AppError::internal("ABDM_TOKEN_FAILED", "session request failed").with_cause(e)
            })?;

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::internal(
                "ABDM_TOKEN_FAILED",
                format!("session endpoint returned {status}"),
            )
            .with_details(details_from_body(&body)));
        }

        let parsed: Value = serde_json::from_slice(&body).map_err(|e| {
            AppError::internal("ABDM_TOKEN_FAILED", "session response is not valid JSON")
                .with_cause(e)
        })?;

        parsed
            .get("accessToken")
            .or_else(|| parsed.get("access_token"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::internal(
                    "ABDM_TOKEN_FAILED",
                    "session response did not include accessToken",
                )
            })
    }

    /// Fetch the authority's published certificate body (PEM text).
    pub async fn fetch_certificate(&self) -> Result<String, AppError> {
        let response = self
            .http
            .get(&self.public_key_url)
            .send()
            .await
            .map_err(|e| {
                AppError::internal("PUBLIC_KEY_HTTP_FAILED", "public key fetch failed")
                    .with_cause(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::internal(
                "PUBLIC_KEY_HTTP_FAILED",
                format!("public key endpoint returned {status}"),
            ));
        }

        response.text().await.map_err(|e| {
            AppError::internal("PUBLIC_KEY_HTTP_FAILED", "public key body unreadable")
                .with_cause(e)
        })
    }

    /// POST a JSON payload to an authority path with standard headers.
    pub async fn post_json(
        &self,
        path: &str,
        payload: &Value,
        bearer: &str,
        code_prefix: &str,
    ) -> Result<Value, AppError> {
        self.post_json_with_stamp(path, payload, bearer, code_prefix, stamp_millis())
            .await
    }

    /// POST variant used by the profile-login endpoint pair, which expects a
    /// nanosecond-precision timestamp header.
    pub async fn post_json_profile(
        &self,
        path: &str,
        payload: &Value,
        bearer: &str,
        code_prefix: &str,
    ) -> Result<Value, AppError> {
        self.post_json_with_stamp(path, payload, bearer, code_prefix, stamp_nanos())
            .await
    }

    async fn post_json_with_stamp(
        &self,
        path: &str,
        payload: &Value,
        bearer: &str,
        code_prefix: &str,
        stamp: String,
    ) -> Result<Value, AppError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {bearer}"))
            .header(HEADER_REQUEST_ID, Uuid::new_v4().to_string())
            .header(HEADER_TIMESTAMP, stamp)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                AppError::internal(
                    format!("{code_prefix}_HTTP_FAILED"),
                    format!("POST {path} failed"),
                )
                .with_cause(e)
            })?;

        decode_json_response(response, path, code_prefix).await
    }

    /// GET a JSON response from an authority path, with optional extra
    /// headers (e.g. `TRANSACTION_ID` for address suggestions).
    pub async fn get_json(
        &self,
        path: &str,
        bearer: &str,
        extra_headers: &[(&str, &str)],
        code_prefix: &str,
    ) -> Result<Value, AppError> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {bearer}"))
            .header(HEADER_REQUEST_ID, Uuid::new_v4().to_string())
            .header(HEADER_TIMESTAMP, stamp_millis());
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            AppError::internal(
                format!("{code_prefix}_HTTP_FAILED"),
                format!("GET {path} failed"),
            )
            .with_cause(e)
        })?;

        decode_json_response(response, path, code_prefix).await
    }

    /// GET a binary asset authenticated by both the user token (`X-Token`)
    /// and the machine token (`Authorization`).
    pub async fn fetch_asset(
        &self,
        path: &str,
        user_token: &str,
        machine_token: &str,
        code_prefix: &str,
    ) -> Result<Vec<u8>, AppError> {
        let response = self
            .short_http
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {machine_token}"))
            .header(HEADER_USER_TOKEN, format!("Bearer {user_token}"))
            .header(HEADER_REQUEST_ID, Uuid::new_v4().to_string())
            .header(HEADER_TIMESTAMP, stamp_millis())
            .send()
            .await
            .map_err(|e| {
                AppError::internal(
                    format!("{code_prefix}_HTTP_FAILED"),
                    format!("GET {path} failed"),
                )
                .with_cause(e)
            })?;

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::from_upstream(status, &body, code_prefix));
        }
        Ok(body.to_vec())
    }

    /// POST a JSON payload to an absolute URL (downstream collaborators).
    pub async fn post_url_json(
        &self,
        url: &str,
        payload: &Value,
        code_prefix: &str,
    ) -> Result<Value, AppError> {
        let response = self.http.post(url).json(payload).send().await.map_err(|e| {
            AppError::internal(
                format!("{code_prefix}_HTTP_FAILED"),
                format!("POST {url} failed"),
            )
            .with_cause(e)
        })?;

        decode_json_response(response, url, code_prefix).await
    }
}

async fn decode_json_response(
    response: reqwest::Response,
    path: &str,
    code_prefix: &str,
) -> Result<Value, AppError> {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    if !status.is_success() {
        return Err(AppError::from_upstream(status, &body, code_prefix));
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body).map_err(|e| {
        AppError::non_recoverable(
            format!("{code_prefix}_INVALID_RESPONSE"),
            format!("{path} returned invalid JSON"),
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .with_cause(e)
    })
}

/// Preserve an upstream error body as structured details when it is JSON,
/// as a raw string otherwise.
fn details_from_body(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn session_payload(client_id: &str, client_secret: &str) -> Value {
    serde_json::json!({
        "clientId": client_id,
        "clientSecret": client_secret,
        "grantType": "client_credentials"
    })
}

/// Millisecond-precision UTC timestamp header value.
fn stamp_millis() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Nanosecond-precision UTC timestamp header value (profile-login endpoints).
fn stamp_nanos() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            abdm_base_url: "https://authority.example/api/v3/".to_string(),
            abdm_session_url: "https://authority.example/sessions".to_string(),
            abdm_public_key_url: "https://authority.example/certificate".to_string(),
            abdm_client_id: "client".to_string(),
            abdm_client_secret: "secret".to_string(),
            hcm_individual_url: None,
            vault_key: "vault".to_string(),
            request_timeout_secs: 15,
            asset_timeout_secs: 10,
            txlog_queue_depth: 256,
        }
    }

    #[test]
    fn client_strips_trailing_slash_from_base_url() {
        let client = AuthorityClient::new(&test_config()).unwrap();
        assert_eq!(client.base_url, "https://authority.example/api/v3");
    }

    #[test]
    fn session_payload_uses_client_credentials_grant() {
        let payload = session_payload("id-1", "secret-1");
        assert_eq!(payload["clientId"], "id-1");
        assert_eq!(payload["clientSecret"], "secret-1");
        assert_eq!(payload["grantType"], "client_credentials");
    }

    #[test]
    fn millis_stamp_has_three_fraction_digits() {
        let stamp = stamp_millis();
        // e.g. 2026-02-03T10:11:12.345Z
        assert_eq!(stamp.len(), 24);
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.as_bytes()[19], b'.');
    }

    #[test]
    fn nanos_stamp_has_nine_fraction_digits() {
        let stamp = stamp_nanos();
        assert_eq!(stamp.len(), 30);
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.as_bytes()[19], b'.');
    }
}
