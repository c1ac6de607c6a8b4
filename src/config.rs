// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment exactly once at startup and
//! passed by handle into every component. No component re-reads process
//! environment at call time.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for the JSON store | `/data` |
//! | `ABDM_BASE_URL` | Authority API base URL | sandbox URL |
//! | `ABDM_SESSION_URL` | Authority session (token) endpoint | sandbox URL |
//! | `ABDM_PUBLIC_KEY_URL` | Authority public certificate endpoint | derived from base |
//! | `ABDM_CLIENT_ID` | Client-credentials ID | Required |
//! | `ABDM_CLIENT_SECRET` | Client-credentials secret | Required |
//! | `HCM_INDIVIDUAL_URL` | Downstream individual-create endpoint | Optional |
//! | `VAULT_KEY` | Passphrase for at-rest sealing of secrets | Required |
//! | `REQUEST_TIMEOUT_SECS` | Upstream JSON call timeout | `15` |
//! | `ASSET_TIMEOUT_SECS` | Token and binary asset fetch timeout | `10` |
//! | `TXLOG_QUEUE_DEPTH` | Bounded transaction-log queue depth | `256` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable name for the JSON store root directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

const DEFAULT_ABDM_BASE_URL: &str = "https://abhasbx.abdm.gov.in/abha/api/v3";
const DEFAULT_ABDM_SESSION_URL: &str =
    "https://dev.abdm.gov.in/api/hiecm/gateway/v3/sessions";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_ASSET_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TXLOG_QUEUE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Immutable application configuration, built once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Authority API base URL (enrollment, login, profile endpoints).
    pub abdm_base_url: String,
    /// Authority session endpoint for client-credentials token exchange.
    pub abdm_session_url: String,
    /// Authority public certificate endpoint (PEM).
    pub abdm_public_key_url: String,
    pub abdm_client_id: String,
    pub abdm_client_secret: String,
    /// Downstream individual-create endpoint. Absent means the v2
    /// verify-and-create flow is disabled.
    pub hcm_individual_url: Option<String>,
    /// Passphrase for AES-GCM sealing of secrets stored at rest.
    pub vault_key: String,
    pub request_timeout_secs: u64,
    pub asset_timeout_secs: u64,
    pub txlog_queue_depth: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let abdm_base_url = env_or_default("ABDM_BASE_URL", DEFAULT_ABDM_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let abdm_session_url = env_or_default("ABDM_SESSION_URL", DEFAULT_ABDM_SESSION_URL);
        let abdm_public_key_url = env_optional("ABDM_PUBLIC_KEY_URL")
            .unwrap_or_else(|| format!("{abdm_base_url}/profile/public/certificate"));

        Ok(Self {
            host: env_or_default("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8080)?,
            abdm_base_url,
            abdm_session_url,
            abdm_public_key_url,
            abdm_client_id: env_required("ABDM_CLIENT_ID")?,
            abdm_client_secret: env_required("ABDM_CLIENT_SECRET")?,
            hcm_individual_url: env_optional("HCM_INDIVIDUAL_URL"),
            vault_key: env_required("VAULT_KEY")?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            asset_timeout_secs: parse_env("ASSET_TIMEOUT_SECS", DEFAULT_ASSET_TIMEOUT_SECS)?,
            txlog_queue_depth: parse_env("TXLOG_QUEUE_DEPTH", DEFAULT_TXLOG_QUEUE_DEPTH)?,
        })
    }
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    env_optional(name).ok_or(ConfigError::Missing(name))
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env_optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_optional_treats_blank_as_absent() {
        std::env::set_var("CONFIG_TEST_BLANK", "   ");
        assert_eq!(env_optional("CONFIG_TEST_BLANK"), None);
        std::env::remove_var("CONFIG_TEST_BLANK");
    }

    #[test]
    fn env_or_default_falls_back() {
        std::env::remove_var("CONFIG_TEST_MISSING");
        assert_eq!(env_or_default("CONFIG_TEST_MISSING", "fallback"), "fallback");
    }

    #[test]
    fn parse_env_rejects_garbage() {
        std::env::set_var("CONFIG_TEST_PORT", "not-a-number");
        let err = parse_env::<u16>("CONFIG_TEST_PORT", 8080).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        std::env::remove_var("CONFIG_TEST_PORT");
    }

    #[test]
    fn missing_required_variable_is_reported_by_name() {
        std::env::remove_var("ABDM_CLIENT_ID_TEST");
        let err = env_required("ABDM_CLIENT_ID_TEST").unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required environment variable ABDM_CLIENT_ID_TEST"
        );
    }
}
