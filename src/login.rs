// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login orchestrator for already-enrolled identities.
//!
//! Mirrors the enrollment OTP exchange against the profile-login endpoint
//! pair. The `abha-number` hint never goes upstream directly: it is
//! format-validated, canonicalized, used to resolve the stored sealed secret,
//! and re-sent as an `aadhaar` hint.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::crypto;
use crate::enroll::{digits, mask};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{
    canonical_abha, is_valid_abha, IdentityProfile, ProfileRepository, TransactionLogEntry,
    TransactionRepository,
};

const LOGIN_REQUEST_PATH: &str = "/profile/login/request/otp";
const LOGIN_VERIFY_PATH: &str = "/profile/login/verify";
const CHECK_AUTH_PATH: &str = "/profile/login/abha/search";

/// Derive the default scope list from the login target and OTP system.
///
/// Callers may override; this applies only when no explicit scope is given.
pub(crate) fn derive_scopes(target: &str, otp_system: &str) -> Vec<String> {
    let mut scopes = Vec::with_capacity(2);
    if target == "abha-address" {
        scopes.push("abha-address-login".to_string());
    } else {
        scopes.push("abha-login".to_string());
    }
    if otp_system == "aadhaar" {
        scopes.push("aadhaar-verify".to_string());
    } else {
        scopes.push("mobile-verify".to_string());
    }
    scopes
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileOtpRequest {
    scope: Vec<String>,
    login_hint: String,
    login_id: String,
    otp_system: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileVerifyOtp {
    txn_id: String,
    otp_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileVerifyAuthData {
    auth_methods: Vec<&'static str>,
    otp: ProfileVerifyOtp,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileVerifyRequest {
    scope: Vec<String>,
    auth_data: ProfileVerifyAuthData,
}

/// Inputs for the profile-login OTP request.
#[derive(Debug, Clone)]
pub struct ProfileLoginRequest {
    pub login_hint: String,
    pub value: String,
    pub otp_system: String,
    pub scope: Vec<String>,
}

/// Login orchestrator borrowing the shared application state.
pub struct Login<'a> {
    state: &'a AppState,
}

impl<'a> Login<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Request a login OTP.
    pub async fn send_otp(
        &self,
        target: &str,
        value: &str,
        otp_system: &str,
    ) -> Result<Value, AppError> {
        let token = self.state.authority.machine_token().await?;
        let payload = json!({
            "scope": derive_scopes(target, otp_system),
            "type": target,
            "value": value,
            "otp_system": otp_system,
        });

        let response = self
            .state
            .authority
            .post_json(LOGIN_REQUEST_PATH, &payload, &token, "ABDM_LOGIN_OTP")
            .await?;

        self.state.txlog.record(
            TransactionLogEntry::new("login_send_otp", LOGIN_REQUEST_PATH).with_status(200),
        );
        Ok(response)
    }

    /// Verify a login OTP and merge returned tokens into the profile.
    pub async fn verify_otp(
        &self,
        target: &str,
        txn_id: &str,
        otp: &str,
        otp_system: &str,
    ) -> Result<Value, AppError> {
        if !digits(otp, 6) {
            return Err(AppError::bad_request(
                "INVALID_OTP_FORMAT",
                "otp must be 6 digits",
            ));
        }

        let token = self.state.authority.machine_token().await?;
        let payload = json!({
            "scope": derive_scopes(target, otp_system),
            "transaction_id": txn_id,
            "otp": otp,
        });

        let response = self
            .state
            .authority
            .post_json(LOGIN_VERIFY_PATH, &payload, &token, "ABDM_LOGIN_VERIFY")
            .await?;

        self.merge_login_tokens(&response);
        self.state.txlog.record(
            TransactionLogEntry::new("login_verify_otp", LOGIN_VERIFY_PATH).with_status(200),
        );
        Ok(response)
    }

    /// List authentication methods available for an alias.
    pub async fn check_auth_methods(&self, abha_address: &str) -> Result<Value, AppError> {
        let token = self.state.authority.machine_token().await?;
        let payload = json!({ "abha_address": abha_address });
        self.state
            .authority
            .post_json(CHECK_AUTH_PATH, &payload, &token, "ABDM_AUTH_METHODS")
            .await
    }

    /// Request a profile-login OTP.
    ///
    /// With `strict` validation (the v2 surface) the hint must be one of
    /// `aadhaar`/`mobile`/`abha-number` and the OTP system `aadhaar`/`abdm`.
    pub async fn profile_request_otp(
        &self,
        request: ProfileLoginRequest,
        strict: bool,
    ) -> Result<Value, AppError> {
        let login_hint = request.login_hint.trim().to_ascii_lowercase();
        let otp_system = request.otp_system.trim().to_ascii_lowercase();

        if strict {
            if !matches!(login_hint.as_str(), "aadhaar" | "mobile" | "abha-number") {
                return Err(AppError::bad_request(
                    "INVALID_LOGIN_HINT",
                    "allowed: aadhaar | mobile | abha-number",
                ));
            }
            if !matches!(otp_system.as_str(), "aadhaar" | "abdm") {
                return Err(AppError::bad_request(
                    "INVALID_OTP_SYSTEM",
                    "allowed: aadhaar | abdm",
                ));
            }
        }

        let scope = if request.scope.is_empty() {
            let mut scope = vec!["abha-login".to_string()];
            if otp_system == "aadhaar" || login_hint == "aadhaar" {
                scope.push("aadhaar-verify".to_string());
            } else {
                scope.push("mobile-verify".to_string());
            }
            scope
        } else {
            request.scope.clone()
        };

        let (login_hint, login_id, otp_system) = match login_hint.as_str() {
            "abha-number" => {
                let plaintext = self.resolve_secret_for_abha(&request.value)?;
                let encrypted = self.encrypt_for_authority(&plaintext).await?;
                ("aadhaar".to_string(), encrypted, "aadhaar".to_string())
            }
            "aadhaar" => {
                let encrypted = self.encrypt_for_authority(request.value.trim()).await?;
                ("aadhaar".to_string(), encrypted, "aadhaar".to_string())
            }
            _ => (login_hint, request.value.clone(), otp_system),
        };

        let token = self.state.authority.machine_token().await?;
        let payload = to_payload(&ProfileOtpRequest {
            scope,
            login_hint,
            login_id,
            otp_system,
        })?;

        let response = self
            .state
            .authority
            .post_json_profile(LOGIN_REQUEST_PATH, &payload, &token, "ABDM_PROFILE_OTP")
            .await?;

        self.state.txlog.record(
            TransactionLogEntry::new("profile_login_request_otp", LOGIN_REQUEST_PATH)
                .with_status(200),
        );
        Ok(response)
    }

    /// Verify a profile-login OTP and merge returned tokens into the profile.
    pub async fn profile_verify_otp(
        &self,
        txn_id: &str,
        otp: &str,
        otp_system: &str,
        scope_override: Vec<String>,
    ) -> Result<Value, AppError> {
        if !digits(otp, 6) {
            return Err(AppError::bad_request(
                "INVALID_OTP_FORMAT",
                "otp must be 6 digits",
            ));
        }

        let scope = if scope_override.is_empty() {
            let mut scope = vec!["abha-login".to_string()];
            if otp_system == "aadhaar" {
                scope.push("aadhaar-verify".to_string());
            } else {
                scope.push("mobile-verify".to_string());
            }
            scope
        } else {
            scope_override
        };

        let encrypted_otp = self.encrypt_for_authority(otp).await?;
        let token = self.state.authority.machine_token().await?;
        let payload = to_payload(&ProfileVerifyRequest {
            scope,
            auth_data: ProfileVerifyAuthData {
                auth_methods: vec!["otp"],
                otp: ProfileVerifyOtp {
                    txn_id: txn_id.to_string(),
                    otp_value: encrypted_otp,
                },
            },
        })?;

        let response = self
            .state
            .authority
            .post_json_profile(LOGIN_VERIFY_PATH, &payload, &token, "ABDM_PROFILE_VERIFY")
            .await?;

        self.merge_login_tokens(&response);
        self.state.txlog.record(
            TransactionLogEntry::new("profile_login_verify_otp", LOGIN_VERIFY_PATH)
                .with_status(200),
        );
        Ok(response)
    }

    /// Resolve the plaintext linked secret for an identity number.
    fn resolve_secret_for_abha(&self, raw: &str) -> Result<String, AppError> {
        if !is_valid_abha(raw) {
            return Err(AppError::bad_request(
                "INVALID_LOGIN_HINT",
                "expected 14 digits, optionally grouped like 91-XXXX-XXXX-XXXX",
            ));
        }
        let canonical = canonical_abha(raw.trim());

        let sealed = TransactionRepository::new(&self.state.store)
            .sealed_secret_by_abha(&canonical)
            .map_err(|e| {
                AppError::not_found(
                    "ABHA_NOT_FOUND_OR_NO_LINKED_AADHAAR",
                    "no linked secret stored for this identity",
                )
                .with_cause(e)
            })?;

        self.state.vault.open(&sealed)
    }

    async fn encrypt_for_authority(&self, plaintext: &str) -> Result<String, AppError> {
        let public_key = crypto::fetch_public_key(&self.state.authority).await?;
        crypto::encrypt_with_public_key(&public_key, plaintext)
    }

    /// Best-effort token merge after a successful verify.
    fn merge_login_tokens(&self, response: &Value) {
        let abha_number = response
            .pointer("/ABHANumber")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        let access_token = response
            .pointer("/token")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if abha_number.is_empty() || access_token.is_empty() {
            return;
        }

        let update = IdentityProfile {
            abha_number: abha_number.to_string(),
            health_id: response
                .pointer("/preferredAbhaAddress")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            access_token: access_token.to_string(),
            refresh_token: response
                .pointer("/refreshToken")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            last_modified_by: "system".to_string(),
            ..Default::default()
        };

        match ProfileRepository::new(&self.state.store).upsert(update) {
            Ok(_) => info!(abha = %mask(abha_number), "login tokens merged into profile"),
            Err(err) => warn!(error = %err, "failed to merge login tokens"),
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| {
        AppError::internal("REQ_MARSHAL_FAILED", "failed to serialize request payload")
            .with_cause(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_derivation_covers_all_combinations() {
        assert_eq!(
            derive_scopes("abha-number", "aadhaar"),
            vec!["abha-login", "aadhaar-verify"]
        );
        assert_eq!(
            derive_scopes("mobile", "abdm"),
            vec!["abha-login", "mobile-verify"]
        );
        assert_eq!(
            derive_scopes("abha-address", "aadhaar"),
            vec!["abha-address-login", "aadhaar-verify"]
        );
        assert_eq!(
            derive_scopes("abha-address", "abdm"),
            vec!["abha-address-login", "mobile-verify"]
        );
    }

    #[test]
    fn profile_otp_request_serializes_camel_case() {
        let payload = to_payload(&ProfileOtpRequest {
            scope: vec!["abha-login".to_string(), "aadhaar-verify".to_string()],
            login_hint: "aadhaar".to_string(),
            login_id: "cipher".to_string(),
            otp_system: "aadhaar".to_string(),
        })
        .unwrap();
        assert_eq!(payload["loginHint"], "aadhaar");
        assert_eq!(payload["loginId"], "cipher");
        assert_eq!(payload["otpSystem"], "aadhaar");
    }

    #[test]
    fn profile_verify_request_wraps_auth_data() {
        let payload = to_payload(&ProfileVerifyRequest {
            scope: vec!["abha-login".to_string(), "mobile-verify".to_string()],
            auth_data: ProfileVerifyAuthData {
                auth_methods: vec!["otp"],
                otp: ProfileVerifyOtp {
                    txn_id: "T1".to_string(),
                    otp_value: "cipher".to_string(),
                },
            },
        })
        .unwrap();
        assert_eq!(payload["authData"]["authMethods"][0], "otp");
        assert_eq!(payload["authData"]["otp"]["txnId"], "T1");
        assert_eq!(payload["authData"]["otp"]["otpValue"], "cipher");
    }
}
