// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login route handlers.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::login::{Login, ProfileLoginRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginSendOtpRequest {
    /// Login target: `abha-number` or `abha-address`.
    #[serde(rename = "type")]
    pub target: String,
    pub value: String,
    pub otp_system: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginVerifyOtpRequest {
    #[serde(rename = "type")]
    pub target: String,
    pub transaction_id: String,
    pub otp: String,
    pub otp_system: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckAuthMethodsRequest {
    pub abha_address: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileLoginOtpRequest {
    /// One of `aadhaar`, `mobile`, `abha-number`.
    pub login_hint: String,
    pub value: String,
    /// One of `aadhaar`, `abdm`.
    pub otp_system: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileLoginVerifyRequest {
    pub txn_id: String,
    pub otp_value: String,
    #[serde(default)]
    pub otp_system: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

/// Request a login OTP for an enrolled identity.
#[utoipa::path(
    post,
    path = "/api/abha/login/send-otp",
    tag = "Login",
    request_body = LoginSendOtpRequest,
    responses(
        (status = 200, description = "OTP requested"),
        (status = 502, description = "Authority rejected the request")
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(body): Json<LoginSendOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Login::new(&state)
        .send_otp(&body.target, &body.value, &body.otp_system)
        .await?;
    Ok(Json(response))
}

/// Verify a login OTP.
#[utoipa::path(
    post,
    path = "/api/abha/login/verify-otp",
    tag = "Login",
    request_body = LoginVerifyOtpRequest,
    responses(
        (status = 200, description = "Logged in, response carries tokens"),
        (status = 400, description = "Malformed OTP")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<LoginVerifyOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Login::new(&state)
        .verify_otp(&body.target, &body.transaction_id, &body.otp, &body.otp_system)
        .await?;
    Ok(Json(response))
}

/// List authentication methods for an alias.
#[utoipa::path(
    post,
    path = "/api/abha/login/check-auth-methods",
    tag = "Login",
    request_body = CheckAuthMethodsRequest,
    responses(
        (status = 200, description = "Available authentication methods")
    )
)]
pub async fn check_auth_methods(
    State(state): State<AppState>,
    Json(body): Json<CheckAuthMethodsRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Login::new(&state)
        .check_auth_methods(&body.abha_address)
        .await?;
    Ok(Json(response))
}

/// Request a profile-login OTP (strict hint and OTP-system validation).
#[utoipa::path(
    post,
    path = "/api/abha/login/profile/request-otp",
    tag = "Login",
    request_body = ProfileLoginOtpRequest,
    responses(
        (status = 200, description = "OTP requested"),
        (status = 400, description = "Invalid login hint or OTP system")
    )
)]
pub async fn profile_request_otp(
    State(state): State<AppState>,
    Json(body): Json<ProfileLoginOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Login::new(&state)
        .profile_request_otp(
            ProfileLoginRequest {
                login_hint: body.login_hint,
                value: body.value,
                otp_system: body.otp_system,
                scope: body.scope,
            },
            true,
        )
        .await?;
    Ok(Json(response))
}

/// Verify a profile-login OTP.
#[utoipa::path(
    post,
    path = "/api/abha/login/profile/verify-otp",
    tag = "Login",
    request_body = ProfileLoginVerifyRequest,
    responses(
        (status = 200, description = "Logged in, tokens merged into the stored profile"),
        (status = 400, description = "Malformed OTP")
    )
)]
pub async fn profile_verify_otp(
    State(state): State<AppState>,
    Json(body): Json<ProfileLoginVerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Login::new(&state)
        .profile_verify_otp(&body.txn_id, &body.otp_value, &body.otp_system, body.scope)
        .await?;
    Ok(Json(response))
}
