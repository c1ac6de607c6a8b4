// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enrollment route handlers: validate shape, delegate to the orchestrator,
//! map its normalized error to an HTTP response.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::enroll::{Enrollment, VerifyAndCreateInput};
use crate::error::AppError;
use crate::state::AppState;

use super::tenant_id;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendAadhaarOtpRequest {
    /// 12-digit secret identifier. Encrypted before it leaves the process.
    pub aadhaar_number: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEnrollRequest {
    pub txn_id: String,
    pub otp: String,
    #[serde(default)]
    pub mobile: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAndCreateV2Request {
    pub txn_id: String,
    pub otp: String,
    #[serde(default)]
    pub mobile: Option<String>,
    pub tenant_id: String,
    pub client_reference_id: String,
    pub hcm_auth_token: String,
    pub user_id: i64,
    pub user_uuid: String,
    #[serde(default)]
    pub locality_code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkMobileRequest {
    pub mobile: String,
    pub txn_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMobileOtpRequest {
    pub txn_id: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressSuggestionRequest {
    pub txn_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrolAddressRequest {
    pub txn_id: String,
    pub abha_address: String,
}

/// Request an enrollment OTP for a secret identifier.
#[utoipa::path(
    post,
    path = "/api/abha/create/send-aadhaar-otp",
    tag = "Enrollment",
    request_body = SendAadhaarOtpRequest,
    responses(
        (status = 200, description = "OTP requested, response carries the transaction id"),
        (status = 400, description = "Malformed identifier"),
        (status = 502, description = "Authority rejected the request")
    )
)]
pub async fn send_aadhaar_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SendAadhaarOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let tenant = tenant_id(&headers);
    let response = Enrollment::new(&state)
        .send_aadhaar_otp(&body.aadhaar_number, &tenant)
        .await?;
    Ok(Json(response))
}

/// Verify the enrollment OTP and persist the returned profile.
#[utoipa::path(
    post,
    path = "/api/abha/create/verify-and-enroll-with-aadhaar-otp",
    tag = "Enrollment",
    request_body = VerifyEnrollRequest,
    responses(
        (status = 200, description = "Enrolled, response carries profile and tokens"),
        (status = 400, description = "Malformed OTP or rejected by the authority"),
        (status = 502, description = "Authority verify failed")
    )
)]
pub async fn verify_and_enroll(
    State(state): State<AppState>,
    Json(body): Json<VerifyEnrollRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Enrollment::new(&state)
        .verify_and_enroll(&body.txn_id, &body.otp, body.mobile.as_deref())
        .await?;
    Ok(Json(response))
}

/// Verify the enrollment OTP and create a downstream individual record.
#[utoipa::path(
    post,
    path = "/api/abha/create/verify-aadhaar-otp-v2",
    tag = "Enrollment",
    request_body = VerifyAndCreateV2Request,
    responses(
        (status = 200, description = "Enrolled and individual created"),
        (status = 400, description = "Malformed input or invalid OTP"),
        (status = 502, description = "Authority or downstream call failed")
    )
)]
pub async fn verify_and_create_v2(
    State(state): State<AppState>,
    Json(body): Json<VerifyAndCreateV2Request>,
) -> Result<Json<Value>, AppError> {
    let response = Enrollment::new(&state)
        .verify_and_create(VerifyAndCreateInput {
            txn_id: body.txn_id,
            otp: body.otp,
            mobile: body.mobile,
            tenant_id: body.tenant_id,
            client_reference_id: body.client_reference_id,
            auth_token: body.hcm_auth_token,
            user_id: body.user_id,
            user_uuid: body.user_uuid,
            locality_code: body.locality_code,
        })
        .await?;
    Ok(Json(response))
}

/// Link a mobile number to an in-flight enrollment.
#[utoipa::path(
    post,
    path = "/api/abha/create/link-mobile",
    tag = "Enrollment",
    request_body = LinkMobileRequest,
    responses(
        (status = 200, description = "Mobile OTP sent"),
        (status = 400, description = "Malformed mobile number")
    )
)]
pub async fn link_mobile(
    State(state): State<AppState>,
    Json(body): Json<LinkMobileRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Enrollment::new(&state)
        .link_mobile(&body.mobile, &body.txn_id)
        .await?;
    Ok(Json(response))
}

/// Verify the OTP sent to a linked mobile number.
#[utoipa::path(
    post,
    path = "/api/abha/create/verify-mobile-otp",
    tag = "Enrollment",
    request_body = VerifyMobileOtpRequest,
    responses(
        (status = 200, description = "Mobile number verified"),
        (status = 400, description = "Malformed OTP")
    )
)]
pub async fn verify_mobile_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyMobileOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Enrollment::new(&state)
        .verify_mobile_otp(&body.txn_id, &body.otp)
        .await?;
    Ok(Json(response))
}

/// Fetch alias suggestions for an in-flight enrollment.
#[utoipa::path(
    post,
    path = "/api/abha/create/address-suggestion",
    tag = "Enrollment",
    request_body = AddressSuggestionRequest,
    responses(
        (status = 200, description = "Suggested aliases")
    )
)]
pub async fn address_suggestion(
    State(state): State<AppState>,
    Json(body): Json<AddressSuggestionRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Enrollment::new(&state)
        .address_suggestions(&body.txn_id)
        .await?;
    Ok(Json(response))
}

/// Register the chosen alias as the preferred address.
#[utoipa::path(
    post,
    path = "/api/abha/create/enrol-address",
    tag = "Enrollment",
    request_body = EnrolAddressRequest,
    responses(
        (status = 200, description = "Alias registered"),
        (status = 400, description = "Missing alias")
    )
)]
pub async fn enrol_address(
    State(state): State<AppState>,
    Json(body): Json<EnrolAddressRequest>,
) -> Result<Json<Value>, AppError> {
    let response = Enrollment::new(&state)
        .enrol_address(&body.txn_id, &body.abha_address)
        .await?;
    Ok(Json(response))
}
