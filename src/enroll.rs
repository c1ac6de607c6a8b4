// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enrollment orchestrator.
//!
//! Drives the multi-step exchange with the identity authority: OTP request,
//! OTP verify + enrol, and the richer v2 variant that additionally creates a
//! downstream individual record. Sensitive inputs are encrypted with the
//! authority's public key before they leave the process; the plaintext secret
//! is sealed and persisted only for later identifier resolution.

use std::time::Instant;

use axum::http::StatusCode;
use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto;
use crate::error::{AppError, ErrorKind};
use crate::state::AppState;
use crate::storage::{
    IdentityProfile, ProfileRepository, TransactionLogEntry, TransactionRepository,
};

const OTP_REQUEST_PATH: &str = "/enrollment/request/otp";
const ENROL_BY_AADHAAR_PATH: &str = "/enrollment/enrol/byAadhaar";
const MOBILE_VERIFY_PATH: &str = "/enrollment/auth/byAbdm";
const ADDRESS_SUGGEST_PATH: &str = "/enrollment/enrol/suggestion";
const ENROL_ADDRESS_PATH: &str = "/enrollment/enrol/abha-address";

const CONSENT_CODE: &str = "abha-enrollment";
const CONSENT_VERSION: &str = "1.4";

/// Canonical value assigned when the authority sends an unrecognized gender
/// code. Matches the authority's observed behavior; confirm with the domain
/// owner before changing.
pub const DEFAULT_GENDER: &str = "MALE";

/// True when `s` is exactly `len` ASCII digits.
pub(crate) fn digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtpRequestPayload {
    scope: Vec<&'static str>,
    login_hint: &'static str,
    login_id: String,
    otp_system: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    txn_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct Consent {
    code: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OtpAuth {
    time_stamp: String,
    txn_id: String,
    otp_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    auth_methods: Vec<&'static str>,
    otp: OtpAuth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrolByAadhaarPayload {
    auth_data: AuthData,
    consent: Consent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MobileVerifyPayload {
    scope: Vec<&'static str>,
    auth_data: AuthData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrolAddressPayload {
    txn_id: String,
    abha_address: String,
    preferred: u8,
}

/// Downstream individual-record payload. Optional fields are omitted when
/// the authority omitted them, never sent as empty strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    given_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    other_names: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordIdentifier {
    identifier_type: &'static str,
    identifier_id: String,
}

#[derive(Debug, Serialize)]
struct LocalityRef {
    code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordAddress {
    client_reference_id: String,
    tenant_id: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pincode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locality: Option<LocalityRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndividualRecord {
    tenant_id: String,
    client_reference_id: String,
    name: PersonName,
    row_version: u32,
    is_system_user: bool,
    identifiers: Vec<RecordIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<Vec<RecordAddress>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRef {
    id: i64,
    uuid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestInfo {
    api_id: &'static str,
    msg_id: &'static str,
    auth_token: String,
    user_info: UserRef,
}

#[derive(Debug, Serialize)]
struct IndividualCreateEnvelope {
    #[serde(rename = "RequestInfo")]
    request_info: RequestInfo,
    #[serde(rename = "Individual")]
    individual: IndividualRecord,
}

/// Inputs for the verify-and-create v2 flow.
#[derive(Debug, Clone)]
pub struct VerifyAndCreateInput {
    pub txn_id: String,
    pub otp: String,
    pub mobile: Option<String>,
    pub tenant_id: String,
    pub client_reference_id: String,
    pub auth_token: String,
    pub user_id: i64,
    pub user_uuid: String,
    pub locality_code: Option<String>,
}

/// Enrollment orchestrator borrowing the shared application state.
pub struct Enrollment<'a> {
    state: &'a AppState,
}

impl<'a> Enrollment<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Request an OTP for a 12-digit secret identifier.
    ///
    /// On success the authority transaction id is linked to the (sealed)
    /// secret, keyed by its lookup hash so a resend updates the pending
    /// record in place. Persistence is best-effort: the authority is the
    /// source of truth for whether the OTP went out.
    pub async fn send_aadhaar_otp(
        &self,
        aadhaar: &str,
        tenant_id: &str,
    ) -> Result<Value, AppError> {
        let aadhaar = aadhaar.trim();
        if !digits(aadhaar, 12) {
            return Err(AppError::bad_request(
                "INVALID_AADHAAR_FORMAT",
                "aadhaar must be 12 digits",
            ));
        }

        let public_key = crypto::fetch_public_key(&self.state.authority).await?;
        let encrypted = crypto::encrypt_with_public_key(&public_key, aadhaar)?;
        let token = self.state.authority.machine_token().await?;

        let payload = to_payload(&OtpRequestPayload {
            scope: vec!["abha-enrol"],
            login_hint: "aadhaar",
            login_id: encrypted,
            otp_system: "aadhaar",
            txn_id: None,
        })?;

        let started = Instant::now();
        let response = self
            .state
            .authority
            .post_json(OTP_REQUEST_PATH, &payload, &token, "ABDM_OTP")
            .await?;

        if let Some(txn_id) = text_opt(&response, "/txnId") {
            self.persist_otp_txn(tenant_id, aadhaar, &txn_id);
            self.state.txlog.record(
                TransactionLogEntry::new("enroll_send_otp", OTP_REQUEST_PATH)
                    .with_status(200)
                    .with_response(json!({ "txnId": txn_id }))
                    .with_latency(started.elapsed().as_millis() as i64),
            );
            info!(txn_id = %txn_id, "enrollment otp sent");
        } else {
            warn!("otp response did not include a transaction id");
        }

        Ok(response)
    }

    fn persist_otp_txn(&self, tenant_id: &str, aadhaar: &str, txn_id: &str) {
        let sealed = match self.state.vault.seal(aadhaar) {
            Ok(sealed) => sealed,
            Err(err) => {
                warn!(error = %err, "failed to seal secret, skipping txn persistence");
                return;
            }
        };
        let hash = crypto::lookup_hash(aadhaar);
        let repo = TransactionRepository::new(&self.state.store);
        if let Err(err) = repo.upsert_on_otp(tenant_id, txn_id, &sealed, &hash, "system") {
            warn!(error = %err, txn_id = %txn_id, "failed to persist otp transaction");
        }
    }

    /// Verify the OTP and enrol, persisting the returned profile.
    pub async fn verify_and_enroll(
        &self,
        txn_id: &str,
        otp: &str,
        mobile: Option<&str>,
    ) -> Result<Value, AppError> {
        if !digits(otp, 6) {
            return Err(AppError::bad_request(
                "INVALID_OTP_FORMAT",
                "otp must be 6 digits",
            ));
        }
        if txn_id.trim().is_empty() {
            return Err(AppError::bad_request(
                "MISSING_TXN_ID",
                "transaction id is required",
            ));
        }

        let response = self.verify_with_authority(txn_id, otp, mobile).await?;

        let profile = map_enrolled_profile(&response)?;
        let abha_number = profile.abha_number.clone();
        ProfileRepository::new(&self.state.store)
            .upsert(profile)
            .map_err(|e| {
                AppError::internal("ABHA_SAVE_FAILED", "failed to save identity profile")
                    .with_cause(e)
            })?;

        self.state.txlog.record(
            TransactionLogEntry::new("enroll_verify_otp", ENROL_BY_AADHAAR_PATH)
                .with_abha(abha_number.clone())
                .with_status(200),
        );
        info!(abha = %mask(&abha_number), "enrollment verified");

        Ok(response)
    }

    async fn verify_with_authority(
        &self,
        txn_id: &str,
        otp: &str,
        mobile: Option<&str>,
    ) -> Result<Value, AppError> {
        let public_key = crypto::fetch_public_key(&self.state.authority).await?;
        let encrypted_otp = crypto::encrypt_with_public_key(&public_key, otp)?;
        let token = self.state.authority.machine_token().await?;

        let payload = to_payload(&EnrolByAadhaarPayload {
            auth_data: AuthData {
                auth_methods: vec!["otp"],
                otp: OtpAuth {
                    time_stamp: enrol_timestamp(),
                    txn_id: txn_id.to_string(),
                    otp_value: encrypted_otp,
                    mobile: mobile
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string),
                },
            },
            consent: Consent {
                code: CONSENT_CODE,
                version: CONSENT_VERSION,
            },
        })?;

        self.state
            .authority
            .post_json(ENROL_BY_AADHAAR_PATH, &payload, &token, "ABDM_ENROL")
            .await
            .map_err(|err| {
                if err.to_string().contains("INVALID_OTP") {
                    AppError::bad_request("ABDM_INVALID_OTP", "invalid otp").with_cause(err)
                } else {
                    err
                }
            })
    }

    /// Verify the OTP, create a downstream individual record, and persist
    /// the profile — the richer v2 flow.
    pub async fn verify_and_create(&self, input: VerifyAndCreateInput) -> Result<Value, AppError> {
        if !digits(&input.otp, 6) {
            return Err(AppError::bad_request(
                "INVALID_OTP_FORMAT",
                "otp must be 6 digits",
            ));
        }
        if let Some(mobile) = input.mobile.as_deref() {
            if !mobile.is_empty() && !digits(mobile, 10) {
                return Err(AppError::bad_request(
                    "INVALID_MOBILE_FORMAT",
                    "mobile must be 10 digits",
                ));
            }
        }
        if input.txn_id.trim().is_empty() {
            return Err(AppError::bad_request(
                "MISSING_TXN_ID",
                "transaction id is required",
            ));
        }
        if input.tenant_id.trim().is_empty()
            || input.client_reference_id.trim().is_empty()
            || input.auth_token.trim().is_empty()
            || input.user_uuid.trim().is_empty()
            || input.user_id == 0
        {
            return Err(AppError::bad_request(
                "MISSING_HCM_INPUTS",
                "required downstream inputs missing",
            ));
        }

        let response = self
            .verify_with_authority(&input.txn_id, &input.otp, input.mobile.as_deref())
            .await
            .map_err(wrap_verify_error)?;

        let mut profile = map_enrolled_profile(&response)?;
        let abha_number = profile.abha_number.clone();

        // The linked secret, when it survives unsealing, rides along as an
        // extra identifier on the downstream record.
        let aadhaar_plain = self.resolve_linked_secret(&input.txn_id);

        let envelope = build_individual_envelope(&input, &profile, &abha_number, aadhaar_plain);
        let hcm_url = self.state.config.hcm_individual_url.as_deref().ok_or_else(|| {
            AppError::internal(
                "HCM_URL_MISSING",
                "individual create URL is not configured",
            )
        })?;

        let hcm_response = self
            .state
            .authority
            .post_url_json(hcm_url, &to_payload(&envelope)?, "HCM_INDIVIDUAL_CREATE")
            .await
            .map_err(|err| {
                let mut wrapped = AppError::recoverable(
                    "HCM_INDIVIDUAL_CREATE_FAILED",
                    "downstream individual create failed",
                    StatusCode::BAD_GATEWAY,
                )
                .with_cause(&err);
                wrapped.details = err.details;
                wrapped
            })?;

        let record_id = text_opt(&hcm_response, "/Individual/id").ok_or_else(|| {
            AppError::internal(
                "INDIVIDUAL_ID_MISSING",
                "individual response did not include an id",
            )
        })?;
        let individual_id =
            text_opt(&hcm_response, "/Individual/individualId").unwrap_or_else(|| record_id.clone());

        profile.external_id = choose_external_id(&record_id);
        ProfileRepository::new(&self.state.store)
            .upsert(profile)
            .map_err(|e| {
                AppError::internal("ABHA_SAVE_FAILED", "failed to save identity profile")
                    .with_cause(e)
            })?;

        let txn_repo = TransactionRepository::new(&self.state.store);
        if let Err(err) =
            txn_repo.update_on_verify(&input.txn_id, &individual_id, &abha_number, "system")
        {
            warn!(error = %err, txn_id = %input.txn_id, "failed to link verified transaction");
        }

        self.state.txlog.record(
            TransactionLogEntry::new("enroll_verify_create_v2", ENROL_BY_AADHAAR_PATH)
                .with_abha(abha_number.clone())
                .with_status(200),
        );
        info!(abha = %mask(&abha_number), individual_id = %individual_id, "enrollment verified and individual created");

        Ok(json!({
            "abhaNumber": abha_number,
            "individualId": individual_id,
            "hcmResponse": hcm_response,
        }))
    }

    fn resolve_linked_secret(&self, txn_id: &str) -> Option<String> {
        let repo = TransactionRepository::new(&self.state.store);
        let sealed = match repo.sealed_secret_by_txn(txn_id) {
            Ok(sealed) => sealed,
            Err(err) => {
                warn!(error = %err, txn_id = %txn_id, "no stored secret for transaction");
                return None;
            }
        };
        match self.state.vault.open(&sealed) {
            Ok(plain) if digits(&plain, 12) => Some(plain),
            Ok(_) => {
                warn!(txn_id = %txn_id, "unsealed secret has unexpected format");
                None
            }
            Err(err) => {
                warn!(error = %err, txn_id = %txn_id, "failed to unseal stored secret");
                None
            }
        }
    }

    /// Link a mobile number to an in-flight enrollment.
    pub async fn link_mobile(&self, mobile: &str, txn_id: &str) -> Result<Value, AppError> {
        if !digits(mobile.trim(), 10) {
            return Err(AppError::bad_request(
                "INVALID_MOBILE_FORMAT",
                "mobile must be 10 digits",
            ));
        }

        let public_key = crypto::fetch_public_key(&self.state.authority).await?;
        let encrypted = crypto::encrypt_with_public_key(&public_key, mobile.trim())?;
        let token = self.state.authority.machine_token().await?;

        let payload = to_payload(&OtpRequestPayload {
            scope: vec!["abha-enrol", "mobile-verify"],
            login_hint: "mobile",
            login_id: encrypted,
            otp_system: "abdm",
            txn_id: Some(txn_id.to_string()),
        })?;

        self.state
            .authority
            .post_json(OTP_REQUEST_PATH, &payload, &token, "ABDM_LINK_MOBILE")
            .await
    }

    /// Verify the OTP sent to a linked mobile number.
    pub async fn verify_mobile_otp(&self, txn_id: &str, otp: &str) -> Result<Value, AppError> {
        if !digits(otp, 6) {
            return Err(AppError::bad_request(
                "INVALID_OTP_FORMAT",
                "otp must be 6 digits",
            ));
        }

        let public_key = crypto::fetch_public_key(&self.state.authority).await?;
        let encrypted_otp = crypto::encrypt_with_public_key(&public_key, otp)?;
        let token = self.state.authority.machine_token().await?;

        let payload = to_payload(&MobileVerifyPayload {
            scope: vec!["abha-enrol", "mobile-verify"],
            auth_data: AuthData {
                auth_methods: vec!["otp"],
                otp: OtpAuth {
                    time_stamp: enrol_timestamp(),
                    txn_id: txn_id.to_string(),
                    otp_value: encrypted_otp,
                    mobile: None,
                },
            },
        })?;

        self.state
            .authority
            .post_json(MOBILE_VERIFY_PATH, &payload, &token, "ABDM_MOBILE_VERIFY")
            .await
    }

    /// Fetch alias suggestions for an in-flight enrollment.
    pub async fn address_suggestions(&self, txn_id: &str) -> Result<Value, AppError> {
        let token = self.state.authority.machine_token().await?;
        self.state
            .authority
            .get_json(
                ADDRESS_SUGGEST_PATH,
                &token,
                &[("TRANSACTION_ID", txn_id)],
                "ADDRESS_SUGGEST",
            )
            .await
    }

    /// Register the chosen alias as the preferred address.
    pub async fn enrol_address(&self, txn_id: &str, abha_address: &str) -> Result<Value, AppError> {
        if abha_address.trim().is_empty() {
            return Err(AppError::bad_request(
                "MISSING_ABHA_ADDRESS",
                "abha address is required",
            ));
        }

        let token = self.state.authority.machine_token().await?;
        let payload = to_payload(&EnrolAddressPayload {
            txn_id: txn_id.to_string(),
            abha_address: abha_address.trim().to_string(),
            preferred: 1,
        })?;

        let response = self
            .state
            .authority
            .post_json(ENROL_ADDRESS_PATH, &payload, &token, "ENROL_ADDRESS")
            .await?;

        // Best-effort alias merge into the stored profile.
        let abha_number = text_opt(&response, "/healthIdNumber");
        let alias = text_opt(&response, "/preferredAbhaAddress");
        if let (Some(abha_number), Some(alias)) = (abha_number, alias) {
            let update = IdentityProfile {
                abha_number,
                health_id: alias,
                last_modified_by: "system".to_string(),
                ..Default::default()
            };
            if let Err(err) = ProfileRepository::new(&self.state.store).upsert(update) {
                warn!(error = %err, "failed to merge enrolled address into profile");
            }
        }

        Ok(response)
    }
}

/// Map the authority's verify-enroll response into an identity profile.
///
/// A missing identity number or given name is a verify failure, never
/// silently defaulted. The first PHR address becomes the alias; absence is
/// non-fatal.
pub(crate) fn map_enrolled_profile(response: &Value) -> Result<IdentityProfile, AppError> {
    let abha_number = text_opt(response, "/ABHAProfile/ABHANumber")
        .or_else(|| text_opt(response, "/ABHAProfile/healthIdNumber"))
        .ok_or_else(|| {
            AppError::recoverable(
                "ABDM_VERIFY_ERROR",
                "missing identity number in authority response",
                StatusCode::BAD_GATEWAY,
            )
        })?;
    let first_name = text_opt(response, "/ABHAProfile/firstName").ok_or_else(|| {
        AppError::recoverable(
            "ABDM_VERIFY_ERROR",
            "missing first name in authority profile",
            StatusCode::BAD_GATEWAY,
        )
    })?;

    let last_name = text(response, "/ABHAProfile/lastName");
    let name = format!("{first_name} {last_name}").trim().to_string();

    Ok(IdentityProfile {
        abha_number,
        health_id: text(response, "/ABHAProfile/phrAddress/0"),
        first_name,
        middle_name: text(response, "/ABHAProfile/middleName"),
        last_name,
        name,
        gender: text(response, "/ABHAProfile/gender"),
        date_of_birth: text(response, "/ABHAProfile/dob"),
        address: text(response, "/ABHAProfile/address"),
        district: text(response, "/ABHAProfile/districtCode"),
        state: text(response, "/ABHAProfile/stateCode"),
        pincode: text(response, "/ABHAProfile/pinCode"),
        mobile: text(response, "/ABHAProfile/mobile"),
        email: text(response, "/ABHAProfile/email"),
        profile_photo: text(response, "/ABHAProfile/photo"),
        access_token: text(response, "/tokens/token"),
        refresh_token: text(response, "/tokens/refreshToken"),
        created_by: "system".to_string(),
        last_modified_by: "system".to_string(),
        new: true,
        ..Default::default()
    })
}

fn build_individual_envelope(
    input: &VerifyAndCreateInput,
    profile: &IdentityProfile,
    abha_number: &str,
    aadhaar_plain: Option<String>,
) -> IndividualCreateEnvelope {
    let mut identifiers = Vec::with_capacity(2);
    if let Some(aadhaar) = aadhaar_plain {
        identifiers.push(RecordIdentifier {
            identifier_type: "AADHAAR",
            identifier_id: aadhaar,
        });
    }
    identifiers.push(RecordIdentifier {
        identifier_type: "ABHA",
        identifier_id: abha_number.to_string(),
    });

    let dob = non_empty(format_dob(&profile.date_of_birth));
    let gender = non_empty(normalize_gender(&profile.gender));
    let mobile = Some(profile.mobile.trim().to_string()).filter(|m| digits(m, 10));
    let email = non_empty(profile.email.trim().to_string());
    let address_line1 = non_empty(profile.address.trim().to_string());
    let pincode = non_empty(profile.pincode.trim().to_string());
    let locality = input
        .locality_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|code| LocalityRef {
            code: code.to_string(),
        });

    let address = if address_line1.is_some() || pincode.is_some() || locality.is_some() {
        Some(vec![RecordAddress {
            client_reference_id: input.client_reference_id.clone(),
            tenant_id: "default",
            kind: "OTHER",
            address_line1,
            pincode,
            locality,
        }])
    } else {
        None
    };

    IndividualCreateEnvelope {
        request_info: RequestInfo {
            api_id: "dev",
            msg_id: "Create Individual",
            auth_token: input.auth_token.clone(),
            user_info: UserRef {
                id: input.user_id,
                uuid: input.user_uuid.clone(),
            },
        },
        individual: IndividualRecord {
            tenant_id: input.tenant_id.clone(),
            client_reference_id: input.client_reference_id.clone(),
            name: PersonName {
                given_name: profile.first_name.clone(),
                family_name: non_empty(profile.last_name.clone()),
                other_names: non_empty(profile.middle_name.clone()),
            },
            row_version: 1,
            is_system_user: false,
            identifiers,
            date_of_birth: dob,
            gender,
            mobile_number: mobile,
            email,
            address,
        },
    }
}

/// Normalize a failed authority verify for the v2 flow.
///
/// Internal faults (crypto, token, client construction) keep their own code
/// and classification; a rejected OTP keeps its dedicated code. Only other
/// upstream-derived rejections collapse into the single verify-failure code.
fn wrap_verify_error(err: AppError) -> AppError {
    if err.kind == ErrorKind::NonRecoverable || err.code == "ABDM_INVALID_OTP" {
        return err;
    }
    let mut wrapped = AppError::recoverable(
        "ABDM_VERIFY_ERROR",
        "authority verify call failed",
        StatusCode::BAD_GATEWAY,
    )
    .with_cause(&err);
    wrapped.details = err.details;
    wrapped
}

/// Use the downstream record id as the external correlation id only when it
/// is a well-formed UUID; otherwise mint a fresh one.
pub(crate) fn choose_external_id(record_id: &str) -> String {
    if Uuid::parse_str(record_id).is_ok() {
        record_id.to_string()
    } else {
        Uuid::new_v4().to_string()
    }
}

/// Normalize a date of birth to `DD/MM/YYYY`.
///
/// The authority sends either `YYYY-MM-DD` or `DD-MM-YYYY`; anything else is
/// passed through untouched.
pub(crate) fn format_dob(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%d/%m/%Y").to_string();
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%d-%m-%Y") {
        return date.format("%d/%m/%Y").to_string();
    }
    raw.to_string()
}

/// Collapse gender codes into the three canonical values, defaulting
/// unrecognized input to [`DEFAULT_GENDER`].
pub(crate) fn normalize_gender(raw: &str) -> String {
    match raw.trim().to_ascii_uppercase().as_str() {
        "" => String::new(),
        "M" | "MALE" => "MALE".to_string(),
        "F" | "FEMALE" => "FEMALE".to_string(),
        "O" | "OTHER" | "OTHERS" => "OTHER".to_string(),
        _ => DEFAULT_GENDER.to_string(),
    }
}

fn enrol_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| {
        AppError::internal("REQ_MARSHAL_FAILED", "failed to serialize request payload")
            .with_cause(e)
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn text(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn text_opt(value: &Value, pointer: &str) -> Option<String> {
    Some(text(value, pointer)).filter(|s| !s.is_empty())
}

pub(crate) fn mask(s: &str) -> String {
    let s = s.trim();
    if s.len() <= 6 {
        return "***".to_string();
    }
    format!("{}****{}", &s[..3], &s[s.len() - 3..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digit_validation() {
        assert!(digits("123456789012", 12));
        assert!(!digits("12345678901", 12));
        assert!(!digits("12345678901x", 12));
        assert!(digits("000111", 6));
        assert!(!digits("00011", 6));
    }

    #[test]
    fn dob_formats_normalize_to_slashed() {
        assert_eq!(format_dob("1994-03-21"), "21/03/1994");
        assert_eq!(format_dob("21-03-1994"), "21/03/1994");
        // Unknown formats pass through untouched.
        assert_eq!(format_dob("21.03.1994"), "21.03.1994");
        assert_eq!(format_dob(""), "");
    }

    #[test]
    fn gender_codes_collapse_to_canonical_values() {
        assert_eq!(normalize_gender("M"), "MALE");
        assert_eq!(normalize_gender("male"), "MALE");
        assert_eq!(normalize_gender("F"), "FEMALE");
        assert_eq!(normalize_gender(" female "), "FEMALE");
        assert_eq!(normalize_gender("Others"), "OTHER");
        assert_eq!(normalize_gender("X"), DEFAULT_GENDER);
        assert_eq!(normalize_gender(""), "");
    }

    #[test]
    fn external_id_keeps_valid_uuid() {
        let id = "0bb1f9bc-9823-4a9e-a586-07c8a2e7bd6d";
        assert_eq!(choose_external_id(id), id);
    }

    #[test]
    fn external_id_replaces_non_uuid() {
        let generated = choose_external_id("IND-000123");
        assert_ne!(generated, "IND-000123");
        assert!(Uuid::parse_str(&generated).is_ok());
    }

    #[test]
    fn otp_payload_omits_absent_txn_id() {
        let payload = to_payload(&OtpRequestPayload {
            scope: vec!["abha-enrol"],
            login_hint: "aadhaar",
            login_id: "cipher".to_string(),
            otp_system: "aadhaar",
            txn_id: None,
        })
        .unwrap();
        assert_eq!(payload["loginHint"], "aadhaar");
        assert_eq!(payload["scope"], json!(["abha-enrol"]));
        assert!(payload.get("txnId").is_none());
    }

    #[test]
    fn enrol_payload_carries_consent_and_auth_data() {
        let payload = to_payload(&EnrolByAadhaarPayload {
            auth_data: AuthData {
                auth_methods: vec!["otp"],
                otp: OtpAuth {
                    time_stamp: "2026-02-03 10:11:12".to_string(),
                    txn_id: "T1".to_string(),
                    otp_value: "cipher".to_string(),
                    mobile: None,
                },
            },
            consent: Consent {
                code: CONSENT_CODE,
                version: CONSENT_VERSION,
            },
        })
        .unwrap();

        assert_eq!(payload["consent"]["code"], "abha-enrollment");
        assert_eq!(payload["consent"]["version"], "1.4");
        assert_eq!(payload["authData"]["authMethods"], json!(["otp"]));
        assert_eq!(payload["authData"]["otp"]["txnId"], "T1");
        assert!(payload["authData"]["otp"].get("mobile").is_none());
    }

    fn verify_response() -> Value {
        json!({
            "txnId": "T1",
            "tokens": {"token": "acc-1", "refreshToken": "ref-1"},
            "ABHAProfile": {
                "ABHANumber": "91123412341234",
                "firstName": "Asha",
                "lastName": "Devi",
                "dob": "21-03-1994",
                "gender": "F",
                "mobile": "9999900000",
                "phrAddress": ["asha@sbx"]
            }
        })
    }

    #[test]
    fn enrolled_profile_maps_alias_and_tokens() {
        let profile = map_enrolled_profile(&verify_response()).unwrap();
        assert_eq!(profile.abha_number, "91123412341234");
        assert_eq!(profile.health_id, "asha@sbx");
        assert_eq!(profile.name, "Asha Devi");
        assert_eq!(profile.access_token, "acc-1");
        assert_eq!(profile.refresh_token, "ref-1");
        assert!(profile.new);
    }

    #[test]
    fn missing_first_name_is_a_verify_failure() {
        let mut response = verify_response();
        response["ABHAProfile"]
            .as_object_mut()
            .unwrap()
            .remove("firstName");
        let err = map_enrolled_profile(&response).unwrap_err();
        assert_eq!(err.code, "ABDM_VERIFY_ERROR");
    }

    #[test]
    fn missing_identity_number_is_a_verify_failure() {
        let response = json!({"ABHAProfile": {"firstName": "Asha"}});
        let err = map_enrolled_profile(&response).unwrap_err();
        assert_eq!(err.code, "ABDM_VERIFY_ERROR");
    }

    #[test]
    fn health_id_number_is_the_identity_fallback() {
        let response = json!({
            "ABHAProfile": {"healthIdNumber": "91000000000000", "firstName": "Asha"}
        });
        let profile = map_enrolled_profile(&response).unwrap();
        assert_eq!(profile.abha_number, "91000000000000");
    }

    #[test]
    fn absent_phr_address_is_non_fatal() {
        let mut response = verify_response();
        response["ABHAProfile"]
            .as_object_mut()
            .unwrap()
            .remove("phrAddress");
        let profile = map_enrolled_profile(&response).unwrap();
        assert_eq!(profile.health_id, "");
    }

    fn v2_input() -> VerifyAndCreateInput {
        VerifyAndCreateInput {
            txn_id: "T1".to_string(),
            otp: "000111".to_string(),
            mobile: None,
            tenant_id: "default".to_string(),
            client_reference_id: "ref-1".to_string(),
            auth_token: "hcm-token".to_string(),
            user_id: 7,
            user_uuid: "u-1".to_string(),
            locality_code: None,
        }
    }

    #[test]
    fn individual_envelope_omits_empty_optionals() {
        let profile = IdentityProfile {
            abha_number: "91123412341234".to_string(),
            first_name: "Asha".to_string(),
            ..Default::default()
        };
        let envelope = build_individual_envelope(&v2_input(), &profile, "91123412341234", None);
        let body = to_payload(&envelope).unwrap();

        let individual = &body["Individual"];
        assert_eq!(individual["name"]["givenName"], "Asha");
        assert!(individual["name"].get("familyName").is_none());
        assert!(individual.get("dateOfBirth").is_none());
        assert!(individual.get("gender").is_none());
        assert!(individual.get("mobileNumber").is_none());
        assert!(individual.get("address").is_none());
        // Identity number always present in the identifiers.
        assert_eq!(individual["identifiers"][0]["identifierType"], "ABHA");
        assert_eq!(body["RequestInfo"]["authToken"], "hcm-token");
    }

    #[test]
    fn individual_envelope_includes_linked_secret_first() {
        let profile = IdentityProfile {
            abha_number: "91123412341234".to_string(),
            first_name: "Asha".to_string(),
            last_name: "Devi".to_string(),
            gender: "F".to_string(),
            date_of_birth: "1994-03-21".to_string(),
            mobile: "9999900000".to_string(),
            address: "12 Lake Road".to_string(),
            pincode: "560001".to_string(),
            ..Default::default()
        };
        let envelope = build_individual_envelope(
            &v2_input(),
            &profile,
            "91123412341234",
            Some("123456789012".to_string()),
        );
        let body = to_payload(&envelope).unwrap();

        let individual = &body["Individual"];
        assert_eq!(individual["identifiers"][0]["identifierType"], "AADHAAR");
        assert_eq!(individual["identifiers"][0]["identifierId"], "123456789012");
        assert_eq!(individual["identifiers"][1]["identifierType"], "ABHA");
        assert_eq!(individual["dateOfBirth"], "21/03/1994");
        assert_eq!(individual["gender"], "FEMALE");
        assert_eq!(individual["mobileNumber"], "9999900000");
        assert_eq!(individual["address"][0]["addressLine1"], "12 Lake Road");
        assert_eq!(individual["address"][0]["pincode"], "560001");
        assert!(individual["address"][0].get("locality").is_none());
    }

    #[test]
    fn internal_faults_keep_their_code_through_verify_wrapping() {
        let err = wrap_verify_error(AppError::internal(
            "PUBLIC_KEY_HTTP_FAILED",
            "public key fetch failed",
        ));
        assert_eq!(err.code, "PUBLIC_KEY_HTTP_FAILED");
        assert_eq!(err.kind, ErrorKind::NonRecoverable);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejected_otp_keeps_its_code_through_verify_wrapping() {
        let err = wrap_verify_error(AppError::bad_request("ABDM_INVALID_OTP", "invalid otp"));
        assert_eq!(err.code, "ABDM_INVALID_OTP");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_rejections_collapse_into_verify_error() {
        let upstream = AppError::from_upstream(
            StatusCode::BAD_REQUEST,
            br#"{"code":"ABDM-1114","message":"txn expired"}"#,
            "ABDM_ENROL",
        );
        let err = wrap_verify_error(upstream);
        assert_eq!(err.code, "ABDM_VERIFY_ERROR");
        assert_eq!(err.kind, ErrorKind::Recoverable);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        // The upstream body rides along for diagnosis.
        assert!(err.details.is_some());
    }

    #[test]
    fn masking_keeps_edges_only() {
        assert_eq!(mask("91123412341234"), "911****234");
        assert_eq!(mask("short"), "***");
    }
}
