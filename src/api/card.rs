// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential route handlers: binary card and QR responses with the content
//! type sniffed from the asset bytes.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::credentials::{CardAsset, Credentials, FetchedAsset};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CardFetchRequest {
    pub abha_number: String,
    /// One of `getCard`, `getSvgCard`, `getPngCard`.
    pub card_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CardFetchV2Request {
    #[serde(default)]
    pub abha_number: Option<String>,
    /// One of `getCard`, `getSvgCard`, `getPngCard`.
    pub card_type: String,
    /// Caller-supplied user access token.
    #[serde(default)]
    pub token: String,
    /// Caller-supplied user refresh token.
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct QrFetchRequest {
    pub abha_number: String,
}

fn parse_card_type(raw: &str) -> Result<CardAsset, AppError> {
    CardAsset::from_card_type(raw).ok_or_else(|| {
        AppError::bad_request(
            "INVALID_CARD_TYPE",
            "card_type must be one of: getCard, getSvgCard, getPngCard",
        )
    })
}

fn binary_response(asset: FetchedAsset) -> Response {
    let filename = match asset.content_type.as_str() {
        "image/svg+xml" => Some("inline; filename=abha.svg"),
        "image/jpeg" => Some("inline; filename=abha.jpg"),
        "image/png" => Some("inline; filename=abha.png"),
        _ => None,
    };

    let mut response = ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response();
    if let Some(disposition) = filename {
        if let Ok(value) = disposition.parse() {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}

/// Fetch a visual ID card using the stored token pair.
#[utoipa::path(
    post,
    path = "/api/abha/card/fetch",
    tag = "Credentials",
    request_body = CardFetchRequest,
    responses(
        (status = 200, description = "Card bytes, content type sniffed from the payload"),
        (status = 404, description = "Identity unknown or no stored access token"),
        (status = 502, description = "Both token attempts failed")
    )
)]
pub async fn fetch_card(
    State(state): State<AppState>,
    Json(body): Json<CardFetchRequest>,
) -> Result<Response, AppError> {
    let asset_kind = parse_card_type(&body.card_type)?;
    let asset = Credentials::new(&state)
        .fetch(&body.abha_number, asset_kind)
        .await?;
    Ok(binary_response(asset))
}

/// Fetch a visual ID card with caller-supplied tokens.
#[utoipa::path(
    post,
    path = "/api/abha/card/fetch-v2",
    tag = "Credentials",
    request_body = CardFetchV2Request,
    responses(
        (status = 200, description = "Card bytes, content type sniffed from the payload"),
        (status = 400, description = "Missing token or unsupported card type"),
        (status = 502, description = "All provided tokens failed")
    )
)]
pub async fn fetch_card_v2(
    State(state): State<AppState>,
    Json(body): Json<CardFetchV2Request>,
) -> Result<Response, AppError> {
    let asset_kind = parse_card_type(&body.card_type)?;
    let asset = Credentials::new(&state)
        .fetch_with_tokens(asset_kind, &body.token, &body.refresh_token)
        .await?;
    Ok(binary_response(asset))
}

/// Fetch the identity QR code using the stored token pair.
#[utoipa::path(
    post,
    path = "/api/abha/qr",
    tag = "Credentials",
    request_body = QrFetchRequest,
    responses(
        (status = 200, description = "QR code bytes"),
        (status = 404, description = "Identity unknown or no stored access token"),
        (status = 502, description = "Both token attempts failed")
    )
)]
pub async fn fetch_qr(
    State(state): State<AppState>,
    Json(body): Json<QrFetchRequest>,
) -> Result<Response, AppError> {
    let asset = Credentials::new(&state)
        .fetch(&body.abha_number, CardAsset::Qr)
        .await?;
    Ok(binary_response(asset))
}
