// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential fetcher: visual ID cards and QR codes.
//!
//! Assets are fetched with two bearers: the user token in `X-Token` and a
//! fresh machine token in `Authorization`. Access tokens expire faster than
//! refresh tokens and a single call cannot know in advance whether the stored
//! access token is stale, so the first failure is treated as a freshness
//! signal: one retry with the refresh token, then give up.

use axum::http::StatusCode;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{ProfileRepository, TransactionLogEntry};

/// Asset kinds exposed by the authority's account endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAsset {
    Card,
    SvgCard,
    PngCard,
    Qr,
}

impl CardAsset {
    /// Parse the caller-facing `card_type` value.
    pub fn from_card_type(raw: &str) -> Option<Self> {
        match raw {
            "getCard" => Some(Self::Card),
            "getSvgCard" => Some(Self::SvgCard),
            "getPngCard" => Some(Self::PngCard),
            _ => None,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Card => "/profile/account/abha-card",
            Self::SvgCard => "/profile/account/abha-card/svg",
            Self::PngCard => "/profile/account/abha-card/png",
            Self::Qr => "/profile/account/qrCode",
        }
    }

    fn code_prefix(self) -> &'static str {
        match self {
            Self::Qr => "QR_FETCH",
            _ => "ABHA_CARD_FETCH",
        }
    }
}

/// A fetched binary credential with its sniffed content type.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Credential fetcher borrowing the shared application state.
pub struct Credentials<'a> {
    state: &'a AppState,
}

impl<'a> Credentials<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Fetch an asset using the token pair stored for the identity.
    pub async fn fetch(
        &self,
        abha_number: &str,
        asset: CardAsset,
    ) -> Result<FetchedAsset, AppError> {
        let (access_token, refresh_token) = ProfileRepository::new(&self.state.store)
            .tokens(abha_number)
            .ok()
            .filter(|(access, _)| !access.trim().is_empty())
            .ok_or_else(|| {
                AppError::not_found(
                    "ABHA_NOT_FOUND_OR_TOKEN_MISSING",
                    "identity not found or access token missing",
                )
            })?;

        let asset_result = self
            .fetch_with_fallback(
                asset,
                &access_token,
                Some(refresh_token.as_str()).filter(|t| !t.is_empty()),
            )
            .await;

        self.state.txlog.record(
            TransactionLogEntry::new("credential_fetch", asset.path())
                .with_abha(abha_number)
                .with_status(if asset_result.is_ok() { 200 } else { 502 }),
        );

        asset_result
    }

    /// Fetch an asset with a caller-supplied token pair.
    pub async fn fetch_with_tokens(
        &self,
        asset: CardAsset,
        token: &str,
        refresh_token: &str,
    ) -> Result<FetchedAsset, AppError> {
        let token = token.trim();
        let refresh_token = refresh_token.trim();
        if token.is_empty() && refresh_token.is_empty() {
            return Err(AppError::bad_request(
                "MISSING_TOKEN",
                "either token or refresh_token must be provided",
            ));
        }

        // With no access token the refresh token is the only attempt.
        if token.is_empty() {
            return self.attempt(asset, refresh_token).await.map_err(|err| {
                fetch_failed(asset.code_prefix(), err)
            });
        }

        self.fetch_with_fallback(asset, token, Some(refresh_token).filter(|t| !t.is_empty()))
            .await
    }

    async fn fetch_with_fallback(
        &self,
        asset: CardAsset,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<FetchedAsset, AppError> {
        let first_err = match self.attempt(asset, access_token).await {
            Ok(fetched) => {
                debug!("asset fetched with access token");
                return Ok(fetched);
            }
            Err(err) => err,
        };

        let Some(refresh_token) = refresh_token else {
            // No fallback available: the first failure is terminal.
            return Err(first_err.into_non_recoverable());
        };

        info!(error = %first_err, "access token attempt failed, retrying with refresh token");
        match self.attempt(asset, refresh_token).await {
            Ok(fetched) => Ok(fetched),
            Err(second_err) => {
                warn!(error = %second_err, "refresh token attempt also failed");
                Err(fetch_failed(asset.code_prefix(), second_err))
            }
        }
    }

    async fn attempt(&self, asset: CardAsset, user_token: &str) -> Result<FetchedAsset, AppError> {
        let machine_token = self.state.authority.machine_token().await?;
        let bytes = self
            .state
            .authority
            .fetch_asset(asset.path(), user_token, &machine_token, asset.code_prefix())
            .await?;
        Ok(finish_asset(bytes))
    }
}

fn fetch_failed(prefix: &str, cause: AppError) -> AppError {
    let mut err = AppError::recoverable(
        format!("{prefix}_FAILED"),
        "asset fetch failed with all available tokens",
        StatusCode::BAD_GATEWAY,
    )
    .with_cause(&cause);
    err.details = cause.details;
    err
}

/// Sniff the content type and unwrap SVG-embedded raster images.
fn finish_asset(bytes: Vec<u8>) -> FetchedAsset {
    let content_type = sniff_content_type(&bytes);
    if content_type == "image/svg+xml" {
        if let Some((decoded, raster_type)) = extract_svg_image(&bytes) {
            return FetchedAsset {
                bytes: decoded,
                content_type: raster_type.to_string(),
            };
        }
        // Extraction failure never fails the fetch.
    }
    FetchedAsset {
        bytes,
        content_type,
    }
}

/// Minimal magic-byte content sniffing for the asset types the authority
/// actually serves.
pub(crate) fn sniff_content_type(bytes: &[u8]) -> String {
    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";
    const PDF_MAGIC: &[u8] = b"%PDF";

    if bytes.starts_with(PNG_MAGIC) {
        return "image/png".to_string();
    }
    if bytes.starts_with(JPEG_MAGIC) {
        return "image/jpeg".to_string();
    }
    if bytes.starts_with(PDF_MAGIC) {
        return "application/pdf".to_string();
    }

    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let trimmed = head.trim_start();
    if trimmed.starts_with("<?xml") || trimmed.starts_with("<svg") {
        return "image/svg+xml".to_string();
    }

    "application/octet-stream".to_string()
}

/// Locate and decode a raster image embedded in an SVG wrapper
/// (`data:image/(png|jpeg);base64,...`). Returns `None` when no decodable
/// image is present.
pub(crate) fn extract_svg_image(svg: &[u8]) -> Option<(Vec<u8>, &'static str)> {
    let text = std::str::from_utf8(svg).ok()?;

    for (marker, content_type) in [
        ("data:image/png;base64,", "image/png"),
        ("data:image/jpeg;base64,", "image/jpeg"),
    ] {
        let Some(start) = text.find(marker) else {
            continue;
        };
        let payload = &text[start + marker.len()..];
        let end = payload.find(['"', '\''])?;
        let encoded = &payload[..end];
        if let Ok(decoded) = BASE64.decode(encoded) {
            return Some((decoded, content_type));
        }
    }
    None
}
