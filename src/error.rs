// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Normalized error taxonomy and upstream error translation.
//!
//! Every externally-surfaced failure is exactly one [`AppError`]: a
//! machine-readable code, a human message, a `Recoverable`/`NonRecoverable`
//! kind, an HTTP status, and whatever diagnostic payload the upstream
//! returned. Upstream non-2xx responses never pass through verbatim; they go
//! through [`AppError::from_upstream`] so the authority's response shape
//! never leaks into this system's error contract.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Code used by the boundary guard for uncaught failures.
pub const CODE_PANIC: &str = "PANIC";
/// Code for malformed inbound request bodies.
pub const CODE_INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
/// Code for wrapped internal defects without a more specific code.
pub const CODE_INTERNAL: &str = "INTERNAL";

/// Coarse failure classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum ErrorKind {
    /// Caller may retry or resubmit; bad user input or upstream rejection.
    #[serde(rename = "RECOVERABLE")]
    Recoverable,
    /// Internal defect: crypto failure, malformed config, decode failure.
    #[serde(rename = "NON_RECOVERABLE")]
    NonRecoverable,
}

/// Normalized error carried by every failing boundary call.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub kind: ErrorKind,
    pub status: StatusCode,
    /// Parsed upstream error body, or the raw body string when not JSON.
    pub details: Option<Value>,
    /// Stringified wrapped cause, surfaced as the envelope description.
    pub cause: Option<String>,
}

impl AppError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        kind: ErrorKind,
        status: StatusCode,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
            status,
            details: None,
            cause: None,
        }
    }

    pub fn recoverable(
        code: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self::new(code, message, ErrorKind::Recoverable, status)
    }

    pub fn non_recoverable(
        code: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self::new(code, message, ErrorKind::NonRecoverable, status)
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::recoverable(code, message, StatusCode::BAD_REQUEST)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::recoverable(code, message, StatusCode::NOT_FOUND)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::non_recoverable(code, message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Flip the classification, keeping everything else.
    pub fn into_non_recoverable(mut self) -> Self {
        self.kind = ErrorKind::NonRecoverable;
        self
    }

    /// Translate an upstream HTTP failure into a normalized error.
    ///
    /// Structured extraction is attempted in priority order:
    /// 1. `{"error":{"code","message"}}`
    /// 2. `{"code","message"}`
    /// 3. `{"errorCode","errorMessage"}`
    /// 4. `{"errors":[{"code","message"}, ...]}` (first element)
    ///
    /// The first shape yielding a non-empty code or message wins. If none
    /// match, the code falls back to `code_prefix + "_UPSTREAM"` and the
    /// message to the status's canonical reason phrase. The parsed body (or
    /// the raw string when not JSON) is always kept in `details`.
    pub fn from_upstream(status: StatusCode, body: &[u8], code_prefix: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();

        let mut code = String::new();
        let mut message = status
            .canonical_reason()
            .unwrap_or("Upstream Failure")
            .to_string();

        if let Some(value) = parsed.as_ref() {
            let shapes = [
                ("/error/code", "/error/message"),
                ("/code", "/message"),
                ("/errorCode", "/errorMessage"),
                ("/errors/0/code", "/errors/0/message"),
            ];
            for (code_ptr, message_ptr) in shapes {
                let shape_code = non_empty_str(value, code_ptr);
                let shape_message = non_empty_str(value, message_ptr);
                if shape_code.is_some() || shape_message.is_some() {
                    if let Some(c) = shape_code {
                        code = c;
                    }
                    if let Some(m) = shape_message {
                        message = m;
                    }
                    break;
                }
            }
        }

        if code.is_empty() {
            code = format!("{code_prefix}_UPSTREAM");
        }

        let details = match parsed {
            Some(value) if value.as_object().is_some_and(|m| !m.is_empty()) => Some(value),
            _ if !body.is_empty() => Some(Value::String(
                String::from_utf8_lossy(body).into_owned(),
            )),
            _ => None,
        };

        let mut err = Self::recoverable(code, message, status)
            .with_cause(format!("upstream status {}", status.as_u16()));
        err.details = details;
        err
    }
}

/// Error item in the platform envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorItem {
    pub id: Option<String>,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    pub code: String,
    pub message: String,
    pub description: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub params: Option<Value>,
}

/// Platform error envelope written on every failure response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    #[serde(rename = "Errors")]
    pub errors: Vec<ErrorItem>,
}

impl ErrorEnvelope {
    pub fn from_error(err: &AppError) -> Self {
        Self {
            errors: vec![ErrorItem {
                id: None,
                parent_id: None,
                code: err.code.clone(),
                message: err.message.clone(),
                description: err.cause.clone(),
                params: err.details.clone(),
            }],
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope::from_error(&self);
        (self.status, Json(envelope)).into_response()
    }
}

fn non_empty_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
