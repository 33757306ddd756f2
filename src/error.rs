// src/error.rs
//
// The error taxonomy used throughout the registry, use-case, and hub
// layers. `UseCaseError` is the typed kind the use-case layer and registry
// return; `ApiError` adapts it (plus a handful of HTTP-only failures) to
// the pre-upgrade HTTP surface, following the same JSON-envelope /
// `IntoResponse` shape the rest of this codebase's ancestors use.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

// ─── UseCaseError ───────────────────────────────────────────────────────────

/// Typed error kinds produced by the registry and the room use-case layer.
///
/// See the error handling design for the propagation policy: `TransportError`
/// never reaches a peer directly (it triggers unregister); `MalformedFrame`
/// is logged and the connection stays up; everything else may be surfaced
/// either as an HTTP status (pre-upgrade) or a `screen-share-error` frame
/// (post-upgrade, screen-share contention only).
#[derive(Debug, Clone)]
pub enum UseCaseError {
    /// Room or recording absent.
    NotFound(String),
    /// Room at capacity.
    Full(String),
    /// Non-host attempted a host-only action.
    Forbidden(String),
    /// Duplicate screen share or recording already in progress.
    Conflict(String),
    /// Underlying registry store failure.
    RegistryError(String),
}

impl UseCaseError {
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::Full(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::RegistryError(m) => m,
        }
    }
}

impl std::fmt::Display for UseCaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for UseCaseError {}

// ─── JSON envelope ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    status: u16,
}

// ─── ApiError ───────────────────────────────────────────────────────────────

/// Structured HTTP-facing error that serializes to JSON.
///
/// ```json
/// {
///   "error": {
///     "code": "room_not_found",
///     "message": "Room 'abc123' does not exist.",
///     "status": 404
///   }
/// }
/// ```
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub status: StatusCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, status = self.status.as_u16(), "{}", self.message);
        } else if self.status.is_client_error() {
            tracing::warn!(code = self.code, status = self.status.as_u16(), "{}", self.message);
        }

        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                status: self.status.as_u16(),
            },
        };

        (self.status, Json(envelope)).into_response()
    }
}

impl From<UseCaseError> for ApiError {
    fn from(err: UseCaseError) -> Self {
        match err {
            UseCaseError::NotFound(msg) => Self { code: "not_found", message: msg, status: StatusCode::NOT_FOUND },
            UseCaseError::Full(msg) => Self { code: "room_full", message: msg, status: StatusCode::CONFLICT },
            UseCaseError::Forbidden(msg) => Self { code: "forbidden", message: msg, status: StatusCode::FORBIDDEN },
            UseCaseError::Conflict(msg) => Self { code: "conflict", message: msg, status: StatusCode::CONFLICT },
            UseCaseError::RegistryError(msg) => Self { code: "registry_error", message: msg, status: StatusCode::SERVICE_UNAVAILABLE },
        }
    }
}

// ─── Constructors for UseCaseError (used by registry.rs / usecase.rs) ───────

impl UseCaseError {
    pub fn room_not_found(room_id: &str) -> Self {
        Self::NotFound(format!("Room '{room_id}' does not exist."))
    }

    pub fn recording_not_found(recording_id: &str) -> Self {
        Self::NotFound(format!("Recording '{recording_id}' does not exist."))
    }

    pub fn room_full(room_id: &str) -> Self {
        Self::Full(format!("Room '{room_id}' is full."))
    }

    pub fn not_host(room_id: &str) -> Self {
        Self::Forbidden(format!("Requester is not the host of room '{room_id}'."))
    }

    pub fn not_screen_sharer() -> Self {
        Self::Forbidden("you are not the current screen sharer".to_string())
    }

    pub fn recording_in_progress(room_id: &str) -> Self {
        Self::Conflict(format!("Room '{room_id}' is already recording."))
    }

    pub fn screen_share_conflict() -> Self {
        Self::Conflict("screen share already in progress by another user".to_string())
    }
}
