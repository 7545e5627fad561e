// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use crate::binding::LifecycleState;
use crate::store::StoreError;

/// Classification of a failed cloud API call, mirroring the error families
/// the SDK transports surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    PermissionDenied,
    Validation,
    NotFound,
    Throttled,
    Other,
}

/// A typed failure from the cloud API executor.
///
/// Throttling is retried by the transport layer, never here; every kind is
/// terminal from the orchestrator's point of view except `NotFound` during
/// delete, which callers swallow.
#[derive(Debug, thiserror::Error, bon::Builder)]
#[error("{service}:{action} failed ({kind:?}): {message}")]
pub struct ApiError {
    #[builder(into)]
    pub service: String,
    #[builder(into)]
    pub action: String,
    pub kind: ApiErrorKind,
    #[builder(into)]
    pub message: String,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    pub fn is_throttled(&self) -> bool {
        self.kind == ApiErrorKind::Throttled
    }
}

/// Failures raised by the lifecycle orchestrator itself.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The configured output field path did not resolve against the raw
    /// response document. Aborts the whole operation; no partial success.
    #[error("no field found at response path {path:?}")]
    FieldNotFound { path: String },

    /// An output was read before any call produced a response, e.g. on a
    /// freshly adopted resource.
    #[error("no response recorded yet for {logical_id}")]
    NoResponse { logical_id: String },

    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
