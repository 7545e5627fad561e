// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use crate::call::ApiCallSpec;
use crate::error::ApiError;
use async_trait::async_trait;
use serde_json::Value;

/// Executes one cloud API call and returns the raw response document.
///
/// Implementations own transport concerns: credentials, endpoint resolution,
/// timeouts, and retries (throttled calls are retried here, not by the
/// orchestrator). Each call blocks until the remote API responds or the
/// transport gives up.
#[async_trait]
pub trait ApiExecutor: Send + Sync {
    async fn execute(&self, call: &ApiCallSpec) -> Result<Value, ApiError>;
}
