// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use crate::call::{ApiCallSpec, PhysicalIdSource, PhysicalResourceId};
use crate::error::LifecycleError;
use crate::executor::ApiExecutor;
use crate::fieldpath::resolve_output_field;
use crate::store::PhysicalIdStore;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Creating,
    Active,
    Updating,
    Deleting,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Creating => "creating",
            LifecycleState::Active => "active",
            LifecycleState::Updating => "updating",
            LifecycleState::Deleting => "deleting",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecycleState::Creating | LifecycleState::Updating | LifecycleState::Deleting
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The create/update/delete call triple plus output-extraction rule for one
/// externally-provisioned resource.
#[derive(Debug, Clone, bon::Builder)]
pub struct LifecycleBinding {
    /// Key under which the physical id is persisted.
    #[builder(into)]
    pub logical_id: String,
    pub on_create: ApiCallSpec,
    pub on_update: ApiCallSpec,
    pub on_delete: ApiCallSpec,
    /// Field path fed to dependents as this resource's output value.
    #[builder(into)]
    pub output_path: String,
}

/// Drives one custom resource through its lifecycle against a cloud API the
/// declarative layer cannot express natively.
///
/// The deployment engine serializes operations per resource; at most one call
/// is in flight per binding. Transient states are re-entrant so an
/// interrupted operation can be re-driven to completion. No retry logic lives
/// here; that belongs to the [`ApiExecutor`] transport.
pub struct CustomResource {
    binding: LifecycleBinding,
    executor: Arc<dyn ApiExecutor>,
    store: Arc<dyn PhysicalIdStore>,
    state: LifecycleState,
    physical_id: Option<PhysicalResourceId>,
    last_response: Option<Value>,
}

impl CustomResource {
    pub fn new(
        binding: LifecycleBinding,
        executor: Arc<dyn ApiExecutor>,
        store: Arc<dyn PhysicalIdStore>,
    ) -> Self {
        Self {
            binding,
            executor,
            store,
            state: LifecycleState::Absent,
            physical_id: None,
            last_response: None,
        }
    }

    /// Like [`CustomResource::new`], but adopts a physical id recorded by a
    /// previous run, if any. Adopted resources start out `Active`.
    pub async fn attach(
        binding: LifecycleBinding,
        executor: Arc<dyn ApiExecutor>,
        store: Arc<dyn PhysicalIdStore>,
    ) -> Result<Self, LifecycleError> {
        let recorded = store.fetch(&binding.logical_id).await?;
        let mut resource = Self::new(binding, executor, store);
        if let Some(id) = recorded {
            tracing::debug!(logical_id = %resource.binding.logical_id, physical_id = %id, "Adopted recorded physical id");
            resource.physical_id = Some(id);
            resource.state = LifecycleState::Active;
        }
        Ok(resource)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn physical_id(&self) -> Option<&PhysicalResourceId> {
        self.physical_id.as_ref()
    }

    pub fn binding(&self) -> &LifecycleBinding {
        &self.binding
    }

    /// Submit the on-create call and bind the resulting physical id.
    #[tracing::instrument(skip_all, fields(logical_id = %self.binding.logical_id))]
    pub async fn create(&mut self) -> Result<PhysicalResourceId, LifecycleError> {
        self.begin(LifecycleState::Creating)?;
        tracing::info!(
            service = %self.binding.on_create.service,
            action = %self.binding.on_create.action,
            "Submitting create call"
        );

        let response = self.executor.execute(&self.binding.on_create).await?;
        let id = self.derive_physical_id(&self.binding.on_create, &response)?;

        // Persist before reporting success so an aborted deploy leaves a
        // reconcilable record of the remote resource.
        self.store.record(&self.binding.logical_id, &id).await?;

        self.last_response = Some(response);
        self.physical_id = Some(id.clone());
        self.state = LifecycleState::Active;
        tracing::info!(physical_id = %id, "Create complete");
        Ok(id)
    }

    /// Re-submit the full document and rebind to the new physical id.
    ///
    /// There is no diff or patch logic: the underlying API is additive and
    /// versioning, so every update registers a new version even when the
    /// payload is unchanged. A changed id means replacement; the superseded
    /// resource is cleaned up by a later delete against the old id.
    #[tracing::instrument(skip_all, fields(logical_id = %self.binding.logical_id))]
    pub async fn update(&mut self) -> Result<PhysicalResourceId, LifecycleError> {
        self.begin(LifecycleState::Updating)?;
        tracing::info!(
            service = %self.binding.on_update.service,
            action = %self.binding.on_update.action,
            "Submitting update call"
        );

        let call = match &self.physical_id {
            Some(id) => self.binding.on_update.bound_to(id),
            None => self.binding.on_update.clone(),
        };
        let response = self.executor.execute(&call).await?;
        let new_id = self.derive_physical_id(&self.binding.on_update, &response)?;

        self.store.record(&self.binding.logical_id, &new_id).await?;

        if let Some(old_id) = &self.physical_id {
            if *old_id != new_id {
                tracing::info!(
                    old = %old_id,
                    new = %new_id,
                    "Physical id changed; previous resource is superseded"
                );
            }
        }

        self.last_response = Some(response);
        self.physical_id = Some(new_id.clone());
        self.state = LifecycleState::Active;
        tracing::info!(physical_id = %new_id, "Update complete");
        Ok(new_id)
    }

    /// Issue the on-delete call against the recorded physical id.
    ///
    /// A resource already removed out-of-band reads as success; any other
    /// failure propagates and leaves the lifecycle unresolved until a
    /// corrective run. Deleting with no recorded id is a no-op.
    #[tracing::instrument(skip_all, fields(logical_id = %self.binding.logical_id))]
    pub async fn delete(&mut self) -> Result<(), LifecycleError> {
        let id = match self.physical_id.clone() {
            Some(id) => Some(id),
            None => self.store.fetch(&self.binding.logical_id).await?,
        };
        let Some(id) = id else {
            tracing::warn!("No physical id recorded; nothing to delete");
            self.state = LifecycleState::Absent;
            return Ok(());
        };

        self.begin(LifecycleState::Deleting)?;
        tracing::info!(
            service = %self.binding.on_delete.service,
            action = %self.binding.on_delete.action,
            physical_id = %id,
            "Submitting delete call"
        );

        match self.executor.execute(&self.binding.on_delete.bound_to(&id)).await {
            Ok(response) => {
                self.last_response = Some(response);
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(physical_id = %id, "Resource already removed out-of-band");
            }
            Err(e) => return Err(e.into()),
        }

        self.store.clear(&self.binding.logical_id).await?;
        self.physical_id = None;
        self.state = LifecycleState::Absent;
        tracing::info!("Delete complete");
        Ok(())
    }

    /// Extract a named field from the last raw response. Errors with
    /// [`LifecycleError::NoResponse`] until a call has completed.
    pub fn response_field(&self, path: &str) -> Result<String, LifecycleError> {
        let response = self
            .last_response
            .as_ref()
            .ok_or_else(|| LifecycleError::NoResponse {
                logical_id: self.binding.logical_id.clone(),
            })?;
        resolve_output_field(response, path)
    }

    /// The binding's declared output value, for dependent declarations.
    pub fn output(&self) -> Result<String, LifecycleError> {
        self.response_field(&self.binding.output_path)
    }

    fn begin(&mut self, next: LifecycleState) -> Result<(), LifecycleError> {
        use LifecycleState::*;
        let allowed = matches!(
            (self.state, next),
            (Absent, Creating)
                | (Creating, Creating)
                | (Active, Updating)
                | (Updating, Updating)
                | (Active, Deleting)
                | (Updating, Deleting)
                | (Deleting, Deleting)
                // reached only with a recorded id fetched from the store;
                // delete() returns early when there is nothing to target
                | (Absent, Deleting)
        );
        if !allowed {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    fn derive_physical_id(
        &self,
        call: &ApiCallSpec,
        response: &Value,
    ) -> Result<PhysicalResourceId, LifecycleError> {
        match &call.physical_id {
            Some(PhysicalIdSource::FromResponse(path)) => {
                resolve_output_field(response, path).map(PhysicalResourceId::new)
            }
            Some(PhysicalIdSource::Fixed(id)) => Ok(PhysicalResourceId::new(id.clone())),
            // No declared source: fall back to a deterministic id so retries
            // of the same logical resource converge.
            None => Ok(PhysicalResourceId::new(self.binding.logical_id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::PHYSICAL_RESOURCE_ID_REF;
    use crate::error::{ApiError, ApiErrorKind};
    use crate::store::MemoryIdStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct ScriptedExecutor {
        responses: Mutex<VecDeque<Result<Value, ApiErrorKind>>>,
        calls: Mutex<Vec<ApiCallSpec>>,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<Result<Value, ApiErrorKind>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn recorded_calls(&self) -> Vec<ApiCallSpec> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl ApiExecutor for ScriptedExecutor {
        async fn execute(&self, call: &ApiCallSpec) -> Result<Value, ApiError> {
            self.calls.lock().await.push(call.clone());
            let next = self
                .responses
                .lock()
                .await
                .pop_front()
                .expect("executor called more times than scripted");
            next.map_err(|kind| {
                ApiError::builder()
                    .service(call.service.clone())
                    .action(call.action.clone())
                    .kind(kind)
                    .message("scripted failure")
                    .build()
            })
        }
    }

    fn register_response(arn: &str) -> Value {
        json!({ "taskDefinition": { "taskDefinitionArn": arn } })
    }

    fn binding() -> LifecycleBinding {
        let register = ApiCallSpec::builder()
            .service("ECS")
            .action("registerTaskDefinition")
            .parameters(json!({ "family": "site_webserver" }))
            .physical_id(PhysicalIdSource::from_response(
                "taskDefinition.taskDefinitionArn",
            ))
            .build();
        let deregister = ApiCallSpec::builder()
            .service("ECS")
            .action("deregisterTaskDefinition")
            .parameters(json!({ "taskDefinition": PHYSICAL_RESOURCE_ID_REF }))
            .build();
        LifecycleBinding::builder()
            .logical_id("site-task-definition")
            .on_create(register.clone())
            .on_update(register)
            .on_delete(deregister)
            .output_path("taskDefinition.taskDefinitionArn")
            .build()
    }

    #[tokio::test]
    async fn test_create_binds_id_from_response_and_records_it() {
        let executor = ScriptedExecutor::new(vec![Ok(register_response("arn:task-def/foo:1"))]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor.clone(), store.clone());

        let id = resource.create().await.unwrap();
        assert_eq!(id.as_str(), "arn:task-def/foo:1");
        assert!(!id.as_str().is_empty());
        assert_eq!(resource.state(), LifecycleState::Active);
        assert_eq!(resource.output().unwrap(), "arn:task-def/foo:1");
        assert_eq!(
            store.fetch("site-task-definition").await.unwrap().unwrap().as_str(),
            "arn:task-def/foo:1"
        );
    }

    #[tokio::test]
    async fn test_create_fails_when_output_path_missing() {
        let executor = ScriptedExecutor::new(vec![Ok(json!({ "unexpected": "shape" }))]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor, store.clone());

        let err = resource.create().await.unwrap_err();
        assert!(matches!(err, LifecycleError::FieldNotFound { .. }));
        // nothing recorded, nothing bound
        assert!(store.fetch("site-task-definition").await.unwrap().is_none());
        assert!(resource.physical_id().is_none());
    }

    #[tokio::test]
    async fn test_create_is_reentrant_after_api_failure() {
        let executor = ScriptedExecutor::new(vec![
            Err(ApiErrorKind::Other),
            Ok(register_response("arn:task-def/foo:1")),
        ]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor, store);

        assert!(resource.create().await.is_err());
        assert_eq!(resource.state(), LifecycleState::Creating);
        // re-driving the interrupted create completes it
        let id = resource.create().await.unwrap();
        assert_eq!(id.as_str(), "arn:task-def/foo:1");
    }

    #[tokio::test]
    async fn test_update_then_delete_targets_new_id() {
        let executor = ScriptedExecutor::new(vec![
            Ok(register_response("arn:task-def/foo:1")),
            Ok(register_response("arn:task-def/foo:2")),
            Ok(json!({ "taskDefinition": { "status": "INACTIVE" } })),
        ]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor.clone(), store.clone());

        let first = resource.create().await.unwrap();
        let second = resource.update().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(
            store.fetch("site-task-definition").await.unwrap().unwrap().as_str(),
            "arn:task-def/foo:2"
        );

        resource.delete().await.unwrap();
        let calls = executor.recorded_calls().await;
        assert_eq!(calls[2].action, "deregisterTaskDefinition");
        // delete targets the id recorded at last update, never the original
        assert_eq!(calls[2].parameters["taskDefinition"], "arn:task-def/foo:2");
        assert!(store.fetch("site-task-definition").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_targets_id_recorded_by_a_previous_run() {
        let store = Arc::new(MemoryIdStore::new());
        store
            .record("site-task-definition", &PhysicalResourceId::new("arn:task-def/foo:9"))
            .await
            .unwrap();
        let executor =
            ScriptedExecutor::new(vec![Ok(json!({ "taskDefinition": { "status": "INACTIVE" } }))]);
        // built with new, not attach: the id is only in the store
        let mut resource = CustomResource::new(binding(), executor.clone(), store.clone());

        resource.delete().await.unwrap();
        let calls = executor.recorded_calls().await;
        assert_eq!(calls[0].action, "deregisterTaskDefinition");
        assert_eq!(calls[0].parameters["taskDefinition"], "arn:task-def/foo:9");
        assert_eq!(resource.state(), LifecycleState::Absent);
        assert!(store.fetch("site-task-definition").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_swallows_not_found_and_double_delete_is_safe() {
        let executor = ScriptedExecutor::new(vec![
            Ok(register_response("arn:task-def/foo:1")),
            Err(ApiErrorKind::NotFound),
        ]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor, store.clone());

        resource.create().await.unwrap();
        // removed out-of-band: still reads as success
        resource.delete().await.unwrap();
        assert_eq!(resource.state(), LifecycleState::Absent);
        // second delete finds no recorded id and must not raise
        resource.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_blocks_teardown_and_rejects_update() {
        let executor = ScriptedExecutor::new(vec![
            Ok(register_response("arn:task-def/foo:1")),
            Err(ApiErrorKind::PermissionDenied),
        ]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor, store.clone());

        resource.create().await.unwrap();
        assert!(resource.delete().await.is_err());
        assert_eq!(resource.state(), LifecycleState::Deleting);
        // the id stays recorded for a corrective run
        assert!(store.fetch("site-task-definition").await.unwrap().is_some());
        // once teardown begins, no further mutation is accepted
        let err = resource.update().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Deleting,
                to: LifecycleState::Updating,
            }
        ));
    }

    #[tokio::test]
    async fn test_create_on_active_resource_is_rejected() {
        let executor = ScriptedExecutor::new(vec![Ok(register_response("arn:task-def/foo:1"))]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(binding(), executor, store);

        resource.create().await.unwrap();
        assert!(matches!(
            resource.create().await.unwrap_err(),
            LifecycleError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_attach_adopts_recorded_id() {
        let store = Arc::new(MemoryIdStore::new());
        store
            .record("site-task-definition", &PhysicalResourceId::new("arn:task-def/foo:7"))
            .await
            .unwrap();
        let executor = ScriptedExecutor::new(vec![Ok(register_response("arn:task-def/foo:8"))]);

        let mut resource = CustomResource::attach(binding(), executor, store.clone())
            .await
            .unwrap();
        assert_eq!(resource.state(), LifecycleState::Active);
        assert_eq!(resource.physical_id().unwrap().as_str(), "arn:task-def/foo:7");
        // adopted, but no call has run yet, so there is no output to read
        assert!(matches!(
            resource.output().unwrap_err(),
            LifecycleError::NoResponse { .. }
        ));

        // update from the adopted state rebinds to the new version
        let id = resource.update().await.unwrap();
        assert_eq!(id.as_str(), "arn:task-def/foo:8");
    }

    #[tokio::test]
    async fn test_fixed_and_synthesized_physical_ids() {
        let mut fixed_binding = binding();
        fixed_binding.on_create.physical_id = Some(PhysicalIdSource::fixed("pinned-id"));
        let executor = ScriptedExecutor::new(vec![Ok(json!({}))]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(fixed_binding, executor, store);
        assert_eq!(resource.create().await.unwrap().as_str(), "pinned-id");

        let mut synthesized_binding = binding();
        synthesized_binding.on_create.physical_id = None;
        let executor = ScriptedExecutor::new(vec![Ok(json!({}))]);
        let store = Arc::new(MemoryIdStore::new());
        let mut resource = CustomResource::new(synthesized_binding, executor, store);
        assert_eq!(
            resource.create().await.unwrap().as_str(),
            "site-task-definition"
        );
    }
}
