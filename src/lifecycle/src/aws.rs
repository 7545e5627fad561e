// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! ECS-backed [`ApiExecutor`]: translates opaque parameter documents into
//! typed SDK calls for the task-definition actions the declarative layer
//! cannot express natively.

use crate::call::ApiCallSpec;
use crate::error::{ApiError, ApiErrorKind};
use crate::executor::ApiExecutor;
use async_trait::async_trait;
use aws_sdk_ecs::error::ProvideErrorMetadata;
use aws_sdk_ecs::types::{
    Compatibility, ContainerDefinition, FSxWindowsFileServerAuthorizationConfig,
    FSxWindowsFileServerVolumeConfiguration, MountPoint, PortMapping, TaskDefinition,
    TransportProtocol, Volume,
};
use aws_sdk_ecs::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct EcsExecutor {
    client: Client,
}

impl EcsExecutor {
    /// Create an executor using the default AWS credential chain.
    pub async fn new() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }

    /// Create with an explicit region.
    pub async fn with_region(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn register_task_definition(&self, call: &ApiCallSpec) -> Result<Value, ApiError> {
        let params: RegisterTaskDefinitionParams = decode_params(call)?;

        let containers: Vec<ContainerDefinition> = params
            .container_definitions
            .iter()
            .map(build_container)
            .collect();
        let mut volumes = Vec::with_capacity(params.volumes.len());
        for volume in &params.volumes {
            volumes.push(build_volume(call, volume)?);
        }
        let compatibilities: Vec<Compatibility> = params
            .requires_compatibilities
            .iter()
            .map(|c| Compatibility::from(c.as_str()))
            .collect();

        tracing::info!(family = %params.family, "Registering task definition");

        let output = self
            .client
            .register_task_definition()
            .family(&params.family)
            .set_task_role_arn(params.task_role_arn.clone())
            .set_execution_role_arn(params.execution_role_arn.clone())
            .set_container_definitions(non_empty(containers))
            .set_volumes(non_empty(volumes))
            .set_requires_compatibilities(non_empty(compatibilities))
            .send()
            .await
            .map_err(|e| sdk_error(call, &e))?;

        Ok(task_definition_document(output.task_definition()))
    }

    async fn deregister_task_definition(&self, call: &ApiCallSpec) -> Result<Value, ApiError> {
        let params: DeregisterTaskDefinitionParams = decode_params(call)?;

        tracing::info!(task_definition = %params.task_definition, "Deregistering task definition");

        let output = self
            .client
            .deregister_task_definition()
            .task_definition(&params.task_definition)
            .send()
            .await
            .map_err(|e| sdk_error(call, &e))?;

        Ok(task_definition_document(output.task_definition()))
    }
}

#[async_trait]
impl ApiExecutor for EcsExecutor {
    async fn execute(&self, call: &ApiCallSpec) -> Result<Value, ApiError> {
        if !call.service.eq_ignore_ascii_case("ecs") {
            return Err(validation_error(
                call,
                format!("unsupported service {:?}", call.service),
            ));
        }
        match call.action.as_str() {
            "registerTaskDefinition" => self.register_task_definition(call).await,
            "deregisterTaskDefinition" => self.deregister_task_definition(call).await,
            other => Err(validation_error(
                call,
                format!("unsupported action {other:?}"),
            )),
        }
    }
}

// Typed views of the camelCase parameter documents. Unknown keys are
// tolerated so payload builders can grow ahead of this executor.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterTaskDefinitionParams {
    family: String,
    task_role_arn: Option<String>,
    execution_role_arn: Option<String>,
    #[serde(default)]
    container_definitions: Vec<ContainerDefinitionParams>,
    #[serde(default)]
    volumes: Vec<VolumeParams>,
    #[serde(default)]
    requires_compatibilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerDefinitionParams {
    name: String,
    image: String,
    cpu: Option<i32>,
    memory: Option<i32>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    port_mappings: Vec<PortMappingParams>,
    #[serde(default = "default_true")]
    essential: bool,
    #[serde(default)]
    entry_point: Vec<String>,
    #[serde(default)]
    mount_points: Vec<MountPointParams>,
    #[serde(default)]
    command: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortMappingParams {
    container_port: i32,
    host_port: i32,
    #[serde(default = "default_protocol")]
    protocol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MountPointParams {
    source_volume: String,
    container_path: String,
    #[serde(default)]
    read_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeParams {
    name: String,
    fsx_windows_file_server_volume_configuration: Option<FsxVolumeParams>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FsxVolumeParams {
    file_system_id: String,
    root_directory: String,
    authorization_config: FsxAuthParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FsxAuthParams {
    credentials_parameter: String,
    domain: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeregisterTaskDefinitionParams {
    task_definition: String,
}

fn default_true() -> bool {
    true
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn decode_params<T: serde::de::DeserializeOwned>(call: &ApiCallSpec) -> Result<T, ApiError> {
    serde_json::from_value(call.parameters.clone())
        .map_err(|e| validation_error(call, e.to_string()))
}

fn build_container(params: &ContainerDefinitionParams) -> ContainerDefinition {
    let port_mappings: Vec<PortMapping> = params
        .port_mappings
        .iter()
        .map(|p| {
            PortMapping::builder()
                .container_port(p.container_port)
                .host_port(p.host_port)
                .protocol(TransportProtocol::from(p.protocol.as_str()))
                .build()
        })
        .collect();

    let mount_points: Vec<MountPoint> = params
        .mount_points
        .iter()
        .map(|m| {
            MountPoint::builder()
                .source_volume(&m.source_volume)
                .container_path(&m.container_path)
                .read_only(m.read_only)
                .build()
        })
        .collect();

    ContainerDefinition::builder()
        .name(&params.name)
        .image(&params.image)
        .set_cpu(params.cpu)
        .set_memory(params.memory)
        .essential(params.essential)
        .set_links(non_empty(params.links.clone()))
        .set_port_mappings(non_empty(port_mappings))
        .set_entry_point(non_empty(params.entry_point.clone()))
        .set_mount_points(non_empty(mount_points))
        .set_command(non_empty(params.command.clone()))
        .build()
}

fn build_volume(call: &ApiCallSpec, params: &VolumeParams) -> Result<Volume, ApiError> {
    let mut builder = Volume::builder().name(&params.name);
    if let Some(fsx) = &params.fsx_windows_file_server_volume_configuration {
        let auth = FSxWindowsFileServerAuthorizationConfig::builder()
            .credentials_parameter(&fsx.authorization_config.credentials_parameter)
            .domain(&fsx.authorization_config.domain)
            .build()
            .map_err(|e| validation_error(call, e.to_string()))?;
        let config = FSxWindowsFileServerVolumeConfiguration::builder()
            .file_system_id(&fsx.file_system_id)
            .root_directory(&fsx.root_directory)
            .authorization_config(auth)
            .build()
            .map_err(|e| validation_error(call, e.to_string()))?;
        builder = builder.fsx_windows_file_server_volume_configuration(config);
    }
    Ok(builder.build())
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Reduce the SDK response to the document shape field paths are written
/// against.
fn task_definition_document(task_definition: Option<&TaskDefinition>) -> Value {
    let mut doc = serde_json::Map::new();
    if let Some(td) = task_definition {
        let mut inner = serde_json::Map::new();
        if let Some(arn) = td.task_definition_arn() {
            inner.insert("taskDefinitionArn".to_string(), json!(arn));
        }
        if let Some(family) = td.family() {
            inner.insert("family".to_string(), json!(family));
        }
        if let Some(status) = td.status() {
            inner.insert("status".to_string(), json!(status.as_str()));
        }
        doc.insert("taskDefinition".to_string(), Value::Object(inner));
    }
    Value::Object(doc)
}

fn validation_error(call: &ApiCallSpec, message: String) -> ApiError {
    ApiError::builder()
        .service(call.service.clone())
        .action(call.action.clone())
        .kind(ApiErrorKind::Validation)
        .message(message)
        .build()
}

fn sdk_error<E, R>(call: &ApiCallSpec, err: &aws_sdk_ecs::error::SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().unwrap_or_default().to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    ApiError::builder()
        .service(call.service.clone())
        .action(call.action.clone())
        .kind(classify(&code, &message))
        .message(if code.is_empty() {
            message
        } else {
            format!("{code}: {message}")
        })
        .build()
}

fn classify(code: &str, message: &str) -> ApiErrorKind {
    if code.contains("AccessDenied") || code.contains("UnauthorizedOperation") {
        ApiErrorKind::PermissionDenied
    } else if code.contains("Throttl") || code.contains("TooManyRequests") {
        ApiErrorKind::Throttled
    } else if code.contains("NotFound")
        || message.contains("does not exist")
        || message.contains("Unable to describe task definition")
    {
        ApiErrorKind::NotFound
    } else if code.contains("InvalidParameter") || code.contains("Validation") {
        ApiErrorKind::Validation
    } else {
        ApiErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_families() {
        assert_eq!(
            classify("AccessDeniedException", "nope"),
            ApiErrorKind::PermissionDenied
        );
        assert_eq!(classify("ThrottlingException", ""), ApiErrorKind::Throttled);
        assert_eq!(
            classify("ClientException", "The task definition does not exist."),
            ApiErrorKind::NotFound
        );
        assert_eq!(
            classify("InvalidParameterException", "bad field"),
            ApiErrorKind::Validation
        );
        assert_eq!(classify("ServerException", "boom"), ApiErrorKind::Other);
    }

    #[test]
    fn test_register_params_decode_from_camel_case() {
        let call = ApiCallSpec::builder()
            .service("ECS")
            .action("registerTaskDefinition")
            .parameters(serde_json::json!({
                "family": "site_webserver",
                "taskRoleArn": "arn:aws:iam::111122223333:role/site_webserver_task",
                "containerDefinitions": [{
                    "name": "IISContainer",
                    "image": "microsoft/iis",
                    "cpu": 512,
                    "memory": 1024,
                    "portMappings": [{ "containerPort": 80, "hostPort": 8081, "protocol": "tcp" }],
                    "essential": true,
                }],
                "volumes": [{
                    "name": "fs-0123",
                    "fsxWindowsFileServerVolumeConfiguration": {
                        "fileSystemId": "fs-0123",
                        "rootDirectory": "share",
                        "authorizationConfig": { "credentialsParameter": "arn:secret", "domain": "example.aws" },
                    },
                }],
                "requiresCompatibilities": ["EC2"],
            }))
            .build();

        let params: RegisterTaskDefinitionParams = decode_params(&call).unwrap();
        assert_eq!(params.family, "site_webserver");
        assert_eq!(params.container_definitions[0].port_mappings[0].host_port, 8081);
        let fsx = params.volumes[0]
            .fsx_windows_file_server_volume_configuration
            .as_ref()
            .unwrap();
        assert_eq!(fsx.authorization_config.domain, "example.aws");
    }

    #[test]
    fn test_malformed_parameters_surface_as_validation_errors() {
        let call = ApiCallSpec::builder()
            .service("ECS")
            .action("registerTaskDefinition")
            .parameters(serde_json::json!({ "containerDefinitions": [] }))
            .build();
        // missing required "family"
        let err = decode_params::<RegisterTaskDefinitionParams>(&call).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Validation);
    }
}
