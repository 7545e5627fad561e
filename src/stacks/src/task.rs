// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! The Windows IIS task definition is registered through a direct SDK call:
//! the declarative layer cannot yet express an FSx-for-Windows task volume,
//! so the full document is built here, typed, and serialized to the wire
//! shape only at the API boundary.

use anyhow::{Context, Result};
use cr_lifecycle::{
    ApiCallSpec, LifecycleBinding, PhysicalIdSource, PolicyStatement, PHYSICAL_RESOURCE_ID_REF,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const IIS_CONTAINER_NAME: &str = "IISContainer";
pub const IIS_IMAGE: &str = "microsoft/iis";
pub const IIS_CONTAINER_PORT: u16 = 80;
pub const FSX_CONTAINER_PATH: &str = r"C:\fsx-windows-dir";
pub const FSX_ROOT_DIRECTORY: &str = "share";

/// Field path of the registered task definition's ARN in the API response.
pub const TASK_DEFINITION_ARN_PATH: &str = "taskDefinition.taskDefinitionArn";

/// Seeds the shared index.html on the FSx share if absent, appends this
/// task's id to it, copies it into the IIS web root, and hands off to the
/// Windows service monitor.
const IIS_BOOTSTRAP_COMMAND: &str = r##"$IndexFilePath = "C:\fsx-windows-dir\index.html"; if ((Test-Path -Path $IndexFilePath) -ne $true){New-Item -Path $IndexFilePath -ItemType file -Value "<html> <head> <title>Amazon ECS Sample App</title> <style>body {margin-top: 40px; background-color: #ff3;} </style> </head><body> <div style=color:black;text-align:center> <h1>Amazon ECS Sample App</h1> <h2>Congratulations!</h2> <p>Your application is now running on a container in Amazon ECS.</p> <table style=margin-left:auto;margin-right:auto;><tr><th>TimeStamp</th><th>Task ID</th></tr>" -Force;}; $datetime = Get-Date -Format "yyyy-MM-dd HH:mm:ss"; $TaskId = (Invoke-RestMethod -Method GET -Uri $env:ECS_CONTAINER_METADATA_URI_V4/task).TaskARN.split("/")[2]; Add-Content -Path $IndexFilePath -Value "<tr><th>$datetime</th><th>$TaskId</th></tr>"; Copy-Item -Path $IndexFilePath -Destination C:\inetpub\wwwroot\index.html -Force; C:\ServiceMonitor.exe w3svc;"##;

/// Construction parameters for one site's Windows task definition.
///
/// `host_port` must be unique among sites sharing a cluster; a collision is
/// surfaced by the service scheduler at runtime, not validated here.
#[derive(Debug, Clone, bon::Builder)]
pub struct WindowsTaskParams {
    #[builder(into)]
    pub family: String,
    pub host_port: u16,
    #[builder(into)]
    pub file_system_id: String,
    #[builder(into)]
    pub directory_secret_arn: String,
    #[builder(into)]
    pub directory_domain_name: String,
    #[builder(into)]
    pub task_role_arn: String,
    #[builder(into)]
    pub execution_role_arn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinitionSpec {
    pub family: String,
    pub task_role_arn: String,
    pub execution_role_arn: String,
    pub container_definitions: Vec<ContainerSpec>,
    pub volumes: Vec<VolumeSpec>,
    pub requires_compatibilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cpu: u32,
    pub memory: u32,
    pub links: Vec<String>,
    pub port_mappings: Vec<PortMappingSpec>,
    pub essential: bool,
    pub entry_point: Vec<String>,
    pub mount_points: Vec<MountPointSpec>,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMappingSpec {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPointSpec {
    pub source_volume: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    pub name: String,
    pub fsx_windows_file_server_volume_configuration: FsxVolumeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsxVolumeConfig {
    pub file_system_id: String,
    pub root_directory: String,
    pub authorization_config: FsxAuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsxAuthConfig {
    pub credentials_parameter: String,
    pub domain: String,
}

/// Build the full task definition document for one site.
pub fn windows_task_definition(params: &WindowsTaskParams) -> TaskDefinitionSpec {
    TaskDefinitionSpec {
        family: params.family.clone(),
        task_role_arn: params.task_role_arn.clone(),
        execution_role_arn: params.execution_role_arn.clone(),
        container_definitions: vec![ContainerSpec {
            name: IIS_CONTAINER_NAME.to_string(),
            image: IIS_IMAGE.to_string(),
            cpu: 512,
            memory: 1024,
            links: vec![],
            port_mappings: vec![PortMappingSpec {
                container_port: IIS_CONTAINER_PORT,
                host_port: params.host_port,
                protocol: "tcp".to_string(),
            }],
            essential: true,
            entry_point: vec!["powershell".to_string(), "-Command".to_string()],
            mount_points: vec![MountPointSpec {
                source_volume: params.file_system_id.clone(),
                container_path: FSX_CONTAINER_PATH.to_string(),
                read_only: false,
            }],
            command: vec![IIS_BOOTSTRAP_COMMAND.to_string()],
        }],
        volumes: vec![VolumeSpec {
            name: params.file_system_id.clone(),
            fsx_windows_file_server_volume_configuration: FsxVolumeConfig {
                file_system_id: params.file_system_id.clone(),
                root_directory: FSX_ROOT_DIRECTORY.to_string(),
                authorization_config: FsxAuthConfig {
                    credentials_parameter: params.directory_secret_arn.clone(),
                    domain: params.directory_domain_name.clone(),
                },
            },
        }],
        requires_compatibilities: vec!["EC2".to_string()],
    }
}

/// Build the lifecycle binding for one site's task definition: register on
/// create and update (each deploy registers a new version; the API is
/// additive), deregister the recorded ARN on delete.
pub fn windows_task_binding(params: &WindowsTaskParams) -> Result<LifecycleBinding> {
    let document = serde_json::to_value(windows_task_definition(params))
        .context("Failed to serialize task definition document")?;

    let policy = vec![
        PolicyStatement::allow(["ecs:*"], ["*"]),
        PolicyStatement::allow(
            ["iam:PassRole"],
            [params.task_role_arn.clone(), params.execution_role_arn.clone()],
        ),
    ];

    let register = ApiCallSpec::builder()
        .service("ECS")
        .action("registerTaskDefinition")
        .parameters(document)
        .policy(policy.clone())
        .physical_id(PhysicalIdSource::from_response(TASK_DEFINITION_ARN_PATH))
        .build();

    let deregister = ApiCallSpec::builder()
        .service("ECS")
        .action("deregisterTaskDefinition")
        .parameters(json!({ "taskDefinition": PHYSICAL_RESOURCE_ID_REF }))
        .policy(policy)
        .physical_id(PhysicalIdSource::from_response(TASK_DEFINITION_ARN_PATH))
        .build();

    Ok(LifecycleBinding::builder()
        .logical_id(format!("{}-task-definition", params.family))
        .on_create(register.clone())
        .on_update(register)
        .on_delete(deregister)
        .output_path(TASK_DEFINITION_ARN_PATH)
        .build())
}
