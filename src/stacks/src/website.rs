// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! One load-balanced IIS site. The real task definition is provisioned
//! out-of-band (see [`crate::task`]); the declared placeholder exists only
//! to satisfy the service shape and is swapped for the provisioned ARN via
//! a property override once the lifecycle call resolves.

use crate::iam::{RoleSpec, ECS_TASKS_SERVICE_PRINCIPAL};
use crate::overrides::{apply_overrides, PropertyOverride};
use crate::task::{windows_task_binding, WindowsTaskParams, IIS_CONTAINER_NAME, IIS_IMAGE};
use anyhow::{bail, Context, Result};
use cr_lifecycle::{LifecycleBinding, PolicyStatement};
use serde_json::{json, Value};

pub const SERVICE_DESIRED_COUNT: u32 = 2;

#[derive(Debug, Clone, bon::Builder)]
pub struct WebsiteParams {
    #[builder(into)]
    pub stack_name: String,
    #[builder(into)]
    pub sub_domain: String,
    #[builder(into)]
    pub hosted_zone_id: String,
    #[builder(into)]
    pub zone_name: String,
    /// Must be unique per cluster; collisions surface downstream.
    pub host_port: u16,
    #[builder(into)]
    pub file_system_id: String,
    #[builder(into)]
    pub directory_secret_arn: String,
    #[builder(into)]
    pub directory_domain_name: String,
    #[builder(into)]
    pub account_id: String,
    #[builder(into)]
    pub cluster_name: String,
}

pub struct WebsiteStack {
    pub params: WebsiteParams,
    pub family: String,
    pub task_role: RoleSpec,
    pub execution_role: RoleSpec,
    pub binding: LifecycleBinding,
}

pub fn build_website_stack(params: WebsiteParams) -> Result<WebsiteStack> {
    for (name, value) in [
        ("sub_domain", &params.sub_domain),
        ("hosted_zone_id", &params.hosted_zone_id),
        ("zone_name", &params.zone_name),
    ] {
        if value.is_empty() {
            bail!("Please provide required parameter {name} via configuration");
        }
    }

    let family = format!("{}_webserver", params.stack_name);

    let task_role = RoleSpec::builder()
        .role_name(format!("{family}_task"))
        .assumed_by(ECS_TASKS_SERVICE_PRINCIPAL)
        .build();

    let execution_role = RoleSpec::builder()
        .role_name(format!("{family}_execution"))
        .assumed_by(ECS_TASKS_SERVICE_PRINCIPAL)
        .inline_policies(vec![
            PolicyStatement::allow(
                ["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                [params.directory_secret_arn.clone()],
            ),
            PolicyStatement::allow(["fsx:DescribeFileSystems"], ["*"]),
        ])
        .managed_policy_arns(vec![
            "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy".to_string(),
        ])
        .build();

    let binding = windows_task_binding(
        &WindowsTaskParams::builder()
            .family(family.clone())
            .host_port(params.host_port)
            .file_system_id(params.file_system_id.clone())
            .directory_secret_arn(params.directory_secret_arn.clone())
            .directory_domain_name(params.directory_domain_name.clone())
            .task_role_arn(task_role.arn(&params.account_id))
            .execution_role_arn(execution_role.arn(&params.account_id))
            .build(),
    )
    .context("Failed to build task definition binding")?;

    Ok(WebsiteStack {
        params,
        family,
        task_role,
        execution_role,
        binding,
    })
}

impl WebsiteStack {
    pub fn domain_name(&self) -> String {
        format!("{}.{}", self.params.sub_domain, self.params.zone_name)
    }

    /// The synthesized site document with the placeholder task definition
    /// still in place. Declared overrides are already applied.
    pub fn template(&self) -> Result<Value> {
        let mut doc = json!({
            "Resources": {
                "TaskRole": self.task_role.to_resource(),
                "ExecutionRole": self.execution_role.to_resource(),
                // placeholder only; never used at runtime. The declared
                // shape cannot omit NetworkMode, which Windows rejects, so
                // it is stripped by a deletion override below.
                "TaskDef": {
                    "Type": "AWS::ECS::TaskDefinition",
                    "Properties": {
                        "Family": self.family,
                        "NetworkMode": "bridge",
                        "RequiresCompatibilities": ["EC2"],
                        "ContainerDefinitions": [{
                            "Name": IIS_CONTAINER_NAME,
                            "Image": IIS_IMAGE,
                            "Cpu": 512,
                            "Memory": 1024,
                            "EntryPoint": ["powershell", "-Command"],
                            "Command": [r"C:\ServiceMonitor.exe w3svc"],
                            "PortMappings": [{
                                "ContainerPort": 80,
                                "HostPort": self.params.host_port,
                                "Protocol": "tcp",
                            }],
                        }],
                    },
                },
                "IisService": {
                    "Type": "AWS::ECS::Service",
                    "Properties": {
                        "Cluster": self.params.cluster_name,
                        "DesiredCount": SERVICE_DESIRED_COUNT,
                        "TaskDefinition": { "Ref": "TaskDef" },
                        "LoadBalancers": [{
                            "ContainerName": IIS_CONTAINER_NAME,
                            "ContainerPort": 80,
                            "TargetGroupArn": { "Ref": "TargetGroup" },
                        }],
                    },
                },
                "LoadBalancer": {
                    "Type": "AWS::ElasticLoadBalancingV2::LoadBalancer",
                    "Properties": { "Scheme": "internet-facing", "Type": "application" },
                },
                "TargetGroup": {
                    "Type": "AWS::ElasticLoadBalancingV2::TargetGroup",
                    "Properties": { "Protocol": "HTTP", "Port": 80 },
                },
                "HttpsListener": {
                    "Type": "AWS::ElasticLoadBalancingV2::Listener",
                    "Properties": {
                        "Protocol": "HTTPS",
                        "Port": 443,
                        "Certificates": [{ "CertificateArn": { "Ref": "Certificate" } }],
                        "DefaultActions": [{ "Type": "forward", "TargetGroupArn": { "Ref": "TargetGroup" } }],
                    },
                },
                "HttpRedirect": {
                    "Type": "AWS::ElasticLoadBalancingV2::Listener",
                    "Properties": {
                        "Protocol": "HTTP",
                        "Port": 80,
                        "DefaultActions": [{
                            "Type": "redirect",
                            "RedirectConfig": { "Protocol": "HTTPS", "Port": "443", "StatusCode": "HTTP_301" },
                        }],
                    },
                },
                "Certificate": {
                    "Type": "AWS::CertificateManager::Certificate",
                    "Properties": {
                        "DomainName": self.domain_name(),
                        "ValidationMethod": "DNS",
                    },
                },
                "DnsRecord": {
                    "Type": "AWS::Route53::RecordSet",
                    "Properties": {
                        "HostedZoneId": self.params.hosted_zone_id,
                        "Name": self.domain_name(),
                        "Type": "A",
                        "AliasTarget": {
                            "DNSName": { "Fn::GetAtt": ["LoadBalancer", "DNSName"] },
                            "HostedZoneId": { "Fn::GetAtt": ["LoadBalancer", "CanonicalHostedZoneID"] },
                        },
                    },
                },
            },
        });

        apply_overrides(&mut doc, &self.base_overrides())
            .context("Failed to apply website overrides")?;
        Ok(doc)
    }

    /// Overrides applied at synthesis time, before the lifecycle call runs.
    pub fn base_overrides(&self) -> Vec<PropertyOverride> {
        vec![PropertyOverride::delete(
            "Resources.TaskDef.Properties.NetworkMode",
        )]
    }

    /// The override that swaps the placeholder for the provisioned ARN.
    pub fn task_definition_override(&self, task_definition_arn: &str) -> PropertyOverride {
        PropertyOverride::set(
            "Resources.IisService.Properties.TaskDefinition",
            json!(task_definition_arn),
        )
    }

    /// The site document with the provisioned task definition bound in.
    pub fn bound_template(&self, task_definition_arn: &str) -> Result<Value> {
        let mut doc = self.template()?;
        apply_overrides(&mut doc, &[self.task_definition_override(task_definition_arn)])
            .context("Failed to bind task definition override")?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> WebsiteParams {
        WebsiteParams::builder()
            .stack_name("ecs-windows-website1")
            .sub_domain("website1")
            .hosted_zone_id("Z0000000000000000000")
            .zone_name("example.com")
            .host_port(8081)
            .file_system_id("fs-0123456789abcdef0")
            .directory_secret_arn("arn:aws:secretsmanager:eu-west-1:111122223333:secret:MADSecret")
            .directory_domain_name("example.aws")
            .account_id("111122223333")
            .cluster_name("ecs-windows-cluster-cluster")
            .build()
    }

    #[test]
    fn test_missing_zone_parameters_are_rejected() {
        let mut bad = params();
        bad.sub_domain = String::new();
        assert!(build_website_stack(bad).is_err());

        let mut bad = params();
        bad.hosted_zone_id = String::new();
        assert!(build_website_stack(bad).is_err());

        let mut bad = params();
        bad.zone_name = String::new();
        assert!(build_website_stack(bad).is_err());
    }

    #[test]
    fn test_roles_follow_family_naming() {
        let stack = build_website_stack(params()).unwrap();
        assert_eq!(stack.family, "ecs-windows-website1_webserver");
        assert_eq!(stack.task_role.role_name, "ecs-windows-website1_webserver_task");
        assert_eq!(
            stack.execution_role.role_name,
            "ecs-windows-website1_webserver_execution"
        );
        // execution role can read the directory secret and describe FSx
        assert_eq!(stack.execution_role.inline_policies.len(), 2);
    }

    #[test]
    fn test_template_strips_network_mode_from_placeholder() {
        let stack = build_website_stack(params()).unwrap();
        let doc = stack.template().unwrap();
        assert!(doc["Resources"]["TaskDef"]["Properties"]
            .get("NetworkMode")
            .is_none());
        assert_eq!(doc["Resources"]["IisService"]["Properties"]["DesiredCount"], 2);
    }

    #[test]
    fn test_bound_template_points_service_at_provisioned_arn() {
        let stack = build_website_stack(params()).unwrap();
        let arn = "arn:aws:ecs:eu-west-1:111122223333:task-definition/ecs-windows-website1_webserver:3";
        let doc = stack.bound_template(arn).unwrap();
        assert_eq!(
            doc["Resources"]["IisService"]["Properties"]["TaskDefinition"],
            arn
        );
    }

    #[test]
    fn test_binding_payload_reflects_site_parameters() {
        let stack = build_website_stack(params()).unwrap();
        let doc = &stack.binding.on_create.parameters;
        assert_eq!(doc["family"], "ecs-windows-website1_webserver");
        assert_eq!(
            doc["taskRoleArn"],
            "arn:aws:iam::111122223333:role/ecs-windows-website1_webserver_task"
        );
        assert_eq!(
            doc["containerDefinitions"][0]["portMappings"][0]["hostPort"],
            8081
        );
    }
}
