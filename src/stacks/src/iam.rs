// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use cr_lifecycle::PolicyStatement;
use serde_json::{json, Value};

pub const ECS_TASKS_SERVICE_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
pub const EC2_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// Declaration of one IAM role: who assumes it, inline statements, and
/// attached managed policies.
#[derive(Debug, Clone, bon::Builder)]
pub struct RoleSpec {
    #[builder(into)]
    pub role_name: String,
    /// Service principal allowed to assume the role.
    #[builder(into)]
    pub assumed_by: String,
    #[builder(default)]
    pub inline_policies: Vec<PolicyStatement>,
    #[builder(default)]
    pub managed_policy_arns: Vec<String>,
}

impl RoleSpec {
    /// The ARN this role will have in `account_id` once deployed. Dependents
    /// may reference it before the role is materialized.
    pub fn arn(&self, account_id: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", account_id, self.role_name)
    }

    pub fn assume_role_policy_document(&self) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.assumed_by },
                "Action": "sts:AssumeRole",
            }]
        })
    }

    pub fn to_resource(&self) -> Value {
        let mut properties = json!({
            "RoleName": self.role_name,
            "AssumeRolePolicyDocument": self.assume_role_policy_document(),
        });
        if !self.managed_policy_arns.is_empty() {
            properties["ManagedPolicyArns"] = json!(self.managed_policy_arns);
        }
        if !self.inline_policies.is_empty() {
            properties["Policies"] = json!([{
                "PolicyName": format!("{}-inline", self.role_name),
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": self.inline_policies,
                },
            }]);
        }
        json!({ "Type": "AWS::IAM::Role", "Properties": properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_arn_uses_account_and_name() {
        let role = RoleSpec::builder()
            .role_name("site_webserver_task")
            .assumed_by(ECS_TASKS_SERVICE_PRINCIPAL)
            .build();
        assert_eq!(
            role.arn("111122223333"),
            "arn:aws:iam::111122223333:role/site_webserver_task"
        );
    }

    #[test]
    fn test_role_resource_carries_inline_policies() {
        let role = RoleSpec::builder()
            .role_name("site_webserver_execution")
            .assumed_by(ECS_TASKS_SERVICE_PRINCIPAL)
            .inline_policies(vec![PolicyStatement::allow(
                ["secretsmanager:GetSecretValue"],
                ["arn:aws:secretsmanager:eu-west-1:111122223333:secret:MADSecret"],
            )])
            .managed_policy_arns(vec![
                "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy".to_string(),
            ])
            .build();

        let resource = role.to_resource();
        assert_eq!(resource["Type"], "AWS::IAM::Role");
        assert_eq!(
            resource["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            ECS_TASKS_SERVICE_PRINCIPAL
        );
        assert_eq!(
            resource["Properties"]["Policies"][0]["PolicyDocument"]["Statement"][0]["Action"][0],
            "secretsmanager:GetSecretValue"
        );
        assert_eq!(resource["Properties"]["ManagedPolicyArns"][0],
            "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy");
    }
}
