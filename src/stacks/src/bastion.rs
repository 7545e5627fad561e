// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! Windows bastion host stack: a domain-joined instance in a public subnet
//! with the RSAT tooling needed to administer the directory and the share.

use crate::cluster::DIRECTORY_SECRET_NAME;
use crate::iam::{RoleSpec, EC2_SERVICE_PRINCIPAL};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

pub const WINDOWS_BASTION_AMI_PARAMETER: &str =
    "/aws/service/ami-windows-latest/Windows_Server-2019-English-Full-Base";
pub const BASTION_INSTANCE_TYPE: &str = "t3.medium";

#[derive(Debug, Clone)]
pub struct BastionStack {
    pub stack_name: String,
    pub role: RoleSpec,
}

pub fn build_bastion_stack(stack_name: impl Into<String>) -> BastionStack {
    let role = RoleSpec::builder()
        .role_name("ec2-bastion-role")
        .assumed_by(EC2_SERVICE_PRINCIPAL)
        .managed_policy_arns(vec![
            "arn:aws:iam::aws:policy/SecretsManagerReadWrite".to_string(),
            "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore".to_string(),
        ])
        .build();
    BastionStack {
        stack_name: stack_name.into(),
        role,
    }
}

/// PowerShell user data: open the VPC-local firewall, install the AD/DNS
/// admin tooling, and join the domain using the managed secret.
pub fn bastion_user_data(secret_name: &str) -> String {
    format!(
        "<powershell> \n\
         Import-Module AWSPowerShell \n\
         New-NetFirewallRule -DisplayName \"Allow local VPC\" -Direction Inbound -LocalAddress 10.0.0.0/8 -LocalPort Any -Action Allow \n\
         ADD-WindowsFeature RSAT-AD-Tools \n\
         ADD-WindowsFeature RSAT-DNS-Server \n\
         [string]$SecretAD  = \"{secret_name}\" \n\
         $SecretObj = Get-SECSecretValue -SecretId $SecretAD \n\
         [PSCustomObject]$Secret = ($SecretObj.SecretString  | ConvertFrom-Json) \n\
         $password   = $Secret.Password | ConvertTo-SecureString -asPlainText -Force \n\
         $username   = $Secret.username + \"@\" + $Secret.Domain \n\
         $credential = New-Object System.Management.Automation.PSCredential($username,$password) \n\
         Add-Computer -DomainName $Secret.Domain -Credential $credential -Restart -Force \n\
         </powershell> \n"
    )
}

impl BastionStack {
    pub fn template(&self) -> Value {
        let user_data = bastion_user_data(DIRECTORY_SECRET_NAME);
        json!({
            "Resources": {
                "BastionRole": self.role.to_resource(),
                "BastionInstanceProfile": {
                    "Type": "AWS::IAM::InstanceProfile",
                    "Properties": { "Roles": [{ "Ref": "BastionRole" }] },
                },
                "Bastion": {
                    "Type": "AWS::EC2::Instance",
                    "Properties": {
                        "InstanceType": BASTION_INSTANCE_TYPE,
                        "ImageId": format!("{{{{resolve:ssm:{WINDOWS_BASTION_AMI_PARAMETER}}}}}"),
                        "IamInstanceProfile": { "Ref": "BastionInstanceProfile" },
                        "SubnetId": { "Ref": "PublicSubnet1" },
                        "SecurityGroupIds": [{ "Ref": "BastionSecurityGroup" }],
                        "UserData": general_purpose::STANDARD.encode(&user_data),
                    },
                },
            },
            "Outputs": {
                "BastionHost": {
                    "Value": { "Fn::GetAtt": ["Bastion", "PublicDnsName"] },
                },
            },
        })
    }
}
