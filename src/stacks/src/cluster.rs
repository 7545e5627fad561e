// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! The shared cluster stack: VPC, Managed AD plus its admin secret, the
//! Windows ECS cluster, the FSx file system, and the glue between them
//! (DHCP options, security groups). All of it is inert declaration data;
//! deployment happens elsewhere.

use crate::config::Config;
use crate::overrides::{apply_overrides, PropertyOverride};
use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};

pub const DIRECTORY_SECRET_NAME: &str = "MADSecret";
pub const DIRECTORY_ADMIN_USERNAME: &str = "Admin";

pub const WINDOWS_ECS_AMI_PARAMETER: &str =
    "/aws/service/ami-windows-latest/Windows_Server-2019-English-Core-ECS_Optimized/image_id";
pub const CLUSTER_INSTANCE_TYPE: &str = "t3.medium";
pub const CLUSTER_CAPACITY: u32 = 2;

// 32 GiB and 8 MB/s are the FSx for Windows minimums.
pub const FSX_STORAGE_GIB: u32 = 32;
pub const FSX_THROUGHPUT_MBPS: u32 = 8;

pub const SMB_PORT: u16 = 445;
pub const WINRM_PORT: u16 = 5985;
pub const RDP_PORT: u16 = 3389;

/// Values dependent stacks consume. Ids minted by the provider (file system,
/// secret ARN) are only known once this stack is deployed and are supplied
/// through configuration; everything else is fixed by the declaration.
#[derive(Debug, Clone)]
pub struct ClusterOutputs {
    pub cluster_name: String,
    pub directory_domain_name: String,
    pub directory_secret_name: String,
    pub file_system_id: String,
    pub directory_secret_arn: String,
}

#[derive(Debug, Clone)]
pub struct ClusterStack {
    pub stack_name: String,
    pub directory_domain_name: String,
}

pub fn build_cluster_stack(config: &Config) -> (ClusterStack, ClusterOutputs) {
    let stack = ClusterStack {
        stack_name: config.cluster_stack_name.clone(),
        directory_domain_name: config.directory_domain_name.clone(),
    };
    let outputs = ClusterOutputs {
        cluster_name: format!("{}-cluster", config.cluster_stack_name),
        directory_domain_name: config.directory_domain_name.clone(),
        directory_secret_name: DIRECTORY_SECRET_NAME.to_string(),
        file_system_id: config.file_system_id.clone(),
        directory_secret_arn: config.directory_secret_arn.clone(),
    };
    (stack, outputs)
}

/// PowerShell user data joining each cluster host to the directory before
/// the ECS agent starts. Applied as an override because the declared ASG
/// shape has no seam for Windows user data.
pub fn cluster_user_data(cluster_name: &str, secret_name: &str) -> String {
    format!(
        "<powershell> \n\
         Import-Module ECSTools \n\
         Initialize-ECSAgent -Cluster {cluster_name} -EnableTaskIAMRole \n\
         [string]$SecretAD  = \"{secret_name}\" \n\
         $SecretObj = Get-SECSecretValue -SecretId $SecretAD \n\
         [PSCustomObject]$Secret = ($SecretObj.SecretString  | ConvertFrom-Json) \n\
         $password   = $Secret.Password | ConvertTo-SecureString -asPlainText -Force \n\
         $username   = $Secret.username + \"@\" + $Secret.Domain \n\
         $credential = New-Object System.Management.Automation.PSCredential($username,$password) \n\
         Add-Computer -DomainName $Secret.Domain -Credential $credential -Restart -Force \n\
         </powershell> \n\
         <persist>true</persist>"
    )
}

impl ClusterStack {
    pub fn cluster_name(&self) -> String {
        format!("{}-cluster", self.stack_name)
    }

    /// The synthesized stack document, post-overrides.
    pub fn template(&self) -> Result<Value> {
        let secret_template = json!({
            "Domain": self.directory_domain_name,
            "username": DIRECTORY_ADMIN_USERNAME,
        });

        let mut doc = json!({
            "Resources": {
                "Vpc": {
                    "Type": "AWS::EC2::VPC",
                    "Properties": {
                        "CidrBlock": "10.0.0.0/16",
                        "EnableDnsSupport": true,
                        "EnableDnsHostnames": true,
                        "Tags": [{ "Key": "Name", "Value": self.stack_name }],
                    },
                    // two AZs, one NAT gateway per public subnet; the
                    // isolated tier is reserved, not materialized
                    "Metadata": {
                        "SubnetConfiguration": [
                            { "name": "public", "subnetType": "PUBLIC", "cidrMask": 24 },
                            { "name": "private", "subnetType": "PRIVATE", "cidrMask": 24 },
                            { "name": "isolated", "subnetType": "ISOLATED", "cidrMask": 24, "reserved": true },
                        ],
                        "MaxAzs": 2,
                        "NatGateways": 2,
                    },
                },
                "DirectorySecret": {
                    "Type": "AWS::SecretsManager::Secret",
                    "Properties": {
                        "Name": DIRECTORY_SECRET_NAME,
                        "GenerateSecretString": {
                            "SecretStringTemplate": secret_template.to_string(),
                            "GenerateStringKey": "Password",
                            "ExcludePunctuation": true,
                        },
                    },
                },
                "Cluster": {
                    "Type": "AWS::ECS::Cluster",
                    "Properties": { "ClusterName": self.cluster_name() },
                },
                "ClusterInstanceRole": {
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [{
                                "Effect": "Allow",
                                "Principal": { "Service": "ec2.amazonaws.com" },
                                "Action": "sts:AssumeRole",
                            }],
                        },
                        "ManagedPolicyArns": [
                            "arn:aws:iam::aws:policy/SecretsManagerReadWrite",
                            "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore",
                        ],
                    },
                },
                "ClusterLaunchConfig": {
                    "Type": "AWS::AutoScaling::LaunchConfiguration",
                    "Properties": {
                        "ImageId": format!("{{{{resolve:ssm:{WINDOWS_ECS_AMI_PARAMETER}}}}}"),
                        "InstanceType": CLUSTER_INSTANCE_TYPE,
                        "IamInstanceProfile": { "Ref": "ClusterInstanceRole" },
                    },
                },
                "ClusterAutoScalingGroup": {
                    "Type": "AWS::AutoScaling::AutoScalingGroup",
                    "Properties": {
                        "LaunchConfigurationName": { "Ref": "ClusterLaunchConfig" },
                        "MinSize": CLUSTER_CAPACITY.to_string(),
                        "MaxSize": CLUSTER_CAPACITY.to_string(),
                        "VPCZoneIdentifier": [{ "Ref": "PrivateSubnet1" }, { "Ref": "PrivateSubnet2" }],
                    },
                },
                "Directory": {
                    "Type": "AWS::DirectoryService::MicrosoftAD",
                    "Properties": {
                        "Name": self.directory_domain_name,
                        "Edition": "Standard",
                        "Password": format!(
                            "{{{{resolve:secretsmanager:{DIRECTORY_SECRET_NAME}:SecretString:Password}}}}"
                        ),
                        "VpcSettings": {
                            "VpcId": { "Ref": "Vpc" },
                            "SubnetIds": [{ "Ref": "PrivateSubnet1" }, { "Ref": "PrivateSubnet2" }],
                        },
                    },
                },
                "FsxSecurityGroup": {
                    "Type": "AWS::EC2::SecurityGroup",
                    "Properties": {
                        "GroupDescription": "FSx for Windows hosts",
                        "VpcId": { "Ref": "Vpc" },
                        "Tags": [{ "Key": "Name", "Value": format!("{}_FSx", self.stack_name) }],
                        "SecurityGroupIngress": [
                            sg_ingress(SMB_PORT, "ClusterSecurityGroup", "ECS Cluster"),
                            sg_ingress(WINRM_PORT, "ClusterSecurityGroup", "ECS Cluster"),
                            sg_ingress(SMB_PORT, "BastionSecurityGroup", "Bastion"),
                            sg_ingress(WINRM_PORT, "BastionSecurityGroup", "Bastion"),
                        ],
                    },
                },
                "WindowsFsx": {
                    "Type": "AWS::FSx::FileSystem",
                    "Properties": {
                        "FileSystemType": "WINDOWS",
                        "StorageCapacity": FSX_STORAGE_GIB,
                        "SubnetIds": [{ "Ref": "PrivateSubnet1" }, { "Ref": "PrivateSubnet2" }],
                        "SecurityGroupIds": [{ "Ref": "FsxSecurityGroup" }],
                        "WindowsConfiguration": {
                            "ActiveDirectoryId": { "Ref": "Directory" },
                            "ThroughputCapacity": FSX_THROUGHPUT_MBPS,
                            "DeploymentType": "MULTI_AZ_1",
                            "PreferredSubnetId": { "Ref": "PrivateSubnet1" },
                        },
                    },
                },
                "DhcpOptions": {
                    "Type": "AWS::EC2::DHCPOptions",
                    "Properties": {
                        "DomainName": self.directory_domain_name,
                        "DomainNameServers": [
                            { "Fn::Select": [0, { "Fn::GetAtt": ["Directory", "DnsIpAddresses"] }] },
                            { "Fn::Select": [1, { "Fn::GetAtt": ["Directory", "DnsIpAddresses"] }] },
                        ],
                        "NtpServers": ["169.254.169.123"],
                    },
                },
                "DhcpOptionsAssociation": {
                    "Type": "AWS::EC2::VPCDHCPOptionsAssociation",
                    "Properties": {
                        "VpcId": { "Ref": "Vpc" },
                        "DhcpOptionsId": { "Ref": "DhcpOptions" },
                    },
                },
                // created here, not in the bastion stack, to avoid a
                // circular dependency between the two
                "BastionSecurityGroup": {
                    "Type": "AWS::EC2::SecurityGroup",
                    "Properties": {
                        "GroupDescription": "Bastion host",
                        "VpcId": { "Ref": "Vpc" },
                        "Tags": [{ "Key": "Name", "Value": format!("{}_Bastion", self.stack_name) }],
                    },
                },
                "ClusterSecurityGroup": {
                    "Type": "AWS::EC2::SecurityGroup",
                    "Properties": {
                        "GroupDescription": "ECS cluster hosts",
                        "VpcId": { "Ref": "Vpc" },
                        "SecurityGroupIngress": [sg_ingress(RDP_PORT, "BastionSecurityGroup", "Bastion")],
                    },
                },
                "PrivateSubnet1": subnet("10.0.2.0/24", false),
                "PrivateSubnet2": subnet("10.0.3.0/24", false),
                "PublicSubnet1": subnet("10.0.0.0/24", true),
                "PublicSubnet2": subnet("10.0.1.0/24", true),
            },
            "Outputs": {
                "FileSystemId": { "Value": { "Ref": "WindowsFsx" } },
                "DirectorySecretArn": { "Value": { "Ref": "DirectorySecret" } },
            },
        });

        apply_overrides(&mut doc, &self.overrides())?;
        Ok(doc)
    }

    /// Post-synthesis patches this stack needs: the Windows user data has no
    /// place in the declared launch configuration shape.
    pub fn overrides(&self) -> Vec<PropertyOverride> {
        let user_data = cluster_user_data(&self.cluster_name(), DIRECTORY_SECRET_NAME);
        vec![PropertyOverride::set(
            "Resources.ClusterLaunchConfig.Properties.UserData",
            json!(general_purpose::STANDARD.encode(user_data)),
        )]
    }
}

fn subnet(cidr: &str, public: bool) -> Value {
    json!({
        "Type": "AWS::EC2::Subnet",
        "Properties": {
            "VpcId": { "Ref": "Vpc" },
            "CidrBlock": cidr,
            "MapPublicIpOnLaunch": public,
        },
    })
}

fn sg_ingress(port: u16, source_sg: &str, description: &str) -> Value {
    json!({
        "IpProtocol": "tcp",
        "FromPort": port,
        "ToPort": port,
        "SourceSecurityGroupId": { "Ref": source_sg },
        "Description": description,
    })
}
