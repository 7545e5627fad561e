// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// One load-balanced site. Host ports must be unique per cluster; the value
/// is passed through unvalidated and a collision fails at the service
/// scheduler, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub sub_domain: String,
    pub host_port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub aws_region: String,
    pub aws_account_id: String,
    pub hosted_zone_id: String,
    pub zone_name: String,
    pub cluster_stack_name: String,
    pub directory_domain_name: String,
    /// FSx file system id, known once the cluster stack is deployed.
    pub file_system_id: String,
    /// Managed AD admin secret ARN, known once the cluster stack is deployed.
    pub directory_secret_arn: String,
    pub state_file: PathBuf,
    pub sites: Vec<SiteConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string());
        let aws_account_id = env::var("AWS_ACCOUNT_ID").unwrap_or_default();
        let hosted_zone_id = env::var("HOSTED_ZONE_ID").unwrap_or_default();
        let zone_name = env::var("ZONE_NAME").unwrap_or_default();

        let cluster_stack_name = env::var("CLUSTER_STACK_NAME")
            .unwrap_or_else(|_| "ecs-windows-cluster".to_string());
        let directory_domain_name =
            env::var("MAD_DOMAIN_NAME").unwrap_or_else(|_| "example.aws".to_string());
        let file_system_id = env::var("FILE_SYSTEM_ID").unwrap_or_default();
        let directory_secret_arn = env::var("MAD_SECRET_ARN").unwrap_or_default();

        let state_file = env::var("STATE_FILE")
            .unwrap_or_else(|_| ".infra/custom-resources.json".to_string())
            .into();

        let sites = parse_sites(
            &env::var("SITES").unwrap_or_else(|_| "website1:8081".to_string()),
        )
        .context("Invalid SITES")?;

        Ok(Config {
            aws_region,
            aws_account_id,
            hosted_zone_id,
            zone_name,
            cluster_stack_name,
            directory_domain_name,
            file_system_id,
            directory_secret_arn,
            state_file,
            sites,
        })
    }
}

/// Parse a `sub_domain:host_port` comma-separated list, e.g.
/// `website1:8081,website2:8082`.
pub fn parse_sites(raw: &str) -> Result<Vec<SiteConfig>> {
    let mut sites = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((sub_domain, port)) = entry.split_once(':') else {
            bail!("Site entry {entry:?} is not of the form sub_domain:host_port");
        };
        let host_port: u16 = port
            .parse()
            .with_context(|| format!("Invalid host port in site entry {entry:?}"))?;
        if host_port == 0 {
            bail!("Host port must be a positive integer in site entry {entry:?}");
        }
        sites.push(SiteConfig {
            sub_domain: sub_domain.to_string(),
            host_port,
        });
    }
    if sites.is_empty() {
        bail!("No sites configured");
    }
    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sites_list() {
        let sites = parse_sites("website1:8081, website2:8082").unwrap();
        assert_eq!(
            sites,
            vec![
                SiteConfig {
                    sub_domain: "website1".to_string(),
                    host_port: 8081
                },
                SiteConfig {
                    sub_domain: "website2".to_string(),
                    host_port: 8082
                },
            ]
        );
    }

    #[test]
    fn test_parse_sites_rejects_malformed_entries() {
        assert!(parse_sites("website1").is_err());
        assert!(parse_sites("website1:notaport").is_err());
        assert!(parse_sites("website1:0").is_err());
        assert!(parse_sites("").is_err());
    }
}
