// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cr_lifecycle::{CustomResource, EcsExecutor, FileIdStore, PhysicalIdStore};
use infra_stacks::{
    build_bastion_stack, build_cluster_stack, build_website_stack, Config, SiteConfig,
    WebsiteParams, WebsiteStack,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "infra")]
#[command(version)]
#[command(about = "Deploy the Windows ECS hosting environment and its sites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Print the synthesized stack documents")]
    Synth,
    #[command(about = "Provision task definitions and write bound site documents")]
    Deploy,
    #[command(about = "Deregister provisioned task definitions")]
    Destroy,
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Synth => synth(&config),
        Commands::Deploy => deploy(&config).await,
        Commands::Destroy => destroy(&config).await,
    }
}

fn website_params(config: &Config, site: &SiteConfig, cluster_name: &str) -> WebsiteParams {
    WebsiteParams::builder()
        .stack_name(format!("ecs-windows-{}", site.sub_domain))
        .sub_domain(site.sub_domain.clone())
        .hosted_zone_id(config.hosted_zone_id.clone())
        .zone_name(config.zone_name.clone())
        .host_port(site.host_port)
        .file_system_id(config.file_system_id.clone())
        .directory_secret_arn(config.directory_secret_arn.clone())
        .directory_domain_name(config.directory_domain_name.clone())
        .account_id(config.aws_account_id.clone())
        .cluster_name(cluster_name)
        .build()
}

fn synth(config: &Config) -> Result<()> {
    let (cluster, outputs) = build_cluster_stack(config);
    let bastion = build_bastion_stack(format!("{}-bastion", config.cluster_stack_name));

    let mut documents = vec![
        (cluster.stack_name.clone(), cluster.template()?),
        (bastion.stack_name.clone(), bastion.template()),
    ];
    for site in &config.sites {
        let stack = build_website_stack(website_params(config, site, &outputs.cluster_name))?;
        let name = stack.params.stack_name.clone();
        documents.push((name, stack.template()?));
    }

    for (name, doc) in documents {
        println!("# {name}");
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    Ok(())
}

/// Drive one site's task definition to its desired version and write the
/// site document with the resolved ARN bound in.
async fn deploy_site(
    stack: &WebsiteStack,
    executor: Arc<EcsExecutor>,
    store: Arc<dyn PhysicalIdStore>,
) -> Result<()> {
    let mut resource = CustomResource::attach(stack.binding.clone(), executor, store)
        .await
        .with_context(|| format!("Failed to load recorded state for {}", stack.family))?;

    // Adopted resources get a fresh version; the registration API is
    // additive, so this runs on every deploy without a diff.
    let arn = if resource.physical_id().is_some() {
        resource.update().await
    } else {
        resource.create().await
    }
    .with_context(|| format!("Failed to register task definition for {}", stack.family))?;

    let document = stack.bound_template(arn.as_str())?;
    let out_path = format!(".infra/{}.template.json", stack.params.stack_name);
    if let Some(parent) = Path::new(&out_path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create output directory")?;
    }
    tokio::fs::write(&out_path, serde_json::to_vec_pretty(&document)?)
        .await
        .with_context(|| format!("Failed to write {out_path}"))?;

    tracing::info!(
        stack = %stack.params.stack_name,
        domain = %stack.domain_name(),
        task_definition = %arn,
        template = %out_path,
        "Site deployed"
    );
    Ok(())
}

async fn deploy(config: &Config) -> Result<()> {
    for (name, value) in [
        ("AWS_ACCOUNT_ID", &config.aws_account_id),
        ("FILE_SYSTEM_ID", &config.file_system_id),
        ("MAD_SECRET_ARN", &config.directory_secret_arn),
    ] {
        if value.is_empty() {
            bail!("{name} must be set before deploying sites");
        }
    }

    let (_, outputs) = build_cluster_stack(config);
    let executor = Arc::new(EcsExecutor::with_region(&config.aws_region).await);
    let store: Arc<dyn PhysicalIdStore> = Arc::new(FileIdStore::new(&config.state_file));

    for site in &config.sites {
        let stack = build_website_stack(website_params(config, site, &outputs.cluster_name))?;
        deploy_site(&stack, executor.clone(), store.clone()).await?;
    }
    Ok(())
}

async fn destroy(config: &Config) -> Result<()> {
    let (_, outputs) = build_cluster_stack(config);
    let executor = Arc::new(EcsExecutor::with_region(&config.aws_region).await);
    let store: Arc<dyn PhysicalIdStore> = Arc::new(FileIdStore::new(&config.state_file));

    for site in &config.sites {
        let stack = build_website_stack(website_params(config, site, &outputs.cluster_name))?;
        let mut resource =
            CustomResource::attach(stack.binding.clone(), executor.clone(), store.clone())
                .await
                .with_context(|| format!("Failed to load recorded state for {}", stack.family))?;

        if resource.physical_id().is_none() {
            tracing::warn!(stack = %stack.params.stack_name, "Nothing recorded; skipping");
            continue;
        }
        resource
            .delete()
            .await
            .with_context(|| format!("Failed to deregister task definition for {}", stack.family))?;
        tracing::info!(stack = %stack.params.stack_name, "Site destroyed");
    }
    Ok(())
}
