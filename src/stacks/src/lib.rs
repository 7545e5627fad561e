// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! Declarative infrastructure for the Windows ECS hosting environment: the
//! shared cluster (VPC, Managed AD, FSx share, bastion) and one
//! load-balanced IIS site per configured sub-domain. Stacks synthesize to
//! JSON documents; the task definition each site runs is provisioned
//! out-of-band through `cr_lifecycle` and bound in via a property override.

pub mod bastion;
pub mod cluster;
pub mod config;
pub mod iam;
pub mod overrides;
pub mod task;
pub mod website;

pub use bastion::{build_bastion_stack, BastionStack};
pub use cluster::{build_cluster_stack, ClusterOutputs, ClusterStack};
pub use config::{parse_sites, Config, SiteConfig};
pub use iam::RoleSpec;
pub use overrides::{apply_overrides, OverrideError, PropertyOverride};
pub use task::{windows_task_binding, windows_task_definition, WindowsTaskParams};
pub use website::{build_website_stack, WebsiteParams, WebsiteStack};
