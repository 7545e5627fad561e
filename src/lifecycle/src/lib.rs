// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! Lifecycle orchestration for custom resources: resources provisioned by
//! direct SDK calls because the declarative layer has no native shape for
//! them. One [`LifecycleBinding`] pairs create/update/delete call templates
//! with an output-extraction rule; [`CustomResource`] drives the calls and
//! exposes the resulting physical id to dependents.

pub mod aws;
pub mod binding;
pub mod call;
pub mod error;
pub mod executor;
pub mod fieldpath;
pub mod store;

pub use aws::EcsExecutor;
pub use binding::{CustomResource, LifecycleBinding, LifecycleState};
pub use call::{
    ApiCallSpec, Effect, PhysicalIdSource, PhysicalResourceId, PolicyStatement,
    PHYSICAL_RESOURCE_ID_REF,
};
pub use error::{ApiError, ApiErrorKind, LifecycleError};
pub use executor::ApiExecutor;
pub use fieldpath::resolve_output_field;
pub use store::{FileIdStore, MemoryIdStore, PhysicalIdStore, StoreError};
