// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Placeholder inside a call's parameter document that is replaced with the
/// recorded physical resource id at dispatch time. Delete calls use this so
/// they always target the id captured at creation or last update, never a
/// freshly computed one.
pub const PHYSICAL_RESOURCE_ID_REF: &str = "PHYSICAL:RESOURCE:ID";

/// The durable remote identifier of a provisioned resource. Dependents may
/// reference it before the resource is confirmed materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysicalResourceId(String);

impl PhysicalResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhysicalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PhysicalResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PhysicalResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One IAM-style statement declaring a permission the call needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource")]
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where the physical resource id of a call comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalIdSource {
    /// Extracted from the raw response at a dotted field path.
    FromResponse(String),
    /// A fixed, caller-chosen id.
    Fixed(String),
}

impl PhysicalIdSource {
    pub fn from_response(path: impl Into<String>) -> Self {
        Self::FromResponse(path.into())
    }

    pub fn fixed(id: impl Into<String>) -> Self {
        Self::Fixed(id.into())
    }
}

/// One provisioning request: a target SDK action, its full parameter
/// document, and the permissions required to execute it. The document shape
/// is dictated entirely by the remote API; it is carried opaquely here.
#[derive(Debug, Clone, bon::Builder)]
pub struct ApiCallSpec {
    #[builder(into)]
    pub service: String,
    #[builder(into)]
    pub action: String,
    pub parameters: Value,
    #[builder(default)]
    pub policy: Vec<PolicyStatement>,
    pub physical_id: Option<PhysicalIdSource>,
}

impl ApiCallSpec {
    /// Return a copy of this call with every [`PHYSICAL_RESOURCE_ID_REF`]
    /// marker in the parameter document replaced by `id`.
    pub fn bound_to(&self, id: &PhysicalResourceId) -> ApiCallSpec {
        let mut call = self.clone();
        substitute_physical_id(&mut call.parameters, id.as_str());
        call
    }
}

fn substitute_physical_id(value: &mut Value, id: &str) {
    match value {
        Value::String(s) if s == PHYSICAL_RESOURCE_ID_REF => {
            *s = id.to_string();
        }
        Value::Array(items) => {
            for item in items {
                substitute_physical_id(item, id);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_physical_id(item, id);
            }
        }
        _ => {}
    }
}
