// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

//! Post-synthesis property patches. Where a declared resource shape falls
//! short (Windows user data, unsupported properties), the fix is an explicit
//! override list applied to the synthesized document, kept as a narrow,
//! auditable seam instead of ad hoc node mutation.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("override path {path:?} does not resolve at segment {segment:?}")]
pub struct OverrideError {
    pub path: String,
    pub segment: String,
}

/// One patch: set a value at a dotted path, or delete the property there.
#[derive(Debug, Clone)]
pub struct PropertyOverride {
    pub path: String,
    /// `Some` sets the property, `None` deletes it.
    pub value: Option<Value>,
}

impl PropertyOverride {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: None,
        }
    }
}

/// Apply each override in order. Intermediate segments must already exist;
/// a dangling path is a declaration bug and fails the whole synthesis.
/// Deleting an already-absent final key is a no-op.
pub fn apply_overrides(doc: &mut Value, overrides: &[PropertyOverride]) -> Result<(), OverrideError> {
    for patch in overrides {
        apply_one(doc, patch)?;
    }
    Ok(())
}

fn apply_one(doc: &mut Value, patch: &PropertyOverride) -> Result<(), OverrideError> {
    let segments: Vec<&str> = patch.path.split('.').collect();
    let Some((last, intermediate)) = segments.split_last() else {
        return Ok(());
    };

    let mut current = doc;
    for segment in intermediate {
        let next = match current {
            Value::Object(map) => map.get_mut(*segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index)),
            _ => None,
        };
        current = next.ok_or_else(|| OverrideError {
            path: patch.path.clone(),
            segment: segment.to_string(),
        })?;
    }

    let Value::Object(map) = current else {
        return Err(OverrideError {
            path: patch.path.clone(),
            segment: last.to_string(),
        });
    };
    match &patch.value {
        Some(value) => {
            map.insert(last.to_string(), value.clone());
        }
        None => {
            map.remove(*last);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> Value {
        json!({
            "Resources": {
                "TaskDef": {
                    "Type": "AWS::ECS::TaskDefinition",
                    "Properties": { "NetworkMode": "bridge", "Family": "site_webserver" },
                },
            }
        })
    }

    #[test]
    fn test_set_override_replaces_value() {
        let mut doc = template();
        apply_overrides(
            &mut doc,
            &[PropertyOverride::set(
                "Resources.TaskDef.Properties.Family",
                json!("other"),
            )],
        )
        .unwrap();
        assert_eq!(doc["Resources"]["TaskDef"]["Properties"]["Family"], "other");
    }

    #[test]
    fn test_deletion_override_removes_property() {
        let mut doc = template();
        apply_overrides(
            &mut doc,
            &[PropertyOverride::delete(
                "Resources.TaskDef.Properties.NetworkMode",
            )],
        )
        .unwrap();
        assert!(doc["Resources"]["TaskDef"]["Properties"]
            .get("NetworkMode")
            .is_none());
        // deleting again is a no-op
        apply_overrides(
            &mut doc,
            &[PropertyOverride::delete(
                "Resources.TaskDef.Properties.NetworkMode",
            )],
        )
        .unwrap();
    }

    #[test]
    fn test_missing_intermediate_segment_fails() {
        let mut doc = template();
        let err = apply_overrides(
            &mut doc,
            &[PropertyOverride::set(
                "Resources.Missing.Properties.Family",
                json!("x"),
            )],
        )
        .unwrap_err();
        assert_eq!(err.segment, "Missing");
    }

    #[test]
    fn test_set_creates_new_final_key() {
        let mut doc = template();
        apply_overrides(
            &mut doc,
            &[PropertyOverride::set(
                "Resources.TaskDef.Properties.TaskDefinition",
                json!("arn:aws:ecs:::task-def/foo:3"),
            )],
        )
        .unwrap();
        assert_eq!(
            doc["Resources"]["TaskDef"]["Properties"]["TaskDefinition"],
            "arn:aws:ecs:::task-def/foo:3"
        );
    }
}
