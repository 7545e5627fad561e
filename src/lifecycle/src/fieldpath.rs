// SPDX-FileCopyrightText: 2025 Caution SEZC
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Commercial

use crate::error::LifecycleError;
use serde_json::Value;

/// Extract a scalar field from a raw response document by dotted path, e.g.
/// `"taskDefinition.taskDefinitionArn"`. Numeric segments index into arrays.
///
/// A path that does not resolve to a scalar raises
/// [`LifecycleError::FieldNotFound`], which aborts the surrounding
/// provisioning operation.
pub fn resolve_output_field(response: &Value, path: &str) -> Result<String, LifecycleError> {
    let missing = || LifecycleError::FieldNotFound {
        path: path.to_string(),
    };

    let mut current = response;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(missing)?;
    }

    match current {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(missing()),
    }
}
