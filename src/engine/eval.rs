//! Dynamic expression evaluation over deployment specs
//!
//! Component property strings may embed `${{...}}` expressions that are
//! resolved against the instance just before planning:
//!
//! - `${{params.<key>}}` — instance parameter lookup
//! - `${{instance.name}}` — the instance name
//!
//! Unknown references fail the pass for normal deployments; removal passes
//! tolerate failures and proceed with the unevaluated spec.

use serde_json::Value;

use crate::errors::EngineError;
use crate::models::{DeploymentSpec, InstanceSpec};

/// Resolve every expression in the spec's component properties
pub fn evaluate_deployment(deployment: &DeploymentSpec) -> Result<DeploymentSpec, EngineError> {
    let mut ret = deployment.clone();
    for component in &mut ret.solution.components {
        for value in component.properties.values_mut() {
            evaluate_value(value, &deployment.instance)?;
        }
    }
    Ok(ret)
}

fn evaluate_value(value: &mut Value, instance: &InstanceSpec) -> Result<(), EngineError> {
    match value {
        Value::String(s) => {
            if s.contains("${{") {
                *value = evaluate_string(s, instance)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                evaluate_value(item, instance)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                evaluate_value(item, instance)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn evaluate_string(input: &str, instance: &InstanceSpec) -> Result<Value, EngineError> {
    // a string that is exactly one expression keeps the resolved value's
    // type; anything else is treated as string interpolation
    if let Some(expr) = sole_expression(input) {
        return resolve(expr, instance);
    }

    let mut out = String::new();
    let mut rest = input;
    while let Some(start) = rest.find("${{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 3..];
        let end = tail.find("}}").ok_or_else(|| {
            EngineError::EvaluationError(format!("unterminated expression in '{}'", input))
        })?;
        let resolved = resolve(tail[..end].trim(), instance)?;
        match resolved {
            Value::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        rest = &tail[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn sole_expression(input: &str) -> Option<&str> {
    let inner = input.strip_prefix("${{")?.strip_suffix("}}")?;
    if inner.contains("${{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn resolve(expr: &str, instance: &InstanceSpec) -> Result<Value, EngineError> {
    if let Some(key) = expr.strip_prefix("params.") {
        return instance.parameters.get(key).cloned().ok_or_else(|| {
            EngineError::EvaluationError(format!("undefined parameter '{}'", key))
        });
    }
    match expr {
        "instance.name" => Ok(Value::String(instance.name.clone())),
        other => Err(EngineError::EvaluationError(format!(
            "unsupported expression '{}'",
            other
        ))),
    }
}
