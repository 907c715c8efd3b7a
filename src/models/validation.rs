//! Provider validation rules and change detection
//!
//! Each target provider publishes a [`ValidationRule`] describing which
//! component properties it is sensitive to. The reconciler consults
//! [`ValidationRule::is_component_changed`] to decide whether a step can be
//! skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;
use crate::models::solution::ComponentSpec;

/// One property (or property pattern) participating in change detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDesc {
    /// Property name; may contain `*` wildcards
    pub name: String,

    #[serde(default)]
    pub ignore_case: bool,

    /// Treat a missing property as unchanged instead of changed
    #[serde(default)]
    pub skip_if_missing: bool,

    /// Compare by prefix instead of full equality
    #[serde(default)]
    pub prefix_match: bool,
}

impl PropertyDesc {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// What a provider requires of components and which changes it reacts to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    /// Component type the provider insists on; empty accepts any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub required_component_type: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_properties: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_detection_properties: Vec<PropertyDesc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_detection_metadata: Vec<PropertyDesc>,
}

impl ValidationRule {
    /// Rule that reacts to any property change; the usual default for
    /// providers without a narrower contract
    pub fn all_properties() -> Self {
        Self {
            change_detection_properties: vec![PropertyDesc::named("*")],
            ..Default::default()
        }
    }

    /// Validate components against required type and properties
    pub fn validate(&self, components: &[ComponentSpec]) -> Result<(), EngineError> {
        for component in components {
            self.validate_component(component)?;
        }
        Ok(())
    }

    fn validate_component(&self, component: &ComponentSpec) -> Result<(), EngineError> {
        if !self.required_component_type.is_empty()
            && self.required_component_type != component.component_type
        {
            return Err(EngineError::ConfigError(format!(
                "provider requires component type '{}', but '{}' is found instead",
                self.required_component_type, component.component_type
            )));
        }
        for prop in &self.required_properties {
            match component.properties.get(prop) {
                Some(Value::String(s)) if !s.is_empty() => {}
                Some(Value::Null) | None => {
                    return Err(EngineError::ConfigError(format!(
                        "required property '{}' is missing on component '{}'",
                        prop, component.name
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Whether the desired component differs from the observed one in any
    /// property the provider cares about
    pub fn is_component_changed(&self, old: &ComponentSpec, new: &ComponentSpec) -> bool {
        if detect_changes(
            &self.change_detection_properties,
            &old.properties,
            &new.properties,
        ) {
            return true;
        }
        let old_meta = string_map_to_values(&old.metadata);
        let new_meta = string_map_to_values(&new.metadata);
        detect_changes(&self.change_detection_metadata, &old_meta, &new_meta)
    }
}

fn string_map_to_values(map: &HashMap<String, String>) -> HashMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

fn detect_changes(
    properties: &[PropertyDesc],
    old: &HashMap<String, Value>,
    new: &HashMap<String, Value>,
) -> bool {
    for desc in properties {
        if desc.name.contains('*') {
            for key in old.keys() {
                if glob_match(&desc.name, key) && compare_property(desc, old, new, key) {
                    return true;
                }
            }
            // keys that only appear on the desired side are additions
            for key in new.keys() {
                if glob_match(&desc.name, key) && !old.contains_key(key) {
                    return true;
                }
            }
        } else if compare_property(desc, old, new, &desc.name) {
            return true;
        }
    }
    false
}

/// Minimal glob: `*` matches any run of characters
fn glob_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 && !pattern.ends_with('*') {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// True when the property differs between old and new
fn compare_property(
    desc: &PropertyDesc,
    old: &HashMap<String, Value>,
    new: &HashMap<String, Value>,
    key: &str,
) -> bool {
    match (old.get(key), new.get(key)) {
        (Some(ov), Some(nv)) => {
            !compare_strings(&value_string(ov), &value_string(nv), desc)
        }
        (Some(_), None) | (None, Some(_)) => !desc.skip_if_missing,
        (None, None) => false,
    }
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_strings(a: &str, b: &str, desc: &PropertyDesc) -> bool {
    let (ta, tb) = if desc.ignore_case {
        (a.to_lowercase(), b.to_lowercase())
    } else {
        (a.to_string(), b.to_string())
    };
    if desc.prefix_match {
        ta.starts_with(&tb) || tb.starts_with(&ta)
    } else {
        ta == tb
    }
}
