//! Solution, instance and target models

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named unit of desired configuration within a solution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Component name, unique within a solution
    pub name: String,

    /// Provider role discriminator, e.g. "helm", "docker"; empty means the
    /// generic "instance" role
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub component_type: String,

    /// Free-form configuration handed to the provider
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Value>,

    /// String metadata attached to the component
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    /// Names of components that must be realized before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Placement constraint expression, evaluated by schedulers upstream of
    /// this engine; carried through untouched
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub constraints: String,
}

impl ComponentSpec {
    /// Role this component is deployed through, defaulting the empty type
    pub fn role(&self) -> &str {
        if self.component_type.is_empty() {
            super::ROLE_INSTANCE
        } else {
            &self.component_type
        }
    }
}

/// The declarative set of components to deploy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionSpec {
    #[serde(default)]
    pub components: Vec<ComponentSpec>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// A concrete instantiation of a solution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Instance name; keys persisted state and summaries
    pub name: String,

    /// Parameters referenced by `${{params.*}}` expressions
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// A named deployment destination with an opaque provider-specific spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Value>,

    /// Components pre-provisioned on the target itself, e.g. a local agent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentSpec>,
}

/// Fully-resolved input to one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default)]
    pub solution: SolutionSpec,

    #[serde(default)]
    pub instance: InstanceSpec,

    /// Targets referenced by the assignment map, keyed by name
    #[serde(default)]
    pub targets: HashMap<String, TargetSpec>,

    /// Target name → pattern of `{componentName}` tokens
    #[serde(default)]
    pub assignments: HashMap<String, String>,

    /// Deployment version, carried into persisted summaries
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generation: String,

    /// Target the engine is currently executing against; transient
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub active_target: String,
}

impl DeploymentSpec {
    /// Targets whose assignment pattern mentions the named component
    pub fn targets_for_component(&self, component: &str) -> Vec<(String, TargetSpec)> {
        let token = format!("{{{}}}", component);
        let mut ret: Vec<(String, TargetSpec)> = self
            .assignments
            .iter()
            .filter(|(_, pattern)| !pattern.is_empty() && pattern.contains(&token))
            .filter_map(|(name, _)| {
                self.targets
                    .get(name)
                    .map(|spec| (name.clone(), spec.clone()))
            })
            .collect();
        ret.sort_by(|a, b| a.0.cmp(&b.0));
        ret
    }
}
