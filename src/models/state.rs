//! Normalized deployment state: sorted components, deduplicated targets and
//! the sparse target×component role matrix

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::solution::{ComponentSpec, TargetSpec};

/// Matrix key: one component/target pairing
///
/// Serialized as `component::target` so persisted state keeps the legacy
/// wire shape. Component and target names must not contain `::`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StateKey {
    pub component: String,
    pub target: String,
}

impl StateKey {
    pub fn new(component: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.target)
    }
}

impl From<StateKey> for String {
    fn from(key: StateKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for StateKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.split_once("::") {
            Some((component, target)) if !component.is_empty() && !target.is_empty() => {
                Ok(StateKey::new(component, target))
            }
            _ => Err(format!("invalid state key: {}", s)),
        }
    }
}

/// Matrix value: the role a pairing is (or was) deployed through
///
/// `Removed` is the tombstone state: the pairing existed before but is no
/// longer desired. Serialized as the role string, `-` prefixed when removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RoleBinding {
    Live(String),
    Removed(String),
}

impl RoleBinding {
    /// The bound role, regardless of tombstone state
    pub fn role(&self) -> &str {
        match self {
            RoleBinding::Live(role) | RoleBinding::Removed(role) => role,
        }
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, RoleBinding::Removed(_))
    }

    /// Tombstoned copy; idempotent on already-removed bindings
    pub fn removed(&self) -> RoleBinding {
        RoleBinding::Removed(self.role().to_string())
    }
}

impl From<RoleBinding> for String {
    fn from(binding: RoleBinding) -> Self {
        match binding {
            RoleBinding::Live(role) => role,
            RoleBinding::Removed(role) => format!("-{}", role),
        }
    }
}

impl TryFrom<String> for RoleBinding {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() || s == "-" {
            return Err(format!("invalid role binding: {:?}", s));
        }
        match s.strip_prefix('-') {
            Some(role) => Ok(RoleBinding::Removed(role.to_string())),
            None => Ok(RoleBinding::Live(s)),
        }
    }
}

/// A deployment target resolved from the assignment map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDesc {
    pub name: String,
    #[serde(default)]
    pub spec: TargetSpec,
}

/// Normalized, queryable snapshot of a desired or observed world
///
/// Invariant: every matrix key refers to a component in `components` and a
/// target in `targets`, except transiently while merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentState {
    /// Components in dependency order
    #[serde(default)]
    pub components: Vec<ComponentSpec>,

    /// Deduplicated targets, sorted by name
    #[serde(default)]
    pub targets: Vec<TargetDesc>,

    /// Sparse role matrix; absence means "never associated"
    #[serde(default)]
    pub target_component: BTreeMap<StateKey, RoleBinding>,
}

impl DeploymentState {
    /// Tombstone every live matrix entry; used by removal passes
    pub fn mark_all_removed(&mut self) {
        for binding in self.target_component.values_mut() {
            *binding = binding.removed();
        }
    }

    /// Drop tombstoned entries whose removal has been applied, so they do
    /// not resurface in the next pass's previous state
    pub fn clear_all_removed(&mut self) {
        self.target_component.retain(|_, v| !v.is_removed());
    }
}
