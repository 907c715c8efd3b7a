//! Deployment plans: ordered, dependency-respecting steps grouped by
//! target and provider role

use serde::{Deserialize, Serialize};

use crate::models::solution::ComponentSpec;
use crate::models::summary::ComponentResultSpec;

/// What the provider should do with one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Update,
    Delete,
}

/// One component action inside a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStep {
    pub action: StepAction,
    pub component: ComponentSpec,
}

/// One unit of planned work: a target, a provider role and an ordered list
/// of component actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStep {
    pub target: String,
    pub role: String,
    /// True when this is the first step ever emitted for this target+role
    /// pairing; consumed downstream for bootstrap-only behavior
    pub is_first: bool,
    pub components: Vec<ComponentStep>,
}

impl DeploymentStep {
    pub fn components(&self) -> Vec<ComponentSpec> {
        self.components.iter().map(|c| c.component.clone()).collect()
    }

    pub fn updated_components(&self) -> Vec<ComponentSpec> {
        self.components
            .iter()
            .filter(|c| c.action == StepAction::Update)
            .map(|c| c.component.clone())
            .collect()
    }

    pub fn deleted_components(&self) -> Vec<ComponentSpec> {
        self.components
            .iter()
            .filter(|c| c.action == StepAction::Delete)
            .map(|c| c.component.clone())
            .collect()
    }

    /// Per-component result map seeded with untouched entries
    pub fn prepare_result_map(
        &self,
    ) -> std::collections::HashMap<String, ComponentResultSpec> {
        self.components
            .iter()
            .map(|c| {
                (
                    c.component.name.clone(),
                    ComponentResultSpec::untouched(),
                )
            })
            .collect()
    }
}

/// Ordered sequence of steps; transient, recomputed every pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    /// Index of the last step for the given target+role pair, if any
    pub fn find_last_target_role(&self, target: &str, role: &str) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|s| s.target == target && s.role == role)
    }

    /// Whether a component may join the step at `index` without breaking
    /// dependency order: every dependency must already be scheduled as an
    /// update at or before that step
    pub fn can_append_to_step(&self, index: usize, component: &ComponentSpec) -> bool {
        component.dependencies.iter().all(|dep| {
            self.steps[..=index].iter().any(|step| {
                step.components
                    .iter()
                    .any(|c| c.component.name == *dep && c.action == StepAction::Update)
            })
        })
    }

    /// Rework the plan so deletions run after all updates, in reverse plan
    /// order; mixed steps are split into an update step in place and a
    /// reversed deletion step at the tail
    pub fn revised_for_deletion(self) -> DeploymentPlan {
        let mut ret = DeploymentPlan::default();
        let mut deleted_steps: Vec<DeploymentStep> = Vec::new();

        for step in self.steps {
            let deleted = step.deleted_components().len();
            let all = step.components.len();
            if deleted == 0 {
                ret.steps.push(step);
            } else if deleted == all {
                deleted_steps.push(step);
            } else {
                ret.steps.push(make_update_step(&step));
                deleted_steps.push(make_reversed_deletion_step(&step));
            }
        }
        for step in deleted_steps.into_iter().rev() {
            ret.steps.push(step);
        }
        ret
    }
}

fn make_update_step(step: &DeploymentStep) -> DeploymentStep {
    DeploymentStep {
        target: step.target.clone(),
        role: step.role.clone(),
        is_first: step.is_first,
        components: step
            .components
            .iter()
            .filter(|c| c.action == StepAction::Update)
            .cloned()
            .collect(),
    }
}

fn make_reversed_deletion_step(step: &DeploymentStep) -> DeploymentStep {
    DeploymentStep {
        target: step.target.clone(),
        role: step.role.clone(),
        is_first: step.is_first,
        components: step
            .components
            .iter()
            .rev()
            .filter(|c| c.action == StepAction::Delete)
            .cloned()
            .collect(),
    }
}
