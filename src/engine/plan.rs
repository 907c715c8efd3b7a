//! Compiling a merged deployment state into an ordered plan

use crate::errors::EngineError;
use crate::models::{
    ComponentStep, DeploymentPlan, DeploymentState, DeploymentStep, StateKey, StepAction,
};

/// Compile a deployment plan from a merged state.
///
/// Components are walked in their dependency-sorted order, targets in
/// target-list order. Consecutive same-target/same-role entries collapse
/// into one step when dependency order allows; otherwise a new step opens.
/// A final deletion pass floats pure-deletion steps to the tail.
///
/// Total over any valid state: planning itself cannot fail beyond what the
/// state builder already rejected.
pub fn plan_for_deployment(state: &DeploymentState) -> Result<DeploymentPlan, EngineError> {
    let mut ret = DeploymentPlan::default();

    for component in &state.components {
        for target in &state.targets {
            let key = StateKey::new(&component.name, &target.name);
            let Some(binding) = state.target_component.get(&key) else {
                continue;
            };
            let role = component.role();
            let action = if binding.is_removed() {
                StepAction::Delete
            } else {
                StepAction::Update
            };
            let index = ret.find_last_target_role(&target.name, role);
            match index {
                Some(i) if ret.can_append_to_step(i, component) => {
                    ret.steps[i].components.push(ComponentStep {
                        action,
                        component: component.clone(),
                    });
                }
                _ => {
                    ret.steps.push(DeploymentStep {
                        target: target.name.clone(),
                        role: role.to_string(),
                        is_first: index.is_none(),
                        components: vec![ComponentStep {
                            action,
                            component: component.clone(),
                        }],
                    });
                }
            }
        }
    }

    Ok(ret.revised_for_deletion())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::{merge_deployment_states, new_deployment_state};
    use crate::models::{ComponentSpec, DeploymentSpec, SolutionSpec, TargetSpec};

    fn component(name: &str, ctype: &str, deps: &[&str]) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            component_type: ctype.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn deployment(
        components: Vec<ComponentSpec>,
        assignments: &[(&str, &str)],
    ) -> DeploymentSpec {
        DeploymentSpec {
            solution: SolutionSpec {
                components,
                ..Default::default()
            },
            assignments: assignments
                .iter()
                .map(|(t, p)| (t.to_string(), p.to_string()))
                .collect(),
            targets: assignments
                .iter()
                .map(|(t, _)| (t.to_string(), TargetSpec::default()))
                .collect(),
            ..Default::default()
        }
    }

    fn plan_for(deployment: &DeploymentSpec) -> DeploymentPlan {
        let state = new_deployment_state(deployment).unwrap();
        plan_for_deployment(&state).unwrap()
    }

    fn step_names(step: &DeploymentStep) -> Vec<&str> {
        step.components
            .iter()
            .map(|c| c.component.name.as_str())
            .collect()
    }

    #[test]
    fn independent_components_collapse_into_one_step() {
        //       T1
        // ---------
        //  a     X
        //  b     X
        //  c     X
        let plan = plan_for(&deployment(
            vec![
                component("a", "", &[]),
                component("b", "", &[]),
                component("c", "", &[]),
            ],
            &[("T1", "{a}{b}{c}")],
        ));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].target, "T1");
        assert_eq!(plan.steps[0].role, "instance");
        assert!(plan.steps[0].is_first);
        assert_eq!(step_names(&plan.steps[0]), vec!["a", "b", "c"]);
        assert!(plan.steps[0]
            .components
            .iter()
            .all(|c| c.action == StepAction::Update));
    }

    #[test]
    fn roles_split_into_separate_steps() {
        //       T1
        // ---------
        //  a     X   helm
        //  b     X   (instance)
        //  c     X   instance
        let plan = plan_for(&deployment(
            vec![
                component("a", "helm", &[]),
                component("b", "", &[]),
                component("c", "instance", &[]),
            ],
            &[("T1", "{a}{b}{c}")],
        ));
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].role, "helm");
        assert_eq!(step_names(&plan.steps[0]), vec!["a"]);
        assert_eq!(plan.steps[1].role, "instance");
        assert_eq!(step_names(&plan.steps[1]), vec!["b", "c"]);
    }

    #[test]
    fn diamond_across_targets_produces_six_ordered_steps() {
        //       T1    T2    T3
        // ---------------------
        //  a     .     .     X
        //  b     X     X     .   helm
        //  c     .     X     X   helm
        //  d     X     .     X   kubectl
        let plan = plan_for(&deployment(
            vec![
                component("a", "", &[]),
                component("b", "helm", &["a"]),
                component("c", "helm", &["b"]),
                component("d", "kubectl", &["b", "c"]),
            ],
            &[("T1", "{b}{d}"), ("T2", "{b}{c}"), ("T3", "{a}{c}{d}")],
        ));
        assert_eq!(plan.steps.len(), 6);

        let shape: Vec<(&str, &str, Vec<&str>)> = plan
            .steps
            .iter()
            .map(|s| (s.target.as_str(), s.role.as_str(), step_names(s)))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("T3", "instance", vec!["a"]),
                ("T1", "helm", vec!["b"]),
                ("T2", "helm", vec!["b", "c"]),
                ("T3", "helm", vec!["c"]),
                ("T1", "kubectl", vec!["d"]),
                ("T3", "kubectl", vec!["d"]),
            ]
        );
    }

    #[test]
    fn same_role_groups_across_interleaved_declarations() {
        // a:helm, b:kubectl, c:helm, no dependencies -> helm step absorbs c
        let plan = plan_for(&deployment(
            vec![
                component("a", "helm", &[]),
                component("b", "kubectl", &[]),
                component("c", "helm", &[]),
            ],
            &[("T1", "{a}{b}{c}")],
        ));
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(step_names(&plan.steps[0]), vec!["a", "c"]);
        assert_eq!(step_names(&plan.steps[1]), vec!["b"]);
    }

    #[test]
    fn cross_role_dependency_splits_same_role_steps() {
        // c:helm depends on b:kubectl, so c cannot join a's helm step
        let plan = plan_for(&deployment(
            vec![
                component("a", "helm", &[]),
                component("b", "kubectl", &[]),
                component("c", "helm", &["b"]),
            ],
            &[("T1", "{a}{b}{c}")],
        ));
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].role, "helm");
        assert!(plan.steps[0].is_first);
        assert_eq!(step_names(&plan.steps[0]), vec!["a"]);
        assert_eq!(plan.steps[1].role, "kubectl");
        assert_eq!(step_names(&plan.steps[1]), vec!["b"]);
        assert_eq!(plan.steps[2].role, "helm");
        assert!(!plan.steps[2].is_first);
        assert_eq!(step_names(&plan.steps[2]), vec!["c"]);
    }

    #[test]
    fn satisfied_dependencies_still_group_by_role() {
        // b->a and d->c, but each dependency lands in the earlier step of
        // the other role, so both role groups stay intact
        let plan = plan_for(&deployment(
            vec![
                component("a", "helm", &[]),
                component("b", "docker", &["a"]),
                component("c", "helm", &[]),
                component("d", "docker", &["c"]),
            ],
            &[("T1", "{a}{b}{c}{d}")],
        ));
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(step_names(&plan.steps[0]), vec!["a", "c"]);
        assert_eq!(step_names(&plan.steps[1]), vec!["b", "d"]);
    }

    #[test]
    fn linear_cross_role_chain_splits_every_step() {
        let plan = plan_for(&deployment(
            vec![
                component("a", "helm", &[]),
                component("b", "docker", &["a"]),
                component("c", "helm", &["b"]),
                component("d", "docker", &["c"]),
            ],
            &[("T1", "{a}{b}{c}{d}")],
        ));
        assert_eq!(plan.steps.len(), 4);
        let roles: Vec<&str> = plan.steps.iter().map(|s| s.role.as_str()).collect();
        assert_eq!(roles, vec!["helm", "docker", "helm", "docker"]);
        assert!(plan.steps[0].is_first && plan.steps[1].is_first);
        assert!(!plan.steps[2].is_first && !plan.steps[3].is_first);
    }

    #[test]
    fn tombstoned_entries_plan_as_trailing_deletions() {
        let previous = new_deployment_state(&deployment(
            vec![
                component("a", "", &[]),
                component("b", "", &[]),
                component("c", "", &[]),
            ],
            &[("T1", "{a}{b}{c}")],
        ))
        .unwrap();
        let current = new_deployment_state(&deployment(
            vec![component("a", "", &[]), component("b", "", &[])],
            &[("T1", "{a}{b}")],
        ))
        .unwrap();

        let merged = merge_deployment_states(Some(&previous), current);
        let plan = plan_for_deployment(&merged).unwrap();

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(step_names(&plan.steps[0]), vec!["a", "b"]);
        assert!(plan.steps[0].deleted_components().is_empty());
        let deletions = plan.steps[1].deleted_components();
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].name, "c");
    }

    #[test]
    fn empty_state_yields_empty_plan() {
        let plan = plan_for_deployment(&DeploymentState::default()).unwrap();
        assert!(plan.steps.is_empty());
    }
}
