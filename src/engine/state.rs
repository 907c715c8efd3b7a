//! Building and merging normalized deployment states

use crate::engine::sort::sort_by_dependencies;
use crate::errors::EngineError;
use crate::models::{DeploymentSpec, DeploymentState, RoleBinding, StateKey, TargetDesc};

/// Build the normalized desired state for a deployment spec.
///
/// Components come out dependency-sorted, targets deduplicated and sorted
/// by name, and the matrix holds one live binding per component/target
/// pairing named by the assignment map. Pure: identical inputs yield
/// identical output.
pub fn new_deployment_state(
    deployment: &DeploymentSpec,
) -> Result<DeploymentState, EngineError> {
    let mut ret = DeploymentState::default();

    let components = sort_by_dependencies(&deployment.solution.components)?;

    for component in components {
        for (target_name, target_spec) in deployment.targets_for_component(&component.name) {
            if !ret.targets.iter().any(|t| t.name == target_name) {
                ret.targets.push(TargetDesc {
                    name: target_name.clone(),
                    spec: target_spec,
                });
            }
            ret.target_component.insert(
                StateKey::new(&component.name, &target_name),
                RoleBinding::Live(component.role().to_string()),
            );
        }
        ret.components.push(component);
    }

    // deterministic ordering downstream
    ret.targets.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(ret)
}

/// Merge two states: `overlay` wins, `base` fills gaps.
///
/// Components and targets union by name. Matrix keys present only in the
/// base come back tombstoned, never double-prefixed; keys the overlay
/// states explicitly are left untouched.
pub fn merge_deployment_states(
    base: Option<&DeploymentState>,
    overlay: DeploymentState,
) -> DeploymentState {
    let Some(base) = base else {
        return overlay;
    };
    let mut current = overlay;

    for c in &base.components {
        if !current.components.iter().any(|cc| cc.name == c.name) {
            current.components.push(c.clone());
        }
    }
    for t in &base.targets {
        if !current.targets.iter().any(|tt| tt.name == t.name) {
            current.targets.push(t.clone());
        }
    }
    for (key, binding) in &base.target_component {
        if !current.target_component.contains_key(key) {
            current
                .target_component
                .insert(key.clone(), binding.removed());
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::{ComponentSpec, TargetSpec};

    fn deployment(
        components: Vec<ComponentSpec>,
        assignments: &[(&str, &str)],
    ) -> DeploymentSpec {
        DeploymentSpec {
            solution: crate::models::SolutionSpec {
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

    fn component(name: &str) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn binding(state: &DeploymentState, key: &str) -> Option<String> {
        let key = StateKey::try_from(key.to_string()).unwrap();
        state
            .target_component
            .get(&key)
            .cloned()
            .map(String::from)
    }

    #[test]
    fn builds_single_target_state() {
        //       T1
        // ---------
        //  a     X
        //  b     X
        //  c     X
        let state = new_deployment_state(&deployment(
            vec![component("a"), component("b"), component("c")],
            &[("T1", "{a}{b}{c}")],
        ))
        .unwrap();
        assert_eq!(state.components.len(), 3);
        assert_eq!(state.targets.len(), 1);
        assert_eq!(binding(&state, "a::T1").unwrap(), "instance");
        assert_eq!(binding(&state, "b::T1").unwrap(), "instance");
        assert_eq!(binding(&state, "c::T1").unwrap(), "instance");
    }

    #[test]
    fn builds_two_target_state() {
        //       T1    T2
        // ----------------
        //  a     X     .
        //  b     .     X
        //  c     X     .
        let state = new_deployment_state(&deployment(
            vec![component("a"), component("b"), component("c")],
            &[("T1", "{a}{c}"), ("T2", "{b}")],
        ))
        .unwrap();
        assert_eq!(state.components.len(), 3);
        assert_eq!(state.targets.len(), 2);
        assert_eq!(binding(&state, "a::T1").unwrap(), "instance");
        assert_eq!(binding(&state, "b::T2").unwrap(), "instance");
        assert_eq!(binding(&state, "c::T1").unwrap(), "instance");
    }

    #[test]
    fn records_component_types_in_matrix() {
        let mut a = component("a");
        a.component_type = "mock1".to_string();
        let mut b = component("b");
        b.component_type = "mock2".to_string();

        let state =
            new_deployment_state(&deployment(vec![a, b], &[("T1", "{a}"), ("T2", "{b}")]))
                .unwrap();
        assert_eq!(state.target_component.len(), 2);
        assert_eq!(binding(&state, "a::T1").unwrap(), "mock1");
        assert_eq!(binding(&state, "b::T2").unwrap(), "mock2");
    }

    #[test]
    fn sorts_components_before_building() {
        let mut a = component("a");
        a.dependencies = vec!["b".to_string()];
        let mut b = component("b");
        b.dependencies = vec!["c".to_string()];

        let state = new_deployment_state(&deployment(
            vec![a, b, component("c")],
            &[("T1", "{a}"), ("T2", "{b}"), ("T3", "{c}")],
        ))
        .unwrap();
        let names: Vec<&str> = state.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert_eq!(state.targets.len(), 3);
    }

    #[test]
    fn propagates_sort_failure() {
        let mut a = component("a");
        a.dependencies = vec!["a".to_string()];
        assert!(new_deployment_state(&deployment(vec![a], &[("T1", "{a}")])).is_err());
    }

    #[test]
    fn build_is_deterministic() {
        let spec = deployment(
            vec![component("a"), component("b")],
            &[("T2", "{a}{b}"), ("T1", "{a}")],
        );
        let first = new_deployment_state(&spec).unwrap();
        let second = new_deployment_state(&spec).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        // targets come out name-sorted
        assert_eq!(first.targets[0].name, "T1");
        assert_eq!(first.targets[1].name, "T2");
    }

    #[test]
    fn merge_added_component_keeps_overlay_untouched() {
        let state1 = new_deployment_state(&deployment(
            vec![component("a"), component("b")],
            &[("T1", "{a}{b}")],
        ))
        .unwrap();
        let state2 = new_deployment_state(&deployment(
            vec![component("a"), component("b"), component("c")],
            &[("T1", "{a}{b}{c}")],
        ))
        .unwrap();

        let merged = merge_deployment_states(Some(&state1), state2);
        assert_eq!(merged.components.len(), 3);
        assert_eq!(merged.targets.len(), 1);
        assert_eq!(binding(&merged, "a::T1").unwrap(), "instance");
        assert_eq!(binding(&merged, "b::T1").unwrap(), "instance");
        assert_eq!(binding(&merged, "c::T1").unwrap(), "instance");
    }

    #[test]
    fn merge_removed_component_survives_tombstoned() {
        let state1 = new_deployment_state(&deployment(
            vec![component("a"), component("b"), component("c")],
            &[("T1", "{a}{b}{c}")],
        ))
        .unwrap();
        let state2 = new_deployment_state(&deployment(
            vec![component("a"), component("b")],
            &[("T1", "{a}{b}")],
        ))
        .unwrap();

        let merged = merge_deployment_states(Some(&state1), state2);
        assert_eq!(merged.components.len(), 3);
        assert_eq!(binding(&merged, "a::T1").unwrap(), "instance");
        assert_eq!(binding(&merged, "b::T1").unwrap(), "instance");
        assert_eq!(binding(&merged, "c::T1").unwrap(), "-instance");
    }

    #[test]
    fn merge_target_change_tombstones_old_target() {
        let components = vec![component("a"), component("b"), component("c")];
        let state1 =
            new_deployment_state(&deployment(components.clone(), &[("T1", "{a}{b}{c}")]))
                .unwrap();
        let state2 =
            new_deployment_state(&deployment(components, &[("T2", "{a}{b}{c}")])).unwrap();

        let merged = merge_deployment_states(Some(&state1), state2);
        assert_eq!(merged.components.len(), 3);
        assert_eq!(merged.targets.len(), 2);
        for c in ["a", "b", "c"] {
            assert_eq!(binding(&merged, &format!("{}::T1", c)).unwrap(), "-instance");
            assert_eq!(binding(&merged, &format!("{}::T2", c)).unwrap(), "instance");
        }
    }

    #[test]
    fn merge_never_double_tombstones() {
        let mut base = new_deployment_state(&deployment(
            vec![component("a")],
            &[("T1", "{a}")],
        ))
        .unwrap();
        base.mark_all_removed();

        let merged = merge_deployment_states(Some(&base), DeploymentState::default());
        assert_eq!(binding(&merged, "a::T1").unwrap(), "-instance");
    }

    #[test]
    fn merge_with_no_base_returns_overlay() {
        let overlay = new_deployment_state(&deployment(
            vec![component("a")],
            &[("T1", "{a}")],
        ))
        .unwrap();
        let merged = merge_deployment_states(None, overlay.clone());
        assert_eq!(merged, overlay);
    }

    #[test]
    fn merge_unrelated_states_unions_everything() {
        let state1 = new_deployment_state(&deployment(
            vec![component("a"), component("b"), component("c")],
            &[("T1", "{a}{b}{c}")],
        ))
        .unwrap();
        let state2 = new_deployment_state(&deployment(
            vec![component("d"), component("e")],
            &[("T2", "{d}{e}")],
        ))
        .unwrap();

        let merged = merge_deployment_states(Some(&state1), state2);
        assert_eq!(merged.components.len(), 5);
        assert_eq!(merged.targets.len(), 2);
        assert_eq!(binding(&merged, "a::T1").unwrap(), "-instance");
        assert_eq!(binding(&merged, "d::T2").unwrap(), "instance");
    }

    #[test]
    fn merge_added_target_keeps_both_assignments() {
        let components = vec![component("a"), component("b"), component("c")];
        let state1 =
            new_deployment_state(&deployment(components.clone(), &[("T1", "{a}{b}{c}")]))
                .unwrap();
        let state2 = new_deployment_state(&deployment(
            components,
            &[("T1", "{a}{b}{c}"), ("T2", "{a}{b}")],
        ))
        .unwrap();

        let merged = merge_deployment_states(Some(&state1), state2);
        assert_eq!(merged.components.len(), 3);
        assert_eq!(merged.targets.len(), 2);
        assert_eq!(merged.target_component.len(), 5);
        assert!(merged.target_component.values().all(|v| !v.is_removed()));
    }

    #[test]
    fn assignments_with_empty_patterns_are_ignored() {
        let mut spec = deployment(vec![component("a")], &[("T1", "{a}")]);
        spec.assignments.insert("T2".to_string(), String::new());
        spec.targets
            .insert("T2".to_string(), TargetSpec::default());
        let state = new_deployment_state(&spec).unwrap();
        assert_eq!(state.targets.len(), 1);
        assert_eq!(state.target_component.len(), 1);
    }
}
