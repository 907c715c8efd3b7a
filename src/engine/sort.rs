//! Dependency ordering of solution components

use std::collections::VecDeque;

use crate::errors::EngineError;
use crate::models::ComponentSpec;

/// Order components so every component appears after its dependencies.
///
/// Kahn's algorithm, seeded and drained in input order, so the sort is
/// stable: components with no dependency relationship keep their original
/// relative order. The planner's grouping relies on this.
///
/// Fails when any cycle exists or a dependency names an undeclared
/// component; a self-dependency is rejected the same way.
pub fn sort_by_dependencies(
    components: &[ComponentSpec],
) -> Result<Vec<ComponentSpec>, EngineError> {
    let size = components.len();
    let mut in_degrees: Vec<usize> = components.iter().map(|c| c.dependencies.len()).collect();
    let mut queue: VecDeque<usize> = (0..size).filter(|&i| in_degrees[i] == 0).collect();

    let mut ret = Vec::with_capacity(size);
    while let Some(index) = queue.pop_front() {
        ret.push(components[index].clone());
        let resolved = &components[index].name;
        for (i, c) in components.iter().enumerate() {
            if c.dependencies.iter().any(|d| d == resolved) {
                in_degrees[i] -= 1;
                if in_degrees[i] == 0 {
                    queue.push_back(i);
                }
            }
        }
    }

    if ret.len() != size {
        return Err(EngineError::CircularDependency);
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, deps: &[&str]) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn no_dependencies_preserves_input_order() {
        let input = vec![
            component("c", &[]),
            component("a", &[]),
            component("b", &[]),
        ];
        let sorted = sort_by_dependencies(&input).unwrap();
        let names: Vec<&str> = sorted.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn chain_is_reordered() {
        let input = vec![
            component("a", &["b"]),
            component("b", &["c"]),
            component("c", &[]),
        ];
        let sorted = sort_by_dependencies(&input).unwrap();
        let names: Vec<&str> = sorted.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn diamond_respects_partial_order() {
        let input = vec![
            component("a", &["b", "c"]),
            component("b", &["d"]),
            component("c", &["d"]),
            component("d", &[]),
        ];
        let sorted = sort_by_dependencies(&input).unwrap();
        let pos = |n: &str| sorted.iter().position(|c| c.name == n).unwrap();
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
    }

    #[test]
    fn cycle_is_rejected() {
        let input = vec![component("a", &["b"]), component("b", &["a"])];
        assert!(matches!(
            sort_by_dependencies(&input),
            Err(EngineError::CircularDependency)
        ));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let input = vec![component("a", &["a"])];
        assert!(matches!(
            sort_by_dependencies(&input),
            Err(EngineError::CircularDependency)
        ));
    }

    #[test]
    fn unresolved_dependency_is_rejected() {
        let input = vec![component("a", &["ghost"]), component("b", &[])];
        assert!(matches!(
            sort_by_dependencies(&input),
            Err(EngineError::CircularDependency)
        ));
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(sort_by_dependencies(&[]).unwrap().is_empty());
    }
}
