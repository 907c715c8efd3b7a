//! The deployment planning and reconciliation engine

pub mod eval;
pub mod heartbeat;
pub mod plan;
pub mod reconciler;
pub mod sort;
pub mod state;

pub use plan::plan_for_deployment;
pub use reconciler::{EngineOptions, PersistedDeploymentState, ReconcileEngine};
pub use sort::sort_by_dependencies;
pub use state::{merge_deployment_states, new_deployment_state};
