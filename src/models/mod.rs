//! Domain models for solutions, deployment state, plans and summaries

pub mod plan;
pub mod solution;
pub mod state;
pub mod summary;
pub mod validation;

pub use plan::{ComponentStep, DeploymentPlan, DeploymentStep, StepAction};
pub use solution::{ComponentSpec, DeploymentSpec, InstanceSpec, SolutionSpec, TargetSpec};
pub use state::{DeploymentState, RoleBinding, StateKey, TargetDesc};
pub use summary::{
    ComponentResultSpec, SummaryResult, SummarySpec, SummaryState, TargetResultSpec,
};
pub use validation::{PropertyDesc, ValidationRule};

/// Default role assumed for components that do not declare a type
pub const ROLE_INSTANCE: &str = "instance";

/// Role reported for observed components of unknown type; aliased to
/// [`ROLE_INSTANCE`] at provider lookup time
pub const ROLE_CONTAINER: &str = "container";
