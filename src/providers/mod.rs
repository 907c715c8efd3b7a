//! Target provider contract and role-keyed registry
//!
//! Providers are the only way the engine touches a target. Real
//! implementations (helm, docker, kubectl, remote agents) live outside this
//! crate; the engine depends only on the [`TargetProvider`] trait.

pub mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::models::{
    ComponentResultSpec, ComponentSpec, ComponentStep, DeploymentSpec, DeploymentStep,
    ValidationRule, ROLE_CONTAINER, ROLE_INSTANCE,
};

pub use mock::MockTargetProvider;

/// Capability set required of a target provider
#[async_trait]
pub trait TargetProvider: Send + Sync {
    /// Apply one step's component actions to the target
    async fn apply(
        &self,
        deployment: &DeploymentSpec,
        step: &DeploymentStep,
        dry_run: bool,
    ) -> Result<HashMap<String, ComponentResultSpec>, EngineError>;

    /// Report which of the referenced components the target currently has
    async fn get(
        &self,
        deployment: &DeploymentSpec,
        references: &[ComponentStep],
    ) -> Result<Vec<ComponentSpec>, EngineError>;

    /// Change-detection contract driving the skip optimization
    fn validation_rule(&self) -> ValidationRule;
}

/// Normalize a role for provider lookup; "container" is an alias of
/// "instance", and the empty role defaults to "instance"
pub fn normalize_role(role: &str) -> &str {
    match role {
        "" | ROLE_CONTAINER => ROLE_INSTANCE,
        other => other,
    }
}

/// Role-keyed provider registry
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn TargetProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a role; the role is normalized first
    pub fn register(&mut self, role: &str, provider: Arc<dyn TargetProvider>) {
        self.providers
            .insert(normalize_role(role).to_string(), provider);
    }

    /// Resolve the provider for a role
    pub fn resolve(&self, role: &str) -> Result<Arc<dyn TargetProvider>, EngineError> {
        let normalized = normalize_role(role);
        self.providers.get(normalized).cloned().ok_or_else(|| {
            EngineError::ConfigError(format!("no provider registered for role '{}'", normalized))
        })
    }

    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.providers.keys().cloned().collect();
        roles.sort();
        roles
    }
}
