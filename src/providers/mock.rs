//! In-memory target provider used by tests and dry runs

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::EngineError;
use crate::models::{
    ComponentResultSpec, ComponentSpec, ComponentStep, DeploymentSpec, DeploymentStep,
    StepAction, ValidationRule,
};
use crate::providers::TargetProvider;

/// One apply call as recorded by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedApply {
    pub target: String,
    pub role: String,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    /// Instance metadata as the provider saw it for this step
    pub instance_metadata: HashMap<String, String>,
}

/// Provider double keeping deployed components in memory.
///
/// Applies mutate the in-memory component set, `get` reads it back, and
/// every apply is recorded for assertions. Components named in `fail_on`
/// make `apply` fail, for exercising partial-failure paths.
pub struct MockTargetProvider {
    name: String,
    deployed: Mutex<HashMap<String, ComponentSpec>>,
    applied: Mutex<Vec<RecordedApply>>,
    fail_on: Mutex<Vec<String>>,
    rule: ValidationRule,
}

impl MockTargetProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            deployed: Mutex::new(HashMap::new()),
            applied: Mutex::new(Vec::new()),
            fail_on: Mutex::new(Vec::new()),
            rule: ValidationRule::all_properties(),
        }
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rule = rule;
        self
    }

    /// Make `apply` fail whenever the named component is in the step
    pub fn fail_on_component(&self, component: &str) {
        self.fail_on.lock().unwrap().push(component.to_string());
    }

    /// Pre-load observed state, as if the component were already deployed
    pub fn seed_deployed(&self, component: ComponentSpec) {
        self.deployed
            .lock()
            .unwrap()
            .insert(component.name.clone(), component);
    }

    pub fn deployed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.deployed.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn recorded_applies(&self) -> Vec<RecordedApply> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetProvider for MockTargetProvider {
    async fn apply(
        &self,
        deployment: &DeploymentSpec,
        step: &DeploymentStep,
        dry_run: bool,
    ) -> Result<HashMap<String, ComponentResultSpec>, EngineError> {
        let mut results = step.prepare_result_map();

        {
            let fail_on = self.fail_on.lock().unwrap();
            if let Some(victim) = step
                .components
                .iter()
                .find(|c| fail_on.contains(&c.component.name))
            {
                return Err(EngineError::ProviderError(format!(
                    "mock provider '{}' failed on component '{}'",
                    self.name, victim.component.name
                )));
            }
        }

        if dry_run {
            return Ok(results);
        }

        self.applied.lock().unwrap().push(RecordedApply {
            target: step.target.clone(),
            role: step.role.clone(),
            updated: step
                .updated_components()
                .iter()
                .map(|c| c.name.clone())
                .collect(),
            deleted: step
                .deleted_components()
                .iter()
                .map(|c| c.name.clone())
                .collect(),
            instance_metadata: deployment.instance.metadata.clone(),
        });

        let mut deployed = self.deployed.lock().unwrap();
        for component in &step.components {
            match component.action {
                StepAction::Update => {
                    debug!("Mock {}: updating {}", self.name, component.component.name);
                    deployed
                        .insert(component.component.name.clone(), component.component.clone());
                }
                StepAction::Delete => {
                    debug!("Mock {}: deleting {}", self.name, component.component.name);
                    deployed.remove(&component.component.name);
                }
            }
            results.insert(component.component.name.clone(), ComponentResultSpec::ok());
        }

        Ok(results)
    }

    async fn get(
        &self,
        _deployment: &DeploymentSpec,
        references: &[ComponentStep],
    ) -> Result<Vec<ComponentSpec>, EngineError> {
        let deployed = self.deployed.lock().unwrap();
        Ok(references
            .iter()
            .filter_map(|r| deployed.get(&r.component.name).cloned())
            .collect())
    }

    fn validation_rule(&self) -> ValidationRule {
        self.rule.clone()
    }
}
