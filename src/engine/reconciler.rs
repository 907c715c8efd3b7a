//! The reconciliation loop: drive the desired state onto targets

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::eval::evaluate_deployment;
use crate::engine::heartbeat::HeartbeatGuard;
use crate::engine::plan::plan_for_deployment;
use crate::engine::state::{merge_deployment_states, new_deployment_state};
use crate::errors::EngineError;
use crate::events::EventSink;
use crate::models::{
    ComponentSpec, DeploymentSpec, DeploymentState, DeploymentStep, RoleBinding, StateKey,
    StepAction, SummaryResult, SummarySpec, SummaryState, TargetResultSpec, TargetSpec,
    ROLE_CONTAINER,
};
use crate::providers::{ProviderRegistry, TargetProvider};
use crate::stores::{StateEntry, StateStore, StoreMetadata};

/// Metadata key through which a target's local agent component is exposed
/// to providers during a step
pub const AGENT_ADDRESS_KEY: &str = "EDGEFLOW_AGENT_ADDRESS";

/// Marker identifying a target component as the edgeflow agent
const AGENT_IMAGE_MARKER: &str = "/edgeflow-agent:";

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Apply attempts per step. Defaults to 1: a failed step fails the
    /// pass, and the next pass re-plans and retries from scratch.
    pub max_attempts: u32,

    /// Blocking delay between apply attempts
    pub retry_delay: Duration,

    /// Heartbeat emission interval
    pub heartbeat_interval: Duration,

    /// Age after which finished summaries are eligible for cleanup
    pub summary_retention: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            summary_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// What survives between passes: the spec that was applied and the merged
/// state it produced
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDeploymentState {
    pub spec: DeploymentSpec,
    pub state: DeploymentState,
}

/// The reconciliation engine.
///
/// One engine value serializes its own passes through an internal lock;
/// independent engine instances do not contend.
pub struct ReconcileEngine {
    providers: ProviderRegistry,
    override_provider: Option<Arc<dyn TargetProvider>>,
    store: Arc<dyn StateStore>,
    events: Arc<dyn EventSink>,
    options: EngineOptions,
    lock: Mutex<()>,
}

impl ReconcileEngine {
    pub fn new(
        providers: ProviderRegistry,
        store: Arc<dyn StateStore>,
        events: Arc<dyn EventSink>,
        options: EngineOptions,
    ) -> Self {
        Self {
            providers,
            override_provider: None,
            store,
            events,
            options,
            lock: Mutex::new(()),
        }
    }

    /// Install a provider that takes precedence over the registry for
    /// every role; used by agent hosts that proxy all applies
    pub fn with_override_provider(mut self, provider: Arc<dyn TargetProvider>) -> Self {
        self.override_provider = Some(provider);
        self
    }

    /// Run one reconciliation pass.
    ///
    /// Returns the same summary that is persisted for polling callers.
    /// A step failure aborts the remaining steps and surfaces as the
    /// returned error, with partial per-target accounting preserved.
    pub async fn reconcile(
        &self,
        deployment: DeploymentSpec,
        remove: bool,
        namespace: &str,
        target_filter: Option<&str>,
    ) -> Result<SummarySpec, EngineError> {
        let _lock = self.lock.lock().await;

        let instance = deployment.instance.name.clone();
        let pass_id = Uuid::new_v4();
        info!(
            pass = %pass_id,
            instance = %instance,
            remove,
            "Reconciling deployment"
        );

        let _heartbeat = HeartbeatGuard::start(
            self.events.clone(),
            instance.clone(),
            namespace.to_string(),
            remove,
            self.options.heartbeat_interval,
        );

        let mut summary = SummarySpec::new(deployment.targets.len(), remove);
        let generation = deployment.generation.clone();
        let hash = deployment_hash(&deployment)?;
        self.save_summary(
            namespace,
            &instance,
            &generation,
            &hash,
            &summary,
            SummaryState::Running,
        )
        .await;

        // 1. Evaluate dynamic expressions. Removal passes proceed with the
        //    unevaluated spec: cleanup must not be blocked by a now-broken
        //    expression.
        let deployment = match evaluate_deployment(&deployment) {
            Ok(evaluated) => evaluated,
            Err(e) if remove => {
                warn!("Skipped failure to evaluate deployment spec: {}", e);
                deployment
            }
            Err(e) => {
                summary.summary_message = format!("failed to evaluate deployment spec: {}", e);
                self.save_summary(
                    namespace,
                    &instance,
                    &generation,
                    &hash,
                    &summary,
                    SummaryState::Done,
                )
                .await;
                return Err(e);
            }
        };

        // 2. Derive desired and observed states
        let previous = self.previous_state(&instance, namespace).await;
        let current_desired = match new_deployment_state(&deployment) {
            Ok(state) => state,
            Err(e) => {
                summary.summary_message =
                    format!("failed to build deployment state: {}", e);
                self.save_summary(
                    namespace,
                    &instance,
                    &generation,
                    &hash,
                    &summary,
                    SummaryState::Done,
                )
                .await;
                return Err(e);
            }
        };
        let observed = match self.get_observed(&deployment).await {
            Ok((state, _)) => state,
            Err(e) => {
                summary.summary_message = format!("failed to get current state: {}", e);
                self.save_summary(
                    namespace,
                    &instance,
                    &generation,
                    &hash,
                    &summary,
                    SummaryState::Done,
                )
                .await;
                return Err(e);
            }
        };

        let mut desired = merge_deployment_states(
            previous.as_ref().map(|p| &p.state),
            current_desired,
        );
        if remove {
            desired.mark_all_removed();
        }
        let mut merged = merge_deployment_states(Some(&observed), desired);

        // 3. Plan
        let plan = match plan_for_deployment(&merged) {
            Ok(plan) => plan,
            Err(e) => {
                summary.summary_message = format!("failed to plan for deployment: {}", e);
                self.save_summary(
                    namespace,
                    &instance,
                    &generation,
                    &hash,
                    &summary,
                    SummaryState::Done,
                )
                .await;
                return Err(e);
            }
        };
        summary.total_steps = plan.steps.len();
        debug!("Planned {} steps", plan.steps.len());

        // 4. Execute in plan order
        //
        // Providers see solution-scoped metadata through the instance
        // metadata map; instance keys win on collision.
        let mut dep = deployment.clone();
        for (key, value) in &deployment.solution.metadata {
            dep.instance
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        let mut some_steps_ran = false;
        let mut planned_steps = 0usize;
        let mut successful_steps = 0usize;
        let mut step_error: Option<EngineError> = None;

        for step in &plan.steps {
            if let Some(filter) = target_filter {
                if filter != step.target {
                    debug!("Skipping step for target '{}' (filter active)", step.target);
                    summary.completed_steps += 1;
                    continue;
                }
            }

            dep.active_target = step.target.clone();
            self.expose_agent_address(&mut dep, &deployment, &step.target);

            let provider = match self.resolve_provider(&step.role) {
                Ok(provider) => provider,
                Err(e) => {
                    summary.summary_message = format!("failed to resolve provider: {}", e);
                    step_error = Some(e);
                    break;
                }
            };

            if let Some(prev) = &previous {
                let test_state =
                    merge_deployment_states(Some(&prev.state), observed.clone());
                if can_skip_step(step, provider.as_ref(), &prev.state.components, &test_state) {
                    debug!(
                        "Skipping step for target '{}': no change detected",
                        step.target
                    );
                    summary.update_target_result(
                        &step.target,
                        TargetResultSpec {
                            status: "OK".to_string(),
                            message: "no change detected".to_string(),
                            component_results: Default::default(),
                        },
                    );
                    // skipped steps count as completed so pollers can see
                    // completed_steps reach total_steps
                    summary.completed_steps += 1;
                    continue;
                }
            }

            some_steps_ran = true;
            planned_steps += 1;
            let action_word = if remove { "delete" } else { "update" };

            let mut attempt = 0u32;
            let applied = loop {
                attempt += 1;
                match provider.apply(&dep, step, false).await {
                    Ok(results) => break Ok(results),
                    Err(e) => {
                        summary.update_target_result(
                            &step.target,
                            TargetResultSpec::error(e.to_string(), step.prepare_result_map()),
                        );
                        if attempt >= self.options.max_attempts {
                            break Err(e);
                        }
                        tokio::time::sleep(self.options.retry_delay).await;
                    }
                }
            };

            match applied {
                Ok(results) => {
                    summary.update_target_result(&step.target, TargetResultSpec::ok(results));
                    successful_steps += 1;
                    summary.completed_steps += 1;
                    // incremental progress for pollers
                    self.save_summary(
                        namespace,
                        &instance,
                        &generation,
                        &hash,
                        &summary,
                        SummaryState::Running,
                    )
                    .await;
                }
                Err(e) => {
                    error!(
                        "Failed to execute deployment step on target '{}': {}",
                        step.target, e
                    );
                    summary.summary_message = format!(
                        "failed to {} on target '{}': {}",
                        action_word, step.target, e
                    );
                    step_error = Some(e);
                    break;
                }
            }
        }

        // 5. Conclude, regardless of step outcome
        merged.clear_all_removed();
        if some_steps_ran {
            match StateEntry::new(
                instance.clone(),
                PersistedDeploymentState {
                    spec: deployment,
                    state: merged,
                },
            ) {
                Ok(entry) => {
                    if let Err(e) = self
                        .store
                        .upsert(entry, &StoreMetadata::namespaced(namespace))
                        .await
                    {
                        error!("Failed to persist deployment state: {}", e);
                        step_error.get_or_insert(e);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize deployment state: {}", e);
                    step_error.get_or_insert(e);
                }
            }
        }

        summary.skipped = !some_steps_ran;
        if summary.skipped {
            summary.success_count = summary.target_count;
        }
        summary.all_assigned_deployed = planned_steps == successful_steps;
        self.save_summary(
            namespace,
            &instance,
            &generation,
            &hash,
            &summary,
            SummaryState::Done,
        )
        .await;

        match step_error {
            Some(e) => Err(e),
            None => {
                info!(
                    instance = %instance,
                    skipped = summary.skipped,
                    "Reconciliation complete"
                );
                Ok(summary)
            }
        }
    }

    /// Query what providers currently see on the targets.
    ///
    /// Recomputes the plan for the desired state and calls each resolved
    /// provider's read operation instead of applying. Roles default to
    /// "container" when the observed component carries no type, which
    /// distinguishes observed-unknown from the desired-state default.
    ///
    /// Unlike step execution, which is strictly sequential, reads are
    /// side-effect free and fan out concurrently across steps.
    pub async fn get_observed(
        &self,
        deployment: &DeploymentSpec,
    ) -> Result<(DeploymentState, Vec<ComponentSpec>), EngineError> {
        let state = new_deployment_state(deployment)?;
        let plan = plan_for_deployment(&state)?;

        let mut ret = state;
        ret.target_component.clear();
        let mut components: Vec<ComponentSpec> = Vec::new();

        // reads are independent, query all steps concurrently
        let observations =
            futures::future::try_join_all(plan.steps.iter().map(|step| {
                let provider = self.resolve_provider(&step.role);
                async move {
                    let observed = provider?.get(deployment, &step.components).await?;
                    Ok::<_, EngineError>((step, observed))
                }
            }))
            .await?;

        for (step, observed) in observations {
            for component in observed {
                let role = if component.component_type.is_empty() {
                    ROLE_CONTAINER
                } else {
                    &component.component_type
                };
                ret.target_component.insert(
                    StateKey::new(&component.name, &step.target),
                    RoleBinding::Live(role.to_string()),
                );
                if !components.iter().any(|c| c.name == component.name) {
                    components.push(component);
                }
            }
        }
        Ok((ret, components))
    }

    /// Fetch the persisted summary for an instance
    pub async fn get_summary(
        &self,
        instance: &str,
        namespace: &str,
    ) -> Result<SummaryResult, EngineError> {
        let entry = self
            .store
            .get(&summary_id(instance), &StoreMetadata::summaries(namespace))
            .await?;
        Ok(serde_json::from_value(entry.body)?)
    }

    /// Delete the persisted summary for an instance
    pub async fn delete_summary(
        &self,
        instance: &str,
        namespace: &str,
    ) -> Result<(), EngineError> {
        self.store
            .delete(&summary_id(instance), &StoreMetadata::summaries(namespace))
            .await
    }

    /// Delete finished summaries older than the retention window; returns
    /// how many were removed
    pub async fn cleanup_summaries(&self, namespace: &str) -> Result<usize, EngineError> {
        let metadata = StoreMetadata::summaries(namespace);
        let retention = chrono::Duration::from_std(self.options.summary_retention)
            .map_err(|e| EngineError::ConfigError(e.to_string()))?;
        let cutoff = chrono::Utc::now() - retention;

        let mut removed = 0;
        for entry in self.store.list(&metadata).await? {
            let Ok(result) = serde_json::from_value::<SummaryResult>(entry.body) else {
                continue;
            };
            if result.state == SummaryState::Done && result.time < cutoff {
                self.store.delete(&entry.id, &metadata).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn resolve_provider(&self, role: &str) -> Result<Arc<dyn TargetProvider>, EngineError> {
        if let Some(provider) = &self.override_provider {
            return Ok(provider.clone());
        }
        self.providers.resolve(role)
    }

    async fn previous_state(
        &self,
        instance: &str,
        namespace: &str,
    ) -> Option<PersistedDeploymentState> {
        let entry = self
            .store
            .get(instance, &StoreMetadata::namespaced(namespace))
            .await
            .ok()?;
        serde_json::from_value(entry.body).ok()
    }

    /// Expose the target's agent component name to providers, or clear the
    /// key for targets without one
    fn expose_agent_address(
        &self,
        dep: &mut DeploymentSpec,
        deployment: &DeploymentSpec,
        target: &str,
    ) {
        let agent = deployment
            .targets
            .get(target)
            .and_then(find_agent);
        match agent {
            Some(agent) => {
                dep.instance
                    .metadata
                    .insert(AGENT_ADDRESS_KEY.to_string(), agent);
            }
            None => {
                dep.instance.metadata.remove(AGENT_ADDRESS_KEY);
            }
        }
    }

    /// Persist the summary; failures are logged, never fatal, since the
    /// summary is a feedback channel and must not roll back applied work
    async fn save_summary(
        &self,
        namespace: &str,
        instance: &str,
        generation: &str,
        hash: &str,
        summary: &SummarySpec,
        state: SummaryState,
    ) {
        let result = SummaryResult {
            summary: summary.clone(),
            generation: generation.to_string(),
            state,
            time: chrono::Utc::now(),
            deployment_hash: hash.to_string(),
        };
        match StateEntry::new(summary_id(instance), &result) {
            Ok(entry) => {
                if let Err(e) = self
                    .store
                    .upsert(entry, &StoreMetadata::summaries(namespace))
                    .await
                {
                    warn!("Failed to save deployment summary: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize deployment summary: {}", e),
        }
    }
}

fn summary_id(instance: &str) -> String {
    format!("summary-{}", instance)
}

/// SHA-256 over the canonical JSON form of the spec; key order is
/// normalized through `serde_json::Value` so the hash is stable
fn deployment_hash(deployment: &DeploymentSpec) -> Result<String, EngineError> {
    let canonical = serde_json::to_string(&serde_json::to_value(deployment)?)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}

/// The agent component declared on a target, if any
fn find_agent(target: &TargetSpec) -> Option<String> {
    target.components.iter().find_map(|c| {
        let image = c.properties.get("container.image")?.as_str()?;
        image
            .contains(AGENT_IMAGE_MARKER)
            .then(|| c.name.clone())
    })
}

/// Whether every component in the step is already in its desired shape on
/// the target, per the provider's own change-detection rule
fn can_skip_step(
    step: &DeploymentStep,
    provider: &dyn TargetProvider,
    current_components: &[ComponentSpec],
    state: &DeploymentState,
) -> bool {
    for component_step in &step.components {
        let name = &component_step.component.name;
        let key = StateKey::new(name, &step.target);
        match component_step.action {
            StepAction::Delete => {
                // still present and desired gone: the delete must run
                if current_components.iter().any(|c| c.name == *name)
                    && state.target_component.contains_key(&key)
                {
                    return false;
                }
            }
            StepAction::Update => {
                let live = matches!(
                    state.target_component.get(&key),
                    Some(binding) if !binding.is_removed()
                );
                let found = current_components
                    .iter()
                    .find(|c| c.name == *name && live);
                match found {
                    Some(current) => {
                        if provider
                            .validation_rule()
                            .is_component_changed(current, &component_step.component)
                        {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }
    }
    true
}
