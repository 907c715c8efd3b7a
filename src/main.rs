//! Edgeflow - Entry Point
//!
//! Command line front end for the deployment planning and reconciliation
//! engine. Loads a deployment spec from a JSON file, prints the computed
//! plan, and optionally executes it against in-process mock providers.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use colored::Colorize;
use tracing::error;

use edgeflow::engine::{
    new_deployment_state, plan_for_deployment, EngineOptions, ReconcileEngine,
};
use edgeflow::events::NullEventSink;
use edgeflow::logs::{init_logging, LogOptions};
use edgeflow::models::{DeploymentSpec, StepAction};
use edgeflow::providers::{MockTargetProvider, ProviderRegistry};
use edgeflow::stores::MemoryStateStore;

const USAGE: &str = "\
Usage: edgeflow --spec=<file> [options]

Options:
  --spec=<file>        Deployment spec JSON file (required)
  --apply              Execute the plan against mock providers
  --remove             Plan and execute a removal pass
  --namespace=<name>   Namespace for persisted state (default: default)
  --target=<name>      Restrict execution to one target
  --log-level=<level>  trace | debug | info | warn | error
  --version            Print version and exit";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    if cli_args.contains_key("version") {
        println!("edgeflow {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let Some(spec_file) = cli_args.get("spec") else {
        println!("{}", USAGE);
        return;
    };

    // Initialize logging
    let log_level = cli_args
        .get("log-level")
        .and_then(|level| level.parse().ok())
        .unwrap_or_default();
    let log_options = LogOptions {
        log_level,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let deployment: DeploymentSpec = match tokio::fs::read(spec_file).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(spec) => spec,
            Err(e) => {
                error!("Unable to parse deployment spec {}: {}", spec_file, e);
                return;
            }
        },
        Err(e) => {
            error!("Unable to read deployment spec {}: {}", spec_file, e);
            return;
        }
    };

    if let Err(e) = print_plan(&deployment) {
        error!("Unable to plan deployment: {}", e);
        return;
    }

    if cli_args.contains_key("apply") {
        let remove = cli_args.contains_key("remove");
        let namespace = cli_args
            .get("namespace")
            .map(String::as_str)
            .unwrap_or("default");
        let target_filter = cli_args.get("target").map(String::as_str);
        apply(deployment, remove, namespace, target_filter).await;
    }
}

/// Print the step sequence the engine would execute
fn print_plan(deployment: &DeploymentSpec) -> Result<(), edgeflow::errors::EngineError> {
    let state = new_deployment_state(deployment)?;
    let plan = plan_for_deployment(&state)?;

    println!(
        "\n{} {} step(s) for instance '{}'\n",
        "Plan:".bold(),
        plan.steps.len(),
        deployment.instance.name
    );
    for (index, step) in plan.steps.iter().enumerate() {
        println!(
            "  {} target={} role={}",
            format!("step {}", index + 1).bold(),
            step.target.cyan(),
            step.role
        );
        for component in &step.components {
            let action = match component.action {
                StepAction::Update => "update".green(),
                StepAction::Delete => "delete".red(),
            };
            println!("    {} {}", action, component.component.name);
        }
    }
    println!();
    Ok(())
}

/// Run one reconciliation pass with a mock provider per role
async fn apply(
    deployment: DeploymentSpec,
    remove: bool,
    namespace: &str,
    target_filter: Option<&str>,
) {
    let mut providers = ProviderRegistry::new();
    for component in &deployment.solution.components {
        providers.register(
            component.role(),
            Arc::new(MockTargetProvider::new(component.role())),
        );
    }

    let engine = ReconcileEngine::new(
        providers,
        Arc::new(MemoryStateStore::new()),
        Arc::new(NullEventSink),
        EngineOptions::default(),
    );

    match engine
        .reconcile(deployment, remove, namespace, target_filter)
        .await
    {
        Ok(summary) => {
            println!("{}", "Reconciliation succeeded".green().bold());
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Unable to render summary: {}", e),
            }
        }
        Err(e) => {
            println!("{}", "Reconciliation failed".red().bold());
            error!("{}", e);
        }
    }
}
