//! Reconciliation summaries: the primary feedback channel for callers

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one component within a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResultSpec {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ComponentResultSpec {
    pub fn untouched() -> Self {
        Self {
            status: "Untouched".to_string(),
            message: String::new(),
        }
    }

    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            message: String::new(),
        }
    }
}

/// Outcome of one target across the pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResultSpec {
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub component_results: HashMap<String, ComponentResultSpec>,
}

impl TargetResultSpec {
    pub fn ok(component_results: HashMap<String, ComponentResultSpec>) -> Self {
        Self {
            status: "OK".to_string(),
            message: String::new(),
            component_results,
        }
    }

    pub fn error(
        message: String,
        component_results: HashMap<String, ComponentResultSpec>,
    ) -> Self {
        Self {
            status: "Error".to_string(),
            message,
            component_results,
        }
    }
}

/// Per-pass counters and per-target results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySpec {
    #[serde(default)]
    pub target_results: HashMap<String, TargetResultSpec>,

    pub target_count: usize,

    /// Targets with an OK result; forced to `target_count` when the whole
    /// pass was skipped
    pub success_count: usize,

    pub total_steps: usize,

    pub completed_steps: usize,

    /// True iff every planned step succeeded
    pub all_assigned_deployed: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary_message: String,

    /// True when no step needed to run at all
    #[serde(default)]
    pub skipped: bool,

    #[serde(default)]
    pub is_removal: bool,
}

impl SummarySpec {
    pub fn new(target_count: usize, is_removal: bool) -> Self {
        Self {
            target_count,
            is_removal,
            ..Default::default()
        }
    }

    /// Record a target's latest result and recompute the success count.
    /// Later results overwrite earlier ones, so a target keeps only its
    /// final status for the pass.
    pub fn update_target_result(&mut self, target: &str, result: TargetResultSpec) {
        self.target_results.insert(target.to_string(), result);
        self.success_count = self
            .target_results
            .values()
            .filter(|r| r.status == "OK")
            .count();
    }
}

/// Lifecycle of a persisted summary record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryState {
    Running,
    Done,
}

/// Persisted summary record, keyed by instance name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub summary: SummarySpec,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generation: String,
    pub state: SummaryState,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_hash: String,
}
