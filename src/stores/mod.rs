//! State store contract
//!
//! Durable storage for previous deployment states and summaries. Backends
//! are external; the engine depends only on the [`StateStore`] trait and
//! ships an in-memory implementation for tests and embedded use.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

pub use memory::MemoryStateStore;

/// One stored record: an id and a JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub id: String,
    pub body: serde_json::Value,
}

impl StateEntry {
    pub fn new(id: impl Into<String>, body: impl Serialize) -> Result<Self, EngineError> {
        Ok(Self {
            id: id.into(),
            body: serde_json::to_value(body)?,
        })
    }
}

/// Routing metadata carried on every store call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetadata {
    pub namespace: String,

    /// Resource discriminators for records that are not plain deployment
    /// state, e.g. summaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl StoreMetadata {
    pub fn namespaced(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    pub fn summaries(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            group: Some("edgeflow".to_string()),
            version: Some("v1".to_string()),
            resource: Some("summaries".to_string()),
        }
    }
}

/// Keyed state storage with upsert semantics
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, id: &str, metadata: &StoreMetadata) -> Result<StateEntry, EngineError>;

    async fn upsert(&self, entry: StateEntry, metadata: &StoreMetadata)
        -> Result<(), EngineError>;

    async fn delete(&self, id: &str, metadata: &StoreMetadata) -> Result<(), EngineError>;

    async fn list(&self, metadata: &StoreMetadata) -> Result<Vec<StateEntry>, EngineError>;
}
