//! In-memory state store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::EngineError;
use crate::stores::{StateEntry, StateStore, StoreMetadata};

/// State store keeping everything in process memory, partitioned by
/// namespace and resource
#[derive(Default)]
pub struct MemoryStateStore {
    partitions: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition_key(metadata: &StoreMetadata) -> String {
        match &metadata.resource {
            Some(resource) => format!("{}/{}", metadata.namespace, resource),
            None => metadata.namespace.clone(),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, id: &str, metadata: &StoreMetadata) -> Result<StateEntry, EngineError> {
        let partitions = self.partitions.read().await;
        partitions
            .get(&Self::partition_key(metadata))
            .and_then(|p| p.get(id))
            .map(|body| StateEntry {
                id: id.to_string(),
                body: body.clone(),
            })
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    async fn upsert(
        &self,
        entry: StateEntry,
        metadata: &StoreMetadata,
    ) -> Result<(), EngineError> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(Self::partition_key(metadata))
            .or_default()
            .insert(entry.id, entry.body);
        Ok(())
    }

    async fn delete(&self, id: &str, metadata: &StoreMetadata) -> Result<(), EngineError> {
        let mut partitions = self.partitions.write().await;
        let removed = partitions
            .get_mut(&Self::partition_key(metadata))
            .and_then(|p| p.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn list(&self, metadata: &StoreMetadata) -> Result<Vec<StateEntry>, EngineError> {
        let partitions = self.partitions.read().await;
        let mut entries: Vec<StateEntry> = partitions
            .get(&Self::partition_key(metadata))
            .map(|p| {
                p.iter()
                    .map(|(id, body)| StateEntry {
                        id: id.clone(),
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}
