//! Keyed JSON documents shared with whatever stores results between runs.

use crate::errors::WorkflowError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PerformanceHistory,
    ProgressionPlan,
    ProgramRequest,
    Extraction,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub kind: DocumentKind,
    pub subject: String,
}

impl DocumentKey {
    pub fn new(kind: DocumentKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
        }
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.subject)
    }
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, key: &DocumentKey) -> Result<Option<serde_json::Value>, WorkflowError>;
    async fn save(&self, key: &DocumentKey, value: serde_json::Value) -> Result<(), WorkflowError>;
}

pub async fn load_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    key: &DocumentKey,
) -> Result<Option<T>, WorkflowError> {
    match store.load(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| WorkflowError::Persistence(format!("decoding {key}: {e}"))),
        None => Ok(None),
    }
}

pub async fn save_typed<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    key: &DocumentKey,
    value: &T,
) -> Result<(), WorkflowError> {
    let json = serde_json::to_value(value)
        .map_err(|e| WorkflowError::Persistence(format!("encoding {key}: {e}")))?;
    store.save(key, json).await
}

/// In-process store, used in tests and by hosts without durable storage.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<DocumentKey, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, key: &DocumentKey) -> Result<Option<serde_json::Value>, WorkflowError> {
        let documents = self
            .documents
            .lock()
            .map_err(|e| WorkflowError::Persistence(format!("store lock poisoned: {e}")))?;
        Ok(documents.get(key).cloned())
    }

    async fn save(&self, key: &DocumentKey, value: serde_json::Value) -> Result<(), WorkflowError> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|e| WorkflowError::Persistence(format!("store lock poisoned: {e}")))?;
        documents.insert(key.clone(), value);
        Ok(())
    }
}
