//! Preview record persistence.
//!
//! Records live in one control namespace. Updates carry the
//! `resourceVersion` read earlier and fail with a conflict when another
//! writer got there first.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{PreviewError, Result};
use crate::models::preview::Preview;
use crate::services::kubectl::{is_conflict, Kubectl};

const RESOURCE: &str = "previews.preview.jenkins.io";

#[async_trait]
pub trait PreviewStore: Send + Sync {
    /// Control namespace the store is scoped to.
    fn namespace(&self) -> &str;

    async fn list(&self) -> Result<Vec<Preview>>;

    /// Fails with [`PreviewError::RecordNotFound`] when absent.
    async fn get(&self, name: &str) -> Result<Preview>;

    async fn create(&self, preview: &Preview) -> Result<Preview>;

    async fn update(&self, preview: &Preview) -> Result<Preview>;

    async fn delete(&self, name: &str) -> Result<()>;
}

// ── kubectl-backed store ──

pub struct KubePreviewStore {
    kubectl: Kubectl,
    namespace: String,
}

impl KubePreviewStore {
    pub fn new(kubectl: Kubectl, namespace: impl Into<String>) -> Self {
        Self {
            kubectl,
            namespace: namespace.into(),
        }
    }

    fn map_write_error(&self, name: &str, err: PreviewError) -> PreviewError {
        if is_conflict(&err) {
            PreviewError::StoreConflict {
                name: name.to_string(),
                namespace: self.namespace.clone(),
                message: err.to_string(),
            }
        } else {
            PreviewError::Store {
                namespace: self.namespace.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl PreviewStore for KubePreviewStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list(&self) -> Result<Vec<Preview>> {
        self.kubectl
            .list(RESOURCE, &self.namespace)
            .await
            .map_err(|e| PreviewError::Store {
                namespace: self.namespace.clone(),
                message: format!("failed to list previews: {e}"),
            })
    }

    async fn get(&self, name: &str) -> Result<Preview> {
        self.kubectl
            .get(RESOURCE, name, Some(&self.namespace))
            .await?
            .ok_or_else(|| PreviewError::RecordNotFound {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            })
    }

    async fn create(&self, preview: &Preview) -> Result<Preview> {
        self.kubectl
            .create(preview, &self.namespace)
            .await
            .map_err(|e| self.map_write_error(preview.name(), e))
    }

    async fn update(&self, preview: &Preview) -> Result<Preview> {
        self.kubectl
            .replace(preview, &self.namespace)
            .await
            .map_err(|e| self.map_write_error(preview.name(), e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if !self.kubectl.delete(RESOURCE, name, Some(&self.namespace)).await? {
            return Err(PreviewError::RecordNotFound {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            });
        }
        Ok(())
    }
}

// ── in-memory store ──

/// Process-local store with the same conflict semantics as the cluster.
#[derive(Default)]
pub struct InMemoryPreviewStore {
    namespace: String,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<String, Preview>,
    version: u64,
}

impl InMemoryPreviewStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn conflict(&self, name: &str, message: &str) -> PreviewError {
        PreviewError::StoreConflict {
            name: name.to_string(),
            namespace: self.namespace.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PreviewStore for InMemoryPreviewStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list(&self) -> Result<Vec<Preview>> {
        Ok(self.lock().records.values().cloned().collect())
    }

    async fn get(&self, name: &str) -> Result<Preview> {
        self.lock()
            .records
            .get(name)
            .cloned()
            .ok_or_else(|| PreviewError::RecordNotFound {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            })
    }

    async fn create(&self, preview: &Preview) -> Result<Preview> {
        let mut state = self.lock();
        if state.records.contains_key(preview.name()) {
            return Err(self.conflict(preview.name(), "already exists"));
        }
        state.version += 1;
        let mut stored = preview.clone();
        stored.metadata.namespace = self.namespace.clone();
        stored.metadata.resource_version = Some(state.version.to_string());
        state.records.insert(stored.name().to_string(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, preview: &Preview) -> Result<Preview> {
        let mut state = self.lock();
        let current = state
            .records
            .get(preview.name())
            .ok_or_else(|| PreviewError::RecordNotFound {
                name: preview.name().to_string(),
                namespace: self.namespace.clone(),
            })?;
        if let Some(expected) = &preview.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(expected) {
                return Err(self.conflict(preview.name(), "the object has been modified"));
            }
        }
        state.version += 1;
        let mut stored = preview.clone();
        stored.metadata.namespace = self.namespace.clone();
        stored.metadata.resource_version = Some(state.version.to_string());
        state.records.insert(stored.name().to_string(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.lock()
            .records
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PreviewError::RecordNotFound {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            })
    }
}
