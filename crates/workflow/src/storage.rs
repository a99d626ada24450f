//! Storage traits for pipeline persistence.
//!
//! A store is a key-value substrate of JSON documents keyed by pipeline id.
//! It knows nothing about steps; [`PipelineState`](crate::state::PipelineState)
//! owns the document layout. Writes are serialised per pipeline by the
//! engine, so a store only has to make each single `save` atomic.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use serde_json::Value;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::PipelineLocks;
use crate::registry::StepRegistry;
use crate::state::PipelineState;
use crate::types::PipelineId;

/// Trait for pipeline storage backends.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Load the document for a pipeline, `None` if it was never saved.
    async fn load(&self, id: &PipelineId) -> Result<Option<Value>>;

    /// Replace the document for a pipeline.
    async fn save(&self, id: &PipelineId, document: &Value) -> Result<()>;

    /// Delete a pipeline's document. Deleting a missing pipeline is not an error.
    async fn delete(&self, id: &PipelineId) -> Result<()>;

    /// All stored pipeline ids, sorted.
    async fn list(&self) -> Result<Vec<PipelineId>>;
}

/// In-memory storage implementation.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<PipelineId, Value>>,
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn load(&self, id: &PipelineId) -> Result<Option<Value>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn save(&self, id: &PipelineId, document: &Value) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(id.clone(), document.clone());
        Ok(())
    }

    async fn delete(&self, id: &PipelineId) -> Result<()> {
        self.documents.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PipelineId>> {
        Ok(self.documents.read().await.keys().cloned().sorted().collect_vec())
    }
}

/// Directory-backed store: one `<pipeline id>.json` file per pipeline.
///
/// Saves go through a temporary file and a rename, so a reader never sees a
/// half-written document.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::storage_failed("open", format!("{}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Directory holding the documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &PipelineId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl PipelineStore for DirectoryStore {
    async fn load(&self, id: &PipelineId) -> Result<Option<Value>> {
        let path = self.path_for(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(pipeline_id = %id, path = %path.display(), "Loaded pipeline document");
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_failed("load", format!("{}: {e}", path.display()))),
        }
    }

    async fn save(&self, id: &PipelineId, document: &Value) -> Result<()> {
        let path = self.path_for(id);
        let tmp = self.root.join(format!(".{id}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(document)?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Error::storage_failed("save", format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::storage_failed("save", format!("{}: {e}", path.display())))?;

        debug!(pipeline_id = %id, path = %path.display(), "Saved pipeline document");
        Ok(())
    }

    async fn delete(&self, id: &PipelineId) -> Result<()> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_failed("delete", format!("{}: {e}", path.display()))),
        }
    }

    async fn list(&self) -> Result<Vec<PipelineId>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::storage_failed("list", format!("{}: {e}", self.root.display())))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage_failed("list", e.to_string()))?
        {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            // temp files start with '.', which PipelineId rejects
            if let Ok(id) = PipelineId::parse(stem) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Typed access to pipeline state shared by the engine components.
///
/// Missing documents load as fresh state; mutations take the pipeline's
/// write guard via [`StateRepository::lock`] before loading.
#[derive(Clone)]
pub struct StateRepository {
    registry: Arc<StepRegistry>,
    store: Arc<dyn PipelineStore>,
    locks: Arc<PipelineLocks>,
}

impl StateRepository {
    /// Create a repository over `store`.
    pub fn new(registry: Arc<StepRegistry>, store: Arc<dyn PipelineStore>) -> Self {
        Self {
            registry,
            store,
            locks: Arc::new(PipelineLocks::new()),
        }
    }

    /// The step registry documents are normalised against.
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Load a pipeline's state, or a fresh state if it was never saved.
    pub async fn load(&self, id: &PipelineId) -> Result<PipelineState> {
        Ok(self.load_existing(id).await?.unwrap_or_default())
    }

    /// Load a pipeline's state if it exists.
    pub async fn load_existing(&self, id: &PipelineId) -> Result<Option<PipelineState>> {
        self.store
            .load(id)
            .await?
            .map(|document| PipelineState::from_document(document, &self.registry))
            .transpose()
    }

    /// Persist a pipeline's state. Call with the pipeline's guard held.
    pub async fn save(&self, id: &PipelineId, state: &PipelineState) -> Result<()> {
        self.store.save(id, &state.to_document()?).await
    }

    /// Exclusive write access to one pipeline.
    pub async fn lock(&self, id: &PipelineId) -> OwnedMutexGuard<()> {
        self.locks.acquire(id).await
    }

    /// All stored pipeline ids.
    pub async fn list(&self) -> Result<Vec<PipelineId>> {
        self.store.list().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn pid(raw: &str) -> PipelineId {
        PipelineId::parse(raw).expect("valid id")
    }

    #[tokio::test]
    async fn test_in_memory_save_and_load() {
        let store = InMemoryStore::new();
        let id = pid("hello-01");

        assert!(store.load(&id).await.expect("load").is_none());

        store.save(&id, &json!({"steps": {}})).await.expect("save");
        let loaded = store.load(&id).await.expect("load");
        assert_eq!(loaded, Some(json!({"steps": {}})));
    }

    #[tokio::test]
    async fn test_in_memory_list_sorted_and_delete() {
        let store = InMemoryStore::new();
        store.save(&pid("b"), &json!({})).await.expect("save");
        store.save(&pid("a"), &json!({})).await.expect("save");

        assert_eq!(store.list().await.expect("list"), vec![pid("a"), pid("b")]);

        store.delete(&pid("a")).await.expect("delete");
        store.delete(&pid("missing")).await.expect("delete missing");
        assert_eq!(store.list().await.expect("list"), vec![pid("b")]);
    }

    #[tokio::test]
    async fn test_repository_missing_pipeline_is_fresh() {
        use crate::types::StepDescriptor;

        let registry = StepRegistry::register(vec![StepDescriptor::finalize()]).expect("registry");
        let repo = StateRepository::new(Arc::new(registry), Arc::new(InMemoryStore::new()));
        let id = pid("never-seen");

        assert!(repo.load_existing(&id).await.expect("load").is_none());
        let state = repo.load(&id).await.expect("load");
        assert!(!state.is_finalized());
        assert_eq!(state.stored_steps().count(), 0);
    }

    #[tokio::test]
    async fn test_repository_rejects_corrupt_document() {
        use crate::types::StepDescriptor;

        let store = Arc::new(InMemoryStore::new());
        store
            .save(&pid("bad"), &json!({"steps": "not a map"}))
            .await
            .expect("save");
        let registry = StepRegistry::register(vec![StepDescriptor::finalize()]).expect("registry");
        let repo = StateRepository::new(Arc::new(registry), store);

        assert!(matches!(
            repo.load(&pid("bad")).await,
            Err(Error::Serialization { .. })
        ));
    }
}
