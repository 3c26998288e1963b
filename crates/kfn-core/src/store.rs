use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::definition::FunctionDefinition;
use crate::error::KfnError;

/// Project-local store of function definitions.
///
/// A single pretty-printed JSON array, one record per source artifact:
/// ```text
/// <project>/
///   .kfn/
///     functions.json
/// ```
///
/// A missing file reads as an empty store; the directory and file are
/// created on the first save. Read-modify-write cycles are serialized by
/// `write_lock`, so concurrent saves for different artifacts never drop each
/// other's records and same-key saves resolve last-write-wins.
pub struct DefinitionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DefinitionStore {
    pub const FILE_NAME: &'static str = "functions.json";

    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<project_root>/<dir>/functions.json`.
    pub fn in_project(project_root: &Path, dir: &str) -> Self {
        Self::new(project_root.join(dir).join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the definition recorded for an artifact.
    pub async fn load(&self, artifact_key: &str) -> Result<Option<FunctionDefinition>, KfnError> {
        let defs = self.read_all().await?;
        let found = defs
            .into_iter()
            .find(|d| d.source_artifact_key == artifact_key);
        tracing::debug!(key = artifact_key, found = found.is_some(), "Store lookup");
        Ok(found)
    }

    /// All records, in stored order.
    pub async fn list(&self) -> Result<Vec<FunctionDefinition>, KfnError> {
        self.read_all().await
    }

    /// Insert or replace the record for `def.source_artifact_key`. A replaced
    /// record keeps its position.
    pub async fn save(&self, def: &FunctionDefinition) -> Result<(), KfnError> {
        let _guard = self.write_lock.lock().await;
        let mut defs = self.read_all().await?;

        match defs
            .iter()
            .position(|d| d.source_artifact_key == def.source_artifact_key)
        {
            Some(idx) => defs[idx] = def.clone(),
            None => defs.push(def.clone()),
        }

        self.write_all(&defs).await?;
        tracing::info!(
            function_id = %def.id,
            key = %def.source_artifact_key,
            path = %self.path.display(),
            "Function definition saved"
        );
        Ok(())
    }

    /// Drop the record for an artifact. Returns whether one existed.
    pub async fn remove(&self, artifact_key: &str) -> Result<bool, KfnError> {
        let _guard = self.write_lock.lock().await;
        let mut defs = self.read_all().await?;
        let before = defs.len();
        defs.retain(|d| d.source_artifact_key != artifact_key);

        if defs.len() == before {
            return Ok(false);
        }
        self.write_all(&defs).await?;
        tracing::info!(key = artifact_key, "Function definition removed");
        Ok(true)
    }

    async fn read_all(&self) -> Result<Vec<FunctionDefinition>, KfnError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|source| KfnError::StoreCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_all(&self, defs: &[FunctionDefinition]) -> Result<(), KfnError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(defs)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
