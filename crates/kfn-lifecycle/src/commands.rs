use std::sync::Arc;

use kfn_core::{DefinitionResolver, FunctionDefinition, SourceArtifact, UserInterface};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::LifecycleManager;

/// User-facing entry points: resolve the artifact, then run the operation.
///
/// Nothing is returned. Resolution failures are shown here; lifecycle
/// failures were shown by the operation and are only logged.
pub struct Commands {
    resolver: DefinitionResolver,
    lifecycle: LifecycleManager,
    ui: Arc<dyn UserInterface>,
}

impl Commands {
    pub fn new(resolver: DefinitionResolver, lifecycle: LifecycleManager, ui: Arc<dyn UserInterface>) -> Self {
        Self {
            resolver,
            lifecycle,
            ui,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    async fn resolve(&self, artifact: &SourceArtifact) -> Option<FunctionDefinition> {
        match self.resolver.resolve(artifact).await {
            Ok(def) => Some(def),
            Err(e) => {
                tracing::debug!(path = %artifact.path.display(), error = %e, "Resolution failed");
                self.ui.show_error(&e.to_string());
                None
            }
        }
    }

    pub async fn resolve_and_deploy(&self, artifact: &SourceArtifact) {
        let Some(def) = self.resolve(artifact).await else { return };
        if let Err(e) = self.lifecycle.deploy(&def).await {
            tracing::warn!(function_id = %def.id, error = %e, "Deploy command failed");
        }
    }

    pub async fn resolve_and_invoke(&self, artifact: &SourceArtifact) {
        let Some(def) = self.resolve(artifact).await else { return };
        let outcome = self.lifecycle.invoke(&def).await;
        tracing::debug!(function_id = %def.id, ?outcome, "Invoke command finished");
    }

    pub async fn resolve_and_fetch_logs(&self, artifact: &SourceArtifact, cancel: CancellationToken) {
        let Some(def) = self.resolve(artifact).await else { return };
        let outcome = self.lifecycle.fetch_logs(&def, cancel).await;
        tracing::debug!(function_id = %def.id, ?outcome, "Logs command finished");
    }

    pub async fn resolve_and_delete(&self, artifact: &SourceArtifact) {
        let Some(def) = self.resolve(artifact).await else { return };
        if let Err(e) = self.lifecycle.delete(&def).await {
            tracing::warn!(function_id = %def.id, error = %e, "Delete command failed");
        }
    }
}
