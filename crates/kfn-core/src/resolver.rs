use std::io::ErrorKind;
use std::sync::Arc;

use crate::config::PlatformConfig;
use crate::definition::{FunctionDefinition, SourceArtifact, TriggerEvent};
use crate::error::KfnError;
use crate::interaction::UserInterface;
use crate::runtime;
use crate::store::DefinitionStore;

pub const IDENTITY_PROMPT: &str =
    "Which function do you want to work with? (It should match with a function exposed)";

/// Turns a source artifact into a complete function definition.
///
/// Known artifacts get their source text and dependencies refreshed and are
/// returned without asking anything. New artifacts have their runtime
/// checked first and only then is the user asked for the function name;
/// nothing is persisted unless a name is given.
pub struct DefinitionResolver {
    store: Arc<DefinitionStore>,
    ui: Arc<dyn UserInterface>,
    config: PlatformConfig,
}

impl DefinitionResolver {
    pub fn new(store: Arc<DefinitionStore>, ui: Arc<dyn UserInterface>, config: PlatformConfig) -> Self {
        Self { store, ui, config }
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub async fn resolve(&self, artifact: &SourceArtifact) -> Result<FunctionDefinition, KfnError> {
        let key = artifact.key();

        match self.store.load(&key).await? {
            Some(mut def) if def.is_identified() => {
                def.source_text = artifact.text.clone();
                def.dependencies = read_dependencies(artifact, &def.runtime).await?;
                self.store.save(&def).await?;
                tracing::debug!(function_id = %def.id, key = %key, "Known function refreshed");
                Ok(def)
            }
            seed => {
                let mut draft = match seed {
                    Some(partial) => partial,
                    None => FunctionDefinition::draft(
                        artifact,
                        String::new(),
                        Some(self.config.namespace.clone()),
                    ),
                };
                if draft.runtime.is_empty() {
                    draft.runtime = runtime::resolve(&artifact.language)?.to_string();
                }
                if draft.events.is_empty() {
                    draft.events.push(TriggerEvent::http_root());
                }
                draft.source_text = artifact.text.clone();
                draft.dependencies = read_dependencies(artifact, &draft.runtime).await?;

                let id = self
                    .ui
                    .ask(IDENTITY_PROMPT)
                    .await
                    .map(|answer| answer.trim().to_string())
                    .filter(|answer| !answer.is_empty())
                    .ok_or(KfnError::NoIdentitySpecified)?;

                if draft.handler.is_empty() {
                    draft.handler = format!("{}.{id}", artifact.handler_file());
                }
                draft.id = id;

                self.store.save(&draft).await?;
                tracing::info!(
                    function_id = %draft.id,
                    runtime = %draft.runtime,
                    key = %key,
                    "New function registered"
                );
                Ok(draft)
            }
        }
    }
}

/// Contents of the runtime's dependency manifest next to the artifact, if
/// there is one.
async fn read_dependencies(artifact: &SourceArtifact, runtime_id: &str) -> Result<Option<String>, KfnError> {
    let Some(manifest) = runtime::manifest_filename(runtime_id) else {
        return Ok(None);
    };
    let path = artifact.dir().join(manifest);
    match tokio::fs::read_to_string(&path).await {
        Ok(deps) => Ok(Some(deps)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(KfnError::ArtifactUnreadable { path, source }),
    }
}
