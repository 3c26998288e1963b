use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use kfn_core::{FunctionDefinition, KfnError, SinkKind, SinkRegistry, UserInterface};
use kfn_platform::{DeployOptions, InvokePayload, LogRequest, PlatformClient};
use tokio_util::sync::CancellationToken;

pub const CALL_DATA_PROMPT: &str = "Introduce call data (or file containing the data)";

/// Result of an invocation. Failures have already been shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// The function answered with a non-empty body.
    Responded(String),
    /// The function answered with an empty body.
    Empty,
    /// The call-data prompt was cancelled; the platform was not called.
    Cancelled,
    Failed(String),
}

/// How a log tail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Ended,
    Cancelled,
    Failed(String),
}

/// Runs the lifecycle operations for resolved definitions.
///
/// Each operation owns a named sink from the shared registry and reports
/// its own failures to the user.
pub struct LifecycleManager {
    platform: Arc<dyn PlatformClient>,
    sinks: Arc<SinkRegistry>,
    ui: Arc<dyn UserInterface>,
    default_namespace: String,
}

impl LifecycleManager {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        sinks: Arc<SinkRegistry>,
        ui: Arc<dyn UserInterface>,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            sinks,
            ui,
            default_namespace: default_namespace.into(),
        }
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    pub async fn deploy(&self, def: &FunctionDefinition) -> Result<(), KfnError> {
        let sink = self
            .sinks
            .get_or_create(&SinkKind::Deployment.key(&def.id))
            .await;
        sink.show();

        let result = self
            .platform
            .deploy(
                std::slice::from_ref(def),
                &def.runtime,
                DeployOptions::verbose_forced(),
                &sink,
            )
            .await;

        match result {
            Ok(()) => {
                tracing::info!(function_id = %def.id, platform = self.platform.name(), "Deployment finished");
                self.ui.show_info("Deployment finished");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(function_id = %def.id, error = %message, "Deployment failed");
                self.ui.show_error(&format!("ERROR: {message}"));
                Err(KfnError::DeployFailed(message))
            }
        }
    }

    pub async fn invoke(&self, def: &FunctionDefinition) -> InvokeOutcome {
        let Some(answer) = self.ui.ask(CALL_DATA_PROMPT).await else {
            tracing::debug!(function_id = %def.id, "Invocation cancelled at data prompt");
            return InvokeOutcome::Cancelled;
        };
        let payload = payload_from_answer(&answer, def).await;

        let sink = self.sinks.get_or_create(&SinkKind::Invocation.key(&def.id)).await;
        sink.show();
        sink.append(&format!("Calling {}...\n", def.id));

        match self
            .platform
            .invoke(&def.id, payload, std::slice::from_ref(def))
            .await
        {
            Ok(response) if response.body.is_empty() => {
                sink.append(&format!("{} succesfully invoked\n", def.id));
                InvokeOutcome::Empty
            }
            Ok(response) => {
                let body = render_body(&response.body);
                sink.append(&format!("Response:\n{body}\n"));
                tracing::debug!(function_id = %def.id, status = response.status, "Function invoked");
                InvokeOutcome::Responded(response.body)
            }
            Err(e) => {
                let message = KfnError::InvokeFailed(e.to_string()).to_string();
                tracing::warn!(function_id = %def.id, error = %message, "Invocation failed");
                self.ui.show_error(&message);
                InvokeOutcome::Failed(message)
            }
        }
    }

    /// Follow the function's logs into `<id>-logs` until the stream ends,
    /// fails, or `cancel` fires.
    pub async fn fetch_logs(&self, def: &FunctionDefinition, cancel: CancellationToken) -> LogOutcome {
        let sink = self.sinks.reset(&SinkKind::Logs.key(&def.id)).await;
        sink.show();

        let request = LogRequest {
            namespace: def.namespace_or(&self.default_namespace).to_string(),
            tail: true,
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return LogOutcome::Cancelled,
            opened = self.platform.tail_logs(&def.id, request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return self.log_failure(def, e.to_string()),
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(function_id = %def.id, "Log tail cancelled");
                    return LogOutcome::Cancelled;
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => sink.append(&chunk),
                    Some(Err(e)) => return self.log_failure(def, e.to_string()),
                    None => {
                        tracing::debug!(function_id = %def.id, "Log stream ended");
                        return LogOutcome::Ended;
                    }
                },
            }
        }
    }

    fn log_failure(&self, def: &FunctionDefinition, detail: String) -> LogOutcome {
        let message = KfnError::LogStreamError(detail).to_string();
        tracing::warn!(function_id = %def.id, error = %message, "Log tail failed");
        self.ui.show_error(&message);
        LogOutcome::Failed(message)
    }

    pub async fn delete(&self, def: &FunctionDefinition) -> Result<(), KfnError> {
        let sink = self
            .sinks
            .get_or_create(&SinkKind::Deployment.key(&def.id))
            .await;
        sink.show();

        let result = self
            .platform
            .remove(
                std::slice::from_ref(def),
                &def.runtime,
                DeployOptions::verbose_forced(),
                &sink,
            )
            .await;

        match result {
            Ok(()) => {
                tracing::info!(function_id = %def.id, "Function deleted");
                self.ui.show_info(&format!("{} successfully deleted", def.id));
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(function_id = %def.id, error = %message, "Deletion failed");
                self.ui.show_error(&format!("ERROR: {message}"));
                Err(KfnError::DeleteFailed(message))
            }
        }
    }
}

/// An answer naming an existing file sends that file; anything else is sent
/// as typed. Relative paths are tried against the working directory first,
/// then the artifact's directory.
async fn payload_from_answer(answer: &str, def: &FunctionDefinition) -> InvokePayload {
    if answer.is_empty() {
        return InvokePayload::None;
    }

    let mut candidates = vec![PathBuf::from(answer)];
    if Path::new(answer).is_relative() {
        if let Some(dir) = Path::new(&def.source_artifact_key).parent() {
            candidates.push(dir.join(answer));
        }
    }
    for candidate in candidates {
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return InvokePayload::File(candidate);
        }
    }
    InvokePayload::Text(answer.to_string())
}

/// JSON objects are pretty-printed; everything else is shown raw.
fn render_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value @ serde_json::Value::Object(_)) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string())
        }
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfn_core::SourceArtifact;

    #[test]
    fn objects_are_pretty_printed() {
        assert_eq!(render_body(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(render_body("[1,2]"), "[1,2]");
        assert_eq!(render_body("plain"), "plain");
    }

    #[tokio::test]
    async fn answer_naming_file_beside_artifact_is_file_payload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let artifact_path = tmp.path().join("foo.py");
        std::fs::write(tmp.path().join("event.json"), "{}").unwrap();

        let artifact = SourceArtifact::new(artifact_path, "python", "");
        let def = FunctionDefinition::draft(&artifact, "python2.7".into(), None);

        assert_eq!(
            payload_from_answer("event.json", &def).await,
            InvokePayload::File(tmp.path().join("event.json"))
        );
        assert_eq!(
            payload_from_answer("missing.json", &def).await,
            InvokePayload::Text("missing.json".into())
        );
        assert_eq!(payload_from_answer("", &def).await, InvokePayload::None);
    }
}
