use std::collections::HashMap;
use std::sync::Mutex;

use futures::stream::{self, StreamExt};
use kfn_core::{FunctionDefinition, OutputSink};

use crate::client::{
    DeployOptions, InvokePayload, InvokeResponse, LogRequest, LogStream, PlatformClient,
    PlatformFuture,
};
use crate::error::PlatformError;

/// A call received by [`StubPlatform`], in order of arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Deploy {
        ids: Vec<String>,
        runtime: String,
        opts: DeployOptions,
    },
    Invoke {
        id: String,
        payload: InvokePayload,
    },
    Remove {
        ids: Vec<String>,
        runtime: String,
        opts: DeployOptions,
    },
    TailLogs {
        id: String,
        namespace: String,
        tail: bool,
    },
}

/// In-memory platform for tests and offline use.
///
/// Deployed functions live in a map; invocations echo their payload unless
/// a canned response is set. Every call is recorded.
#[derive(Default)]
pub struct StubPlatform {
    deployed: Mutex<HashMap<String, FunctionDefinition>>,
    calls: Mutex<Vec<PlatformCall>>,
    failure: Option<String>,
    response: Option<String>,
    log_lines: Vec<String>,
    log_error: Option<String>,
    open_logs: bool,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_response(mut self, body: impl Into<String>) -> Self {
        self.response = Some(body.into());
        self
    }

    pub fn with_log_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// The log stream yields this error after the configured lines.
    pub fn with_log_error(mut self, message: impl Into<String>) -> Self {
        self.log_error = Some(message.into());
        self
    }

    /// The log stream never ends on its own.
    pub fn with_open_logs(mut self) -> Self {
        self.open_logs = true;
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ids currently deployed, sorted.
    pub fn deployed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .deployed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    fn check_failure(&self) -> Result<(), PlatformError> {
        match &self.failure {
            Some(message) => Err(PlatformError::Rejected {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn ids(defs: &[FunctionDefinition]) -> Vec<String> {
    defs.iter().map(|d| d.id.clone()).collect()
}

impl PlatformClient for StubPlatform {
    fn deploy<'a>(
        &'a self,
        defs: &'a [FunctionDefinition],
        runtime: &'a str,
        opts: DeployOptions,
        diagnostics: &'a OutputSink,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.record(PlatformCall::Deploy {
                ids: ids(defs),
                runtime: runtime.to_string(),
                opts,
            });
            for def in defs {
                opts.report(diagnostics, &format!("Deploying function {}...", def.id));
                self.check_failure()?;
                {
                    let mut deployed = self.deployed.lock().unwrap_or_else(|e| e.into_inner());
                    if deployed.contains_key(&def.id) && !opts.force {
                        return Err(PlatformError::AlreadyExists(def.id.clone()));
                    }
                    deployed.insert(def.id.clone(), def.clone());
                }
                opts.report(diagnostics, &format!("Function {} successfully deployed", def.id));
            }
            Ok(())
        })
    }

    fn invoke<'a>(
        &'a self,
        id: &'a str,
        payload: InvokePayload,
        _defs: &'a [FunctionDefinition],
    ) -> PlatformFuture<'a, InvokeResponse> {
        Box::pin(async move {
            self.record(PlatformCall::Invoke {
                id: id.to_string(),
                payload: payload.clone(),
            });
            self.check_failure()?;
            if !self
                .deployed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains_key(id)
            {
                return Err(PlatformError::NotFound(id.to_string()));
            }

            let body = match &self.response {
                Some(canned) => canned.clone(),
                None => payload.body().await?.unwrap_or_default(),
            };
            Ok(InvokeResponse { status: 200, body })
        })
    }

    fn remove<'a>(
        &'a self,
        defs: &'a [FunctionDefinition],
        runtime: &'a str,
        opts: DeployOptions,
        diagnostics: &'a OutputSink,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.record(PlatformCall::Remove {
                ids: ids(defs),
                runtime: runtime.to_string(),
                opts,
            });
            for def in defs {
                opts.report(diagnostics, &format!("Removing function: {}...", def.id));
                self.check_failure()?;
                let removed = self
                    .deployed
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&def.id);
                if removed.is_none() {
                    return Err(PlatformError::NotFound(def.id.clone()));
                }
                opts.report(diagnostics, &format!("Function {} successfully deleted", def.id));
            }
            Ok(())
        })
    }

    fn tail_logs<'a>(&'a self, id: &'a str, request: LogRequest) -> PlatformFuture<'a, LogStream> {
        Box::pin(async move {
            self.record(PlatformCall::TailLogs {
                id: id.to_string(),
                namespace: request.namespace.clone(),
                tail: request.tail,
            });
            self.check_failure()?;

            let mut items: Vec<Result<String, PlatformError>> =
                self.log_lines.iter().cloned().map(Ok).collect();
            if let Some(message) = &self.log_error {
                items.push(Err(PlatformError::Rejected {
                    status: 500,
                    message: message.clone(),
                }));
            }

            let lines = stream::iter(items);
            let stream: LogStream = if self.open_logs {
                Box::pin(lines.chain(stream::pending()))
            } else {
                Box::pin(lines)
            };
            Ok(stream)
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use kfn_core::{SinkRegistry, SourceArtifact};

    fn named(id: &str) -> FunctionDefinition {
        let artifact = SourceArtifact::new(PathBuf::from("/p/foo.py"), "python", "x");
        let mut def = FunctionDefinition::draft(&artifact, "python2.7".into(), None);
        def.id = id.into();
        def
    }

    #[tokio::test]
    async fn deploy_invoke_remove_cycle() {
        let platform = StubPlatform::new();
        let sinks = SinkRegistry::new();
        let sink = sinks.get_or_create("bar-deployment").await;
        let defs = [named("bar")];

        platform
            .deploy(&defs, "python2.7", DeployOptions::verbose_forced(), &sink)
            .await
            .unwrap();
        assert_eq!(platform.deployed_ids(), vec!["bar"]);

        let resp = platform
            .invoke("bar", InvokePayload::Text("hello".into()), &defs)
            .await
            .unwrap();
        assert_eq!(resp.body, "hello");

        platform
            .remove(&defs, "python2.7", DeployOptions::verbose_forced(), &sink)
            .await
            .unwrap();
        assert!(platform.deployed_ids().is_empty());

        assert_eq!(
            sink.contents(),
            "Deploying function bar...\nFunction bar successfully deployed\n\
             Removing function: bar...\nFunction bar successfully deleted\n"
        );
        assert_eq!(platform.calls().len(), 3);
    }

    #[tokio::test]
    async fn redeploy_without_force_is_rejected() {
        let platform = StubPlatform::new();
        let sink = SinkRegistry::new().get_or_create("bar-deployment").await;
        let defs = [named("bar")];

        platform.deploy(&defs, "python2.7", DeployOptions::default(), &sink).await.unwrap();
        let err = platform
            .deploy(&defs, "python2.7", DeployOptions::default(), &sink)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Function bar already exists");
        assert_eq!(sink.contents(), "");
    }

    #[tokio::test]
    async fn invoking_unknown_function_fails() {
        let platform = StubPlatform::new();
        let err = platform.invoke("ghost", InvokePayload::None, &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "The function ghost doesn't exist");
    }

    #[tokio::test]
    async fn failing_platform_reports_message() {
        let platform = StubPlatform::failing("quota exceeded");
        let sink = SinkRegistry::new().get_or_create("bar-deployment").await;
        let err = platform
            .deploy(&[named("bar")], "python2.7", DeployOptions::verbose_forced(), &sink)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert!(platform.deployed_ids().is_empty());
    }

    #[tokio::test]
    async fn log_stream_replays_lines_then_error() {
        let platform = StubPlatform::new()
            .with_log_lines(["one\n", "two\n"])
            .with_log_error("connection reset");
        let request = LogRequest {
            namespace: "default".into(),
            tail: true,
        };

        let chunks: Vec<_> = platform.tail_logs("bar", request).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_deref().unwrap(), "one\n");
        assert_eq!(chunks[2].as_ref().unwrap_err().to_string(), "connection reset");
        assert_eq!(
            platform.calls(),
            vec![PlatformCall::TailLogs {
                id: "bar".into(),
                namespace: "default".into(),
                tail: true,
            }]
        );
    }
}
