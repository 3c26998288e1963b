use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use futures::Stream;
use kfn_core::{FunctionDefinition, OutputSink};

use crate::error::PlatformError;

pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlatformError>> + Send + 'a>>;

/// Chunks of log text, in arrival order. The underlying connection lives
/// inside the stream and is released when it is dropped.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<String, PlatformError>> + Send>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Write progress to the diagnostics sink.
    pub verbose: bool,
    /// Replace an existing function of the same name without asking.
    pub force: bool,
}

impl DeployOptions {
    pub fn verbose_forced() -> Self {
        Self {
            verbose: true,
            force: true,
        }
    }

    pub(crate) fn report(&self, diagnostics: &OutputSink, message: &str) {
        if self.verbose {
            diagnostics.append_line(message);
        }
    }
}

/// Data sent with an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokePayload {
    None,
    Text(String),
    /// Send the contents of this file.
    File(PathBuf),
}

impl InvokePayload {
    /// Resolve the payload to the request body, reading file payloads.
    pub async fn body(&self) -> Result<Option<String>, PlatformError> {
        match self {
            InvokePayload::None => Ok(None),
            InvokePayload::Text(text) => Ok(Some(text.clone())),
            InvokePayload::File(path) => Ok(Some(tokio::fs::read_to_string(path).await?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub namespace: String,
    /// Keep following the log instead of returning what exists so far.
    pub tail: bool,
}

/// The FaaS control plane, as seen by the lifecycle operations.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility.
pub trait PlatformClient: Send + Sync {
    /// Create or update functions. Progress goes to `diagnostics`.
    fn deploy<'a>(
        &'a self,
        defs: &'a [FunctionDefinition],
        runtime: &'a str,
        opts: DeployOptions,
        diagnostics: &'a OutputSink,
    ) -> PlatformFuture<'a, ()>;

    /// Call a deployed function. `defs` scopes the lookup of its namespace.
    fn invoke<'a>(
        &'a self,
        id: &'a str,
        payload: InvokePayload,
        defs: &'a [FunctionDefinition],
    ) -> PlatformFuture<'a, InvokeResponse>;

    /// Tear functions down. Progress goes to `diagnostics`.
    fn remove<'a>(
        &'a self,
        defs: &'a [FunctionDefinition],
        runtime: &'a str,
        opts: DeployOptions,
        diagnostics: &'a OutputSink,
    ) -> PlatformFuture<'a, ()>;

    /// Open a log stream for a function.
    fn tail_logs<'a>(&'a self, id: &'a str, request: LogRequest) -> PlatformFuture<'a, LogStream>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Content type for a text payload: JSON when it parses as JSON.
pub(crate) fn content_type(body: &str) -> &'static str {
    if serde_json::from_str::<serde_json::Value>(body).is_ok() {
        "application/json"
    } else {
        "text/plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_payload_reads_contents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("payload.json");
        tokio::fs::write(&path, r#"{"n": 1}"#).await.unwrap();

        let body = InvokePayload::File(path).body().await.unwrap();
        assert_eq!(body.as_deref(), Some(r#"{"n": 1}"#));
        assert_eq!(InvokePayload::None.body().await.unwrap(), None);
    }

    #[test]
    fn json_text_is_sent_as_json() {
        assert_eq!(content_type(r#"{"a": 1}"#), "application/json");
        assert_eq!(content_type("42"), "application/json");
        assert_eq!(content_type("hello"), "text/plain");
    }

    #[tokio::test]
    async fn quiet_options_write_nothing() {
        let registry = kfn_core::SinkRegistry::new();
        let sink = registry.get_or_create("f-deployment").await;

        DeployOptions::default().report(&sink, "hidden");
        DeployOptions::verbose_forced().report(&sink, "shown");

        assert_eq!(sink.contents(), "shown\n");
    }
}
