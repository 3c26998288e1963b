use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use kfn_core::{EventKind, FunctionDefinition, OutputSink, PlatformConfig};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::client::{
    DeployOptions, InvokePayload, InvokeResponse, LogRequest, LogStream, PlatformClient,
    PlatformFuture, content_type,
};
use crate::error::PlatformError;

const KUBELESS_API: &str = "apis/kubeless.io/v1beta1";
const FUNCTION_PORT_NAME: &str = "http-function-port";
const FUNCTION_PORT: u16 = 8080;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Kubeless client talking straight to the Kubernetes API server.
///
/// Functions and their triggers are Kubeless custom resources; invocation
/// goes through the API server's service proxy and logs come from the
/// function pod's log endpoint.
pub struct KubelessClient {
    http: reqwest::Client,
    api_server: String,
    token: Option<String>,
    default_namespace: String,
    function_timeout_secs: u64,
    ready_timeout: Duration,
}

/// A trigger resource to create alongside a function.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerManifest {
    /// Resource plural, e.g. `httptriggers`.
    pub plural: &'static str,
    pub name: String,
    pub body: Value,
}

impl KubelessClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_server: config.api_server.trim_end_matches('/').to_string(),
            token: config.token(),
            default_namespace: config.namespace.clone(),
            function_timeout_secs: config.function_timeout_secs,
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn resources_url(&self, namespace: &str, plural: &str) -> String {
        format!("{}/{KUBELESS_API}/namespaces/{namespace}/{plural}", self.api_server)
    }

    fn resource_url(&self, namespace: &str, plural: &str, name: &str) -> String {
        format!("{}/{name}", self.resources_url(namespace, plural))
    }

    fn pods_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{namespace}/pods", self.api_server)
    }

    fn service_proxy_url(&self, namespace: &str, id: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{namespace}/services/{id}:{FUNCTION_PORT_NAME}/proxy/",
            self.api_server
        )
    }

    fn namespace_of<'a>(&'a self, def: &'a FunctionDefinition) -> &'a str {
        def.namespace_or(&self.default_namespace)
    }

    /// Create a resource, or replace it when it already exists and `force`
    /// is set.
    async fn apply(
        &self,
        namespace: &str,
        plural: &str,
        name: &str,
        mut body: Value,
        force: bool,
    ) -> Result<(), PlatformError> {
        let response = self
            .request(Method::POST, &self.resources_url(namespace, plural))
            .json(&body)
            .send()
            .await?;

        if response.status() != StatusCode::CONFLICT {
            check(response).await?;
            return Ok(());
        }
        if !force {
            return Err(PlatformError::AlreadyExists(name.to_string()));
        }

        let url = self.resource_url(namespace, plural, name);
        let existing: Value = check(self.request(Method::GET, &url).send().await?)
            .await?
            .json()
            .await?;
        body["metadata"]["resourceVersion"] = existing["metadata"]["resourceVersion"].clone();

        check(self.request(Method::PUT, &url).json(&body).send().await?).await?;
        tracing::debug!(plural, name, "Existing resource replaced");
        Ok(())
    }

    async fn deploy_one(
        &self,
        def: &FunctionDefinition,
        runtime: &str,
        opts: DeployOptions,
        diagnostics: &OutputSink,
    ) -> Result<(), PlatformError> {
        let namespace = self.namespace_of(def);
        opts.report(diagnostics, &format!("Deploying function {}...", def.id));

        let manifest = function_manifest(def, runtime, namespace, self.function_timeout_secs);
        self.apply(namespace, "functions", &def.id, manifest, opts.force)
            .await?;

        for trigger in trigger_manifests(def, namespace) {
            self.apply(namespace, trigger.plural, &trigger.name, trigger.body, opts.force)
                .await?;
            opts.report(
                diagnostics,
                &format!("Deployed {} {} for function {}", trigger.plural, trigger.name, def.id),
            );
        }

        if !self.ready_timeout.is_zero() {
            opts.report(diagnostics, &format!("Waiting for function {} to be ready...", def.id));
            self.wait_until_ready(namespace, &def.id).await?;
        }

        opts.report(diagnostics, &format!("Function {} successfully deployed", def.id));
        tracing::info!(function_id = %def.id, namespace, runtime, "Function deployed");
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, id: &str) -> Result<Vec<Value>, PlatformError> {
        let list: Value = check(
            self.request(Method::GET, &self.pods_url(namespace))
                .query(&[("labelSelector", format!("function={id}"))])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        Ok(list["items"].as_array().cloned().unwrap_or_default())
    }

    async fn wait_until_ready(&self, namespace: &str, id: &str) -> Result<(), PlatformError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            // A hung poll still counts against the deadline.
            let pods = tokio::time::timeout_at(deadline, self.list_pods(namespace, id))
                .await
                .map_err(|_| PlatformError::NotReady(id.to_string()))??;
            if pods.iter().any(pod_is_ready) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PlatformError::NotReady(id.to_string()));
            }
            tokio::time::sleep(READY_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn remove_one(
        &self,
        def: &FunctionDefinition,
        opts: DeployOptions,
        diagnostics: &OutputSink,
    ) -> Result<(), PlatformError> {
        let namespace = self.namespace_of(def);
        opts.report(diagnostics, &format!("Removing function: {}...", def.id));

        let response = self
            .request(Method::DELETE, &self.resource_url(namespace, "functions", &def.id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(def.id.clone()));
        }
        check(response).await?;

        for trigger in trigger_manifests(def, namespace) {
            let response = self
                .request(
                    Method::DELETE,
                    &self.resource_url(namespace, trigger.plural, &trigger.name),
                )
                .send()
                .await?;
            if response.status() != StatusCode::NOT_FOUND {
                check(response).await?;
            }
        }

        opts.report(diagnostics, &format!("Function {} successfully deleted", def.id));
        tracing::info!(function_id = %def.id, namespace, "Function removed");
        Ok(())
    }
}

impl PlatformClient for KubelessClient {
    fn deploy<'a>(
        &'a self,
        defs: &'a [FunctionDefinition],
        runtime: &'a str,
        opts: DeployOptions,
        diagnostics: &'a OutputSink,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            for def in defs {
                self.deploy_one(def, runtime, opts, diagnostics).await?;
            }
            Ok(())
        })
    }

    fn invoke<'a>(
        &'a self,
        id: &'a str,
        payload: InvokePayload,
        defs: &'a [FunctionDefinition],
    ) -> PlatformFuture<'a, InvokeResponse> {
        Box::pin(async move {
            let namespace = defs
                .iter()
                .find(|d| d.id == id)
                .map_or(self.default_namespace.as_str(), |d| self.namespace_of(d));

            let mut request = self
                .request(Method::POST, &self.service_proxy_url(namespace, id))
                .header("event-namespace", "cli.kubeless.io");
            if let Some(body) = payload.body().await? {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, content_type(&body))
                    .header("event-type", content_type(&body))
                    .body(body);
            }

            tracing::debug!(function_id = id, namespace, "Invoking function");
            let response = check(request.send().await?).await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(InvokeResponse { status, body })
        })
    }

    fn remove<'a>(
        &'a self,
        defs: &'a [FunctionDefinition],
        _runtime: &'a str,
        opts: DeployOptions,
        diagnostics: &'a OutputSink,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            for def in defs {
                self.remove_one(def, opts, diagnostics).await?;
            }
            Ok(())
        })
    }

    fn tail_logs<'a>(&'a self, id: &'a str, request: LogRequest) -> PlatformFuture<'a, LogStream> {
        Box::pin(async move {
            let pods = self.list_pods(&request.namespace, id).await?;
            let pod = pods
                .iter()
                .find(|p| p["status"]["phase"] == "Running")
                .or_else(|| pods.first())
                .and_then(|p| p["metadata"]["name"].as_str())
                .ok_or_else(|| PlatformError::NoPod(id.to_string()))?
                .to_string();

            let url = format!("{}/{pod}/log", self.pods_url(&request.namespace));
            let response = check(
                self.request(Method::GET, &url)
                    .query(&[("container", id), ("follow", if request.tail { "true" } else { "false" })])
                    .send()
                    .await?,
            )
            .await?;

            tracing::info!(function_id = id, pod = %pod, "Log stream opened");
            let stream = decode_utf8_chunks(Box::pin(response.bytes_stream()));
            Ok(Box::pin(stream) as LogStream)
        })
    }

    fn name(&self) -> &str {
        "kubeless"
    }
}

/// Turn a non-success response into [`PlatformError::Rejected`], unwrapping
/// a Kubernetes `Status` body to its message.
async fn check(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(PlatformError::Rejected {
        status: status.as_u16(),
        message: status_message(&text, status),
    })
}

fn status_message(body: &str, status: StatusCode) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    if let Some(message) = parsed.as_ref().and_then(|v| v["message"].as_str()) {
        return message.to_string();
    }
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.to_string()
    }
}

/// Decode a byte stream as UTF-8 text. A character split across chunks is
/// held back until its remaining bytes arrive; invalid bytes become U+FFFD.
fn decode_utf8_chunks<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, PlatformError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<PlatformError>,
{
    stream::unfold(Some((chunks, Vec::new())), |state| async move {
        let (mut chunks, mut carry) = state?;
        loop {
            match chunks.next().await {
                Some(Ok(bytes)) => {
                    carry.extend_from_slice(bytes.as_ref());
                    let text = take_complete_utf8(&mut carry);
                    if !text.is_empty() {
                        return Some((Ok(text), Some((chunks, carry))));
                    }
                }
                Some(Err(e)) => return Some((Err(e.into()), Some((chunks, carry)))),
                None if carry.is_empty() => return None,
                None => {
                    let rest = String::from_utf8_lossy(&carry).into_owned();
                    return Some((Ok(rest), None));
                }
            }
        }
    })
}

/// Remove and return the decodable prefix of `buf`, leaving an incomplete
/// trailing character in place.
fn take_complete_utf8(buf: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        let err = match std::str::from_utf8(&buf[..]) {
            Ok(text) => {
                out.push_str(text);
                buf.clear();
                return out;
            }
            Err(err) => err,
        };
        let valid = err.valid_up_to();
        match err.error_len() {
            Some(bad) => {
                out.push_str(&String::from_utf8_lossy(&buf[..valid + bad]));
                buf.drain(..valid + bad);
            }
            None => {
                out.push_str(&String::from_utf8_lossy(&buf[..valid]));
                buf.drain(..valid);
                return out;
            }
        }
    }
}

fn pod_is_ready(pod: &Value) -> bool {
    pod["status"]["conditions"]
        .as_array()
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c["type"] == "Ready" && c["status"] == "True")
        })
}

fn labels(id: &str) -> Value {
    json!({ "created-by": "kubeless", "function": id })
}

/// `sha256:<hex>` of the function source, as Kubeless expects in
/// `spec.checksum`.
pub fn content_checksum(text: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(text.as_bytes())))
}

/// The Kubeless `Function` resource for a definition.
pub fn function_manifest(
    def: &FunctionDefinition,
    runtime: &str,
    namespace: &str,
    timeout_secs: u64,
) -> Value {
    let env: Vec<Value> = def
        .environment
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    let mut container = json!({ "name": def.id, "env": env });
    if let Some(memory) = &def.memory_size {
        container["resources"] = json!({
            "limits": { "memory": memory },
            "requests": { "memory": memory },
        });
    }

    json!({
        "apiVersion": "kubeless.io/v1beta1",
        "kind": "Function",
        "metadata": {
            "name": def.id,
            "namespace": namespace,
            "labels": labels(&def.id),
        },
        "spec": {
            "deps": def.dependencies.clone().unwrap_or_default(),
            "function": def.source_text,
            "function-content-type": "text",
            "checksum": content_checksum(&def.source_text),
            "handler": def.handler,
            "runtime": runtime,
            "timeout": timeout_secs.to_string(),
            "service": {
                "ports": [{
                    "name": FUNCTION_PORT_NAME,
                    "port": FUNCTION_PORT,
                    "protocol": "TCP",
                    "targetPort": FUNCTION_PORT,
                }],
                "selector": labels(&def.id),
                "type": "ClusterIP",
            },
            "deployment": {
                "spec": { "template": { "spec": { "containers": [container] } } }
            },
        },
    })
}

/// Trigger resources implied by a definition's events. The default root
/// HTTP event needs none.
pub fn trigger_manifests(def: &FunctionDefinition, namespace: &str) -> Vec<TriggerManifest> {
    let mut triggers = Vec::new();
    for event in &def.events {
        match event.kind {
            EventKind::Http if event.needs_ingress() => {
                let host = event
                    .hostname
                    .clone()
                    .unwrap_or_else(|| format!("{}.{namespace}.kfn.local", def.id));
                let path = event.path.as_deref().unwrap_or("/").trim_start_matches('/');
                triggers.push(TriggerManifest {
                    plural: "httptriggers",
                    name: def.id.clone(),
                    body: json!({
                        "apiVersion": "kubeless.io/v1beta1",
                        "kind": "HTTPTrigger",
                        "metadata": { "name": def.id, "namespace": namespace, "labels": labels(&def.id) },
                        "spec": {
                            "function-name": def.id,
                            "host-name": host,
                            "path": path,
                            "tls": false,
                            "gateway": "nginx",
                        },
                    }),
                });
            }
            EventKind::Http => {}
            EventKind::Trigger => {
                let Some(topic) = &event.trigger else { continue };
                let name = resource_name(&format!("{}-{topic}", def.id));
                triggers.push(TriggerManifest {
                    plural: "kafkatriggers",
                    name: name.clone(),
                    body: json!({
                        "apiVersion": "kubeless.io/v1beta1",
                        "kind": "KafkaTrigger",
                        "metadata": { "name": name, "namespace": namespace, "labels": labels(&def.id) },
                        "spec": {
                            "functionSelector": { "matchLabels": labels(&def.id) },
                            "topic": topic,
                        },
                    }),
                });
            }
            EventKind::Schedule => {
                let Some(schedule) = &event.trigger else { continue };
                triggers.push(TriggerManifest {
                    plural: "cronjobtriggers",
                    name: def.id.clone(),
                    body: json!({
                        "apiVersion": "kubeless.io/v1beta1",
                        "kind": "CronJobTrigger",
                        "metadata": { "name": def.id, "namespace": namespace, "labels": labels(&def.id) },
                        "spec": {
                            "function-name": def.id,
                            "schedule": schedule,
                        },
                    }),
                });
            }
        }
    }
    triggers
}

/// Lowercase DNS-1123 name: anything outside `[a-z0-9-]` becomes `-`.
fn resource_name(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
