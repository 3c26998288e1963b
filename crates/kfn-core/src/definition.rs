use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KfnError;

/// How a deployed function is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Plain HTTP, optionally exposed through an ingress (`path`, `hostname`).
    Http,
    /// Message-topic trigger; the topic name is carried in `trigger`.
    Trigger,
    /// Cron schedule; the expression is carried in `trigger`.
    Schedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl TriggerEvent {
    /// The default event: a single HTTP trigger at `/`.
    pub fn http_root() -> Self {
        Self {
            kind: EventKind::Http,
            trigger: None,
            path: Some("/".into()),
            hostname: None,
        }
    }

    /// Whether this HTTP event needs an ingress in front of the function
    /// service (anything beyond the bare root path).
    pub fn needs_ingress(&self) -> bool {
        self.kind == EventKind::Http
            && (self.hostname.is_some()
                || self.path.as_deref().is_some_and(|p| !p.is_empty() && p != "/"))
    }
}

/// The persisted record describing how a local artifact maps to a deployed
/// function.
///
/// Field names on disk follow the `funcs.json` layout earlier tooling wrote,
/// so an existing project store stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    /// Function name on the platform. Empty until the user names it.
    #[serde(default)]
    pub id: String,
    /// `<file base>.<id>`.
    #[serde(default)]
    pub handler: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(rename = "deps", default)]
    pub dependencies: Option<String>,
    #[serde(rename = "text", default)]
    pub source_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub events: Vec<TriggerEvent>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub memory_size: Option<String>,
    /// Absolute path of the artifact; the store key.
    #[serde(rename = "fileName")]
    pub source_artifact_key: String,
}

impl FunctionDefinition {
    /// An unnamed definition for `artifact`, with the default HTTP event.
    pub fn draft(artifact: &SourceArtifact, runtime: String, namespace: Option<String>) -> Self {
        Self {
            id: String::new(),
            handler: String::new(),
            runtime,
            dependencies: None,
            source_text: artifact.text.clone(),
            namespace,
            events: vec![TriggerEvent::http_root()],
            environment: BTreeMap::new(),
            memory_size: None,
            source_artifact_key: artifact.key(),
        }
    }

    pub fn is_identified(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Namespace to use on the platform, falling back to `default`.
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

/// A source file open for a lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    pub path: PathBuf,
    pub language: String,
    pub text: String,
}

impl SourceArtifact {
    pub fn new(path: PathBuf, language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path,
            language: language.into(),
            text: text.into(),
        }
    }

    /// Read an artifact from disk. The language tag is inferred from the
    /// extension unless `language` is given.
    ///
    /// The stored path is canonical, so every spelling of one file maps to
    /// the same store key.
    pub async fn load(path: &Path, language: Option<&str>) -> Result<Self, KfnError> {
        let unreadable = |source: std::io::Error| KfnError::ArtifactUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let text = tokio::fs::read_to_string(path).await.map_err(unreadable)?;
        let path = canonical_key_path(path).await.map_err(unreadable)?;
        let language = match language {
            Some(tag) => tag.to_string(),
            None => language_from_extension(&path),
        };
        Ok(Self { path, language, text })
    }

    /// Store key for this artifact.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// File name up to its first `.`; the module part of the handler.
    pub fn handler_file(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy())
            .and_then(|n| n.split('.').next().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Canonical form of an artifact path: absolute, `..` resolved, symlinks
/// followed.
pub async fn canonical_key_path(path: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::canonicalize(path).await
}

/// Known extensions map to their language tag. Anything else is passed
/// through as-is so runtime resolution can name it.
fn language_from_extension(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    match ext.as_str() {
        "py" => "python".into(),
        "js" => "javascript".into(),
        "rb" => "ruby".into(),
        "" => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        _ => ext,
    }
}
