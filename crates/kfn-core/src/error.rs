use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KfnError {
    #[error("Language {0} is not supported")]
    UnsupportedLanguage(String),

    #[error("You should specify the function name")]
    NoIdentitySpecified,

    #[error("cannot read source artifact {}: {source}", path.display())]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deployment failed: {0}")]
    DeployFailed(String),

    #[error("{0}")]
    InvokeFailed(String),

    #[error("deletion failed: {0}")]
    DeleteFailed(String),

    #[error("log stream error: {0}")]
    LogStreamError(String),

    #[error("function store {} is corrupt: {source}", path.display())]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
