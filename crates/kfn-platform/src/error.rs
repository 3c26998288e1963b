use thiserror::Error;

/// Failures reported by a platform client. `Display` carries the platform's
/// own message so callers can surface it verbatim.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("The function {0} doesn't exist")]
    NotFound(String),

    #[error("Function {0} already exists")]
    AlreadyExists(String),

    #[error("Unable to find any pod for function {0}")]
    NoPod(String),

    #[error("Function {0} did not become ready in time")]
    NotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
