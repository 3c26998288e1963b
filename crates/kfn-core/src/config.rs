use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::KfnError;

pub const CONFIG_FILE_NAME: &str = "kfn.toml";
pub const TOKEN_ENV_VAR: &str = "KFN_KUBE_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KfnConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Where and how to reach the FaaS platform.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub provider: PlatformProvider,
    #[serde(default = "default_api_server")]
    pub api_server: String,
    /// Namespace for functions that do not name one.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub token: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_function_timeout")]
    pub function_timeout_secs: u64,
    /// How long a deploy waits for a ready pod. 0 skips the wait.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

fn default_api_server() -> String {
    "http://127.0.0.1:8001".into()
}
fn default_namespace() -> String {
    "default".into()
}
fn default_function_timeout() -> u64 {
    180
}
fn default_ready_timeout() -> u64 {
    120
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            provider: PlatformProvider::default(),
            api_server: default_api_server(),
            namespace: default_namespace(),
            token: None,
            accept_invalid_certs: false,
            function_timeout_secs: default_function_timeout(),
            ready_timeout_secs: default_ready_timeout(),
        }
    }
}

impl PlatformConfig {
    /// Bearer token, `KFN_KUBE_TOKEN` taking precedence over the file.
    pub fn token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub enum PlatformProvider {
    #[default]
    #[serde(rename = "kubeless")]
    Kubeless,
    #[serde(rename = "stub")]
    Stub,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Settings directory under the project root.
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

fn default_store_dir() -> String {
    ".kfn".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl KfnConfig {
    pub fn from_file(path: &Path) -> Result<Self, KfnError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KfnError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| KfnError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Load configuration the way the command line does: an explicit path
    /// must exist; otherwise `<project>/kfn.toml`, then
    /// `~/.config/kfn/kfn.toml`, then built-in defaults.
    pub fn discover(explicit: Option<&Path>, project_root: &Path) -> Result<(Self, Option<PathBuf>), KfnError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        let mut candidates = vec![project_root.join(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("kfn").join(CONFIG_FILE_NAME));
        }

        for candidate in candidates {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Using config file");
                return Ok((Self::from_file(&candidate)?, Some(candidate)));
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok((Self::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: KfnConfig = toml::from_str("").unwrap();
        assert_eq!(config.platform.provider, PlatformProvider::Kubeless);
        assert_eq!(config.platform.api_server, "http://127.0.0.1:8001");
        assert_eq!(config.platform.namespace, "default");
        assert_eq!(config.platform.function_timeout_secs, 180);
        assert_eq!(config.store.dir, ".kfn");
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[platform]
provider = "kubeless"
api_server = "https://10.0.0.1:6443"
namespace = "functions"
token = "abc"
accept_invalid_certs = true
function_timeout_secs = 60
ready_timeout_secs = 0

[store]
dir = ".vscode"
"#;
        let config: KfnConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform.api_server, "https://10.0.0.1:6443");
        assert_eq!(config.platform.namespace, "functions");
        assert_eq!(config.platform.token.as_deref(), Some("abc"));
        assert!(config.platform.accept_invalid_certs);
        assert_eq!(config.platform.ready_timeout_secs, 0);
        assert_eq!(config.store.dir, ".vscode");
    }

    #[test]
    fn parses_stub_provider() {
        let config: KfnConfig = toml::from_str("[platform]\nprovider = \"stub\"\n").unwrap();
        assert_eq!(config.platform.provider, PlatformProvider::Stub);
    }

    #[test]
    fn discover_prefers_project_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[platform]\nnamespace = \"team-a\"\n",
        )
        .unwrap();

        let (config, found) = KfnConfig::discover(None, tmp.path()).unwrap();
        assert_eq!(config.platform.namespace, "team-a");
        assert_eq!(found, Some(tmp.path().join(CONFIG_FILE_NAME)));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = KfnConfig::discover(Some(&tmp.path().join("missing.toml")), tmp.path()).unwrap_err();
        assert!(matches!(err, KfnError::Config(_)));
    }

    #[test]
    fn env_token_overrides_file() {
        let config = PlatformConfig {
            token: Some("from-file".into()),
            ..PlatformConfig::default()
        };
        unsafe { std::env::set_var(TOKEN_ENV_VAR, "from-env") };
        assert_eq!(config.token().as_deref(), Some("from-env"));
        unsafe { std::env::remove_var(TOKEN_ENV_VAR) };
        assert_eq!(config.token().as_deref(), Some("from-file"));
    }
}
