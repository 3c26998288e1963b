//! Platform clients for kfn.
//!
//! [`PlatformClient`] is the seam between the lifecycle operations and a
//! FaaS control plane. [`KubelessClient`] drives Kubeless through the
//! Kubernetes API server; [`StubPlatform`] keeps everything in memory.

pub mod client;
pub mod error;
pub mod kubeless;
pub mod stub;

use std::sync::Arc;

use kfn_core::{PlatformConfig, PlatformProvider};

pub use client::{
    DeployOptions, InvokePayload, InvokeResponse, LogRequest, LogStream, PlatformClient,
    PlatformFuture,
};
pub use error::PlatformError;
pub use kubeless::KubelessClient;
pub use stub::{PlatformCall, StubPlatform};

/// Build the client selected by `config.provider`.
pub fn build_platform(config: &PlatformConfig) -> Result<Arc<dyn PlatformClient>, PlatformError> {
    let client: Arc<dyn PlatformClient> = match config.provider {
        PlatformProvider::Kubeless => Arc::new(KubelessClient::new(config)?),
        PlatformProvider::Stub => Arc::new(StubPlatform::new()),
    };
    tracing::debug!(provider = client.name(), api_server = %config.api_server, "Platform client ready");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_selects_client() {
        let stub = PlatformConfig {
            provider: PlatformProvider::Stub,
            ..PlatformConfig::default()
        };
        assert_eq!(build_platform(&stub).unwrap().name(), "stub");
        assert_eq!(build_platform(&PlatformConfig::default()).unwrap().name(), "kubeless");
    }
}
