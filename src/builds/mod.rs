use async_trait::async_trait;

use crate::config::LifecycleConfig;
use crate::core::Result;

/// Development build pipeline hook.
///
/// Triggered after a lifecycle operation changed deployed files: cancel any
/// running development builds, then enqueue a fresh one. Callers treat the
/// trigger as fire-and-forget; failures are logged, never faulted back into
/// the saga.
#[async_trait]
pub trait BuildQueue: Send + Sync {
    async fn trigger_development_build(&self) -> Result<()>;
}

/// HTTP client for the build server's queue API.
pub struct DevBuildQueue {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl DevBuildQueue {
    pub fn new(config: &LifecycleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.build_endpoint.clone(),
        })
    }
}

#[async_trait]
impl BuildQueue for DevBuildQueue {
    async fn trigger_development_build(&self) -> Result<()> {
        let Some(endpoint) = &self.endpoint else {
            log::debug!("no build endpoint configured, skipping development build trigger");
            return Ok(());
        };
        self.http
            .post(format!("{}/builds/dev/cancel", endpoint))
            .send()
            .await?
            .error_for_status()?;
        self.http
            .post(format!("{}/builds/dev/queue", endpoint))
            .send()
            .await?
            .error_for_status()?;
        log::info!("development build queued");
        Ok(())
    }
}
