//! Collaborators exercised or informed by a maintenance cycle.

use std::time::Duration;

use {
    anyhow::bail,
    async_trait::async_trait,
    tracing::debug,
};

use crate::error::{Context, Result};

/// A check against something outside the feature registry, such as the mail
/// command pipeline or an HTTP handler.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Name used as the key in the maintenance report.
    fn name(&self) -> &str;

    async fn probe(&self) -> anyhow::Result<()>;
}

/// Receives the report of a cycle that found problems.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Issues a synthetic GET and expects a success status.
pub struct HttpEndpointProbe {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpEndpointProbe {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpEndpointProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> anyhow::Result<()> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        debug!(url = self.url, %status, "probed HTTP handler");
        if !status.is_success() {
            bail!("HTTP {status} from {}", self.url);
        }
        Ok(())
    }
}
