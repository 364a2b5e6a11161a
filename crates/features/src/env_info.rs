//! Runtime environment report (`.e info`).

use std::time::Instant;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    sysinfo::System,
};

use crate::{
    command::{Command, Outcome, Trigger},
    error::{Context, Error, Result},
    feature::Feature,
};

pub const TRIGGER: Trigger = Trigger::new(".e");

const USAGE: &str = "info";

/// The environment report has nothing to configure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvInfoConfig {}

/// Reports program version, host and resource usage.
pub struct EnvInfo {
    started: Instant,
}

impl EnvInfo {
    pub fn new(_config: EnvInfoConfig) -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn report(&self) -> Result<String> {
        let host = hostname::get().context("failed to read host name")?;

        let mut sys = System::new();
        sys.refresh_memory();
        let used_mb = sys.used_memory() / (1024 * 1024);
        let total_mb = sys.total_memory() / (1024 * 1024);

        Ok(format!(
            "Version: {}\nPID: {}\nHost: {}\nProcess uptime: {}s\nSystem uptime: {}s\nMemory: {used_mb}/{total_mb} MB",
            env!("CARGO_PKG_VERSION"),
            std::process::id(),
            host.to_string_lossy(),
            self.started.elapsed().as_secs(),
            System::uptime(),
        ))
    }
}

#[async_trait]
impl Feature for EnvInfo {
    fn key(&self) -> &'static str {
        "env_info"
    }

    fn trigger(&self) -> Trigger {
        TRIGGER
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn initialise(&self) -> Result<()> {
        Ok(())
    }

    async fn self_test(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, mut cmd: Command) -> Outcome {
        if let Err(err) = cmd.trim() {
            return Outcome::failed(err);
        }
        match cmd.content.as_str() {
            "info" => self.report().into(),
            _ => Outcome::failed(Error::grammar(USAGE)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn info_reports_pid() {
        let feature = EnvInfo::new(EnvInfoConfig::default());
        let outcome = feature.execute(Command::new("test", " info ")).await;
        assert!(outcome.is_ok(), "{}", outcome.combined_text());
        assert!(outcome.output.contains(&format!("PID: {}", std::process::id())));
    }

    #[tokio::test]
    async fn other_text_shows_usage() {
        let feature = EnvInfo::new(EnvInfoConfig::default());
        let outcome = feature.execute(Command::new("test", "status")).await;
        assert!(matches!(outcome.error, Some(Error::Grammar(ref usage)) if usage == "info"));
    }

    #[test]
    fn always_configured() {
        assert!(EnvInfo::new(EnvInfoConfig::default()).is_configured());
    }
}
