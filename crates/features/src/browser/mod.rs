//! Remote browser control (`.bp <action> [param]`).
//!
//! The feature owns at most one session checked out of an [`InstancePool`]
//! and keeps it across commands. The pool may evict the session at any time,
//! so every command retrieves it again before use and transparently acquires
//! a fresh one when it is gone.

pub mod grammar;

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    switchboard_browser::{
        BrowserError, ControlKey, InstancePool, Launcher, PoolConfig, Session, format_elements,
        types::{DESKTOP_USER_AGENT, VIEWPORT_HEIGHT, VIEWPORT_WIDTH},
    },
    switchboard_common::Logger,
    tokio::sync::Mutex,
    tracing::{debug, info},
};

pub use grammar::{BrowserAction, USAGE};

use crate::{
    command::{Command, Outcome, Trigger},
    error::{Error, Result},
    feature::Feature,
};

pub const TRIGGER: Trigger = Trigger::new(".bp");

const KILLED: &str = "killed";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserControlConfig {
    /// Pool settings. A zero `base_port_number` leaves the feature unconfigured;
    /// `max_instances` is always overridden to 1.
    pub browsers: PoolConfig,
    /// Pause before reading page info after an action that produced no output.
    pub settle_delay_ms: u64,
}

impl Default for BrowserControlConfig {
    fn default() -> Self {
        Self {
            browsers: PoolConfig::default(),
            settle_delay_ms: 1000,
        }
    }
}

/// Drives a single pooled browser session through the `.bp` grammar.
pub struct BrowserControl {
    config: BrowserControlConfig,
    launcher: Option<Arc<dyn Launcher>>,
    pool: OnceLock<Arc<InstancePool>>,
    session: Mutex<Option<Session>>,
    log: Logger,
}

impl BrowserControl {
    pub fn new(config: BrowserControlConfig, launcher: Option<Arc<dyn Launcher>>) -> Self {
        Self {
            config,
            launcher,
            pool: OnceLock::new(),
            session: Mutex::new(None),
            log: Logger::new("BrowserControl", TRIGGER.as_str()),
        }
    }

    /// The instance pool, once initialised.
    pub fn pool(&self) -> Option<&Arc<InstancePool>> {
        self.pool.get()
    }

    /// Drop the held session and terminate every worker in the pool.
    pub async fn shutdown(&self) {
        self.session.lock().await.take();
        if let Some(pool) = self.pool.get() {
            pool.shutdown().await;
        }
    }

    async fn run(&self, cmd: &Command, action: BrowserAction) -> Result<String> {
        let pool = self
            .pool
            .get()
            .ok_or_else(|| Error::state("browser control is not initialised"))?;

        let mut held = self.session.lock().await;
        if let Some(previous) = held.take() {
            *held = pool.retrieve(previous.index, &previous.tag).await;
            if held.is_none() {
                debug!(index = previous.index, tag = previous.tag, "browser session is gone");
            }
        }

        if action == BrowserAction::Kill {
            if let Some(session) = held.take() {
                pool.kill(session.index, &session.tag).await;
                info!(channel = cmd.channel, "browser session killed");
            }
            return Ok(KILLED.to_string());
        }

        let session = match held.as_ref() {
            Some(session) => session.clone(),
            None => {
                let session = pool.acquire().await.map_err(|err| match err {
                    BrowserError::PoolExhausted(_) => {
                        Error::state(format!("failed to acquire browser session - {err}"))
                    },
                    other => Error::external("failed to acquire browser session", other),
                })?;
                *held = Some(session.clone());
                session
            },
        };

        let output = perform(&session, &action)
            .await
            .map_err(|err| Error::external(format!("{} failed", action.name()), err))?;
        if !output.is_empty() {
            return Ok(output);
        }

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        let info = session.renderer().page_info().await.map_err(|err| {
            Error::external("command was successful, but failed to get page info", err)
        })?;
        Ok(info.to_string())
    }
}

/// Apply one action to the session. Navigation-style actions produce no output.
async fn perform(
    session: &Session,
    action: &BrowserAction,
) -> std::result::Result<String, BrowserError> {
    let renderer = session.renderer();
    let output = match action {
        BrowserAction::Forward => {
            renderer.go_forward().await?;
            String::new()
        },
        BrowserAction::Back => {
            renderer.go_back().await?;
            String::new()
        },
        BrowserAction::PreviousElement => format_elements(&renderer.previous_element().await?),
        BrowserAction::NextElement => format_elements(&renderer.next_element().await?),
        BrowserAction::NextElements(n) => format_elements(&renderer.next_n_elements(*n).await?),
        BrowserAction::ResetNavigation => {
            renderer.reset_navigation().await?;
            String::new()
        },
        BrowserAction::Reload => {
            renderer.reload().await?;
            String::new()
        },
        BrowserAction::Goto(url) => {
            renderer
                .goto(DESKTOP_USER_AGENT, url, VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
                .await?;
            String::new()
        },
        BrowserAction::Info => renderer.page_info().await?.to_string(),
        BrowserAction::Pointer {
            action_type,
            button,
        } => {
            renderer.pointer(action_type, button).await?;
            String::new()
        },
        BrowserAction::SetValue(value) => {
            renderer.set_value(value).await?;
            String::new()
        },
        BrowserAction::Type(text) => {
            renderer.send_key(text, None).await?;
            String::new()
        },
        BrowserAction::Enter => {
            renderer.send_key("", Some(ControlKey::Enter)).await?;
            String::new()
        },
        BrowserAction::Backspace => {
            renderer.send_key("", Some(ControlKey::Backspace)).await?;
            String::new()
        },
        BrowserAction::Render => {
            renderer.render_page().await?;
            String::new()
        },
        // Handled by the caller before a session is needed.
        BrowserAction::Kill => KILLED.to_string(),
    };
    Ok(output)
}

#[async_trait]
impl Feature for BrowserControl {
    fn key(&self) -> &'static str {
        "browser"
    }

    fn trigger(&self) -> Trigger {
        TRIGGER
    }

    fn is_configured(&self) -> bool {
        self.config.browsers.base_port_number != 0
    }

    async fn initialise(&self) -> Result<()> {
        if self.pool.get().is_some() {
            return Ok(());
        }
        let Some(launcher) = self.launcher.as_ref() else {
            return Err(Error::initialisation(TRIGGER, "no browser launcher is available"));
        };
        let config = PoolConfig {
            max_instances: 1,
            ..self.config.browsers.clone()
        };
        let pool = InstancePool::new(config, Arc::clone(launcher)).map_err(|err| {
            Error::initialisation(TRIGGER, format!("failed to initialise browser pool - {err}"))
        })?;
        let _ = self.pool.set(Arc::new(pool));
        Ok(())
    }

    async fn self_test(&self) -> Result<()> {
        let pool = self
            .pool
            .get()
            .ok_or_else(|| Error::state("browser control is not initialised"))?;
        let evicted = pool.cleanup_idle().await;
        if evicted > 0 {
            info!(evicted, "reclaimed idle browser instances");
        }
        pool.self_test()
            .await
            .map_err(|err| Error::external("browser worker is unavailable", err))
    }

    async fn execute(&self, mut cmd: Command) -> Outcome {
        if let Err(err) = cmd.trim() {
            return Outcome::failed(err);
        }
        let action = match cmd.content.parse::<BrowserAction>() {
            Ok(action) => action,
            Err(err) => return Outcome::failed(err),
        };
        let result = self.run(&cmd, action).await;
        if let Err(err) = &result {
            self.log.warn("execute", &cmd.channel, err, &cmd.content);
        }
        result.into()
    }
}
