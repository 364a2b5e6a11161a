//! Feature registry: configuration, initialisation, trigger lookup and
//! concurrent self test.
//!
//! A [`FeatureSet`] has a single writer. Configuration and
//! [`FeatureSet::initialise`] take `&mut self`; once initialised the set is
//! shared (usually behind an `Arc`) and only read. The trigger lookup is
//! rebuilt wholesale by every `initialise`, never patched in place.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
    time::Duration,
};

use {
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::{Map, Value},
    switchboard_browser::Launcher,
    switchboard_common::Logger,
    tokio::{sync::mpsc, task::JoinSet, time::timeout},
    tracing::{debug, info, warn},
};

use crate::{
    browser::{BrowserControl, BrowserControlConfig},
    command::{Command, Outcome, Trigger},
    env_info::{EnvInfo, EnvInfoConfig},
    error::{Error, Result},
    feature::Feature,
    knowledge::{KnowledgeConfig, KnowledgeLookup},
    shell::{Shell, ShellConfig},
};

/// Upper bound on a single feature's self test.
pub const DEFAULT_SELF_TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-feature configuration, keyed by feature name in the JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfigs {
    pub env_info: EnvInfoConfig,
    pub shell: ShellConfig,
    pub knowledge: KnowledgeConfig,
    pub browser: BrowserControlConfig,
}

impl FeatureConfigs {
    /// Deserialise each known key on its own so that one malformed payload is
    /// reported by name. Unknown keys are ignored and missing keys keep their
    /// defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut map: Map<String, Value> =
            serde_json::from_str(raw).map_err(|source| Error::ConfigMap { source })?;

        Ok(Self {
            env_info: take_key(&mut map, "env_info")?,
            shell: take_key(&mut map, "shell")?,
            knowledge: take_key(&mut map, "knowledge")?,
            browser: take_key(&mut map, "browser")?,
        })
    }
}

fn take_key<T: DeserializeOwned + Default>(map: &mut Map<String, Value>, key: &str) -> Result<T> {
    match map.remove(key) {
        Some(value) => serde_json::from_value(value).map_err(|source| Error::Configuration {
            key: key.to_string(),
            source,
        }),
        None => Ok(T::default()),
    }
}

/// Health of one feature after a self test run.
#[derive(Debug)]
pub enum CheckStatus {
    Healthy,
    Failed(Error),
    /// The check never reported back (its task panicked or was cancelled).
    NotRun(String),
}

impl CheckStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    fn into_error(self) -> Option<Error> {
        match self {
            Self::Healthy => None,
            Self::Failed(err) => Some(err),
            Self::NotRun(reason) => Some(Error::state(format!("self test did not run - {reason}"))),
        }
    }
}

/// Aggregate of all features plus the trigger lookup for configured ones.
pub struct FeatureSet {
    configs: FeatureConfigs,
    launcher: Option<Arc<dyn Launcher>>,
    builtin: Vec<Arc<dyn Feature>>,
    /// Handle on the built-in browser feature, which owns worker processes.
    browser: Arc<BrowserControl>,
    extra: Vec<Arc<dyn Feature>>,
    lookup: HashMap<Trigger, Arc<dyn Feature>>,
    self_test_timeout: Duration,
    log: Logger,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSet {
    /// A set of built-in features with default (mostly unconfigured) settings.
    pub fn new() -> Self {
        let configs = FeatureConfigs::default();
        let browser = Arc::new(BrowserControl::new(configs.browser.clone(), None));
        let mut set = Self {
            configs,
            launcher: None,
            builtin: Vec::new(),
            browser,
            extra: Vec::new(),
            lookup: HashMap::new(),
            self_test_timeout: DEFAULT_SELF_TEST_TIMEOUT,
            log: Logger::new("FeatureSet", ""),
        };
        set.rebuild_builtin();
        set
    }

    /// Supply the worker launcher used by the browser feature.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self.rebuild_builtin();
        self
    }

    /// Add a feature that is not part of the built-in catalogue.
    pub fn register(&mut self, feature: Arc<dyn Feature>) {
        self.extra.push(feature);
    }

    pub fn set_self_test_timeout(&mut self, deadline: Duration) {
        self.self_test_timeout = deadline;
    }

    pub fn configs(&self) -> &FeatureConfigs {
        &self.configs
    }

    /// Replace the built-in features' configuration from a JSON object.
    ///
    /// Does not initialise anything; the lookup is emptied until the next
    /// [`FeatureSet::initialise`]. Browser workers started under the previous
    /// configuration are shut down. A rejected document leaves everything as
    /// it was.
    pub async fn deserialise_from_json(&mut self, raw: &str) -> Result<()> {
        self.configs = FeatureConfigs::from_json(raw).inspect_err(|err| {
            self.log.warn("deserialise_from_json", "", err, "rejected configuration");
        })?;
        self.lookup = HashMap::new();
        let previous = Arc::clone(&self.browser);
        self.rebuild_builtin();
        previous.shutdown().await;
        Ok(())
    }

    /// Initialise every configured feature and rebuild the trigger lookup.
    ///
    /// Stops at the first failure; the set then has no registered triggers
    /// and should be discarded.
    pub async fn initialise(&mut self) -> Result<()> {
        self.lookup = HashMap::new();

        let mut lookup: HashMap<Trigger, Arc<dyn Feature>> = HashMap::new();
        for feature in self.builtin.iter().chain(self.extra.iter()) {
            let trigger = feature.trigger();
            if !feature.is_configured() {
                debug!(feature = feature.key(), %trigger, "feature is not configured");
                continue;
            }

            let slot = match lookup.entry(trigger) {
                Entry::Occupied(existing) => {
                    let err = Error::DuplicateTrigger {
                        trigger,
                        first: existing.get().key(),
                        second: feature.key(),
                    };
                    self.log.warn("initialise", feature.key(), &err, "aborting registry build");
                    return Err(err);
                },
                Entry::Vacant(slot) => slot,
            };

            if let Err(err) = feature.initialise().await {
                self.log.warn("initialise", feature.key(), &err, "aborting registry build");
                return Err(err);
            }
            slot.insert(Arc::clone(feature));
        }

        self.lookup = lookup;
        info!(triggers = ?self.triggers(), "feature set initialised");
        Ok(())
    }

    /// Self test every registered feature concurrently and return the
    /// failures keyed by trigger. Healthy features are absent from the map.
    pub async fn self_test(&self) -> HashMap<Trigger, Error> {
        self.self_test_statuses()
            .await
            .into_iter()
            .filter_map(|(trigger, status)| status.into_error().map(|err| (trigger, err)))
            .collect()
    }

    /// Self test every registered feature and report each one's status.
    pub async fn self_test_statuses(&self) -> HashMap<Trigger, CheckStatus> {
        let mut statuses: HashMap<Trigger, CheckStatus> = self
            .lookup
            .keys()
            .map(|trigger| (*trigger, CheckStatus::NotRun("no report received".into())))
            .collect();
        if self.lookup.is_empty() {
            return statuses;
        }

        let (tx, mut rx) = mpsc::channel(self.lookup.len());
        let mut tasks = JoinSet::new();
        for (trigger, feature) in &self.lookup {
            let trigger = *trigger;
            let feature = Arc::clone(feature);
            let tx = tx.clone();
            let deadline = self.self_test_timeout;
            tasks.spawn(async move {
                let status = match timeout(deadline, feature.self_test()).await {
                    Ok(Ok(())) => CheckStatus::Healthy,
                    Ok(Err(err)) => CheckStatus::Failed(err),
                    Err(_) => CheckStatus::Failed(Error::Timeout(deadline)),
                };
                let _ = tx.send((trigger, status)).await;
            });
        }
        drop(tx);

        while let Some((trigger, status)) = rx.recv().await {
            if let CheckStatus::Failed(err) = &status {
                self.log.warn("self_test", trigger.as_str(), err, "feature is unhealthy");
            }
            statuses.insert(trigger, status);
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "self test task did not complete");
            }
        }
        statuses
    }

    /// Registered triggers, sorted.
    pub fn triggers(&self) -> Vec<Trigger> {
        let mut triggers: Vec<Trigger> = self.lookup.keys().copied().collect();
        triggers.sort();
        triggers
    }

    pub fn lookup(&self, trigger: &str) -> Option<Arc<dyn Feature>> {
        self.lookup.get(trigger).map(Arc::clone)
    }

    /// Run a command against the feature registered for `trigger`.
    pub async fn dispatch(&self, trigger: &str, cmd: Command) -> Outcome {
        match self.lookup(trigger) {
            Some(feature) => feature.execute(cmd).await,
            None => Outcome::failed(Error::UnknownTrigger {
                trigger: trigger.to_string(),
            }),
        }
    }

    /// Split `<trigger> <text>` and dispatch it.
    pub async fn dispatch_text(&self, channel: &str, text: &str) -> Outcome {
        let text = text.trim_start();
        let (trigger, content) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));
        self.dispatch(trigger, Command::new(channel, content)).await
    }

    fn rebuild_builtin(&mut self) {
        self.browser = Arc::new(BrowserControl::new(
            self.configs.browser.clone(),
            self.launcher.clone(),
        ));
        self.builtin = vec![
            Arc::new(EnvInfo::new(self.configs.env_info.clone())),
            Arc::new(Shell::new(self.configs.shell.clone())),
            Arc::new(KnowledgeLookup::new(self.configs.knowledge.clone())),
            Arc::clone(&self.browser) as Arc<dyn Feature>,
        ];
    }
}
