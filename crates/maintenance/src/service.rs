//! Maintenance supervisor: timer loop and cycle execution.

use std::{sync::Arc, time::Duration};

use {
    chrono::Utc,
    futures::future::join_all,
    switchboard_common::Logger,
    switchboard_features::FeatureSet,
    tokio::{
        sync::{Mutex, RwLock},
        task::JoinHandle,
        time::MissedTickBehavior,
    },
    tracing::{debug, info, warn},
};

use crate::{
    accounts::{LoginAccounts, SystemLoginAccounts},
    config::MaintenanceConfig,
    error::{Error, Result},
    probe::{HealthProbe, Notifier},
    report::MaintenanceReport,
};

const ACCOUNT_ENUMERATION: &str = "(enumerate login accounts)";

/// Periodically proves the health of the feature registry and its
/// surrounding collaborators, and keeps unexpected login accounts locked.
pub struct Maintenance {
    config: MaintenanceConfig,
    features: Arc<FeatureSet>,
    mail_pipeline: Option<Arc<dyn HealthProbe>>,
    http_handlers: Vec<Arc<dyn HealthProbe>>,
    accounts: Arc<dyn LoginAccounts>,
    notifier: Option<Arc<dyn Notifier>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    running: RwLock<bool>,
    last_report: RwLock<Option<MaintenanceReport>>,
    log: Logger,
}

impl Maintenance {
    pub fn new(config: MaintenanceConfig, features: Arc<FeatureSet>) -> Self {
        Self {
            config,
            features,
            mail_pipeline: None,
            http_handlers: Vec::new(),
            accounts: Arc::new(SystemLoginAccounts::default()),
            notifier: None,
            timer_handle: Mutex::new(None),
            running: RwLock::new(false),
            last_report: RwLock::new(None),
            log: Logger::new("Maintenance", ""),
        }
    }

    #[must_use]
    pub fn with_mail_pipeline(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.mail_pipeline = Some(probe);
        self
    }

    #[must_use]
    pub fn with_http_handler(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.http_handlers.push(probe);
        self
    }

    #[must_use]
    pub fn with_login_accounts(mut self, accounts: Arc<dyn LoginAccounts>) -> Self {
        self.accounts = accounts;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut MaintenanceConfig {
        &mut self.config
    }

    /// Validate the configuration. Can be repeated after correcting it.
    pub fn initialise(&mut self) -> Result<()> {
        self.config.normalise().inspect_err(|err| {
            self.log.warn("initialise", "", err, "rejected configuration");
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_sec)
    }

    /// Report of the most recent completed cycle.
    pub async fn last_report(&self) -> Option<MaintenanceReport> {
        self.last_report.read().await.clone()
    }

    /// Start the timer loop. The first cycle runs immediately.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut config = self.config.clone();
        config.normalise()?;
        if config != self.config {
            return Err(Error::configuration(
                "interval_sec",
                "initialise must run before start",
            ));
        }

        let mut handle = self.timer_handle.lock().await;
        if handle.is_some() {
            debug!("maintenance timer already running");
            return Ok(());
        }
        *self.running.write().await = true;

        let svc = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            svc.timer_loop().await;
        }));
        info!(interval_sec = self.config.interval_sec, "maintenance started");
        Ok(())
    }

    /// Stop the timer loop. A cycle in progress is abandoned.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(handle) = self.timer_handle.lock().await.take() {
            handle.abort();
        }
        info!("maintenance stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    async fn timer_loop(self: &Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                break;
            }
            if let Err(err) = self.run_checks().await {
                self.log.warn("timer_loop", "", &err, "maintenance cycle found problems");
            }
        }
    }

    /// Run one cycle and fold its failures into a single error.
    pub async fn run_checks(&self) -> Result<()> {
        self.run_cycle().await.into_result()
    }

    /// Run every check once and report the failures.
    pub async fn run_cycle(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::new(Utc::now());

        self.lock_unexpected_logins(&mut report).await;

        for (trigger, err) in self.features.self_test().await {
            report.features.insert(trigger.to_string(), err.to_string());
        }

        let probes = self.mail_pipeline.iter().chain(self.http_handlers.iter());
        let results = join_all(probes.map(|probe| async move {
            (probe.name().to_string(), probe.probe().await)
        }))
        .await;
        for (name, result) in results {
            if let Err(err) = result {
                report.probes.insert(name, format!("{err:#}"));
            }
        }

        report.finished_at = Utc::now();
        if !report.is_empty() {
            self.notify(&report).await;
        }
        self.log.info(
            "run_cycle",
            "",
            format!(
                "completed with {} failure(s) in {}ms",
                report.failure_count(),
                (report.finished_at - report.started_at).num_milliseconds()
            ),
        );
        *self.last_report.write().await = Some(report.clone());
        report
    }

    async fn lock_unexpected_logins(&self, report: &mut MaintenanceReport) {
        if self.config.block_system_login_except.is_empty() {
            return;
        }
        let accounts = match self.accounts.login_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                report
                    .login_accounts
                    .insert(ACCOUNT_ENUMERATION.into(), format!("{err:#}"));
                return;
            },
        };
        for account in accounts {
            if self.config.is_allowed_login(&account) {
                continue;
            }
            if let Err(err) = self.accounts.lock(&account).await {
                report.login_accounts.insert(account, format!("{err:#}"));
            }
        }
    }

    async fn notify(&self, report: &MaintenanceReport) {
        let Some(notifier) = self.notifier.as_ref() else {
            warn!(
                failures = report.failure_count(),
                "maintenance found problems, no notifier configured"
            );
            return;
        };
        let subject = format!("maintenance found {} problem(s)", report.failure_count());
        if let Err(err) = notifier.notify(&subject, &report.to_string()).await {
            self.log.error("run_cycle", "", &format!("{err:#}"), "failed to send report");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use {
        super::*,
        anyhow::bail,
        async_trait::async_trait,
        switchboard_features::{Command, Feature, Outcome, Trigger},
    };

    struct FixedFeature {
        trigger: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl Feature for FixedFeature {
        fn key(&self) -> &'static str {
            self.trigger
        }

        fn trigger(&self) -> Trigger {
            Trigger::new(self.trigger)
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn initialise(&self) -> switchboard_features::Result<()> {
            Ok(())
        }

        async fn self_test(&self) -> switchboard_features::Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(switchboard_features::Error::state("upstream unreachable"))
            }
        }

        async fn execute(&self, _cmd: Command) -> Outcome {
            Outcome::default()
        }
    }

    #[derive(Default)]
    struct FakeAccounts {
        accounts: Vec<String>,
        refuse: Vec<String>,
        locked: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl LoginAccounts for FakeAccounts {
        async fn login_accounts(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.accounts.clone())
        }

        async fn lock(&self, account: &str) -> anyhow::Result<()> {
            if self.refuse.iter().any(|a| a == account) {
                bail!("permission denied");
            }
            self.locked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(account.to_string());
            Ok(())
        }
    }

    struct FixedProbe {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl HealthProbe for FixedProbe {
        fn name(&self) -> &str {
            self.name
        }

        async fn probe(&self) -> anyhow::Result<()> {
            if !self.healthy {
                bail!("no response");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    async fn features(healthy: bool) -> Arc<FeatureSet> {
        let mut set = FeatureSet::new();
        set.register(Arc::new(FixedFeature {
            trigger: ".ok",
            healthy: true,
        }));
        set.register(Arc::new(FixedFeature {
            trigger: ".maybe",
            healthy,
        }));
        set.initialise().await.unwrap();
        Arc::new(set)
    }

    fn accounts(names: &[&str]) -> Arc<FakeAccounts> {
        Arc::new(FakeAccounts {
            accounts: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn initialise_validates_interval() {
        let mut maint = Maintenance::new(
            MaintenanceConfig {
                block_system_login_except: vec!["root".into()],
                ..Default::default()
            },
            features(true).await,
        );
        maint.initialise().unwrap();
        assert_eq!(maint.config().interval_sec, 24 * 3600);

        maint.config_mut().interval_sec = 1;
        let err = maint.initialise().unwrap_err();
        assert!(err.to_string().contains("interval_sec"), "{err}");

        maint.config_mut().interval_sec = 3600;
        maint.initialise().unwrap();
        assert_eq!(maint.interval(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn healthy_cycle_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let maint = Maintenance::new(MaintenanceConfig::default(), features(true).await)
            .with_login_accounts(accounts(&["root"]))
            .with_http_handler(Arc::new(FixedProbe {
                name: "info",
                healthy: true,
            }))
            .with_notifier(notifier.clone());

        let report = maint.run_cycle().await;
        assert!(report.is_empty(), "{report}");
        assert!(notifier.sent.lock().unwrap().is_empty());
        assert!(maint.last_report().await.is_some());
    }

    #[tokio::test]
    async fn failures_are_aggregated_and_notified() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fake_accounts = Arc::new(FakeAccounts {
            accounts: vec!["root".into(), "guest".into(), "mallory".into()],
            refuse: vec!["mallory".into()],
            ..Default::default()
        });
        let maint = Maintenance::new(
            MaintenanceConfig {
                block_system_login_except: vec!["root".into()],
                ..Default::default()
            },
            features(false).await,
        )
        .with_login_accounts(fake_accounts.clone())
        .with_mail_pipeline(Arc::new(FixedProbe {
            name: "mail",
            healthy: false,
        }))
        .with_http_handler(Arc::new(FixedProbe {
            name: "info",
            healthy: true,
        }))
        .with_notifier(notifier.clone());

        let report = maint.run_cycle().await;
        assert_eq!(*fake_accounts.locked.lock().unwrap(), vec!["guest"]);
        assert_eq!(report.login_accounts["mallory"], "permission denied");
        assert_eq!(report.features.len(), 1);
        assert_eq!(report.features[".maybe"], "upstream unreachable");
        assert_eq!(report.probes.len(), 1);
        assert_eq!(report.probes["mail"], "no response");

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "maintenance found 3 problem(s)");
        assert!(sent[0].1.contains(".maybe: upstream unreachable"));
    }

    #[tokio::test]
    async fn empty_allow_list_locks_nobody() {
        let fake_accounts = accounts(&["root", "guest"]);
        let maint = Maintenance::new(MaintenanceConfig::default(), features(true).await)
            .with_login_accounts(fake_accounts.clone());

        maint.run_cycle().await;
        assert!(fake_accounts.locked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_checks_aggregates_failures() {
        let healthy = Maintenance::new(MaintenanceConfig::default(), features(true).await);
        healthy.run_checks().await.unwrap();

        let unhealthy = Maintenance::new(MaintenanceConfig::default(), features(false).await);
        match unhealthy.run_checks().await {
            Err(Error::Aggregate { failures, summary }) => {
                assert_eq!(failures, 1);
                assert!(summary.contains("Features:"), "{summary}");
            },
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(unhealthy.last_report().await.unwrap().failure_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_runs_cycles_until_stopped() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut maint = Maintenance::new(
            MaintenanceConfig {
                interval_sec: 600,
                ..Default::default()
            },
            features(false).await,
        )
        .with_notifier(notifier.clone());
        maint.initialise().unwrap();
        let maint = Arc::new(maint);

        maint.start().await.unwrap();
        assert!(maint.is_running().await);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);

        maint.stop().await;
        assert!(!maint.is_running().await);
        tokio::time::sleep(Duration::from_secs(1200)).await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn start_requires_initialise() {
        let maint = Arc::new(Maintenance::new(
            MaintenanceConfig::default(),
            features(true).await,
        ));
        assert!(maint.start().await.is_err());
        assert!(!maint.is_running().await);
    }
}
