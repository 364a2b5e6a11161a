use async_trait::async_trait;

use crate::{
    command::{Command, Outcome, Trigger},
    error::Result,
};

/// Capability contract implemented by every feature.
///
/// The registry calls [`Feature::initialise`] once, and only when
/// [`Feature::is_configured`] is true. [`Feature::self_test`] may run while
/// commands are executing and must not disturb their state.
#[async_trait]
pub trait Feature: Send + Sync {
    /// Configuration key, also used to name the feature in diagnostics.
    fn key(&self) -> &'static str;

    /// Constant for the lifetime of the feature.
    fn trigger(&self) -> Trigger;

    /// Whether enough configuration is present to use the feature. Must not
    /// fail or have side effects, including on a default configuration.
    fn is_configured(&self) -> bool;

    /// Prepare the feature for use, failing when a dependency is unreachable.
    async fn initialise(&self) -> Result<()>;

    /// Check that the feature currently works.
    async fn self_test(&self) -> Result<()>;

    /// Run a command. Failures are reported in the outcome, never by panicking.
    async fn execute(&self, cmd: Command) -> Outcome;
}
